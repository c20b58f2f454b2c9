use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::backoff::{self, BackoffPolicy};

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub host: IpAddr,
    pub port: u16,
    pub field_reports_url: Option<String>,
    pub estimating_url: Option<String>,
    pub crm_url: Option<String>,
    pub delivery_timeout: Duration,
    pub sync_interval: Duration,
    pub probe: Option<ProbeConfig>,
    pub backoff: BackoffPolicy,
    pub log_level: String,
}

#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub url: String,
    pub interval: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let database_url = env_or("DATABASE_URL", "sqlite://fieldqueue.db");

        let host: IpAddr = parse_env("FIELDQUEUE_HOST", "127.0.0.1")?;
        let port: u16 = parse_env("FIELDQUEUE_PORT", "3100")?;

        let field_reports_url = env_optional("FIELDQUEUE_FIELD_REPORTS_URL");
        let estimating_url = env_optional("FIELDQUEUE_ESTIMATING_URL");
        let crm_url = env_optional("FIELDQUEUE_CRM_URL");

        let delivery_timeout = env_secs("FIELDQUEUE_DELIVERY_TIMEOUT_SECS", "30")?;
        let sync_interval = env_secs("FIELDQUEUE_SYNC_INTERVAL_SECS", "60")?;

        let probe = match env_optional("FIELDQUEUE_PROBE_URL") {
            Some(url) => Some(ProbeConfig {
                url,
                interval: env_secs("FIELDQUEUE_PROBE_INTERVAL_SECS", "15")?,
            }),
            None => None,
        };

        let initial_ms: u64 = parse_env(
            "FIELDQUEUE_INITIAL_BACKOFF_MS",
            &backoff::INITIAL_MS.to_string(),
        )?;
        let max_ms: u64 = parse_env("FIELDQUEUE_MAX_BACKOFF_MS", &backoff::CAP_MS.to_string())?;
        let backoff = BackoffPolicy::new(
            Duration::from_millis(initial_ms),
            Duration::from_millis(max_ms),
        );

        let log_level = env_or("FIELDQUEUE_LOG_LEVEL", "info");

        Ok(Config {
            database_url,
            host,
            port,
            field_reports_url,
            estimating_url,
            crm_url,
            delivery_timeout,
            sync_interval,
            probe,
            backoff,
            log_level,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_optional(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// A whole number of seconds. Zero is rejected: every duration here drives a
/// timer or a timeout.
fn env_secs(key: &str, default: &str) -> Result<Duration, String> {
    parse_secs(key, &env_or(key, default))
}

fn parse_secs(key: &str, value: &str) -> Result<Duration, String> {
    let secs: u64 = value.trim().parse().map_err(|e| format!("Invalid {key}: {e}"))?;
    if secs == 0 {
        return Err(format!("Invalid {key}: must be > 0"));
    }
    Ok(Duration::from_secs(secs))
}

fn parse_env<T>(key: &str, default: &str) -> Result<T, String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_or(key, default)
        .parse()
        .map_err(|e| format!("Invalid {key}: {e}"))
}
