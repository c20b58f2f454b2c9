//! Online/offline signal shared by the queues, the worker and the control API.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectivityState {
    Online,
    Offline,
}

impl ConnectivityState {
    pub fn from_online(online: bool) -> Self {
        if online { Self::Online } else { Self::Offline }
    }

    pub fn is_online(self) -> bool {
        self == Self::Online
    }
}

/// Cheap to clone; every clone observes the same state.
#[derive(Debug, Clone)]
pub struct Connectivity {
    tx: Arc<watch::Sender<ConnectivityState>>,
}

impl Connectivity {
    pub fn new(initial: ConnectivityState) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    pub fn online() -> Self {
        Self::new(ConnectivityState::Online)
    }

    pub fn offline() -> Self {
        Self::new(ConnectivityState::Offline)
    }

    pub fn state(&self) -> ConnectivityState {
        *self.tx.borrow()
    }

    pub fn is_online(&self) -> bool {
        self.state().is_online()
    }

    /// Record a new state. Returns `true` if it differs from the previous one,
    /// in which case subscribers are woken.
    pub fn set(&self, state: ConnectivityState) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
        if changed {
            tracing::info!("Connectivity changed: {state:?}");
        }
        changed
    }

    pub fn set_online(&self) -> bool {
        self.set(ConnectivityState::Online)
    }

    pub fn set_offline(&self) -> bool {
        self.set(ConnectivityState::Offline)
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectivityState> {
        self.tx.subscribe()
    }
}

/// Build the client used for connectivity probes.
pub fn probe_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_default()
}

/// Any HTTP response, whatever its status, means the network is reachable.
pub async fn probe(client: &reqwest::Client, url: &str) -> ConnectivityState {
    match client.head(url).send().await {
        Ok(_) => ConnectivityState::Online,
        Err(e) => {
            tracing::debug!("Connectivity probe to {url} failed: {e}");
            ConnectivityState::Offline
        }
    }
}
