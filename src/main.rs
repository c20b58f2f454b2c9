use std::net::SocketAddr;
use std::sync::Arc;

use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use fieldqueue::background_sync::SyncRegistrar;
use fieldqueue::config::Config;
use fieldqueue::connectivity::Connectivity;
use fieldqueue::state::{AppState, SharedState};
use fieldqueue::{db, worker};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Load config
    let config = Config::from_env().expect("Failed to load configuration");

    // Init tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    tracing::info!("Starting fieldqueue");

    let pool = db::connect(&config.database_url)
        .await
        .expect("Failed to open queue database");

    db::setup_database(&pool)
        .await
        .expect("Failed to run migrations");

    tracing::info!("Migrations applied");

    let connectivity = Connectivity::online();
    let (registrar, tags) = SyncRegistrar::channel();

    let queues = fieldqueue::build_queues(
        &pool,
        &config,
        connectivity.clone(),
        Some(Arc::new(registrar)),
    )?;

    let addr = SocketAddr::new(config.host, config.port);
    let sync_interval = config.sync_interval;
    let probe = config.probe.clone();

    let state: SharedState = Arc::new(AppState {
        config,
        queues,
        connectivity: connectivity.clone(),
    });

    // Background workers
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut workers = vec![tokio::spawn(worker::run(
        state.clone(),
        tags,
        sync_interval,
        shutdown_rx.clone(),
    ))];

    if let Some(probe) = probe {
        tracing::info!("Probing {} every {:?}", probe.url, probe.interval);
        workers.push(tokio::spawn(worker::run_probe(
            connectivity,
            probe.url,
            probe.interval,
            shutdown_rx,
        )));
    }

    let app = fieldqueue::build_app(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    for handle in workers {
        let _ = handle.await;
    }
    pool.close().await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
