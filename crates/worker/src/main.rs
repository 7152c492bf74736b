//! Worker entry point.

use std::sync::Arc;

use ramp_store::{InMemoryRampStore, PostgresRampStore};
use saga::{
    HandlerConfig, InMemoryChainClient, InMemoryPaymentProvider, ProcessorConfig,
    RampRecoveryWorker,
};
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use worker::config::{Config, LogFormat};
use worker::{AppState, SharedStore};

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn open_postgres(url: &str) -> SharedStore {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(url)
        .await
        .expect("failed to connect to database");
    let store = PostgresRampStore::new(pool);
    store.run_migrations().await.expect("migrations failed");
    tracing::info!("using PostgreSQL ramp store");
    Arc::new(store)
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    // 1. Initialize tracing
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Open the record store; only in-memory ramps are driven by the in-memory collaborators
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (state, recovery_task) = match &config.database_url {
        Some(url) => {
            let store = open_postgres(url).await;
            tracing::warn!(
                "no chain or payment client is configured for persisted ramps, processing and recovery are disabled"
            );
            (AppState::read_only(store), None)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, ramps are kept in memory only");
            let store: SharedStore = Arc::new(InMemoryRampStore::new());
            let processor = worker::create_processor(
                store,
                Arc::new(InMemoryChainClient::new()),
                Arc::new(InMemoryPaymentProvider::new()),
                HandlerConfig::default(),
                ProcessorConfig::default(),
            );

            // 4. Start the recovery sweeper
            let recovery =
                RampRecoveryWorker::with_config(processor.clone(), config.recovery_config());
            let task = tokio::spawn(async move { recovery.run(shutdown_rx).await });
            (AppState::new(processor), Some(task))
        }
    };

    // 5. Build the application
    let app = worker::create_app(state, metrics_handle);

    // 6. Start server
    let addr = config.addr();
    tracing::info!(%addr, "starting ramp worker");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    // 7. Stop the sweeper; an in-flight sweep finishes first
    let _ = shutdown_tx.send(true);
    if let Some(task) = recovery_task
        && let Err(err) = task.await
    {
        tracing::error!(error = %err, "recovery worker task failed");
    }

    tracing::info!("worker shut down gracefully");
}
