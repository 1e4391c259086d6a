//! hrmigrate server - Main entry point

use anyhow::Result;
use hrmigrate_common::logging::{init_logging, LogConfig};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::signal;
use tracing::info;

use hrmigrate_server::{
    api::{self, AppState},
    config::Config,
    db::{self, EnvConnectParams},
    migration::{ErrorReporter, PgLoader, Pipeline},
    storage::{config::StorageConfig, Storage},
};

#[tokio::main]
async fn main() -> Result<()> {
    let log_config = LogConfig::builder()
        .log_file_prefix("hrmigrate-server")
        .filter_directives("hrmigrate_server=debug,tower_http=debug,sqlx=info")
        .build();

    // Environment variables take precedence
    let log_config = log_config.merge_env()?;

    let _log_guard = init_logging(&log_config)?;

    info!("Starting hrmigrate server");

    let config = Config::load()?;
    info!(
        "Configuration loaded - server will bind to {}",
        config.server.bind_addr()
    );

    let db_pool = db::create_pool(&EnvConnectParams, &config.database).await?;
    info!("Database connection pool established");

    let storage = Storage::new(StorageConfig::from_env()?).await?;
    info!("Storage client initialized");

    let pipeline = Pipeline::new(
        Arc::new(PgLoader::new(db_pool.clone())),
        ErrorReporter::with_prefix(Arc::new(storage), config.migration.error_prefix.clone()),
    );

    let state = AppState {
        db: db_pool.clone(),
        pipeline,
    };
    let app = api::create_router(state);

    let addr: SocketAddr = config.server.bind_addr().parse()?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(config.server.shutdown_timeout_secs))
        .await?;

    db_pool.close().await;
    info!("Server shut down gracefully");

    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal(timeout_secs: u64) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
    }

    // Give in-flight batches time to finish
    info!("Waiting up to {} seconds for connections to close", timeout_secs);
    tokio::time::sleep(Duration::from_secs(timeout_secs.min(5))).await;
}
