use anyhow::Context;
use std::net::SocketAddr;
use tokio::signal;

use violation_reporter::{config, create_router, middleware, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration first
    let config = config::Settings::new().context("failed to load configuration")?;

    middleware::init_logging(&config.log_level, &config.log_format)?;

    tracing::info!("Starting violation report intake v{}", env!("CARGO_PKG_VERSION"));

    let addr: SocketAddr = config
        .bind_address
        .parse()
        .with_context(|| format!("invalid bind address '{}'", config.bind_address))?;
    let app_state = AppState::new(config).context("failed to initialise application state")?;
    let app = create_router(app_state);

    tracing::info!("Server starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Handle graceful shutdown signals
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
