use std::sync::Arc;

use tokio::signal;
use tracing::{error, info};

use ratekeeper::http::{AppState, router};
use ratekeeper::{BackendKind, Config, MemoryBackend, RateLimitBackend, RedisBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();

    let backend: Arc<dyn RateLimitBackend> = match config.backend {
        BackendKind::Redis => {
            let backend = RedisBackend::connect(&config.redis_url()).await?;
            info!(addr = %config.redis_addr, db = config.redis_db, "connected to redis");
            Arc::new(backend)
        }
        BackendKind::Memory => Arc::new(MemoryBackend::new()),
    };

    let app = router(AppState {
        backend: backend.clone(),
    });

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
    info!(port = config.port, backend = ?config.backend, "rate limiter listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Err(err) = backend.close().await {
        error!(error = %err, "backend close failed");
    }

    info!("rate limiter stopped");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
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
        _ = ctrl_c => {
            info!("received Ctrl+C, shutting down");
        }
        _ = terminate => {
            info!("received SIGTERM, shutting down");
        }
    }
}
