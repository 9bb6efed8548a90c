//! URL shortener API server entry point.

use std::error::Error;
use std::net::SocketAddr;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use shorturl_api::app;
use shorturl_api::config::AppConfig;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Initialize tracing subscriber.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting URL shortener API server");

    let config = AppConfig::from_env()?;
    let (trigger, shutdown) = shorturl_core::shutdown::channel();

    let services = app::start(&config, &shutdown).await?;
    let router = app::router(services.state.clone());

    // Start server.
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| format!("invalid HOST:PORT combination: {e}"))?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
            }
            tracing::info!("shutdown requested");
            trigger.trigger();
        })
        .await?;

    services.stop(SHUTDOWN_GRACE).await;
    tracing::info!("server stopped");
    Ok(())
}
