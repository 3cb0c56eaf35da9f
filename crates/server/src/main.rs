use anyhow::Context;
use tokio::net::TcpListener;

mod config;
mod routes;
mod telemetry;

use config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::load()?;
    telemetry::init(config.log_format)?;

    tracing::info!(
        engine = %config.scan.ocr.engine,
        tesseract = %config.scan.ocr.tesseract,
        lang = %config.scan.ocr.lang,
        pdftoppm = %config.scan.pdf.pdftoppm,
        "Starting receipt scan service"
    );

    let pipeline = config.scan.pipeline().context("invalid scan configuration")?;
    let app = routes::router(pipeline, &config);

    let listener = TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    tracing::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
