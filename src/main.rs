use std::sync::Arc;

use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use image_classifier_service::{AppConfig, ModelRegistry, build_router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = Arc::new(AppConfig::from_env()?.validate()?);
    tracing::info!(
        model = %config.model_path.display(),
        media_root = %config.media_root.display(),
        "loading model artifact"
    );

    let registry = Arc::new(load_registry(config.as_ref())?);
    let router = build_router(config.clone(), registry.clone());

    let listener = TcpListener::bind(config.listen_addr).await?;
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "HTTP server ready");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    registry.shutdown();
    Ok(())
}

#[cfg(feature = "tch-backend")]
fn load_registry(config: &AppConfig) -> anyhow::Result<ModelRegistry> {
    Ok(ModelRegistry::from_config(config)?)
}

#[cfg(not(feature = "tch-backend"))]
fn load_registry(_config: &AppConfig) -> anyhow::Result<ModelRegistry> {
    anyhow::bail!("built without a model backend; enable the `tch-backend` feature")
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(%err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

fn init_tracing() {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,hyper=warn,axum::rejection=trace".into());
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
