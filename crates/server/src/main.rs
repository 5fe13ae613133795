use anyhow::Context;
use deployment::Deployment;
use server::{DeploymentImpl, routes};
use services::services::config::Config;
use tracing::info;
use utils::{logging::init_tracing, sentry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("invalid configuration")?;
    init_tracing("info", config.sentry_dsn.is_some());
    config.log_warnings();
    let _sentry_guard = sentry::init_once(config.sentry_dsn.as_deref(), &config.environment);

    let addr = config.bind_address();
    let deployment = DeploymentImpl::new(config).await?;
    deployment.spawn_background_tasks().await;

    let app = routes::router(deployment);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Server running on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutting down");
}
