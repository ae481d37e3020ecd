mod bootstrap;
mod health;
mod webhook;

use std::future::IntoFuture;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use clinibook_core::config::{AppConfig, LoadOptions, LogFormat};
use tokio::sync::oneshot;
use tracing_subscriber::EnvFilter;

use crate::bootstrap::Application;
use crate::webhook::WebhookState;

fn init_logging(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_target(false).with_env_filter(filter);

    match config.logging.format {
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Pretty => builder.pretty().init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn app_router(app: &Application) -> Router {
    let webhook_state = WebhookState::new(app.pipeline.clone(), app.config.messaging.webhook_secret.clone());
    health::router(app.db_pool.clone()).merge(webhook::router(webhook_state))
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;
    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener =
        tokio::net::TcpListener::bind(&address).await.with_context(|| format!("could not bind {address}"))?;

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        webhook_signed = app.config.messaging.webhook_secret.is_some(),
        "clinibook-server listening"
    );

    let (stop, stopped) = oneshot::channel::<()>();
    let server = tokio::spawn(axum::serve(listener, app_router(&app)).with_graceful_shutdown(async move {
        let _ = stopped.await;
    }).into_future());

    tokio::signal::ctrl_c().await.context("could not listen for shutdown signal")?;
    tracing::info!(event_name = "system.server.stopping", correlation_id = "shutdown", "draining in-flight requests");
    let _ = stop.send(());

    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    match tokio::time::timeout(grace, server).await {
        Ok(joined) => joined.context("server task panicked")?.context("server terminated with an error")?,
        Err(_) => tracing::warn!(
            event_name = "system.server.shutdown_timeout",
            correlation_id = "shutdown",
            grace_secs = grace.as_secs(),
            "in-flight requests abandoned"
        ),
    }

    app.db_pool.close().await;
    tracing::info!(event_name = "system.server.stopped", correlation_id = "shutdown");
    Ok(())
}
