//! Feed relay bot: binary entrypoint.
//! Loads configuration, boots the Axum front end and optionally starts the
//! polling loop right away.

use std::net::SocketAddr;

use anyhow::Context;
use feed_relay_bot::api::{self, AppState};
use feed_relay_bot::config::Settings;
use feed_relay_bot::metrics::Metrics;
use feed_relay_bot::Poller;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Compact human logs by default; `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when the file is absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let settings = Settings::from_env()?;
    settings.log_summary();

    let metrics = Metrics::init()?;
    let poller = Poller::from_settings(&settings)?;
    if settings.autostart && poller.start() {
        info!("polling loop started at boot (RELAY_AUTOSTART=1)");
    }

    let app = api::router(AppState::new(poller)).merge(metrics.router());

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "listening");
    axum::serve(listener, app).await.context("http server")?;
    Ok(())
}
