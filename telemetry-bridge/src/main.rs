/**
 * TELEMETRY BRIDGE - process entry point
 *
 * ROLE: loads .env + config, installs logging, builds the webhook notifier
 * and the Bridge, then runs until Ctrl-C.
 */

use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use telemetry_bridge::config::load_config;
use telemetry_bridge::notify::WebhookNotifier;
use telemetry_bridge::{Bridge, BridgeError};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = load_config().await;
    info!(
        broker = %format!("{}:{}", cfg.mqtt.host, cfg.mqtt.port),
        topic = %cfg.mqtt.topic,
        prune_seconds = cfg.prune_seconds,
        cpu_alert_threshold = cfg.cpu_alert_threshold,
        "configuration loaded"
    );

    let notifier = WebhookNotifier::new(
        cfg.webhook.url.clone(),
        Duration::from_secs(cfg.webhook.timeout_seconds),
    )
    .map_err(BridgeError::from)?;
    if !notifier.is_enabled() {
        warn!("SLACK_WEBHOOK_URL not set, alerts and digests are disabled");
    }

    let mut bridge = Bridge::new(cfg, Arc::new(notifier));
    let addr = bridge.start().await.context("starting bridge")?;
    info!("websocket running at ws://{addr}");

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("shutdown requested");
    bridge.stop();
    Ok(())
}
