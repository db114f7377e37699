use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use tokio::fs;
use tracing::warn;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct BridgeConfig {
    pub mqtt: MqttConf,
    pub ws: WsConf,
    pub prune_seconds: i64,
    pub cpu_alert_threshold: f64,
    pub digest_interval_seconds: u64,
    /// Entries older than `reap_factor * prune_seconds` are deleted; 0 disables.
    pub reap_factor: i64,
    pub webhook: WebhookConf,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct MqttConf {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub topic: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct WsConf {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct WebhookConf {
    pub url: Option<String>,
    pub timeout_seconds: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            mqtt: MqttConf::default(),
            ws: WsConf::default(),
            prune_seconds: 30,
            cpu_alert_threshold: 90.0,
            digest_interval_seconds: 60,
            reap_factor: 10,
            webhook: WebhookConf::default(),
        }
    }
}

impl Default for MqttConf {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 1883,
            client_id: "telemetry-bridge".into(),
            topic: "devices/+/metrics".into(),
        }
    }
}

impl Default for WsConf {
    fn default() -> Self {
        Self { host: "0.0.0.0".into(), port: 6789 }
    }
}

impl Default for WebhookConf {
    fn default() -> Self {
        Self { url: None, timeout_seconds: 10 }
    }
}

impl BridgeConfig {
    pub fn prune_window(&self) -> time::Duration {
        time::Duration::seconds(self.prune_seconds)
    }

    /// `None` when reaping is disabled.
    pub fn reap_after(&self) -> Option<time::Duration> {
        (self.reap_factor > 0).then(|| time::Duration::seconds(self.prune_seconds.saturating_mul(self.reap_factor)))
    }

    /// Applies environment-style overrides. `lookup` is `std::env::var` in production.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("MQTT_BROKER") { self.mqtt.host = v; }
        if let Some(v) = lookup("MQTT_CLIENT_ID") { self.mqtt.client_id = v; }
        if let Some(v) = lookup("MQTT_TOPIC") { self.mqtt.topic = v; }
        if let Some(v) = lookup("WS_HOST") { self.ws.host = v; }
        override_parsed(&lookup, "MQTT_PORT", &mut self.mqtt.port);
        override_parsed(&lookup, "WS_PORT", &mut self.ws.port);
        override_checked(&lookup, "PRUNE_SECONDS", &mut self.prune_seconds, |v| *v > 0);
        override_parsed(&lookup, "CPU_ALERT_THRESHOLD", &mut self.cpu_alert_threshold);
        override_parsed(&lookup, "DIGEST_INTERVAL_SECONDS", &mut self.digest_interval_seconds);
        override_parsed(&lookup, "REAP_FACTOR", &mut self.reap_factor);
        override_parsed(&lookup, "WEBHOOK_TIMEOUT_SECONDS", &mut self.webhook.timeout_seconds);
        if let Some(v) = lookup("SLACK_WEBHOOK_URL") {
            self.webhook.url = (!v.trim().is_empty()).then_some(v);
        }
    }
}

fn override_parsed<F, T>(lookup: &F, key: &str, slot: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    override_checked(lookup, key, slot, |_| true);
}

fn override_checked<F, T, V>(lookup: &F, key: &str, slot: &mut T, valid: V)
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    V: Fn(&T) -> bool,
{
    let Some(raw) = lookup(key) else { return };
    match raw.trim().parse() {
        Ok(v) if valid(&v) => *slot = v,
        _ => warn!(key, value = %raw, "ignoring invalid config override"),
    }
}

/// Reads the YAML config file, falling back to defaults when it is missing or invalid.
pub async fn load_file(path: &Path) -> BridgeConfig {
    if !path.exists() {
        warn!(path = %path.display(), "no config file, using defaults");
        return BridgeConfig::default();
    }
    let txt = fs::read_to_string(path).await.unwrap_or_default();
    if txt.trim().is_empty() {
        return BridgeConfig::default();
    }
    let mut cfg: BridgeConfig = serde_yaml::from_str(&txt).unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "invalid config file, using defaults");
        BridgeConfig::default()
    });
    if cfg.prune_seconds <= 0 {
        warn!(prune_seconds = cfg.prune_seconds, "prune_seconds must be positive, using default");
        cfg.prune_seconds = BridgeConfig::default().prune_seconds;
    }
    cfg
}

/// File config (`BRIDGE_CONFIG`, default `bridge.yaml`) with environment overrides on top.
pub async fn load_config() -> BridgeConfig {
    let path = std::env::var("BRIDGE_CONFIG").unwrap_or_else(|_| "bridge.yaml".into());
    let mut cfg = load_file(Path::new(&path)).await;
    cfg.apply_overrides(|key| std::env::var(key).ok());
    cfg
}
