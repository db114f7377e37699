//! Owner of all bridge state and background tasks.
//!
//! One `Bridge` is built at process start. `start` binds the push listener
//! and spawns the MQTT listener, digest scheduler and HTTP/WS server; `stop`
//! aborts them and disconnects every viewer.

use crate::alerts::AlertEvaluator;
use crate::config::BridgeConfig;
use crate::digest::DigestScheduler;
use crate::health::HealthTracker;
use crate::http::{build_router, AppState};
use crate::ingest::IngestHandler;
use crate::mqtt::spawn_mqtt_listener;
use crate::notify::SharedNotifier;
use crate::store::DeviceStore;
use crate::viewers::ViewerRegistry;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info};

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("failed to bind push listener on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to build webhook client: {0}")]
    Notifier(#[from] crate::notify::NotifyError),
}

pub struct Bridge {
    config: BridgeConfig,
    store: DeviceStore,
    viewers: ViewerRegistry,
    health: HealthTracker,
    handler: Arc<IngestHandler>,
    notifier: SharedNotifier,
    tasks: Vec<JoinHandle<()>>,
}

impl Bridge {
    pub fn new(config: BridgeConfig, notifier: SharedNotifier) -> Self {
        let store = DeviceStore::new();
        let viewers = ViewerRegistry::new(store.clone(), config.prune_window());
        let health = HealthTracker::new();
        let alerts = AlertEvaluator::new(config.cpu_alert_threshold, notifier.clone());
        let handler = Arc::new(IngestHandler::new(
            store.clone(),
            viewers.clone(),
            alerts,
            health.clone(),
        ));
        Self { config, store, viewers, health, handler, notifier, tasks: Vec::new() }
    }

    pub fn store(&self) -> &DeviceStore {
        &self.store
    }

    pub fn viewers(&self) -> &ViewerRegistry {
        &self.viewers
    }

    /// The ingestion entry point, for transports other than the built-in MQTT one.
    pub fn handler(&self) -> Arc<IngestHandler> {
        self.handler.clone()
    }

    /// Starts the HTTP/WS server and the digest scheduler. Returns the bound address.
    pub async fn start_local(&mut self) -> Result<SocketAddr, BridgeError> {
        let addr = format!("{}:{}", self.config.ws.host, self.config.ws.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| BridgeError::Bind { addr: addr.clone(), source })?;
        let local = listener
            .local_addr()
            .map_err(|source| BridgeError::Bind { addr, source })?;

        let app = build_router(AppState {
            store: self.store.clone(),
            viewers: self.viewers.clone(),
            health: self.health.clone(),
            window: self.config.prune_window(),
        });
        self.tasks.push(tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                error!(error = %e, "push server stopped");
            }
        }));
        info!(addr = %local, "websocket server listening");

        let digest = DigestScheduler::new(
            self.store.clone(),
            self.notifier.clone(),
            self.config.prune_window(),
            self.config.reap_after(),
            Duration::from_secs(self.config.digest_interval_seconds.max(1)),
        );
        self.tasks.push(tokio::spawn(digest.run()));
        info!(every_secs = self.config.digest_interval_seconds, "digest scheduler started");

        Ok(local)
    }

    /// Everything in [`Bridge::start_local`] plus the MQTT subscription.
    pub async fn start(&mut self) -> Result<SocketAddr, BridgeError> {
        let local = self.start_local().await?;
        self.tasks.push(spawn_mqtt_listener(self.config.mqtt.clone(), self.handler.clone()));
        Ok(local)
    }

    pub fn stop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.viewers.close_all();
        info!("bridge stopped");
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::TransportHandler;
    use crate::notify::testing::RecordingNotifier;
    use bridge_devkit::TelemetryBuilder;
    use futures::StreamExt;
    use tokio_tungstenite::{connect_async, tungstenite::Message};

    fn local_config() -> BridgeConfig {
        let mut cfg = BridgeConfig::default();
        cfg.ws.host = "127.0.0.1".into();
        cfg.ws.port = 0;
        cfg
    }

    async fn next_text<S>(ws: &mut S) -> serde_json::Value
    where
        S: futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
    {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
                .await
                .expect("frame before timeout")
                .expect("stream open")
                .expect("valid frame");
            if let Message::Text(text) = msg {
                return serde_json::from_str(&text).unwrap();
            }
        }
    }

    async fn wait_for_viewers(bridge: &Bridge, n: usize) {
        for _ in 0..100 {
            if bridge.viewers().len() == n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("expected {n} viewers, have {}", bridge.viewers().len());
    }

    #[tokio::test]
    async fn test_websocket_viewer_end_to_end() {
        let rec = RecordingNotifier::default();
        let mut bridge = Bridge::new(local_config(), Arc::new(rec.clone()));
        let addr = bridge.start_local().await.unwrap();
        let handler = bridge.handler();

        handler.on_message("devices/dev-0/metrics", &TelemetryBuilder::new("dev-0").cpu(1.0).to_bytes());

        let (mut ws, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
        let snapshot = next_text(&mut ws).await;
        assert_eq!(snapshot["dev-0"]["cpu_percent"], 1.0);
        wait_for_viewers(&bridge, 1).await;

        handler.on_message("devices/dev-1/metrics", br#"{"device_id":"dev-1","cpu_percent":50,"mem_percent":40}"#);
        assert_eq!(next_text(&mut ws).await["dev-1"]["cpu_percent"], 50);

        handler.on_message("devices/dev-1/metrics", br#"{"device_id":"dev-1","cpu_percent":95,"mem_percent":80}"#);
        assert_eq!(next_text(&mut ws).await["dev-1"]["cpu_percent"], 95);

        let sent = rec.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("dev-1") && sent[0].contains("95"));

        bridge.stop();
        assert!(bridge.viewers().is_empty());
    }

    #[tokio::test]
    async fn test_viewer_disconnect_unregisters() {
        let mut bridge = Bridge::new(local_config(), Arc::new(RecordingNotifier::default()));
        let addr = bridge.start_local().await.unwrap();

        let (ws, _) = connect_async(format!("ws://{addr}/")).await.unwrap();
        wait_for_viewers(&bridge, 1).await;
        drop(ws);
        wait_for_viewers(&bridge, 0).await;

        bridge.stop();
    }

    #[tokio::test]
    async fn test_bind_failure_is_reported() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut cfg = local_config();
        cfg.ws.port = taken.local_addr().unwrap().port();

        let mut bridge = Bridge::new(cfg, Arc::new(RecordingNotifier::default()));
        assert!(matches!(bridge.start_local().await, Err(BridgeError::Bind { .. })));
    }
}
