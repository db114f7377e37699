use crate::alerts::AlertEvaluator;
use crate::health::HealthTracker;
use crate::models::{TelemetryRecord, UNKNOWN_DEVICE};
use crate::store::DeviceStore;
use crate::viewers::ViewerRegistry;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

/// Events raised by a publish-subscribe transport adapter.
pub trait TransportHandler: Send + Sync + 'static {
    fn on_connect(&self);
    fn on_disconnect(&self);
    fn on_message(&self, topic: &str, payload: &[u8]);
}

/// Decodes telemetry, stores it, then fans out and checks alerts on the same record.
#[derive(Clone)]
pub struct IngestHandler {
    store: DeviceStore,
    viewers: ViewerRegistry,
    alerts: AlertEvaluator,
    health: HealthTracker,
}

impl IngestHandler {
    pub fn new(
        store: DeviceStore,
        viewers: ViewerRegistry,
        alerts: AlertEvaluator,
        health: HealthTracker,
    ) -> Self {
        Self { store, viewers, alerts, health }
    }

    /// Returns the device id the payload was stored under, `None` if dropped.
    pub fn ingest(&self, topic: &str, payload: &[u8], now: OffsetDateTime) -> Option<String> {
        let (device_id, record) = match TelemetryRecord::decode(payload) {
            Ok(decoded) => decoded,
            Err(e) => {
                debug!(topic, error = %e, "dropping undecodable telemetry");
                self.health.record_dropped();
                return None;
            }
        };
        if device_id == UNKNOWN_DEVICE {
            debug!(topic, "telemetry without device_id, stored as {UNKNOWN_DEVICE}");
        }

        self.store.upsert(&device_id, record.clone(), now);
        self.health.record_accepted();

        self.viewers.publish(&device_id, &record);
        if self.alerts.evaluate(&device_id, &record).is_some() {
            self.health.record_alert();
        }
        Some(device_id)
    }
}

impl TransportHandler for IngestHandler {
    fn on_connect(&self) {
        info!("mqtt connected");
        self.health.mark_mqtt_connected();
    }

    fn on_disconnect(&self) {
        warn!("mqtt disconnected");
        self.health.mark_mqtt_disconnected();
    }

    fn on_message(&self, topic: &str, payload: &[u8]) {
        self.ingest(topic, payload, OffsetDateTime::now_utc());
    }
}
