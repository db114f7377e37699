use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct BridgeHealth {
    pub uptime_seconds: u64,
    pub mqtt_status: String,
    pub mqtt_reconnects: u64,
    pub messages_accepted: u64,
    pub messages_dropped: u64,
    pub alerts_fired: u64,
    pub devices_tracked: usize,
    pub devices_active: usize,
    pub viewers_connected: usize,
}

/// Counters shared between the transport adapters and the `/health` endpoint.
#[derive(Clone)]
pub struct HealthTracker {
    start_time: Instant,
    mqtt_status: Arc<Mutex<&'static str>>,
    mqtt_reconnects: Arc<AtomicU64>,
    accepted: Arc<AtomicU64>,
    dropped: Arc<AtomicU64>,
    alerts: Arc<AtomicU64>,
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            mqtt_status: Arc::new(Mutex::new("connecting")),
            mqtt_reconnects: Arc::new(AtomicU64::new(0)),
            accepted: Arc::new(AtomicU64::new(0)),
            dropped: Arc::new(AtomicU64::new(0)),
            alerts: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn mark_mqtt_connected(&self) {
        *self.mqtt_status.lock() = "connected";
    }

    pub fn mark_mqtt_disconnected(&self) {
        let mut status = self.mqtt_status.lock();
        // a reconnect is counted once per lost link
        if *status == "connected" {
            self.mqtt_reconnects.fetch_add(1, Ordering::Relaxed);
        }
        *status = "disconnected";
    }

    pub fn record_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_alert(&self) {
        self.alerts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn report(&self, devices_tracked: usize, devices_active: usize, viewers_connected: usize) -> BridgeHealth {
        BridgeHealth {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            mqtt_status: self.mqtt_status.lock().to_string(),
            mqtt_reconnects: self.mqtt_reconnects.load(Ordering::Relaxed),
            messages_accepted: self.accepted.load(Ordering::Relaxed),
            messages_dropped: self.dropped.load(Ordering::Relaxed),
            alerts_fired: self.alerts.load(Ordering::Relaxed),
            devices_tracked,
            devices_active,
            viewers_connected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mqtt_status_transitions() {
        let health = HealthTracker::new();
        assert_eq!(health.report(0, 0, 0).mqtt_status, "connecting");

        // failing before the first connack is not a reconnect
        health.mark_mqtt_disconnected();
        assert_eq!(health.report(0, 0, 0).mqtt_reconnects, 0);

        health.mark_mqtt_connected();
        health.mark_mqtt_disconnected();
        health.mark_mqtt_disconnected();
        let report = health.report(0, 0, 0);
        assert_eq!(report.mqtt_status, "disconnected");
        assert_eq!(report.mqtt_reconnects, 1);
    }

    #[test]
    fn test_counters() {
        let health = HealthTracker::new();
        health.record_accepted();
        health.record_accepted();
        health.record_dropped();
        health.record_alert();

        let report = health.report(5, 3, 2);
        assert_eq!(report.messages_accepted, 2);
        assert_eq!(report.messages_dropped, 1);
        assert_eq!(report.alerts_fired, 1);
        assert_eq!((report.devices_tracked, report.devices_active, report.viewers_connected), (5, 3, 2));
    }
}
