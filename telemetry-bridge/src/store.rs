//! Device state store: latest telemetry per device behind one lock.

use crate::models::{DeviceEntry, Snapshot, TelemetryRecord};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use time::{Duration, OffsetDateTime};

pub type Shared<T> = Arc<Mutex<T>>;

/// Latest telemetry per device. Liveness is derived on read, never stored.
#[derive(Clone, Default)]
pub struct DeviceStore {
    devices: Shared<HashMap<String, DeviceEntry>>,
}

impl DeviceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces whatever was stored for `device_id` (last write wins).
    pub fn upsert(&self, device_id: &str, record: TelemetryRecord, now: OffsetDateTime) {
        self.devices.lock().insert(
            device_id.to_string(),
            DeviceEntry { record, last_seen: now },
        );
    }

    /// Devices seen within `window` of `now`, boundary inclusive.
    pub fn active_snapshot(&self, now: OffsetDateTime, window: Duration) -> Snapshot {
        self.devices
            .lock()
            .iter()
            .filter(|(_, entry)| now - entry.last_seen <= window)
            .map(|(id, entry)| (id.clone(), entry.record.clone()))
            .collect()
    }

    /// Deletes entries older than `max_age`. Returns how many were dropped.
    pub fn reap(&self, now: OffsetDateTime, max_age: Duration) -> usize {
        let mut devices = self.devices.lock();
        let before = devices.len();
        devices.retain(|_, entry| now - entry.last_seen <= max_age);
        before - devices.len()
    }

    /// Number of device identities ever seen and not yet reaped.
    pub fn len(&self) -> usize {
        self.devices.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
