//! Dashboard viewer registry and fan-out.
//!
//! Each viewer owns a bounded outbound queue drained by its own writer task
//! (see `http::handle_socket`). Publishing only ever does a non-blocking
//! `try_send` per viewer, so a slow or dead consumer cannot hold up the
//! others: a full or closed queue is treated as a send failure and the viewer
//! is dropped from the registry.

use crate::models::{Snapshot, TelemetryRecord};
use crate::store::{DeviceStore, Shared};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use time::{Duration, OffsetDateTime};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Messages a viewer may have queued before it is considered stuck.
pub const VIEWER_QUEUE_DEPTH: usize = 64;

pub type ViewerId = Uuid;

/// Handle returned to the transport for one connected viewer.
pub struct ViewerSession {
    pub id: ViewerId,
    /// JSON text frames to push to the client, in order.
    pub outbound: mpsc::Receiver<String>,
}

#[derive(Clone)]
pub struct ViewerRegistry {
    viewers: Shared<HashMap<ViewerId, mpsc::Sender<String>>>,
    store: DeviceStore,
    window: Duration,
}

impl ViewerRegistry {
    pub fn new(store: DeviceStore, window: Duration) -> Self {
        Self {
            viewers: Arc::new(Mutex::new(HashMap::new())),
            store,
            window,
        }
    }

    /// Adds a viewer and queues the current active snapshot for it, unless empty.
    pub fn register(&self, now: OffsetDateTime) -> ViewerSession {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(VIEWER_QUEUE_DEPTH);

        // Holding the registry lock keeps any concurrent delta behind the snapshot.
        let mut viewers = self.viewers.lock();
        let snapshot = self.store.active_snapshot(now, self.window);
        if !snapshot.is_empty() {
            match encode_snapshot(&snapshot) {
                Ok(text) => {
                    let _ = tx.try_send(text);
                }
                Err(e) => warn!(error = %e, "failed to encode snapshot"),
            }
        }
        viewers.insert(id, tx);
        info!(viewer = %id, total = viewers.len(), devices = snapshot.len(), "viewer connected");

        ViewerSession { id, outbound: rx }
    }

    /// Removes a viewer. Safe to call more than once.
    pub fn unregister(&self, id: ViewerId) -> bool {
        let mut viewers = self.viewers.lock();
        let removed = viewers.remove(&id).is_some();
        if removed {
            info!(viewer = %id, total = viewers.len(), "viewer disconnected");
        }
        removed
    }

    /// Pushes `{device_id: record}` to every open viewer.
    ///
    /// Returns the number of viewers the delta was queued for. Viewers whose
    /// queue is closed or full are unregistered.
    pub fn publish(&self, device_id: &str, record: &TelemetryRecord) -> usize {
        let text = match encode_delta(device_id, record) {
            Ok(text) => text,
            Err(e) => {
                warn!(device_id, error = %e, "failed to encode delta");
                return 0;
            }
        };

        let mut viewers = self.viewers.lock();
        let mut failed = Vec::new();
        for (id, tx) in viewers.iter() {
            if tx.try_send(text.clone()).is_err() {
                failed.push(*id);
            }
        }
        for id in &failed {
            viewers.remove(id);
            warn!(viewer = %id, "viewer queue closed or full, dropping viewer");
        }
        let delivered = viewers.len();
        debug!(device_id, delivered, dropped = failed.len(), "delta published");
        delivered
    }

    pub fn len(&self) -> usize {
        self.viewers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every viewer; their writer tasks see a closed queue and hang up.
    pub fn close_all(&self) {
        let mut viewers = self.viewers.lock();
        let count = viewers.len();
        viewers.clear();
        info!(count, "closed all viewer sessions");
    }
}

fn encode_snapshot(snapshot: &Snapshot) -> serde_json::Result<String> {
    serde_json::to_string(snapshot)
}

fn encode_delta(device_id: &str, record: &TelemetryRecord) -> serde_json::Result<String> {
    let mut delta = Map::new();
    delta.insert(device_id.to_string(), Value::Object(record.fields().clone()));
    serde_json::to_string(&delta)
}
