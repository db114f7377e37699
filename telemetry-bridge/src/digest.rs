//! Periodic chat digest of active devices.
//!
//! Every tick renders one line per active device and sends the block as a
//! single notification. An empty snapshot sends nothing. The same tick reaps
//! store entries that have been stale for much longer than the liveness window.

use crate::models::{fmt_percent, Snapshot, CPU_PERCENT, DISK_PERCENT, GPU_PERCENT, MEM_PERCENT};
use crate::notify::SharedNotifier;
use crate::store::DeviceStore;
use std::time::Duration;
use time::OffsetDateTime;
use tracing::{debug, info};

pub struct DigestScheduler {
    store: DeviceStore,
    notifier: SharedNotifier,
    window: time::Duration,
    reap_after: Option<time::Duration>,
    period: Duration,
}

impl DigestScheduler {
    pub fn new(
        store: DeviceStore,
        notifier: SharedNotifier,
        window: time::Duration,
        reap_after: Option<time::Duration>,
        period: Duration,
    ) -> Self {
        Self { store, notifier, window, reap_after, period }
    }

    /// Runs forever; the owner aborts the task to stop it.
    pub async fn run(self) {
        let mut interval = tokio::time::interval(self.period);
        // the first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            self.tick(OffsetDateTime::now_utc());
        }
    }

    /// One digest pass. Returns the dispatched text, if any.
    pub fn tick(&self, now: OffsetDateTime) -> Option<String> {
        if let Some(max_age) = self.reap_after {
            let reaped = self.store.reap(now, max_age);
            if reaped > 0 {
                info!(reaped, "reaped long-stale devices");
            }
        }

        let snapshot = self.store.active_snapshot(now, self.window);
        let Some(text) = format_digest(&snapshot) else {
            debug!("no active devices, skipping digest");
            return None;
        };
        info!(devices = snapshot.len(), "sending digest");
        self.notifier.notify(text.clone());
        Some(text)
    }
}

/// One header line plus one line per device, `None` for an empty snapshot.
pub fn format_digest(snapshot: &Snapshot) -> Option<String> {
    if snapshot.is_empty() {
        return None;
    }
    let mut out = format!(":bar_chart: Device digest ({} active)", snapshot.len());
    for (device_id, record) in snapshot {
        out.push_str(&format!(
            "\n• {device_id}: CPU {} | RAM {} | Disk {} | GPU {}",
            fmt_percent(record.metric(CPU_PERCENT)),
            fmt_percent(record.metric(MEM_PERCENT)),
            fmt_percent(record.metric(DISK_PERCENT)),
            fmt_percent(record.metric(GPU_PERCENT)),
        ));
    }
    Some(out)
}
