use crate::models::{fmt_percent, TelemetryRecord, CPU_PERCENT, MEM_PERCENT};
use crate::notify::SharedNotifier;
use tracing::info;

/// Fires one chat alert per message whose CPU reading reaches the threshold.
/// No cooldown and no de-duplication.
#[derive(Clone)]
pub struct AlertEvaluator {
    threshold: f64,
    notifier: SharedNotifier,
}

impl AlertEvaluator {
    pub fn new(threshold: f64, notifier: SharedNotifier) -> Self {
        Self { threshold, notifier }
    }

    /// Returns the alert text when one was dispatched.
    pub fn evaluate(&self, device_id: &str, record: &TelemetryRecord) -> Option<String> {
        let cpu = record.metric(CPU_PERCENT)?;
        if cpu < self.threshold {
            return None;
        }
        let text = format_alert(device_id, cpu, record.metric(MEM_PERCENT));
        info!(device_id, cpu, threshold = self.threshold, "cpu alert");
        self.notifier.notify(text.clone());
        Some(text)
    }
}

pub fn format_alert(device_id: &str, cpu: f64, mem: Option<f64>) -> String {
    format!(
        ":rotating_light: CPU ALERT at {device_id} - CPU {cpu:.1}%, RAM {} :rotating_light:",
        fmt_percent(mem)
    )
}
