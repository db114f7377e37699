//! Telemetry record model and inbound payload decoding.
//!
//! A record is the producer's JSON object kept verbatim: the bridge only reads
//! a handful of well-known metrics (`cpu_percent`, `mem_percent`,
//! `disk_percent`, `gpu_percent`) and forwards everything else untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use time::OffsetDateTime;

/// Identity used when a payload carries no usable `device_id`.
pub const UNKNOWN_DEVICE: &str = "unknown";

pub const CPU_PERCENT: &str = "cpu_percent";
pub const MEM_PERCENT: &str = "mem_percent";
pub const DISK_PERCENT: &str = "disk_percent";
pub const GPU_PERCENT: &str = "gpu_percent";

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("payload is not valid UTF-8")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("payload is not a JSON object")]
    NotAnObject,
}

/// Latest telemetry reported by one device, as received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TelemetryRecord(Map<String, Value>);

impl TelemetryRecord {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Decodes a raw MQTT payload into `(device_id, record)`.
    ///
    /// Corrupt payloads are rejected; a missing identity is coerced to
    /// [`UNKNOWN_DEVICE`].
    pub fn decode(payload: &[u8]) -> Result<(String, Self), DecodeError> {
        let text = std::str::from_utf8(payload)?;
        let Value::Object(fields) = serde_json::from_str::<Value>(text)? else {
            return Err(DecodeError::NotAnObject);
        };
        let record = Self(fields);
        let device_id = record.device_id();
        Ok((device_id, record))
    }

    pub fn device_id(&self) -> String {
        match self.0.get("device_id") {
            Some(Value::String(id)) => id.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => UNKNOWN_DEVICE.to_string(),
        }
    }

    /// Numeric value of a metric, `None` when absent, null or not a number.
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.0.get(name).and_then(Value::as_f64)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }
}

/// One slot of the device store.
#[derive(Debug, Clone)]
pub struct DeviceEntry {
    pub record: TelemetryRecord,
    pub last_seen: OffsetDateTime,
}

/// Active devices keyed by identity. Ordered so digests render stably.
pub type Snapshot = BTreeMap<String, TelemetryRecord>;

/// Renders a percentage metric for chat text, `?` when unavailable.
pub fn fmt_percent(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{v:.1}%"),
        None => "?".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_full_payload() {
        let payload = br#"{"device_id":"dev-1","timestamp":1700000000,"cpu_percent":50,"mem_percent":40.5,"gpu_percent":null,"agent_cpu":0.3}"#;
        let (id, record) = TelemetryRecord::decode(payload).unwrap();
        assert_eq!(id, "dev-1");
        assert_eq!(record.metric(CPU_PERCENT), Some(50.0));
        assert_eq!(record.metric(MEM_PERCENT), Some(40.5));
        assert_eq!(record.metric(GPU_PERCENT), None);
        // opaque fields pass through
        assert_eq!(record.fields()["agent_cpu"], 0.3);
    }

    #[test]
    fn test_missing_device_id_is_coerced() {
        let (id, _) = TelemetryRecord::decode(br#"{"cpu_percent":10}"#).unwrap();
        assert_eq!(id, UNKNOWN_DEVICE);

        let (id, _) = TelemetryRecord::decode(br#"{"device_id":null}"#).unwrap();
        assert_eq!(id, UNKNOWN_DEVICE);

        let (id, _) = TelemetryRecord::decode(br#"{"device_id":42}"#).unwrap();
        assert_eq!(id, "42");
    }

    #[test]
    fn test_corrupt_payloads_are_rejected() {
        assert!(matches!(
            TelemetryRecord::decode(&[0xff, 0xfe, 0x00]),
            Err(DecodeError::Utf8(_))
        ));
        assert!(matches!(
            TelemetryRecord::decode(b"{not json"),
            Err(DecodeError::Json(_))
        ));
        assert!(matches!(
            TelemetryRecord::decode(b"[1,2,3]"),
            Err(DecodeError::NotAnObject)
        ));
    }

    #[test]
    fn test_non_numeric_metric_is_none() {
        let (_, record) = TelemetryRecord::decode(br#"{"device_id":"d","cpu_percent":"high"}"#).unwrap();
        assert_eq!(record.metric(CPU_PERCENT), None);
    }

    #[test]
    fn test_serializes_as_plain_object() {
        let (_, record) = TelemetryRecord::decode(br#"{"device_id":"d","cpu_percent":1}"#).unwrap();
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json, serde_json::json!({"device_id": "d", "cpu_percent": 1}));
    }

    #[test]
    fn test_fmt_percent() {
        assert_eq!(fmt_percent(Some(95.0)), "95.0%");
        assert_eq!(fmt_percent(Some(12.345)), "12.3%");
        assert_eq!(fmt_percent(None), "?");
    }
}
