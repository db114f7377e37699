/*!
Builders for device telemetry messages.

Mirrors what the edge agent publishes on `devices/{device_id}/metrics`:
`device_id`, epoch-seconds `timestamp`, the four utilization metrics and any
extra agent fields.
*/

use serde_json::{Map, Value};

#[derive(Debug, Clone)]
pub struct TelemetryBuilder {
    device_id: String,
    fields: Map<String, Value>,
}

impl TelemetryBuilder {
    pub fn new<S: Into<String>>(device_id: S) -> Self {
        let device_id = device_id.into();
        let mut fields = Map::new();
        fields.insert("device_id".into(), Value::String(device_id.clone()));
        fields.insert("timestamp".into(), Value::from(chrono::Utc::now().timestamp()));
        Self { device_id, fields }
    }

    pub fn cpu(self, percent: f64) -> Self {
        self.field("cpu_percent", percent)
    }

    pub fn mem(self, percent: f64) -> Self {
        self.field("mem_percent", percent)
    }

    pub fn disk(self, percent: f64) -> Self {
        self.field("disk_percent", percent)
    }

    /// `None` is published as `null`, like an agent on a host without GPU.
    pub fn gpu(self, percent: Option<f64>) -> Self {
        self.field("gpu_percent", percent)
    }

    /// Arbitrary extra field (agent self-metrics and the like).
    pub fn field<V: Into<Value>>(mut self, name: &str, value: V) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    /// Drops the `device_id` key, as a misconfigured agent would.
    pub fn without_device_id(mut self) -> Self {
        self.fields.remove("device_id");
        self
    }

    pub fn topic(&self) -> String {
        format!("devices/{}/metrics", self.device_id)
    }

    pub fn to_json(&self) -> Value {
        Value::Object(self.fields.clone())
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(&self.fields).unwrap_or_default()
    }
}
