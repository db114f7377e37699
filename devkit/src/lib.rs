/*!
# Bridge DevKit - stubs and helpers for telemetry bridge tests

- Mock MQTT client to simulate device publishes without a broker
- Telemetry message builders following the `devices/{id}/metrics` contract
- Mock chat webhook server recording posted notifications
*/

pub mod mqtt_stub;
pub mod telemetry;
pub mod webhook_stub;

pub use mqtt_stub::{MockMessage, MockMqttClient};
pub use telemetry::TelemetryBuilder;
pub use webhook_stub::MockWebhookServer;
