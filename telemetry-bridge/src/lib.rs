//! Telemetry bridge: edge device metrics in over MQTT, live dashboard
//! updates out over WebSocket, threshold alerts and periodic digests out to a
//! chat webhook.

pub mod alerts;
pub mod bridge;
pub mod config;
pub mod digest;
pub mod health;
pub mod http;
pub mod ingest;
pub mod models;
pub mod mqtt;
pub mod notify;
pub mod store;
pub mod viewers;

pub use bridge::{Bridge, BridgeError};
pub use config::BridgeConfig;
