use crate::config::MqttConf;
use crate::ingest::TransportHandler;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{self, JoinHandle};
use tracing::{error, info};

const KEEP_ALIVE: Duration = Duration::from_secs(15);
const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Subscribes to the telemetry subject and feeds every event to `handler`.
///
/// rumqttc reconnects on the next poll after an error; the subscription is
/// re-issued on each ConnAck so a broker restart does not silently stop ingestion.
pub fn spawn_mqtt_listener(cfg: MqttConf, handler: Arc<dyn TransportHandler>) -> JoinHandle<()> {
    task::spawn(async move {
        let mut opts = MqttOptions::new(cfg.client_id.clone(), cfg.host.clone(), cfg.port);
        opts.set_keep_alive(KEEP_ALIVE);
        let (client, mut eventloop) = AsyncClient::new(opts, 10);
        info!(host = %cfg.host, port = cfg.port, topic = %cfg.topic, "starting mqtt listener");

        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    handler.on_connect();
                    if let Err(e) = client.subscribe(cfg.topic.clone(), QoS::AtLeastOnce).await {
                        error!(error = ?e, topic = %cfg.topic, "mqtt subscribe failed");
                    }
                }
                Ok(Event::Incoming(Incoming::Publish(p))) => {
                    handler.on_message(&p.topic, &p.payload);
                }
                Ok(_) => {}
                Err(e) => {
                    error!(error = ?e, "mqtt connection error");
                    handler.on_disconnect();
                    tokio::time::sleep(RECONNECT_DELAY).await;
                }
            }
        }
    })
}
