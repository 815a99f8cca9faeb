//! Passthrough events over a plain MQTT broker.
//!
//! Used instead of the HTTPS data plane when `MQTT_BROKER_URL` is set, e.g.
//! when the station listens on a local Mosquitto rather than AWS IoT.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use tracing::{debug, error, info};

use crate::config::MqttConfig;
use crate::iot::{EventPublisher, PassthroughEvent};

pub struct MqttPublisher {
    client: AsyncClient,
    topic: String,
}

impl MqttPublisher {
    /// Create the client and spawn the task that drives its event loop.
    /// rumqttc reconnects on its own, so errors are only logged.
    pub fn spawn(config: &MqttConfig, topic: String) -> Self {
        let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
        options.set_keep_alive(Duration::from_secs(30));
        if let Some((user, pass)) = &config.credentials {
            options.set_credentials(user, pass);
        }

        let (client, mut eventloop) = AsyncClient::new(options, 16);
        let host = config.host.clone();

        tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!(%host, "MQTT: connected to broker");
                    }
                    Ok(event) => debug!(?event, "MQTT event"),
                    Err(e) => {
                        error!(%host, "MQTT connection error: {e}");
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        });

        Self { client, topic }
    }
}

#[async_trait]
impl EventPublisher for MqttPublisher {
    async fn publish(&self, event: &PassthroughEvent) -> Result<()> {
        let payload = serde_json::to_vec(event).context("Failed to encode event")?;
        self.client
            .publish(&self.topic, QoS::AtMostOnce, false, payload)
            .await
            .with_context(|| format!("Failed to queue MQTT publish to {}", self.topic))?;
        Ok(())
    }
}
