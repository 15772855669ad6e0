//! MQTT transport adapter.
//!
//! Owns the broker connection and calls a [`MessageHandler`] once per
//! inbound publish. Reconnection is left to the `rumqttc` event loop; the
//! subscription is re-issued on every successful connect.

use super::ingest::MessageHandler;
use rumqttc::{AsyncClient, ConnectReturnCode, Event, MqttOptions, Packet, QoS};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub topic: String,
    /// Shared-subscription group; instances in the same group split the topic
    pub shared_group: Option<String>,
    pub client_id: String,
    pub keep_alive: Duration,
    pub reconnect_delay: Duration,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "mqtt".to_string(),
            port: 1883,
            topic: "sensors/temperature".to_string(),
            shared_group: None,
            client_id: "sensor-gateway".to_string(),
            keep_alive: Duration::from_secs(60),
            reconnect_delay: Duration::from_secs(1),
        }
    }
}

impl MqttConfig {
    /// Topic filter actually subscribed to.
    pub fn subscription_filter(&self) -> String {
        match &self.shared_group {
            Some(group) => format!("$share/{}/{}", group, self.topic),
            None => self.topic.clone(),
        }
    }
}

pub struct MqttSubscriber {
    config: MqttConfig,
    handler: Arc<dyn MessageHandler>,
}

impl MqttSubscriber {
    pub fn new(config: MqttConfig, handler: Arc<dyn MessageHandler>) -> Self {
        Self { config, handler }
    }

    /// Drive the connection until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        let mut options =
            MqttOptions::new(&self.config.client_id, &self.config.host, self.config.port);
        options.set_keep_alive(self.config.keep_alive);

        let (client, mut eventloop) = AsyncClient::new(options, 64);
        let filter = self.config.subscription_filter();

        info!(
            broker = %self.config.host,
            port = self.config.port,
            filter = %filter,
            "Connecting to MQTT broker"
        );

        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = eventloop.poll() => event,
            };

            match event {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    if ack.code == ConnectReturnCode::Success {
                        match client.try_subscribe(filter.as_str(), QoS::AtLeastOnce) {
                            Ok(()) => info!(filter = %filter, "Connected and subscribed"),
                            Err(e) => error!(filter = %filter, "Subscribe request failed: {e}"),
                        }
                    } else {
                        warn!(code = ?ack.code, "Broker refused connection");
                    }
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    self.handler.on_message(&publish.topic, &publish.payload);
                }
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    warn!("Broker sent disconnect");
                }
                Ok(other) => debug!(event = ?other, "MQTT event"),
                Err(e) => {
                    warn!("MQTT connection error: {e}, retrying in {:?}", self.config.reconnect_delay);
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.config.reconnect_delay) => {}
                    }
                }
            }
        }

        if let Err(e) = client.try_disconnect() {
            debug!("Disconnect request not delivered: {e}");
        }
        info!("MQTT subscriber stopped");
    }
}
