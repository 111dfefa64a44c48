//! MQTT transport on rumqttc
//!
//! One event loop task owns the connection: it resubscribes after every
//! ConnAck (the broker forgets subscriptions of a clean session) and forwards
//! publishes to the inbound channel.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rumqttc::{AsyncClient, Event, MqttOptions, Outgoing, Packet, QoS};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use super::{InboundMessage, Transport, TransportError};
use crate::config::BrokerConfig;

const RECONNECT_DELAY: Duration = Duration::from_secs(1);

pub struct MqttTransport {
    client: AsyncClient,
    event_loop: Mutex<Option<JoinHandle<()>>>,
}

impl MqttTransport {
    /// Build the client and start the event loop. The connection itself is
    /// established by the event loop, so this never blocks on the broker.
    pub fn connect(
        broker: &BrokerConfig,
        client_id: &str,
        subscriptions: Vec<String>,
    ) -> (Self, mpsc::Receiver<InboundMessage>) {
        let mut opts = MqttOptions::new(client_id, &broker.host, broker.port);
        opts.set_keep_alive(Duration::from_secs(broker.keep_alive_secs));
        if let (Some(username), Some(password)) = (&broker.username, &broker.password) {
            opts.set_credentials(username, password);
        }

        let (client, mut event_loop) = AsyncClient::new(opts, broker.channel_capacity);
        let (inbound_tx, inbound_rx) = mpsc::channel(broker.channel_capacity);

        info!(
            "🔌 MQTT connecting to {}:{} as {}",
            broker.host, broker.port, client_id
        );

        let subscriber = client.clone();
        let handle = tokio::spawn(async move {
            loop {
                match event_loop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("✅ MQTT connected");
                        for topic in &subscriptions {
                            match subscriber.subscribe(topic.as_str(), QoS::AtLeastOnce).await {
                                Ok(()) => debug!("Subscribed to {}", topic),
                                Err(e) => error!("❌ Failed to subscribe to {}: {}", topic, e),
                            }
                        }
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        trace!("MQTT ← {} ({} bytes)", publish.topic, publish.payload.len());
                        let message = InboundMessage {
                            topic: publish.topic,
                            payload: publish.payload.to_vec(),
                        };
                        if inbound_tx.send(message).await.is_err() {
                            debug!("Inbound receiver dropped, stopping MQTT event loop");
                            break;
                        }
                    }
                    Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                        info!("MQTT disconnected");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("⚠️ MQTT connection error: {} (retrying)", e);
                        tokio::time::sleep(RECONNECT_DELAY).await;
                    }
                }
            }
        });

        (
            Self {
                client,
                event_loop: Mutex::new(Some(handle)),
            },
            inbound_rx,
        )
    }

    /// Disconnect from the broker and wait for the event loop to end
    pub async fn disconnect(&self) {
        if let Err(e) = self.client.disconnect().await {
            debug!("MQTT disconnect request failed: {}", e);
        }

        let handle = self.event_loop.lock().take();
        if let Some(handle) = handle {
            match tokio::time::timeout(Duration::from_secs(2), handle).await {
                Ok(_) => debug!("MQTT event loop stopped"),
                Err(_) => warn!("MQTT event loop did not stop in time"),
            }
        }
    }
}

#[async_trait]
impl Transport for MqttTransport {
    async fn send_command(&self, topic: &str, payload: String) -> Result<(), TransportError> {
        trace!("MQTT → {} {}", topic, payload);
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| TransportError::Publish {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }
}
