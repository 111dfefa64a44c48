//! Message transport - broker connection and topic layout
//!
//! Inbound messages are delivered as [`InboundMessage`]s on a channel;
//! outbound commands go through the [`Transport`] trait so handlers can be
//! exercised without a broker.

pub mod mqtt;
pub mod topics;

pub use mqtt::MqttTransport;
pub use topics::{topic_matches, InboundKind, TopicLayout};

use async_trait::async_trait;
use thiserror::Error;

/// A message received on a subscribed topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    /// Payload as text, for logging
    pub fn payload_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

/// Transport failures
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to publish on {topic}: {reason}")]
    Publish { topic: String, reason: String },
    #[error("failed to encode command: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("transport is closed")]
    Closed,
}

/// Outbound side of the transport
#[async_trait]
pub trait Transport: Send + Sync {
    /// Publish `payload` on `topic`. Best effort: no acknowledgement is awaited.
    async fn send_command(&self, topic: &str, payload: String) -> Result<(), TransportError>;
}
