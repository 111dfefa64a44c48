//! Command dispatcher - relays setup and settings requests to drivers
//!
//! The driver's topic is resolved through the state actor (cache first, then
//! the record store). Unresolved devices and send failures are logged, never
//! returned as errors: inbound handlers are fire-and-forget.

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::state::{CommandEnvelope, CommandKind, DeviceConfigUpdate, DeviceSetup, StateActorHandle};
use crate::transport::{TopicLayout, Transport, TransportError};

/// What happened to a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Command published on `topic`
    Sent { topic: String },
    /// No topic known for the device; nothing was sent
    Unresolved,
    /// The transport rejected the command
    SendFailed,
}

#[derive(Clone)]
pub struct CommandDispatcher {
    state: StateActorHandle,
    transport: Arc<dyn Transport>,
    layout: TopicLayout,
}

impl CommandDispatcher {
    pub fn new(state: StateActorHandle, transport: Arc<dyn Transport>, layout: TopicLayout) -> Self {
        Self {
            state,
            transport,
            layout,
        }
    }

    /// Send provisioning values to a driver
    pub async fn dispatch_setup(&self, setup: DeviceSetup) -> DispatchOutcome {
        let mac = setup.mac.clone();
        self.dispatch(&mac, setup, CommandKind::Setup).await
    }

    /// Send new settings to a driver
    pub async fn dispatch_update(&self, update: DeviceConfigUpdate) -> DispatchOutcome {
        let mac = update.mac.clone();
        self.dispatch(&mac, update, CommandKind::Update).await
    }

    async fn dispatch<T: Serialize>(&self, mac: &str, request: T, kind: CommandKind) -> DispatchOutcome {
        let Some(device_topic) = self.state.resolve_topic(mac).await else {
            warn!("⚠️ {} command dropped: device {} not found", kind, mac);
            return DispatchOutcome::Unresolved;
        };

        let topic = match kind {
            CommandKind::Setup => self.layout.setup_command_topic(&device_topic),
            CommandKind::Update => self.layout.settings_command_topic(&device_topic),
        };

        match self.send(&topic, CommandEnvelope::new(request, kind)).await {
            Ok(()) => {
                info!("{} command sent to {} on {}", kind, mac, topic);
                DispatchOutcome::Sent { topic }
            }
            Err(e) => {
                error!("❌ Failed to send {} command to {}: {}", kind, mac, e);
                DispatchOutcome::SendFailed
            }
        }
    }

    async fn send<T: Serialize>(
        &self,
        topic: &str,
        envelope: CommandEnvelope<T>,
    ) -> Result<(), TransportError> {
        let payload = envelope.to_json()?;
        self.transport.send_command(topic, payload).await
    }
}
