//! Inbound message routing
//!
//! Every message from the broker is classified by topic and handled on its
//! own worker task. A semaphore bounds how many handlers run at once; the
//! state actor serializes the reconcile transactions they submit.

use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::dispatcher::{CommandDispatcher, DispatchOutcome};
use crate::state::{
    DeviceConfigUpdate, DeviceRecord, DeviceSetup, ReconcileOutcome, StateActorHandle, MQTT_PROTOCOL,
};
use crate::transport::{InboundKind, InboundMessage, TopicLayout};

pub struct LedService {
    state: StateActorHandle,
    dispatcher: CommandDispatcher,
    layout: TopicLayout,
    switch_mac: String,
    max_inflight: usize,
}

impl LedService {
    pub fn new(
        state: StateActorHandle,
        dispatcher: CommandDispatcher,
        layout: TopicLayout,
        switch_mac: impl Into<String>,
        max_inflight: usize,
    ) -> Self {
        Self {
            state,
            dispatcher,
            layout,
            switch_mac: switch_mac.into(),
            max_inflight: max_inflight.max(1),
        }
    }

    /// Route one inbound message to its handler
    pub async fn handle(&self, message: InboundMessage) {
        debug!("Received {}: {}", message.topic, message.payload_str());

        match self.layout.classify(&message.topic) {
            Some(InboundKind::Hello) => {
                self.on_driver_hello(&message.payload).await;
            }
            Some(InboundKind::Status) => {
                self.on_driver_status(&message.topic, &message.payload).await;
            }
            Some(InboundKind::Setup) => {
                self.on_setup(&message.payload).await;
            }
            Some(InboundKind::Update) => {
                self.on_update(&message.payload).await;
            }
            None => debug!("Ignoring message on unexpected topic {}", message.topic),
        }
    }

    /// A driver announced itself
    pub async fn on_driver_hello(&self, payload: &[u8]) -> Option<ReconcileOutcome> {
        let mut report = self.decode_report(payload, "hello")?;
        report.is_configured = false;
        report.protocol = MQTT_PROTOCOL.to_string();
        report.switch_mac = self.switch_mac.clone();

        let mac = report.mac.clone();
        match self.state.reconcile(report).await {
            Ok(outcome) => {
                info!("✅ New driver {} stored", mac);
                Some(outcome)
            }
            Err(e) => {
                error!("❌ Failed to store new driver {}: {}", mac, e);
                None
            }
        }
    }

    /// Periodic status of a driver
    pub async fn on_driver_status(&self, topic: &str, payload: &[u8]) -> Option<ReconcileOutcome> {
        let mut report = self.decode_report(payload, "status")?;
        report.switch_mac = self.switch_mac.clone();
        report.protocol = MQTT_PROTOCOL.to_string();
        if let Some(device_topic) = self.layout.device_topic(topic) {
            report.topic = device_topic;
        }

        let mac = report.mac.clone();
        match self.state.reconcile(report).await {
            Ok(outcome) => {
                debug!("Status of driver {}: {:?}", mac, outcome);
                Some(outcome)
            }
            Err(e) => {
                error!("❌ Failed to store status of driver {}: {}", mac, e);
                None
            }
        }
    }

    /// Provisioning request for a driver
    pub async fn on_setup(&self, payload: &[u8]) -> Option<DispatchOutcome> {
        let setup: DeviceSetup = decode(payload, "setup")?;
        if setup.mac.is_empty() {
            warn!("⚠️ Setup request without mac ignored");
            return None;
        }
        Some(self.dispatcher.dispatch_setup(setup).await)
    }

    /// Settings request for a driver
    pub async fn on_update(&self, payload: &[u8]) -> Option<DispatchOutcome> {
        let update: DeviceConfigUpdate = decode(payload, "update")?;
        if update.mac.is_empty() {
            warn!("⚠️ Update request without mac ignored");
            return None;
        }
        Some(self.dispatcher.dispatch_update(update).await)
    }

    fn decode_report(&self, payload: &[u8], kind: &str) -> Option<DeviceRecord> {
        let mut report: DeviceRecord = decode(payload, kind)?;
        if report.mac.is_empty() {
            warn!("⚠️ Driver {} message without mac ignored", kind);
            return None;
        }
        // Identity is assigned by the store, never by the driver
        report.id = None;
        Some(report)
    }

    /// Handle messages until `shutdown` resolves or the channel closes, then
    /// wait for in-flight handlers
    pub async fn run(
        self: Arc<Self>,
        mut inbound: mpsc::Receiver<InboundMessage>,
        shutdown: impl Future<Output = ()>,
    ) {
        let semaphore = Arc::new(Semaphore::new(self.max_inflight));
        let mut workers = JoinSet::new();
        tokio::pin!(shutdown);

        info!("Service running ({} concurrent handlers max)", self.max_inflight);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, no longer accepting messages");
                    break;
                }
                message = inbound.recv() => {
                    let Some(message) = message else {
                        info!("Inbound channel closed");
                        break;
                    };
                    let permit = match semaphore.clone().acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => break,
                    };
                    let service = self.clone();
                    workers.spawn(async move {
                        service.handle(message).await;
                        drop(permit);
                    });
                }
                Some(result) = workers.join_next(), if !workers.is_empty() => {
                    if let Err(e) = result {
                        error!("Message handler failed: {}", e);
                    }
                }
            }
        }

        let pending = workers.len();
        if pending > 0 {
            debug!("Waiting for {} in-flight handlers", pending);
        }
        while let Some(result) = workers.join_next().await {
            if let Err(e) = result {
                error!("Message handler failed: {}", e);
            }
        }
    }
}

fn decode<T: DeserializeOwned>(payload: &[u8], kind: &str) -> Option<T> {
    match serde_json::from_slice(payload) {
        Ok(value) => Some(value),
        Err(e) => {
            error!("❌ Invalid {} payload: {}", kind, e);
            None
        }
    }
}
