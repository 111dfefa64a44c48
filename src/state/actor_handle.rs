//! StateActorHandle - public API for the StateActor
//!
//! Wraps message passing with async methods. Handles are cheap to clone and
//! are shared by every inbound message worker.

use super::commands::StateCommand;
use super::reconciler::{ReconcileError, ReconcileOutcome};
use super::types::DeviceRecord;
use crate::store::StoreError;
use tokio::sync::{mpsc, oneshot};

/// Handle for interacting with the [`super::StateActor`]
///
/// Queries return `None` (or [`ReconcileError::ActorGone`]) once the actor
/// has stopped.
#[derive(Clone)]
pub struct StateActorHandle {
    cmd_tx: mpsc::UnboundedSender<StateCommand>,
}

impl StateActorHandle {
    pub fn new(cmd_tx: mpsc::UnboundedSender<StateCommand>) -> Self {
        Self { cmd_tx }
    }

    /// Merge a device report into cache and store
    pub async fn reconcile(&self, report: DeviceRecord) -> Result<ReconcileOutcome, ReconcileError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.cmd_tx
            .send(StateCommand::Reconcile {
                report,
                response: response_tx,
            })
            .map_err(|_| ReconcileError::ActorGone)?;

        response_rx.await.map_err(|_| ReconcileError::ActorGone)?
    }

    /// Last known state of a device, from the cache or the store
    pub async fn get_device(&self, mac: impl Into<String>) -> Option<DeviceRecord> {
        let (response_tx, response_rx) = oneshot::channel();
        let cmd = StateCommand::GetDevice {
            mac: mac.into(),
            response: response_tx,
        };

        if self.cmd_tx.send(cmd).is_err() {
            return None;
        }

        response_rx.await.ok().flatten()
    }

    /// Transport topic of a device, from the cache or the store
    pub async fn resolve_topic(&self, mac: impl Into<String>) -> Option<String> {
        let (response_tx, response_rx) = oneshot::channel();
        let cmd = StateCommand::ResolveTopic {
            mac: mac.into(),
            response: response_tx,
        };

        if self.cmd_tx.send(cmd).is_err() {
            return None;
        }

        response_rx.await.ok().flatten()
    }

    /// Number of devices currently cached
    pub async fn cache_len(&self) -> usize {
        let (response_tx, response_rx) = oneshot::channel();
        if self.cmd_tx.send(StateCommand::CacheLen { response: response_tx }).is_err() {
            return 0;
        }
        response_rx.await.unwrap_or(0)
    }

    /// Flush the store and stop the actor
    ///
    /// Stopping an actor that is already gone is not an error.
    pub async fn shutdown(&self) -> Result<(), StoreError> {
        let (response_tx, response_rx) = oneshot::channel();
        if self.cmd_tx.send(StateCommand::Shutdown { response: response_tx }).is_err() {
            return Ok(());
        }
        response_rx.await.unwrap_or(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use crate::state::{DeviceRecord, ReconcileError, ReconcileOutcome, StateActor};
    use crate::store::MemoryRecordStore;
    use std::sync::Arc;

    fn report(mac: &str, temperature: i32) -> DeviceRecord {
        DeviceRecord {
            mac: mac.to_string(),
            switch_mac: "SW".to_string(),
            topic: format!("led/{}", mac),
            temperature,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_reconcile_through_handle() {
        let store = Arc::new(MemoryRecordStore::new());
        let state = StateActor::spawn(store.clone(), "leds", "SW");

        let first = state.reconcile(report("AA", 21)).await.unwrap();
        assert!(matches!(first, ReconcileOutcome::Inserted { .. }));
        let second = state.reconcile(report("AA", 21)).await.unwrap();
        assert_eq!(second, ReconcileOutcome::Unchanged);

        assert_eq!(state.cache_len().await, 1);
        assert_eq!(state.resolve_topic("AA").await.as_deref(), Some("led/AA"));
        assert_eq!(state.get_device("AA").await.unwrap().temperature, 21);
        assert_eq!(store.calls().writes(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_reports_insert_once() {
        let store = Arc::new(MemoryRecordStore::new());
        let state = StateActor::spawn(store.clone(), "leds", "SW");

        let mut tasks = Vec::new();
        for temperature in 0..16 {
            let state = state.clone();
            tasks.push(tokio::spawn(async move {
                state.reconcile(report("AA", temperature % 2)).await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(store.calls().inserts, 1);
        assert_eq!(store.count("leds"), 1);
    }

    #[tokio::test]
    async fn test_queries_after_shutdown() {
        let store = Arc::new(MemoryRecordStore::new());
        let state = StateActor::spawn(store, "leds", "SW");

        state.shutdown().await.unwrap();
        tokio::task::yield_now().await;

        assert!(state.get_device("AA").await.is_none());
        assert!(matches!(
            state.reconcile(report("AA", 1)).await,
            Err(ReconcileError::ActorGone)
        ));
        assert!(state.shutdown().await.is_ok());
    }
}
