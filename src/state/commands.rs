//! Command enum for the state actor
//!
//! Every command carries a oneshot channel for its answer: handlers need the
//! reconcile result to log it, and queries are the Command Dispatcher's only
//! route to the cache.

use super::reconciler::{ReconcileError, ReconcileOutcome};
use super::types::DeviceRecord;
use crate::store::StoreError;
use tokio::sync::oneshot;

/// Commands processed sequentially by the [`super::StateActor`]
#[derive(Debug)]
pub enum StateCommand {
    /// Merge a device report into cache and store
    Reconcile {
        report: DeviceRecord,
        response: oneshot::Sender<Result<ReconcileOutcome, ReconcileError>>,
    },

    /// Read-through lookup of a device (no cache write-back)
    GetDevice {
        mac: String,
        response: oneshot::Sender<Option<DeviceRecord>>,
    },

    /// Resolve the transport topic of a device
    ResolveTopic {
        mac: String,
        response: oneshot::Sender<Option<String>>,
    },

    /// Number of cached devices
    CacheLen { response: oneshot::Sender<usize> },

    /// Flush the store and stop the actor
    Shutdown {
        response: oneshot::Sender<Result<(), StoreError>>,
    },
}
