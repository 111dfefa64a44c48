//! State management module - device cache and reconciliation
//!
//! This module owns the in-process view of every LED driver seen since start-up
//! and keeps it consistent with the persisted status table. All mutation goes
//! through a single actor so a report is always reconciled as one transaction.

mod actor;
mod actor_handle;
mod builders;
mod commands;
mod reconciler;
mod store;
mod types;

pub use actor::StateActor;
pub use actor_handle::StateActorHandle;
pub use builders::{identity_from_stored, record_from_stored, topic_from_stored, DecodeError};
pub use reconciler::{ReconcileError, ReconcileOutcome, Reconciler};
pub use store::DeviceCache;
pub use types::{
    CommandEnvelope, CommandKind, DeviceConfigUpdate, DeviceRecord, DeviceSetup, MQTT_PROTOCOL,
};
