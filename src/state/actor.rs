//! StateActor - single owner of the device cache
//!
//! Reconciling a report is a read-then-write transaction on the cache entry
//! of its hardware address. Running every command on one task makes that
//! transaction atomic without locks: two reports for the same driver can
//! never both see "no identity yet" and insert twice.
//!
//! ```text
//!  handlers ──StateActorHandle──▶ command_rx ──▶ StateActor
//!                                                 ├─ Reconciler
//!                                                 │   ├─ DeviceCache
//!                                                 │   └─ RecordStore
//!                                                 └─ oneshot replies
//! ```

use super::actor_handle::StateActorHandle;
use super::commands::StateCommand;
use super::reconciler::{ReconcileOutcome, Reconciler};
use crate::store::RecordStore;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

/// Actor owning the [`Reconciler`] and its cache
pub struct StateActor {
    /// Taken while a command runs on the blocking pool
    reconciler: Option<Reconciler>,
    command_rx: mpsc::UnboundedReceiver<StateCommand>,
    /// Reports that reached the store
    write_count: u64,
    /// Reports dropped as unchanged
    unchanged_count: u64,
}

impl StateActor {
    /// Spawn the actor on the current tokio runtime
    ///
    /// # Example
    ///
    /// ```ignore
    /// let store = Arc::new(MemoryRecordStore::new());
    /// let state = StateActor::spawn(store, "leds", "AABBCCDDEEFF");
    /// let outcome = state.reconcile(report).await?;
    /// ```
    pub fn spawn(
        store: Arc<dyn RecordStore>,
        table: impl Into<String>,
        switch_mac: impl Into<String>,
    ) -> StateActorHandle {
        let (cmd_tx, command_rx) = mpsc::unbounded_channel();

        let actor = StateActor {
            reconciler: Some(Reconciler::new(store, table, switch_mac)),
            command_rx,
            write_count: 0,
            unchanged_count: 0,
        };

        tokio::spawn(actor.run());
        info!("StateActor spawned");

        StateActorHandle::new(cmd_tx)
    }

    async fn run(mut self) {
        debug!("StateActor run loop started");

        while let Some(cmd) = self.command_rx.recv().await {
            trace!(?cmd, "Processing command");

            match cmd {
                StateCommand::Reconcile { report, response } => {
                    let Some(result) = self.blocking(move |r| r.reconcile(report)).await else {
                        break;
                    };
                    match &result {
                        Ok(ReconcileOutcome::Unchanged) => self.unchanged_count += 1,
                        Ok(_) => self.write_count += 1,
                        Err(_) => {}
                    }
                    let _ = response.send(result);
                }
                StateCommand::GetDevice { mac, response } => {
                    let device = self.blocking(move |r| r.get_device(&mac)).await;
                    let _ = response.send(device.flatten());
                }
                StateCommand::ResolveTopic { mac, response } => {
                    let topic = self.blocking(move |r| r.resolve_topic(&mac)).await;
                    let _ = response.send(topic.flatten());
                }
                StateCommand::CacheLen { response } => {
                    let _ = response.send(self.cached_devices());
                }
                StateCommand::Shutdown { response } => {
                    let result = self
                        .blocking(|r| r.store().flush())
                        .await
                        .unwrap_or(Ok(()));
                    if let Err(e) = &result {
                        warn!("Failed to flush record store on shutdown: {}", e);
                    }
                    let _ = response.send(result);
                    break;
                }
            }

            if self.reconciler.is_none() {
                break;
            }
        }

        info!(
            "StateActor stopped ({} devices cached, {} writes, {} unchanged reports)",
            self.cached_devices(),
            self.write_count,
            self.unchanged_count
        );
    }

    fn cached_devices(&self) -> usize {
        self.reconciler.as_ref().map_or(0, |r| r.cache().len())
    }

    /// Run `f` against the reconciler on the blocking pool
    ///
    /// Store calls are synchronous disk I/O. The reconciler moves to the
    /// blocking thread and back, so commands still run one at a time.
    /// Returns `None` once the reconciler is lost to a panic.
    async fn blocking<T, F>(&mut self, f: F) -> Option<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Reconciler) -> T + Send + 'static,
    {
        let mut reconciler = self.reconciler.take()?;
        let result = tokio::task::spawn_blocking(move || {
            let output = f(&mut reconciler);
            (reconciler, output)
        })
        .await;

        match result {
            Ok((reconciler, output)) => {
                self.reconciler = Some(reconciler);
                Some(output)
            }
            Err(e) => {
                error!("StateActor command failed: {}", e);
                None
            }
        }
    }
}
