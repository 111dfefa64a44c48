//! Reconciler - turns inbound device reports into cache and store mutations
//!
//! A report is compared with the cached state of its hardware address:
//! identical reports are dropped without touching the store, changed reports
//! are written under the device's persisted identity. The identity is looked
//! up in the store only while it is unknown to this process (first report
//! after a restart), otherwise a fresh document is inserted.

use super::builders::{identity_from_stored, record_from_stored, topic_from_stored};
use super::store::DeviceCache;
use super::types::DeviceRecord;
use crate::store::{Criteria, RecordStore, StoreError};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, trace, warn};

/// Failure to reconcile a report
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("record store error: {0}")]
    Store(#[from] StoreError),
    #[error("failed to encode device record: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("state actor is no longer running")]
    ActorGone,
}

/// What a reconcile did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Report identical to the cached, persisted state
    Unchanged,
    /// New document inserted under the store-assigned identity
    Inserted { id: String },
    /// Existing document replaced
    Updated { id: String },
}

impl ReconcileOutcome {
    pub fn id(&self) -> Option<&str> {
        match self {
            ReconcileOutcome::Unchanged => None,
            ReconcileOutcome::Inserted { id } | ReconcileOutcome::Updated { id } => Some(id),
        }
    }
}

/// Owns the device cache and the path to the status table
pub struct Reconciler {
    cache: DeviceCache,
    store: Arc<dyn RecordStore>,
    table: String,
    switch_mac: String,
}

impl Reconciler {
    pub fn new(store: Arc<dyn RecordStore>, table: impl Into<String>, switch_mac: impl Into<String>) -> Self {
        Self {
            cache: DeviceCache::new(),
            store,
            table: table.into(),
            switch_mac: switch_mac.into(),
        }
    }

    pub fn cache(&self) -> &DeviceCache {
        &self.cache
    }

    pub fn switch_mac(&self) -> &str {
        &self.switch_mac
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Criteria locating a driver of this controller in the status table
    fn device_criteria(&self, mac: &str) -> Criteria {
        Criteria::new()
            .eq("mac", mac)
            .eq("switchMac", self.switch_mac.as_str())
    }

    /// Merge a report into the cache and the status table
    ///
    /// The identity carried by the report itself is ignored. On a store error
    /// the report stays cached without a new identity, so the next report for
    /// the same address retries resolution.
    pub fn reconcile(&mut self, mut report: DeviceRecord) -> Result<ReconcileOutcome, ReconcileError> {
        let known_id = match self.cache.get(&report.mac) {
            Some(cached) => {
                report.id = cached.id.clone();
                let known_id = cached.persisted_id().map(str::to_owned);
                // Only a confirmed (persisted) entry suppresses writes.
                if known_id.is_some() && *cached == report {
                    trace!("No change for driver {}", report.mac);
                    return Ok(ReconcileOutcome::Unchanged);
                }
                known_id
            }
            None => {
                report.id = None;
                None
            }
        };

        let mac = report.mac.clone();
        self.cache.put(mac.clone(), report.clone());

        let outcome = match known_id {
            Some(id) => {
                self.write_update(&id, report)?;
                ReconcileOutcome::Updated { id }
            }
            None => match self.lookup_identity(&mac) {
                Some(id) => {
                    debug!("Driver {} already stored as {}", mac, id);
                    self.write_update(&id, report)?;
                    ReconcileOutcome::Updated { id }
                }
                None => {
                    let document = serde_json::to_value(&report)?;
                    let id = self.store.insert_record(&self.table, &document)?;
                    ReconcileOutcome::Inserted { id }
                }
            },
        };

        if let Some(id) = outcome.id() {
            self.cache.set_identity(&mac, id);
        }
        Ok(outcome)
    }

    fn write_update(&self, id: &str, mut record: DeviceRecord) -> Result<(), ReconcileError> {
        record.id = Some(id.to_string());
        let document = serde_json::to_value(&record)?;
        self.store.update_record(&self.table, id, &document)?;
        Ok(())
    }

    /// Identity of an already-stored driver; lookup failures count as not found
    fn lookup_identity(&self, mac: &str) -> Option<String> {
        let stored = match self.store.get_record(&self.table, &self.device_criteria(mac)) {
            Ok(stored) => stored?,
            Err(e) => {
                warn!("Lookup of driver {} failed, inserting instead: {}", mac, e);
                return None;
            }
        };

        let id = identity_from_stored(&stored);
        if id.is_none() {
            warn!("Stored document for driver {} has no identity, inserting instead", mac);
        }
        id
    }

    /// Last known state of a driver: cache first, then the status table
    ///
    /// Does not populate the cache.
    pub fn get_device(&self, mac: &str) -> Option<DeviceRecord> {
        if let Some(cached) = self.cache.get(mac) {
            return Some(cached.clone());
        }

        let stored = match self.store.get_record(&self.table, &self.device_criteria(mac)) {
            Ok(stored) => stored?,
            Err(e) => {
                debug!("Lookup of driver {} failed: {}", mac, e);
                return None;
            }
        };
        record_from_stored(stored).ok()
    }

    /// Transport topic of a driver: cache first, then the status table
    pub fn resolve_topic(&self, mac: &str) -> Option<String> {
        if let Some(cached) = self.cache.get(mac) {
            return Some(cached.topic.clone()).filter(|topic| !topic.is_empty());
        }

        match self.store.get_record(&self.table, &self.device_criteria(mac)) {
            Ok(stored) => stored.as_ref().and_then(topic_from_stored),
            Err(e) => {
                debug!("Lookup of driver {} failed: {}", mac, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryRecordStore, StoreCalls};
    use serde_json::json;

    const SWITCH: &str = "SW0001";
    const TABLE: &str = "leds";

    fn setup() -> (Arc<MemoryRecordStore>, Reconciler) {
        let store = Arc::new(MemoryRecordStore::new());
        let reconciler = Reconciler::new(store.clone(), TABLE, SWITCH);
        (store, reconciler)
    }

    fn report(mac: &str, temperature: i32) -> DeviceRecord {
        DeviceRecord {
            mac: mac.to_string(),
            switch_mac: SWITCH.to_string(),
            protocol: "MQTT".to_string(),
            topic: format!("led/{}", mac),
            temperature,
            ..Default::default()
        }
    }

    #[test]
    fn test_first_report_inserts() {
        let (store, mut reconciler) = setup();

        let outcome = reconciler.reconcile(report("AA", 21)).unwrap();

        assert_eq!(outcome, ReconcileOutcome::Inserted { id: "1".to_string() });
        assert_eq!(store.calls(), StoreCalls { gets: 1, inserts: 1, updates: 0 });
        assert_eq!(reconciler.cache().get("AA").unwrap().persisted_id(), Some("1"));
    }

    #[test]
    fn test_repeated_report_is_suppressed() {
        let (store, mut reconciler) = setup();

        reconciler.reconcile(report("AA", 21)).unwrap();
        store.reset_calls();

        let outcome = reconciler.reconcile(report("AA", 21)).unwrap();
        assert_eq!(outcome, ReconcileOutcome::Unchanged);
        assert_eq!(store.calls().total(), 0);
    }

    #[test]
    fn test_changed_field_updates_full_record() {
        let (store, mut reconciler) = setup();
        reconciler.reconcile(report("AA", 21)).unwrap();
        store.reset_calls();

        let outcome = reconciler.reconcile(report("AA", 45)).unwrap();

        assert_eq!(outcome, ReconcileOutcome::Updated { id: "1".to_string() });
        assert_eq!(store.calls(), StoreCalls { gets: 0, inserts: 0, updates: 1 });
        let stored = store.record(TABLE, "1").unwrap();
        assert_eq!(stored["temperature"], 45);
        assert_eq!(stored["topic"], "led/AA");
        assert_eq!(stored["id"], "1");
    }

    #[test]
    fn test_report_identity_is_ignored() {
        let (_store, mut reconciler) = setup();
        reconciler.reconcile(report("AA", 21)).unwrap();

        let mut forged = report("AA", 21);
        forged.id = Some("999".to_string());
        assert_eq!(reconciler.reconcile(forged).unwrap(), ReconcileOutcome::Unchanged);

        let mut fresh = report("BB", 1);
        fresh.id = Some("999".to_string());
        let outcome = reconciler.reconcile(fresh).unwrap();
        assert_eq!(outcome, ReconcileOutcome::Inserted { id: "2".to_string() });
    }

    #[test]
    fn test_restart_reuses_stored_identity() {
        let (store, mut reconciler) = setup();
        store.seed(
            TABLE,
            "abc",
            json!({"mac": "AA:BB:CC:DD:EE:FF", "switchMac": SWITCH, "temperature": 10}),
        );

        let outcome = reconciler.reconcile(report("AA:BB:CC:DD:EE:FF", 21)).unwrap();

        assert_eq!(outcome, ReconcileOutcome::Updated { id: "abc".to_string() });
        assert_eq!(store.calls(), StoreCalls { gets: 1, inserts: 0, updates: 1 });
        assert_eq!(store.count(TABLE), 1);
        assert_eq!(store.record(TABLE, "abc").unwrap()["temperature"], 21);
    }

    #[test]
    fn test_restart_reuses_identity_of_loosely_typed_document() {
        let (store, mut reconciler) = setup();
        store.seed(
            TABLE,
            "abc",
            json!({
                "mac": "AA",
                "switchMac": SWITCH,
                "temperature": 21.0,
                "friendlyName": null,
                "group": "kitchen",
                "topic": "led/AA"
            }),
        );

        assert_eq!(reconciler.resolve_topic("AA").as_deref(), Some("led/AA"));

        let outcome = reconciler.reconcile(report("AA", 21)).unwrap();

        assert_eq!(outcome, ReconcileOutcome::Updated { id: "abc".to_string() });
        assert_eq!(store.calls().inserts, 0);
        assert_eq!(store.count(TABLE), 1);
    }

    #[test]
    fn test_stored_record_of_other_controller_is_not_reused() {
        let (store, mut reconciler) = setup();
        store.seed(TABLE, "abc", json!({"mac": "AA", "switchMac": "OTHER"}));

        let outcome = reconciler.reconcile(report("AA", 21)).unwrap();
        assert!(matches!(outcome, ReconcileOutcome::Inserted { .. }));
        assert_eq!(store.count(TABLE), 2);
    }

    #[test]
    fn test_stored_record_without_identity_falls_through_to_insert() {
        let (store, mut reconciler) = setup();
        store.seed(TABLE, "", json!({"mac": "AA", "switchMac": SWITCH}));

        let outcome = reconciler.reconcile(report("AA", 21)).unwrap();
        assert!(matches!(outcome, ReconcileOutcome::Inserted { .. }));
        assert_eq!(store.calls().inserts, 1);
    }

    #[test]
    fn test_lookup_error_falls_through_to_insert() {
        let (store, mut reconciler) = setup();
        store.set_fail_reads(true);

        let outcome = reconciler.reconcile(report("AA", 21)).unwrap();
        assert!(matches!(outcome, ReconcileOutcome::Inserted { .. }));
    }

    #[test]
    fn test_resolved_identity_never_triggers_insert_again() {
        let (store, mut reconciler) = setup();
        for temperature in 0..5 {
            reconciler.reconcile(report("AA", temperature)).unwrap();
        }

        assert_eq!(store.calls(), StoreCalls { gets: 1, inserts: 1, updates: 4 });
    }

    #[test]
    fn test_write_error_keeps_identity_unresolved() {
        let (store, mut reconciler) = setup();
        store.set_fail_writes(true);

        let err = reconciler.reconcile(report("AA", 21)).unwrap_err();
        assert!(matches!(err, ReconcileError::Store(StoreError::Unavailable)));

        let cached = reconciler.cache().get("AA").unwrap();
        assert_eq!(cached.temperature, 21);
        assert_eq!(cached.persisted_id(), None);

        // Same report again: not suppressed, resolution is retried.
        store.set_fail_writes(false);
        store.reset_calls();
        let outcome = reconciler.reconcile(report("AA", 21)).unwrap();
        assert!(matches!(outcome, ReconcileOutcome::Inserted { .. }));
        assert_eq!(store.calls(), StoreCalls { gets: 1, inserts: 1, updates: 0 });
    }

    #[test]
    fn test_update_error_keeps_previous_identity() {
        let (store, mut reconciler) = setup();
        reconciler.reconcile(report("AA", 21)).unwrap();
        store.set_fail_writes(true);

        assert!(reconciler.reconcile(report("AA", 45)).is_err());

        let cached = reconciler.cache().get("AA").unwrap();
        assert_eq!(cached.temperature, 45);
        assert_eq!(cached.persisted_id(), Some("1"));
    }

    #[test]
    fn test_get_device_reads_through_without_caching() {
        let (store, reconciler) = setup();
        store.seed(TABLE, "5", json!({"mac": "AA", "switchMac": SWITCH, "topic": "led/AA"}));

        let device = reconciler.get_device("AA").unwrap();
        assert_eq!(device.persisted_id(), Some("5"));
        assert_eq!(device.topic, "led/AA");
        assert!(reconciler.cache().is_empty());

        assert!(reconciler.get_device("BB").is_none());
    }

    #[test]
    fn test_get_device_prefers_cache() {
        let (store, mut reconciler) = setup();
        reconciler.reconcile(report("AA", 21)).unwrap();
        store.reset_calls();

        assert_eq!(reconciler.get_device("AA").unwrap().temperature, 21);
        assert_eq!(store.calls().total(), 0);
    }

    #[test]
    fn test_resolve_topic() {
        let (store, mut reconciler) = setup();
        reconciler.reconcile(report("AA11", 21)).unwrap();
        store.seed(TABLE, "9", json!({"mac": "BB", "switchMac": SWITCH, "Topic": "led/BB"}));

        assert_eq!(reconciler.resolve_topic("AA11").as_deref(), Some("led/AA11"));
        assert_eq!(reconciler.resolve_topic("BB").as_deref(), Some("led/BB"));
        assert_eq!(reconciler.resolve_topic("CC"), None);
    }
}
