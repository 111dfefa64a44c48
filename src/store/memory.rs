//! In-memory record store
//!
//! Used for `--ephemeral` runs and as the store double in tests: it counts
//! every call and can be switched into a failing mode to exercise error paths.

use super::{with_identity, Criteria, RecordStore, StoreError};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

/// Number of calls made against a [`MemoryRecordStore`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCalls {
    pub gets: usize,
    pub inserts: usize,
    pub updates: usize,
}

impl StoreCalls {
    /// Inserts plus updates
    pub fn writes(&self) -> usize {
        self.inserts + self.updates
    }

    pub fn total(&self) -> usize {
        self.gets + self.writes()
    }
}

type Table = BTreeMap<String, Value>;

#[derive(Default)]
pub struct MemoryRecordStore {
    tables: Mutex<HashMap<String, Table>>,
    next_id: AtomicU64,
    gets: AtomicUsize,
    inserts: AtomicUsize,
    updates: AtomicUsize,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a document in place without counting it as a call
    pub fn seed(&self, table: &str, id: &str, record: Value) {
        let stored = match with_identity(&record, id) {
            Ok(stored) => stored,
            Err(_) => record,
        };
        self.tables
            .lock()
            .entry(table.to_string())
            .or_default()
            .insert(id.to_string(), stored);
    }

    /// Snapshot of the call counters
    pub fn calls(&self) -> StoreCalls {
        StoreCalls {
            gets: self.gets.load(Ordering::SeqCst),
            inserts: self.inserts.load(Ordering::SeqCst),
            updates: self.updates.load(Ordering::SeqCst),
        }
    }

    pub fn reset_calls(&self) {
        self.gets.store(0, Ordering::SeqCst);
        self.inserts.store(0, Ordering::SeqCst);
        self.updates.store(0, Ordering::SeqCst);
    }

    /// Make every subsequent lookup fail with [`StoreError::Unavailable`]
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent insert/update fail with [`StoreError::Unavailable`]
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Stored document under `id`
    pub fn record(&self, table: &str, id: &str) -> Option<Value> {
        self.tables.lock().get(table)?.get(id).cloned()
    }

    /// Number of documents in a table
    pub fn count(&self, table: &str) -> usize {
        self.tables.lock().get(table).map(BTreeMap::len).unwrap_or(0)
    }
}

impl RecordStore for MemoryRecordStore {
    fn ensure_table(&self, table: &str) -> Result<(), StoreError> {
        self.tables.lock().entry(table.to_string()).or_default();
        Ok(())
    }

    fn get_record(&self, table: &str, criteria: &Criteria) -> Result<Option<Value>, StoreError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable);
        }

        let tables = self.tables.lock();
        Ok(tables
            .get(table)
            .and_then(|rows| rows.values().find(|row| criteria.matches(row)).cloned()))
    }

    fn insert_record(&self, table: &str, record: &Value) -> Result<String, StoreError> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable);
        }

        let id = (self.next_id.fetch_add(1, Ordering::SeqCst) + 1).to_string();
        let stored = with_identity(record, &id)?;
        self.tables
            .lock()
            .entry(table.to_string())
            .or_default()
            .insert(id.clone(), stored);
        Ok(id)
    }

    fn update_record(&self, table: &str, id: &str, record: &Value) -> Result<(), StoreError> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable);
        }

        let stored = with_identity(record, id)?;
        self.tables
            .lock()
            .entry(table.to_string())
            .or_default()
            .insert(id.to_string(), stored);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_counts_calls() {
        let store = MemoryRecordStore::new();
        let id = store.insert_record("leds", &json!({"mac": "AA"})).unwrap();
        store.update_record("leds", &id, &json!({"mac": "AA"})).unwrap();
        store.get_record("leds", &Criteria::new()).unwrap();

        assert_eq!(
            store.calls(),
            StoreCalls {
                gets: 1,
                inserts: 1,
                updates: 1
            }
        );
        assert_eq!(store.count("leds"), 1);
    }

    #[test]
    fn test_seed_is_not_counted() {
        let store = MemoryRecordStore::new();
        store.seed("leds", "7", json!({"mac": "AA"}));

        assert_eq!(store.calls().total(), 0);
        assert_eq!(store.record("leds", "7").unwrap()["id"], "7");
    }

    #[test]
    fn test_failure_injection() {
        let store = MemoryRecordStore::new();
        store.set_fail_writes(true);
        assert!(matches!(
            store.insert_record("leds", &json!({"mac": "AA"})),
            Err(StoreError::Unavailable)
        ));
        assert_eq!(store.count("leds"), 0);

        store.set_fail_reads(true);
        assert!(store.get_record("leds", &Criteria::new()).is_err());
    }
}
