//! Record store backed by an embedded sled database
//!
//! Each table is a sled tree. Documents are stored as JSON under their
//! identity, which is drawn from sled's monotonic id generator so identities
//! stay unique across restarts.

use super::{with_identity, Criteria, RecordStore, StoreError};
use serde_json::Value;
use std::path::Path;
use tracing::{debug, info, trace, warn};

/// Sled-backed [`RecordStore`]
#[derive(Clone)]
pub struct SledRecordStore {
    db: sled::Db,
}

impl SledRecordStore {
    /// Open (or create) the database at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let db = sled::open(path)?;
        info!("Record store opened at: {}", path.display());
        Ok(Self { db })
    }

    /// Open a throwaway database that is removed when dropped
    pub fn temporary() -> Result<Self, StoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }

    fn tree(&self, table: &str) -> Result<sled::Tree, StoreError> {
        Ok(self.db.open_tree(table)?)
    }

    /// Number of documents in a table
    pub fn count(&self, table: &str) -> Result<usize, StoreError> {
        Ok(self.tree(table)?.len())
    }
}

impl RecordStore for SledRecordStore {
    fn ensure_table(&self, table: &str) -> Result<(), StoreError> {
        let tree = self.tree(table)?;
        debug!("Table '{}' ready ({} documents)", table, tree.len());
        Ok(())
    }

    fn get_record(&self, table: &str, criteria: &Criteria) -> Result<Option<Value>, StoreError> {
        let tree = self.tree(table)?;
        for item in tree.iter() {
            let (key, bytes) = item?;
            let record: Value = match serde_json::from_slice(&bytes) {
                Ok(record) => record,
                Err(e) => {
                    warn!(
                        "Skipping unreadable document {} in '{}': {}",
                        String::from_utf8_lossy(&key),
                        table,
                        e
                    );
                    continue;
                }
            };
            if criteria.matches(&record) {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    fn insert_record(&self, table: &str, record: &Value) -> Result<String, StoreError> {
        let tree = self.tree(table)?;
        let id = self.db.generate_id()?.to_string();
        let stored = with_identity(record, &id)?;
        tree.insert(id.as_bytes(), serde_json::to_vec(&stored)?)?;
        trace!("Inserted document {} into '{}'", id, table);
        Ok(id)
    }

    fn update_record(&self, table: &str, id: &str, record: &Value) -> Result<(), StoreError> {
        let tree = self.tree(table)?;
        let stored = with_identity(record, id)?;
        tree.insert(id.as_bytes(), serde_json::to_vec(&stored)?)?;
        trace!("Updated document {} in '{}'", id, table);
        Ok(())
    }

    fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_insert_then_find() {
        let store = SledRecordStore::temporary().unwrap();
        store.ensure_table("leds").unwrap();

        let id = store
            .insert_record("leds", &json!({"mac": "AA", "switchMac": "SW1"}))
            .unwrap();

        let found = store
            .get_record("leds", &Criteria::new().eq("mac", "AA").eq("switchMac", "SW1"))
            .unwrap()
            .unwrap();
        assert_eq!(found["id"], json!(id));

        let missing = store
            .get_record("leds", &Criteria::new().eq("mac", "AA").eq("switchMac", "SW2"))
            .unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn test_identities_are_unique() {
        let store = SledRecordStore::temporary().unwrap();
        let a = store.insert_record("leds", &json!({"mac": "AA"})).unwrap();
        let b = store.insert_record("leds", &json!({"mac": "BB"})).unwrap();
        assert_ne!(a, b);
        assert_eq!(store.count("leds").unwrap(), 2);
    }

    #[test]
    fn test_update_replaces_document() {
        let store = SledRecordStore::temporary().unwrap();
        let id = store
            .insert_record("leds", &json!({"mac": "AA", "temperature": 21}))
            .unwrap();

        store
            .update_record("leds", &id, &json!({"mac": "AA", "temperature": 45}))
            .unwrap();

        let found = store
            .get_record("leds", &Criteria::new().eq("mac", "AA"))
            .unwrap()
            .unwrap();
        assert_eq!(found["temperature"], 45);
        assert_eq!(found["id"], json!(id));
        assert_eq!(store.count("leds").unwrap(), 1);
    }

    #[test]
    fn test_documents_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sled");

        let id = {
            let store = SledRecordStore::open(&path).unwrap();
            let id = store.insert_record("leds", &json!({"mac": "AA"})).unwrap();
            store.flush().unwrap();
            id
        };

        let store = SledRecordStore::open(&path).unwrap();
        let found = store
            .get_record("leds", &Criteria::new().eq("mac", "AA"))
            .unwrap()
            .unwrap();
        assert_eq!(found["id"], json!(id));
    }

    #[test]
    fn test_tables_are_isolated() {
        let store = SledRecordStore::temporary().unwrap();
        store.insert_record("leds", &json!({"mac": "AA"})).unwrap();

        let other = store
            .get_record("sensors", &Criteria::new().eq("mac", "AA"))
            .unwrap();
        assert!(other.is_none());
    }
}
