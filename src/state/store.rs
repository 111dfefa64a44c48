//! DeviceCache - in-memory view of every driver seen since start-up
//!
//! Keyed by hardware address. Entries are never evicted: the population is
//! bounded by the number of drivers wired to one controller.

use super::types::DeviceRecord;
use std::collections::HashMap;

/// Last known state per hardware address
#[derive(Debug, Default)]
pub struct DeviceCache {
    devices: HashMap<String, DeviceRecord>,
}

impl DeviceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the cached record for an address
    pub fn get(&self, mac: &str) -> Option<&DeviceRecord> {
        self.devices.get(mac)
    }

    /// Create or replace the cached record for an address
    pub fn put(&mut self, mac: impl Into<String>, record: DeviceRecord) {
        self.devices.insert(mac.into(), record);
    }

    /// Record the persisted identity of a cached entry.
    ///
    /// An identity that is already resolved is kept; returns whether the
    /// entry now carries `id`.
    pub fn set_identity(&mut self, mac: &str, id: &str) -> bool {
        match self.devices.get_mut(mac) {
            Some(entry) => match entry.persisted_id() {
                Some(existing) => existing == id,
                None => {
                    entry.id = Some(id.to_string());
                    true
                }
            },
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
