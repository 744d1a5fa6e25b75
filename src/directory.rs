use crate::attributes::AttributeMap;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

/// Peer address → attributes, behind a single lock.
///
/// Every operation takes the lock for its whole duration and hands out owned
/// copies only, so no caller can hold the lock across an `.await`.
#[derive(Debug, Default, Clone)]
pub struct AttributeDirectory {
    peers: Arc<Mutex<HashMap<String, AttributeMap>>>,
}

impl AttributeDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, AttributeMap>> {
        self.peers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Merges `updates` into the entry for `addr`, creating it if needed.
    pub fn set_attributes(&self, addr: &str, updates: AttributeMap) {
        let mut peers = self.lock();
        peers.entry(addr.to_string()).or_default().extend(updates);
    }

    /// Snapshot of `addr`'s attributes, empty when the peer is unknown.
    pub fn get_attributes(&self, addr: &str) -> AttributeMap {
        self.lock().get(addr).cloned().unwrap_or_default()
    }

    /// Presence check and snapshot under one lock acquisition.
    pub fn lookup(&self, addr: &str) -> Option<AttributeMap> {
        self.lock().get(addr).cloned()
    }

    pub fn contains(&self, addr: &str) -> bool {
        self.lock().contains_key(addr)
    }

    pub fn erase(&self, addr: &str) {
        self.lock().remove(addr);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
