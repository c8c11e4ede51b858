//! Storage for one-time prekeys.
//!
//! The core owns no persistence format; the trait lets callers plug a
//! backing store of their own while the in-memory implementation covers
//! tests and single-process responders. Stores follow the single-owner
//! model of the rest of the crate: one responder endpoint owns the store
//! and serializes access to it.

use crate::keys::{PublicKey, SecretKey};
use std::collections::HashMap;

/// Backend holding a responder's unused one-time prekeys.
///
/// Keys are consumed atomically when retrieved; a consumed key must never
/// be returned again.
pub trait PreKeyStore {
    /// Stores a one-time prekey under the given ID, replacing any
    /// existing entry.
    fn store(&mut self, id: u32, key: SecretKey);

    /// Retrieves and removes a one-time prekey by ID.
    ///
    /// Returns `None` if no prekey exists with the given ID.
    fn consume(&mut self, id: u32) -> Option<SecretKey>;

    /// Returns the public half of a stored prekey without consuming it.
    fn public_key(&self, id: u32) -> Option<PublicKey>;

    /// Lists all available one-time prekey IDs.
    fn ids(&self) -> Vec<u32>;

    /// Returns the number of one-time prekeys currently stored.
    fn count(&self) -> usize;
}

/// In-memory prekey storage.
///
/// Suitable for testing and applications that keep prekey inventory in
/// process memory. Secrets zeroize on drop.
#[derive(Debug, Default)]
pub struct InMemoryPreKeyStore {
    one_time_prekeys: HashMap<u32, SecretKey>,
}

impl InMemoryPreKeyStore {
    /// Creates a new empty prekey store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bulk-inserts freshly generated prekeys into the store.
    pub fn populate(&mut self, keys: Vec<(u32, SecretKey)>) {
        for (id, key) in keys {
            self.one_time_prekeys.insert(id, key);
        }
    }
}

impl PreKeyStore for InMemoryPreKeyStore {
    fn store(&mut self, id: u32, key: SecretKey) {
        self.one_time_prekeys.insert(id, key);
    }

    fn consume(&mut self, id: u32) -> Option<SecretKey> {
        self.one_time_prekeys.remove(&id)
    }

    fn public_key(&self, id: u32) -> Option<PublicKey> {
        self.one_time_prekeys.get(&id).map(SecretKey::public_key)
    }

    fn ids(&self) -> Vec<u32> {
        self.one_time_prekeys.keys().copied().collect()
    }

    fn count(&self) -> usize {
        self.one_time_prekeys.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_core::OsRng;

    #[test]
    fn test_store_and_consume() {
        let mut storage = InMemoryPreKeyStore::new();

        storage.store(1, SecretKey::generate(&mut OsRng));
        storage.store(2, SecretKey::generate(&mut OsRng));
        assert_eq!(storage.count(), 2);

        assert!(storage.consume(1).is_some());
        assert_eq!(storage.count(), 1);

        // A consumed key is gone.
        assert!(storage.consume(1).is_none());
    }

    #[test]
    fn test_unknown_id() {
        let mut storage = InMemoryPreKeyStore::new();
        assert!(storage.consume(42).is_none());
    }

    #[test]
    fn test_populate() {
        let mut storage = InMemoryPreKeyStore::new();
        let batch = (0..10u32)
            .map(|id| (id, SecretKey::generate(&mut OsRng)))
            .collect();
        storage.populate(batch);

        assert_eq!(storage.count(), 10);
        let mut ids = storage.ids();
        ids.sort_unstable();
        assert_eq!(ids, (0..10).collect::<Vec<_>>());
    }
}
