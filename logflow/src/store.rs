//! Persistent key-value store handle shared by plugins.
//!
//! The engine treats the store as opaque: plugins that need durable state
//! (read offsets, counters) keep it under a bucket named after their id.

use crate::errors::StoreError;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt::Debug;

/// A bucketed byte store.
pub trait PersistentStore: Send + Sync + Debug {
    /// Reads a value.
    fn get(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Writes a value, replacing any previous one.
    fn put(&self, bucket: &str, key: &str, value: Vec<u8>) -> Result<(), StoreError>;

    /// Removes a value, returning it if present.
    fn delete(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Lists the keys of a bucket in sorted order.
    fn keys(&self, bucket: &str) -> Result<Vec<String>, StoreError>;
}

/// A store kept in process memory.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    buckets: RwLock<BTreeMap<String, BTreeMap<String, Vec<u8>>>>,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes every bucket.
    pub fn clear(&self) {
        self.buckets.write().clear();
    }
}

impl PersistentStore for InMemoryStore {
    fn get(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self
            .buckets
            .read()
            .get(bucket)
            .and_then(|entries| entries.get(key))
            .cloned())
    }

    fn put(&self, bucket: &str, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        self.buckets
            .write()
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    fn delete(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let mut buckets = self.buckets.write();
        let Some(entries) = buckets.get_mut(bucket) else {
            return Ok(None);
        };
        let removed = entries.remove(key);
        if entries.is_empty() {
            buckets.remove(bucket);
        }
        Ok(removed)
    }

    fn keys(&self, bucket: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .buckets
            .read()
            .get(bucket)
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_delete() {
        let store = InMemoryStore::new();
        store.put("input", "offset", b"42".to_vec()).unwrap();

        assert_eq!(store.get("input", "offset").unwrap(), Some(b"42".to_vec()));
        assert_eq!(store.get("other", "offset").unwrap(), None);
        assert_eq!(store.keys("input").unwrap(), vec!["offset".to_string()]);

        assert_eq!(store.delete("input", "offset").unwrap(), Some(b"42".to_vec()));
        assert_eq!(store.delete("input", "offset").unwrap(), None);
        assert!(store.keys("input").unwrap().is_empty());
    }

    #[test]
    fn test_buckets_are_not_namespaced_further() {
        let store = InMemoryStore::new();
        store.put("a", "k", vec![1]).unwrap();
        store.put("a", "k", vec![2]).unwrap();
        assert_eq!(store.get("a", "k").unwrap(), Some(vec![2]));

        store.clear();
        assert_eq!(store.get("a", "k").unwrap(), None);
    }
}
