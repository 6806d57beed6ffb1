//! In-memory key-value store

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{KeyValueStore, StorageEstimate};
use crate::error::{Error, Result};

/// Map-backed store with an optional byte quota.
///
/// Sizes are counted as key bytes plus value bytes. With a quota set, writes
/// that would exceed it fail with [`Error::QuotaExceeded`] and leave the
/// previous value in place.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
    quota_bytes: Option<u64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that rejects writes beyond `quota_bytes`
    pub fn with_quota(quota_bytes: u64) -> Self {
        Self {
            entries: Mutex::default(),
            quota_bytes: Some(quota_bytes),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn pair_size(key: &str, value: &str) -> u64 {
        (key.len() + value.len()) as u64
    }

    fn used_bytes(entries: &BTreeMap<String, String>) -> u64 {
        entries
            .iter()
            .map(|(key, value)| Self::pair_size(key, value))
            .sum()
    }
}

impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.lock();
        if let Some(quota) = self.quota_bytes {
            let existing = entries
                .get(key)
                .map_or(0, |previous| Self::pair_size(key, previous));
            let used = Self::used_bytes(&entries) - existing;
            let needed = Self::pair_size(key, value);
            if used + needed > quota {
                return Err(Error::QuotaExceeded {
                    key: key.to_string(),
                    needed,
                    available: quota.saturating_sub(used),
                });
            }
        }
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.lock().remove(key);
        Ok(())
    }

    async fn entries(&self) -> Result<Vec<(String, String)>> {
        Ok(self
            .lock()
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }

    async fn estimate(&self) -> Result<Option<StorageEstimate>> {
        Ok(self.quota_bytes.map(|quota_bytes| StorageEstimate {
            used_bytes: Self::used_bytes(&self.lock()),
            quota_bytes,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_remove() {
        let store = MemoryStore::new();
        assert_eq!(store.get("a").await.unwrap(), None);

        store.set("a", "1").await.unwrap();
        store.set("a", "2").await.unwrap();
        assert_eq!(store.get("a").await.unwrap().as_deref(), Some("2"));

        store.remove("a").await.unwrap();
        store.remove("a").await.unwrap();
        assert!(store.entries().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn quota_rejects_oversized_writes() {
        let store = MemoryStore::with_quota(10);
        store.set("k", "12345").await.unwrap();

        let error = store.set("j", "123456789").await.unwrap_err();
        assert!(error.is_quota_exceeded());
        assert_eq!(store.get("j").await.unwrap(), None);

        // Replacing an existing value only counts the difference.
        store.set("k", "123456789").await.unwrap();
        let estimate = store.estimate().await.unwrap().unwrap();
        assert_eq!(estimate.used_bytes, 10);
        assert_eq!(estimate.quota_bytes, 10);
    }
}
