//! Local key-value persistence used for the outbox and entity snapshots.

mod health;
mod memory;
mod snapshot;

use crate::error::Result;

pub use health::{check_storage_health, StorageHealth, StorageMonitor, StorageStatus};
pub use memory::MemoryStore;
pub use snapshot::LocalSnapshot;
pub(crate) use snapshot::{read_json, write_json};

/// Persisted keys
pub mod keys {
    pub const OUTBOX: &str = "focal.outbox";
    pub const DEVICE_ID: &str = "focal.device_id";
    pub const CONTEXTS: &str = "focal.contexts";
    pub const TASKS: &str = "focal.tasks";
    pub const REMINDERS: &str = "focal.reminders";
    pub const PRESETS: &str = "focal.presets";
    pub const ACTIVE_SESSION: &str = "focal.active_session";
    pub const PREFERENCES: &str = "focal.preferences";
    /// Set while a migration upload is unfinished
    pub const MIGRATION_PENDING: &str = "focal.migration_pending";
}

/// Usage figures reported by the storage backend itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageEstimate {
    pub used_bytes: u64,
    pub quota_bytes: u64,
}

/// Blob store with string keys and string values (async)
#[allow(async_fn_in_trait)]
pub trait KeyValueStore {
    /// Read a value, `None` when the key was never written
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value, replacing any previous one
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Delete a key; missing keys are not an error
    async fn remove(&self, key: &str) -> Result<()>;

    /// Every stored pair
    async fn entries(&self) -> Result<Vec<(String, String)>>;

    /// Platform usage/quota estimate, if the backend can provide one
    async fn estimate(&self) -> Result<Option<StorageEstimate>> {
        Ok(None)
    }
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for &S {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        (**self).set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        (**self).remove(key).await
    }

    async fn entries(&self) -> Result<Vec<(String, String)>> {
        (**self).entries().await
    }

    async fn estimate(&self) -> Result<Option<StorageEstimate>> {
        (**self).estimate().await
    }
}

/// Load the stable tag identifying this device, creating it on first use.
pub async fn load_or_create_device_id<S: KeyValueStore>(store: &S) -> Result<String> {
    if let Some(existing) = store.get(keys::DEVICE_ID).await? {
        let existing = existing.trim();
        if !existing.is_empty() {
            return Ok(existing.to_string());
        }
    }

    let device_id = uuid::Uuid::now_v7().to_string();
    store.set(keys::DEVICE_ID, &device_id).await?;
    tracing::info!(device_id = %device_id, "Registered new device id");
    Ok(device_id)
}
