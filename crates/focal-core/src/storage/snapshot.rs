//! Whole-dataset snapshot of locally persisted entities

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{keys, KeyValueStore};
use crate::error::Result;
use crate::models::{Context, Preferences, Preset, Reminder, Session, Task};

/// Every syncable collection held on this device
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalSnapshot {
    pub contexts: Vec<Context>,
    pub tasks: Vec<Task>,
    pub reminders: Vec<Reminder>,
    pub presets: Vec<Preset>,
    pub active_session: Option<Session>,
    pub preferences: Option<Preferences>,
}

impl LocalSnapshot {
    /// Read every collection; missing keys load as empty.
    pub async fn load<S: KeyValueStore>(store: &S) -> Result<Self> {
        Ok(Self {
            contexts: read_json(store, keys::CONTEXTS).await?.unwrap_or_default(),
            tasks: read_json(store, keys::TASKS).await?.unwrap_or_default(),
            reminders: read_json(store, keys::REMINDERS).await?.unwrap_or_default(),
            presets: read_json(store, keys::PRESETS).await?.unwrap_or_default(),
            active_session: read_json(store, keys::ACTIVE_SESSION).await?,
            preferences: read_json(store, keys::PREFERENCES).await?,
        })
    }

    /// Write every collection back.
    pub async fn save<S: KeyValueStore>(&self, store: &S) -> Result<()> {
        write_json(store, keys::CONTEXTS, &self.contexts).await?;
        write_json(store, keys::TASKS, &self.tasks).await?;
        write_json(store, keys::REMINDERS, &self.reminders).await?;
        write_json(store, keys::PRESETS, &self.presets).await?;
        match &self.active_session {
            Some(session) => write_json(store, keys::ACTIVE_SESSION, session).await?,
            None => store.remove(keys::ACTIVE_SESSION).await?,
        }
        match &self.preferences {
            Some(preferences) => write_json(store, keys::PREFERENCES, preferences).await?,
            None => store.remove(keys::PREFERENCES).await?,
        }
        Ok(())
    }

    /// Number of records that upload individually (preferences excluded)
    pub fn item_count(&self) -> usize {
        self.contexts.len()
            + self.tasks.len()
            + self.reminders.len()
            + self.presets.len()
            + usize::from(self.active_session.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.item_count() == 0 && self.preferences.is_none()
    }
}

pub(crate) async fn read_json<S, T>(store: &S, key: &str) -> Result<Option<T>>
where
    S: KeyValueStore,
    T: DeserializeOwned,
{
    match store.get(key).await? {
        Some(raw) if !raw.trim().is_empty() => Ok(Some(serde_json::from_str(&raw)?)),
        _ => Ok(None),
    }
}

pub(crate) async fn write_json<S, T>(store: &S, key: &str, value: &T) -> Result<()>
where
    S: KeyValueStore,
    T: Serialize + ?Sized,
{
    let raw = serde_json::to_string(value)?;
    store.set(key, &raw).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContextAllocation, Syncable};
    use crate::storage::MemoryStore;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn empty_store_loads_empty_snapshot() {
        let store = MemoryStore::new();
        let snapshot = LocalSnapshot::load(&store).await.unwrap();
        assert!(snapshot.is_empty());
    }

    #[tokio::test]
    async fn save_then_load_preserves_collections() {
        let store = MemoryStore::new();
        let context = Context::new("Work");
        let task = Task::new("Ship it", Some(context.id().to_string()), "a0");
        let snapshot = LocalSnapshot {
            contexts: vec![context.clone()],
            tasks: vec![task],
            active_session: Some(Session::start(vec![ContextAllocation::new(
                context.id.clone(),
                25,
            )])),
            preferences: Some(Preferences::default()),
            ..LocalSnapshot::default()
        };

        snapshot.save(&store).await.unwrap();
        let loaded = LocalSnapshot::load(&store).await.unwrap();
        assert_eq!(loaded, snapshot);
        assert_eq!(loaded.item_count(), 3);
    }

    #[tokio::test]
    async fn clearing_session_removes_key() {
        let store = MemoryStore::new();
        let mut snapshot = LocalSnapshot {
            active_session: Some(Session::start(Vec::new())),
            ..LocalSnapshot::default()
        };
        snapshot.save(&store).await.unwrap();

        snapshot.active_session = None;
        snapshot.save(&store).await.unwrap();
        assert_eq!(store.get(keys::ACTIVE_SESSION).await.unwrap(), None);
    }

    #[tokio::test]
    async fn corrupt_blob_is_an_error() {
        let store = MemoryStore::new();
        store.set(keys::TASKS, "{not json").await.unwrap();
        assert!(LocalSnapshot::load(&store).await.is_err());
    }
}
