//! Sync service wiring local storage, the outbox, and the remote store.

use std::sync::Arc;

use serde::Serialize;

use crate::auth::{require_session, AuthSession};
use crate::config::SyncConfig;
use crate::error::{Error, Result};
use crate::models::{Context, EntityType, Preferences, Preset, Reminder, Session, Syncable, Task};
use crate::notify::Notifier;
use crate::storage::{
    keys, load_or_create_device_id, read_json, write_json, KeyValueStore, StorageHealth,
    StorageMonitor,
};
use crate::sync::{
    decode_entity, merge_entity_arrays, resolve_context_conflict, resolve_preferences_conflict,
    resolve_preset_conflict, resolve_reminder_conflict, resolve_session_conflict,
    resolve_task_conflict, FlushReport, MigrationEngine, MigrationProgress, Outbox, OutboxEntry,
    RemoteStore, RowMeta,
};
use crate::sync::wire::WireEntity;

/// Per-device sync state and operations.
///
/// `remote` is `None` while the app runs local-only; operations that need it
/// fail with [`Error::NotAuthenticated`].
pub struct SyncService<S: KeyValueStore, R: RemoteStore> {
    store: S,
    remote: Option<R>,
    config: SyncConfig,
    device_id: String,
    outbox: Outbox<Arc<dyn Notifier>>,
    monitor: StorageMonitor,
    notifier: Arc<dyn Notifier>,
}

impl<S: KeyValueStore, R: RemoteStore> SyncService<S, R> {
    /// Load device id and pending outbox from `store`.
    pub async fn open(
        store: S,
        remote: Option<R>,
        config: SyncConfig,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        let device_id = load_or_create_device_id(&store).await?;
        let outbox = Outbox::load(&store, Arc::clone(&notifier)).await;
        tracing::debug!(
            device_id = %device_id,
            pending = outbox.get_outbox_count(),
            remote = remote.is_some(),
            "Opened sync service"
        );

        Ok(Self {
            monitor: StorageMonitor::new(config.storage_quota_bytes),
            store,
            remote,
            config,
            device_id,
            outbox,
            notifier,
        })
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub const fn store(&self) -> &S {
        &self.store
    }

    pub const fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn outbox_entries(&self) -> &[OutboxEntry] {
        self.outbox.entries()
    }

    pub fn outbox_count(&self) -> usize {
        self.outbox.get_outbox_count()
    }

    pub async fn clear_outbox(&mut self) {
        self.outbox.clear(&self.store).await;
    }

    pub async fn record_create<T: Syncable + Serialize>(&mut self, entity: &T) -> Result<()> {
        self.outbox.record_create(&self.store, entity).await
    }

    pub async fn record_update<T: Syncable + Serialize>(&mut self, entity: &T) -> Result<()> {
        self.outbox.record_update(&self.store, entity).await
    }

    pub async fn record_delete<T: Syncable + Serialize + Clone>(
        &mut self,
        entity: &T,
    ) -> Result<()> {
        self.outbox.record_delete(&self.store, entity).await
    }

    fn remote(&self) -> Result<&R> {
        self.remote.as_ref().ok_or(Error::NotAuthenticated)
    }

    fn row_meta(&self, auth: Option<&AuthSession>) -> Result<RowMeta> {
        let user_id = require_session(auth)?.user_id()?;
        Ok(RowMeta::new(user_id, self.device_id.clone()))
    }

    /// Push every pending mutation once
    pub async fn flush_outbox(&mut self, auth: Option<&AuthSession>) -> Result<FlushReport> {
        let meta = self.row_meta(auth)?;
        let remote = self.remote.as_ref().ok_or(Error::NotAuthenticated)?;
        Ok(self.outbox.flush(&self.store, remote, &meta).await)
    }

    /// Check storage usage, notifying once per threshold
    pub async fn check_storage(&mut self) -> Result<StorageHealth> {
        self.monitor
            .check_storage_health(&self.store, self.notifier.as_ref())
            .await
    }

    pub fn reset_storage_warning(&mut self) {
        self.monitor.reset_storage_warning();
    }

    /// Upgrade local ids and upload the dataset
    ///
    /// The queued outbox is written out first so the migration rewrites the
    /// same entries this service holds, then reloaded with the new ids.
    pub async fn run_migration(
        &mut self,
        auth: Option<&AuthSession>,
        on_progress: impl FnMut(&MigrationProgress),
    ) -> Result<MigrationProgress> {
        require_session(auth)?;
        let remote = self.remote.as_ref().ok_or(Error::NotAuthenticated)?;
        write_json(&self.store, keys::OUTBOX, self.outbox.entries()).await?;

        let outcome = MigrationEngine::new(self.device_id.clone())
            .migrate(&self.store, remote, auth, on_progress)
            .await;
        self.outbox = Outbox::load(&self.store, Arc::clone(&self.notifier)).await;
        outcome
    }

    async fn fetch_remote<T: WireEntity>(&self) -> Result<Vec<T>> {
        let rows = self.remote()?.fetch_all(T::ENTITY).await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| match decode_entity::<T>(row) {
                Ok(entity) => Some(entity),
                Err(error) => {
                    tracing::warn!(table = %T::ENTITY, "Skipping remote row: {}", error);
                    None
                }
            })
            .collect())
    }

    async fn reconcile_collection<T, F>(&self, key: &str, resolver: F) -> Result<Vec<T>>
    where
        T: WireEntity,
        F: Fn(T, T) -> T,
    {
        let remote = self.fetch_remote::<T>().await?;
        let local: Vec<T> = read_json(&self.store, key).await?.unwrap_or_default();
        let merged = merge_entity_arrays(local, remote, resolver);
        write_json(&self.store, key, &merged).await?;
        tracing::info!(table = %T::ENTITY, count = merged.len(), "Reconciled collection");
        Ok(merged)
    }

    pub async fn reconcile_contexts(&self) -> Result<Vec<Context>> {
        self.reconcile_collection(keys::CONTEXTS, resolve_context_conflict)
            .await
    }

    pub async fn reconcile_tasks(&self) -> Result<Vec<Task>> {
        self.reconcile_collection(keys::TASKS, resolve_task_conflict)
            .await
    }

    pub async fn reconcile_reminders(&self) -> Result<Vec<Reminder>> {
        self.reconcile_collection(keys::REMINDERS, resolve_reminder_conflict)
            .await
    }

    pub async fn reconcile_presets(&self) -> Result<Vec<Preset>> {
        self.reconcile_collection(keys::PRESETS, resolve_preset_conflict)
            .await
    }

    /// Merge the local active session with its remote copy
    pub async fn reconcile_session(&self) -> Result<Option<Session>> {
        let Some(local) = read_json::<_, Session>(&self.store, keys::ACTIVE_SESSION).await? else {
            return Ok(None);
        };
        let Some(row) = self.remote()?.fetch(EntityType::Session, &local.id).await? else {
            return Ok(Some(local));
        };

        let merged = resolve_session_conflict(local, decode_entity(row)?);
        write_json(&self.store, keys::ACTIVE_SESSION, &merged).await?;
        Ok(Some(merged))
    }

    /// Merge local preferences with the user's remote row
    pub async fn reconcile_preferences(
        &self,
        auth: Option<&AuthSession>,
    ) -> Result<Option<Preferences>> {
        let user_id = require_session(auth)?.user_id()?;
        let local = read_json::<_, Preferences>(&self.store, keys::PREFERENCES).await?;
        let remote_store = self.remote()?;
        let remote = match remote_store.fetch(EntityType::Preferences, user_id).await? {
            Some(row) => Some(decode_entity::<Preferences>(row)?),
            None => None,
        };

        let merged = match (local, remote) {
            (Some(local), Some(remote)) => resolve_preferences_conflict(local, remote),
            (Some(only), None) | (None, Some(only)) => only,
            (None, None) => return Ok(None),
        };
        write_json(&self.store, keys::PREFERENCES, &merged).await?;
        Ok(Some(merged))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthUser;
    use crate::models::ContextAllocation;
    use crate::notify::LogNotifier;
    use crate::storage::{LocalSnapshot, MemoryStore};
    use crate::sync::{encode_entity, is_uuid, MemoryRemoteStore, MigrationState};
    use crate::util::unix_timestamp_now;
    use chrono::{Duration, Utc};
    use pretty_assertions::assert_eq;

    fn auth() -> AuthSession {
        AuthSession {
            access_token: "token".to_string(),
            refresh_token: "refresh".to_string(),
            expires_at: unix_timestamp_now() + 3600,
            user: AuthUser {
                id: "user-1".to_string(),
                email: Some("user@example.com".to_string()),
            },
        }
    }

    async fn service(
        remote: Option<MemoryRemoteStore>,
    ) -> SyncService<MemoryStore, MemoryRemoteStore> {
        SyncService::open(
            MemoryStore::new(),
            remote,
            SyncConfig::default(),
            Arc::new(LogNotifier),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn flush_requires_session_and_remote() {
        let mut local_only = service(None).await;
        local_only
            .record_create(&Context::new("Work"))
            .await
            .unwrap();
        let session = auth();
        assert!(matches!(
            local_only.flush_outbox(Some(&session)).await,
            Err(Error::NotAuthenticated)
        ));

        let mut online = service(Some(MemoryRemoteStore::new())).await;
        online.record_create(&Context::new("Work")).await.unwrap();
        assert!(matches!(
            online.flush_outbox(None).await,
            Err(Error::NotAuthenticated)
        ));

        let report = online.flush_outbox(Some(&session)).await.unwrap();
        assert_eq!(report, FlushReport { pushed: 1, failed: 0 });
        assert_eq!(online.outbox_count(), 0);
    }

    #[tokio::test]
    async fn reconcile_contexts_merges_and_persists() {
        let remote = MemoryRemoteStore::new();
        let meta = RowMeta::new("user-1", "device-b");

        let mut shared = Context::new("Work");
        shared.updated_at = Utc::now() - Duration::hours(1);
        let local_only = Context::new("Local");
        let mut newer = shared.clone();
        newer.priority = 5;
        let remote_only = Context::new("Remote");

        remote
            .insert(EntityType::Context, encode_entity(&newer, &meta).unwrap())
            .unwrap();
        remote
            .insert(
                EntityType::Context,
                encode_entity(&remote_only, &meta).unwrap(),
            )
            .unwrap();

        let service = service(Some(remote)).await;
        LocalSnapshot {
            contexts: vec![shared.clone(), local_only.clone()],
            ..LocalSnapshot::default()
        }
        .save(service.store())
        .await
        .unwrap();

        let merged = service.reconcile_contexts().await.unwrap();
        let ids: Vec<&str> = merged.iter().map(|context| context.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                shared.id.as_str(),
                local_only.id.as_str(),
                remote_only.id.as_str(),
            ]
        );
        assert_eq!(merged[0].priority, 5);

        let saved = LocalSnapshot::load(service.store()).await.unwrap();
        assert_eq!(saved.contexts, merged);
    }

    #[tokio::test]
    async fn reconcile_session_keeps_larger_usage() {
        let remote = MemoryRemoteStore::new();
        let mut local = Session::start(vec![ContextAllocation::new("a", 30)]);
        local.allocations[0].used_minutes = 20;
        let mut theirs = local.clone();
        theirs.allocations[0].used_minutes = 15;
        theirs.allocations.push(ContextAllocation {
            context_id: "b".to_string(),
            allocated_minutes: 30,
            used_minutes: 10,
        });
        remote
            .insert(
                EntityType::Session,
                encode_entity(&theirs, &RowMeta::new("user-1", "device-b")).unwrap(),
            )
            .unwrap();

        let service = service(Some(remote)).await;
        LocalSnapshot {
            active_session: Some(local),
            ..LocalSnapshot::default()
        }
        .save(service.store())
        .await
        .unwrap();

        let merged = service.reconcile_session().await.unwrap().unwrap();
        let used: Vec<(String, u32)> = merged
            .allocations
            .iter()
            .map(|alloc| (alloc.context_id.clone(), alloc.used_minutes))
            .collect();
        assert_eq!(used, vec![("a".to_string(), 20), ("b".to_string(), 10)]);
    }

    #[tokio::test]
    async fn run_migration_uploads_local_dataset() {
        let remote = MemoryRemoteStore::new();
        let mut service = service(Some(remote)).await;
        LocalSnapshot {
            contexts: vec![Context::new("Work")],
            preferences: Some(Preferences::default()),
            ..LocalSnapshot::default()
        }
        .save(service.store())
        .await
        .unwrap();

        let session = auth();
        let progress = service.run_migration(Some(&session), |_| {}).await.unwrap();
        assert_eq!(progress.state, MigrationState::Complete);
        assert_eq!(progress.processed_items, 1);

        let preferences = service
            .reconcile_preferences(Some(&session))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(preferences.id, "user-1");
    }

    #[tokio::test]
    async fn flush_after_migration_pushes_only_server_ids() {
        let remote = MemoryRemoteStore::new();
        let mut service: SyncService<MemoryStore, &MemoryRemoteStore> = SyncService::open(
            MemoryStore::new(),
            Some(&remote),
            SyncConfig::default(),
            Arc::new(LogNotifier),
        )
        .await
        .unwrap();

        let mut work = Context::new("Work");
        work.id = "ctx-xyz".to_string();
        let mut task = Task::new("Draft", Some(work.id.clone()), "a0");
        task.id = "task-abc123".to_string();
        service.record_create(&work).await.unwrap();
        service.record_create(&task).await.unwrap();
        LocalSnapshot {
            contexts: vec![work],
            tasks: vec![task],
            ..LocalSnapshot::default()
        }
        .save(service.store())
        .await
        .unwrap();

        let session = auth();
        let progress = service.run_migration(Some(&session), |_| {}).await.unwrap();
        assert_eq!(progress.state, MigrationState::Complete);
        assert_eq!(service.outbox_count(), 0);

        let report = service.flush_outbox(Some(&session)).await.unwrap();
        assert_eq!(report, FlushReport::default());

        let contexts = remote.fetch_all(EntityType::Context).await.unwrap();
        let tasks = remote.fetch_all(EntityType::Task).await.unwrap();
        assert_eq!(contexts.len(), 1);
        assert_eq!(tasks.len(), 1);
        let context_id = contexts[0]["id"].as_str().unwrap();
        assert!(is_uuid(context_id));
        assert!(is_uuid(tasks[0]["id"].as_str().unwrap()));
        assert_eq!(tasks[0]["context_id"], context_id);

        let local = service.reconcile_tasks().await.unwrap();
        assert_eq!(local.len(), 1);
        assert_eq!(local[0].context_id.as_deref(), Some(context_id));
    }

    #[tokio::test]
    async fn device_id_is_stable_across_reopen() {
        let store = MemoryStore::new();
        let first: SyncService<&MemoryStore, MemoryRemoteStore> =
            SyncService::open(&store, None, SyncConfig::default(), Arc::new(LogNotifier))
                .await
                .unwrap();
        let device_id = first.device_id().to_string();
        drop(first);

        let second: SyncService<&MemoryStore, MemoryRemoteStore> =
            SyncService::open(&store, None, SyncConfig::default(), Arc::new(LogNotifier))
                .await
                .unwrap();
        assert_eq!(second.device_id(), device_id);
    }
}
