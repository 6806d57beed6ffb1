//! One-time upgrade of a local-only dataset to server-compatible ids.
//!
//! Every record whose id is not a UUID gets a fresh one, every reference to
//! it is rewritten, and the dataset is uploaded one record at a time in
//! dependency order (contexts, tasks, reminders, presets, session, then
//! preferences). The remapped dataset is saved locally, together with a
//! resume marker, before the upload starts; a failed run is repeated by
//! uploading the already-remapped dataset again.
//!
//! Queued outbox entries are rewritten in the same step so that nothing
//! flushed afterwards refers to a local id.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use super::outbox::{OutboxEntry, OutboxOperation};
use super::remote::RemoteStore;
use super::wire::{encode_entity, RowMeta, WireEntity};
use crate::auth::{require_session, AuthSession};
use crate::error::{Error, Result};
use crate::models::{EntityType, Syncable};
use crate::storage::{keys, read_json, write_json, KeyValueStore, LocalSnapshot};

static UUID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$")
        .expect("Invalid regex")
});

/// Whether `id` is already in server (UUID) format
pub fn is_uuid(id: &str) -> bool {
    UUID_PATTERN.is_match(id)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MigrationState {
    #[default]
    Idle,
    Pending,
    InProgress,
    Complete,
    Error,
}

impl MigrationState {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Pending => "pending",
            Self::InProgress => "in-progress",
            Self::Complete => "complete",
            Self::Error => "error",
        }
    }
}

/// Progress snapshot handed to the caller at every step boundary
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationProgress {
    pub state: MigrationState,
    pub total_items: usize,
    pub processed_items: usize,
    pub current_step: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Old id to new id, per collection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IdMapping {
    pub contexts: BTreeMap<String, String>,
    pub tasks: BTreeMap<String, String>,
    pub reminders: BTreeMap<String, String>,
    pub presets: BTreeMap<String, String>,
    pub sessions: BTreeMap<String, String>,
}

impl IdMapping {
    /// Mapping for one collection; preferences are keyed by user instead
    fn collection(&self, entity_type: EntityType) -> Option<&BTreeMap<String, String>> {
        match entity_type {
            EntityType::Context => Some(&self.contexts),
            EntityType::Task => Some(&self.tasks),
            EntityType::Reminder => Some(&self.reminders),
            EntityType::Preset => Some(&self.presets),
            EntityType::Session => Some(&self.sessions),
            EntityType::Preferences => None,
        }
    }

    /// Number of ids that actually change
    pub fn remapped_count(&self) -> usize {
        [
            &self.contexts,
            &self.tasks,
            &self.reminders,
            &self.presets,
            &self.sessions,
        ]
        .into_iter()
        .flat_map(BTreeMap::iter)
        .filter(|(old, new)| old != new)
        .count()
    }
}

fn lookup(map: &BTreeMap<String, String>, id: &str) -> String {
    map.get(id).cloned().unwrap_or_else(|| id.to_string())
}

fn assign_ids<'a>(ids: impl IntoIterator<Item = &'a str>) -> BTreeMap<String, String> {
    ids.into_iter()
        .map(|id| {
            let new_id = if is_uuid(id) {
                id.to_string()
            } else {
                Uuid::now_v7().to_string()
            };
            (id.to_string(), new_id)
        })
        .collect()
}

/// Whether any record in the dataset still carries a local id
pub fn needs_migration(snapshot: &LocalSnapshot) -> bool {
    snapshot.contexts.iter().any(|item| !is_uuid(&item.id))
        || snapshot.tasks.iter().any(|item| !is_uuid(&item.id))
        || snapshot.reminders.iter().any(|item| !is_uuid(&item.id))
        || snapshot.presets.iter().any(|item| !is_uuid(&item.id))
        || snapshot
            .active_session
            .as_ref()
            .is_some_and(|session| !is_uuid(&session.id))
}

/// Assign new ids to every non-UUID record. UUID ids map to themselves.
pub fn generate_id_mapping(snapshot: &LocalSnapshot) -> IdMapping {
    IdMapping {
        contexts: assign_ids(snapshot.contexts.iter().map(|item| item.id.as_str())),
        tasks: assign_ids(snapshot.tasks.iter().map(|item| item.id.as_str())),
        reminders: assign_ids(snapshot.reminders.iter().map(|item| item.id.as_str())),
        presets: assign_ids(snapshot.presets.iter().map(|item| item.id.as_str())),
        sessions: assign_ids(snapshot.active_session.iter().map(|item| item.id.as_str())),
    }
}

fn remap_record<T: Syncable>(record: &mut T, map: &BTreeMap<String, String>, now: DateTime<Utc>) {
    let id = lookup(map, record.id());
    record.set_id(id);
    record.set_updated_at(now);
}

/// Rewrite ids and every cross-record reference, stamping `updated_at`.
pub fn remap_entity_ids(snapshot: &mut LocalSnapshot, mapping: &IdMapping, now: DateTime<Utc>) {
    for context in &mut snapshot.contexts {
        remap_record(context, &mapping.contexts, now);
    }

    for task in &mut snapshot.tasks {
        remap_record(task, &mapping.tasks, now);
        task.context_id = task
            .context_id
            .as_deref()
            .map(|context_id| lookup(&mapping.contexts, context_id));
    }

    for reminder in &mut snapshot.reminders {
        remap_record(reminder, &mapping.reminders, now);
    }

    for preset in &mut snapshot.presets {
        remap_record(preset, &mapping.presets, now);
        for context_id in &mut preset.context_ids {
            *context_id = lookup(&mapping.contexts, context_id);
        }
        for allocation in &mut preset.allocations {
            allocation.context_id = lookup(&mapping.contexts, &allocation.context_id);
        }
    }

    if let Some(session) = snapshot.active_session.as_mut() {
        remap_record(session, &mapping.sessions, now);
        for allocation in &mut session.allocations {
            allocation.context_id = lookup(&mapping.contexts, &allocation.context_id);
        }
        session.active_context_id = session
            .active_context_id
            .as_deref()
            .map(|context_id| lookup(&mapping.contexts, context_id));
    }
}

fn remap_field(payload: &mut Value, field: &str, map: &BTreeMap<String, String>) {
    if let Some(Value::String(id)) = payload.get_mut(field) {
        *id = lookup(map, id);
    }
}

fn remap_allocations(payload: &mut Value, map: &BTreeMap<String, String>) {
    if let Some(Value::Array(allocations)) = payload.get_mut("allocations") {
        for allocation in allocations {
            remap_field(allocation, "contextId", map);
        }
    }
}

/// Bring queued mutations in line with a remapped dataset.
///
/// Creates and updates of records the migration uploads are dropped, since
/// the upload already carries their latest state. Every other entry keeps
/// its place with its own id and its context references rewritten.
/// `preferences` is the `(local id, user id)` pair of the migrated
/// preferences row, if any.
pub fn remap_outbox_entries(
    entries: Vec<OutboxEntry>,
    mapping: &IdMapping,
    preferences: Option<(&str, &str)>,
) -> Vec<OutboxEntry> {
    entries
        .into_iter()
        .filter_map(|mut entry| {
            let new_id = match mapping.collection(entry.entity_type) {
                Some(map) => map.get(&entry.entity_id).cloned(),
                None => preferences
                    .filter(|(old, _)| *old == entry.entity_id)
                    .map(|(_, user_id)| user_id.to_string()),
            };
            if new_id.is_some() && entry.operation != OutboxOperation::Delete {
                tracing::debug!(
                    entity = %entry.entity_type,
                    id = %entry.entity_id,
                    "Dropping outbox entry covered by migration upload"
                );
                return None;
            }

            if let Some(id) = new_id {
                if let Some(payload) = entry.payload.as_object_mut() {
                    payload.insert("id".to_string(), Value::String(id.clone()));
                }
                entry.entity_id = id;
            }
            match entry.entity_type {
                EntityType::Task => remap_field(&mut entry.payload, "contextId", &mapping.contexts),
                EntityType::Preset => {
                    if let Some(Value::Array(ids)) = entry.payload.get_mut("contextIds") {
                        for id in ids {
                            if let Value::String(id) = id {
                                *id = lookup(&mapping.contexts, id);
                            }
                        }
                    }
                    remap_allocations(&mut entry.payload, &mapping.contexts);
                }
                EntityType::Session => {
                    remap_allocations(&mut entry.payload, &mapping.contexts);
                    remap_field(&mut entry.payload, "activeContextId", &mapping.contexts);
                }
                EntityType::Context | EntityType::Reminder | EntityType::Preferences => {}
            }
            Some(entry)
        })
        .collect()
}

/// Drives a single migration run and tracks its state
#[derive(Debug)]
pub struct MigrationEngine {
    device_id: String,
    progress: MigrationProgress,
}

impl MigrationEngine {
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            progress: MigrationProgress::default(),
        }
    }

    pub const fn state(&self) -> MigrationState {
        self.progress.state
    }

    pub const fn progress(&self) -> &MigrationProgress {
        &self.progress
    }

    /// Run the migration against `remote`.
    ///
    /// Fails with [`Error::NotAuthenticated`] before touching anything when
    /// no usable session is supplied. Uploaded records stay uploaded if a
    /// later step fails.
    pub async fn migrate<S, R, F>(
        &mut self,
        store: &S,
        remote: &R,
        auth: Option<&AuthSession>,
        mut on_progress: F,
    ) -> Result<MigrationProgress>
    where
        S: KeyValueStore,
        R: RemoteStore,
        F: FnMut(&MigrationProgress),
    {
        let user_id = require_session(auth)?.user_id()?.to_string();
        let mut snapshot = LocalSnapshot::load(store).await?;
        let resuming = store.get(keys::MIGRATION_PENDING).await?.is_some();

        if !resuming && !needs_migration(&snapshot) {
            tracing::info!("Local data already uses server ids; nothing to migrate");
            self.progress = MigrationProgress {
                state: MigrationState::Complete,
                current_step: "Nothing to migrate".to_string(),
                ..MigrationProgress::default()
            };
            on_progress(&self.progress);
            return Ok(self.progress.clone());
        }

        self.progress = MigrationProgress {
            state: MigrationState::Pending,
            total_items: snapshot.item_count(),
            processed_items: 0,
            current_step: "Preparing id mapping".to_string(),
            error: None,
        };
        on_progress(&self.progress);

        let now = Utc::now();
        let mapping = generate_id_mapping(&snapshot);
        remap_entity_ids(&mut snapshot, &mapping, now);
        let local_preferences_id = snapshot.preferences.as_ref().map(|prefs| prefs.id.clone());
        if let Some(preferences) = snapshot.preferences.as_mut() {
            preferences.id.clone_from(&user_id);
            preferences.updated_at = now;
        }

        let preferences = local_preferences_id
            .as_deref()
            .map(|local_id| (local_id, user_id.as_str()));
        if let Err(error) = save_remapped(store, &snapshot, &mapping, preferences).await {
            return Err(self.fail("saving remapped data", &error, &mut on_progress));
        }
        tracing::info!(
            remapped = mapping.remapped_count(),
            total = self.progress.total_items,
            "Starting migration upload"
        );

        self.progress.state = MigrationState::InProgress;
        let uploader = Uploader {
            remote,
            meta: RowMeta::new(user_id, self.device_id.clone()).at(now),
        };
        let progress = &mut on_progress;

        self.upload_all(&uploader, "contexts", &snapshot.contexts, progress)
            .await?;
        self.upload_all(&uploader, "tasks", &snapshot.tasks, progress)
            .await?;
        self.upload_all(&uploader, "reminders", &snapshot.reminders, progress)
            .await?;
        self.upload_all(&uploader, "presets", &snapshot.presets, progress)
            .await?;
        let session = snapshot.active_session.as_slice();
        self.upload_all(&uploader, "session", session, progress)
            .await?;

        if let Some(preferences) = &snapshot.preferences {
            self.progress.current_step = "Uploading preferences".to_string();
            on_progress(&self.progress);
            if let Err(error) = uploader.upload(preferences).await {
                return Err(self.fail("uploading preferences", &error, &mut on_progress));
            }
        }

        if let Err(error) = store.remove(keys::MIGRATION_PENDING).await {
            tracing::warn!("Failed to clear migration marker: {}", error);
        }
        self.progress.state = MigrationState::Complete;
        self.progress.current_step = "Migration complete".to_string();
        on_progress(&self.progress);
        tracing::info!(
            uploaded = self.progress.processed_items,
            "Migration complete"
        );
        Ok(self.progress.clone())
    }

    async fn upload_all<R, T, F>(
        &mut self,
        uploader: &Uploader<'_, R>,
        label: &str,
        items: &[T],
        on_progress: &mut F,
    ) -> Result<()>
    where
        R: RemoteStore,
        T: WireEntity,
        F: FnMut(&MigrationProgress),
    {
        let step = format!("Uploading {label}");
        for item in items {
            if let Err(error) = uploader.upload(item).await {
                let failed_step = format!("uploading {label}");
                return Err(self.fail(&failed_step, &error, on_progress));
            }
            self.progress.processed_items += 1;
            self.progress.current_step.clone_from(&step);
            on_progress(&self.progress);
        }
        Ok(())
    }

    fn fail<F: FnMut(&MigrationProgress)>(
        &mut self,
        step: &str,
        error: &Error,
        on_progress: &mut F,
    ) -> Error {
        tracing::error!(step, "Migration halted: {}", error);
        self.progress.state = MigrationState::Error;
        self.progress.error = Some(error.to_string());
        on_progress(&self.progress);
        Error::Migration {
            step: step.to_string(),
            message: error.to_string(),
        }
    }
}

/// Persist the resume marker, the remapped dataset and the rewritten outbox
async fn save_remapped<S: KeyValueStore>(
    store: &S,
    snapshot: &LocalSnapshot,
    mapping: &IdMapping,
    preferences: Option<(&str, &str)>,
) -> Result<()> {
    store
        .set(keys::MIGRATION_PENDING, &Utc::now().to_rfc3339())
        .await?;
    snapshot.save(store).await?;

    let queued: Vec<OutboxEntry> = read_json(store, keys::OUTBOX).await?.unwrap_or_default();
    let before = queued.len();
    let remapped = remap_outbox_entries(queued, mapping, preferences);
    write_json(store, keys::OUTBOX, &remapped).await?;
    tracing::info!(
        before,
        after = remapped.len(),
        "Rewrote queued outbox entries"
    );
    Ok(())
}

/// Remote plus the metadata stamped on every uploaded row
struct Uploader<'a, R> {
    remote: &'a R,
    meta: RowMeta,
}

impl<R: RemoteStore> Uploader<'_, R> {
    async fn upload<T: WireEntity>(&self, item: &T) -> Result<()> {
        let row = encode_entity(item, &self.meta)?;
        self.remote.upsert(T::ENTITY, row).await?;
        tracing::debug!(entity = %T::ENTITY, id = item.id(), "Uploaded record");
        Ok(())
    }
}
