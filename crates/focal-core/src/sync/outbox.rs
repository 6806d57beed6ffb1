//! Durable queue of mutations made while disconnected.
//!
//! At most one entry exists per `(entity_type, entity_id)`; later mutations
//! coalesce into the existing entry so the queue grows with the number of
//! entities touched, not the number of edits.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::remote::RemoteStore;
use super::wire::{encode_payload, RowMeta};
use crate::error::Result;
use crate::models::{EntityType, Syncable};
use crate::notify::{Notice, Notifier};
use crate::storage::{keys, read_json, write_json, KeyValueStore};
use crate::util::truncate_error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutboxOperation {
    Create,
    Update,
    Delete,
}

impl OutboxOperation {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

/// A pending mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboxEntry {
    pub id: String,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub operation: OutboxOperation,
    /// Full camelCase snapshot of the entity
    pub payload: Value,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub last_attempt_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error: Option<String>,
}

impl OutboxEntry {
    fn new(
        entity_type: EntityType,
        entity_id: String,
        operation: OutboxOperation,
        payload: Value,
    ) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            entity_type,
            entity_id,
            operation,
            payload,
            created_at: Utc::now(),
            attempts: 0,
            last_attempt_at: None,
            error: None,
        }
    }
}

/// Outcome of one pass over the queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub pushed: usize,
    pub failed: usize,
}

/// Outbox backed by a [`KeyValueStore`] blob
pub struct Outbox<N: Notifier> {
    entries: Vec<OutboxEntry>,
    notifier: N,
    persistence_failure_reported: bool,
}

impl<N: Notifier> Outbox<N> {
    /// Empty queue that has never been persisted
    pub const fn new(notifier: N) -> Self {
        Self {
            entries: Vec::new(),
            notifier,
            persistence_failure_reported: false,
        }
    }

    /// Restore the persisted queue; an unreadable blob starts empty.
    pub async fn load<S: KeyValueStore>(store: &S, notifier: N) -> Self {
        let mut outbox = Self::new(notifier);
        match read_json::<_, Vec<OutboxEntry>>(store, keys::OUTBOX).await {
            Ok(entries) => outbox.entries = entries.unwrap_or_default(),
            Err(error) => {
                tracing::warn!("Discarding unreadable outbox: {}", error);
            }
        }
        outbox
    }

    pub fn entries(&self) -> &[OutboxEntry] {
        &self.entries
    }

    pub fn get_outbox_count(&self) -> usize {
        self.entries.len()
    }

    /// Queue a mutation, coalescing with any pending one for the same entity.
    pub async fn add_to_outbox<S: KeyValueStore>(
        &mut self,
        store: &S,
        entity_type: EntityType,
        entity_id: &str,
        operation: OutboxOperation,
        payload: Value,
    ) {
        let existing = self
            .entries
            .iter()
            .position(|entry| entry.entity_type == entity_type && entry.entity_id == entity_id);

        match existing {
            None => self.entries.push(OutboxEntry::new(
                entity_type,
                entity_id.to_string(),
                operation,
                payload,
            )),
            Some(index) => match (self.entries[index].operation, operation) {
                (OutboxOperation::Create, OutboxOperation::Update) => {
                    self.entries[index].payload = payload;
                }
                (OutboxOperation::Create, OutboxOperation::Delete) => {
                    self.entries.remove(index);
                }
                _ => {
                    self.entries[index] =
                        OutboxEntry::new(entity_type, entity_id.to_string(), operation, payload);
                }
            },
        }

        tracing::debug!(
            entity = %entity_type,
            entity_id,
            operation = operation.as_str(),
            depth = self.entries.len(),
            "Queued outbox mutation"
        );
        self.persist(store).await;
    }

    pub async fn record_create<S: KeyValueStore, T: Syncable + Serialize>(
        &mut self,
        store: &S,
        entity: &T,
    ) -> Result<()> {
        self.record(store, entity, OutboxOperation::Create).await
    }

    pub async fn record_update<S: KeyValueStore, T: Syncable + Serialize>(
        &mut self,
        store: &S,
        entity: &T,
    ) -> Result<()> {
        self.record(store, entity, OutboxOperation::Update).await
    }

    /// Queue a soft delete, stamping `deletedAt` if the entity lacks one
    pub async fn record_delete<S: KeyValueStore, T: Syncable + Serialize + Clone>(
        &mut self,
        store: &S,
        entity: &T,
    ) -> Result<()> {
        let mut tombstone = entity.clone();
        if tombstone.deleted_at().is_none() {
            let now = Utc::now();
            tombstone.set_deleted_at(Some(now));
            tombstone.set_updated_at(now);
        }
        self.record(store, &tombstone, OutboxOperation::Delete)
            .await
    }

    async fn record<S: KeyValueStore, T: Syncable + Serialize>(
        &mut self,
        store: &S,
        entity: &T,
        operation: OutboxOperation,
    ) -> Result<()> {
        let payload = serde_json::to_value(entity)?;
        self.add_to_outbox(store, T::ENTITY, entity.id(), operation, payload)
            .await;
        Ok(())
    }

    /// Drop an entry after the remote store confirmed it
    pub async fn remove_from_outbox<S: KeyValueStore>(&mut self, store: &S, entry_id: &str) {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.id != entry_id);
        if self.entries.len() != before {
            self.persist(store).await;
        }
    }

    /// Record a failed attempt; the entry stays queued
    pub async fn mark_outbox_entry_failed<S: KeyValueStore>(
        &mut self,
        store: &S,
        entry_id: &str,
        error: &str,
    ) {
        let Some(entry) = self.entries.iter_mut().find(|entry| entry.id == entry_id) else {
            return;
        };
        entry.attempts = entry.attempts.saturating_add(1);
        entry.last_attempt_at = Some(Utc::now());
        entry.error = Some(truncate_error(error));
        self.persist(store).await;
    }

    pub async fn clear<S: KeyValueStore>(&mut self, store: &S) {
        self.entries.clear();
        self.persist(store).await;
    }

    /// Push every queued entry once, in queue order.
    ///
    /// Deletes upload the soft-deleted row. Nothing is retried here.
    pub async fn flush<S: KeyValueStore, R: RemoteStore>(
        &mut self,
        store: &S,
        remote: &R,
        meta: &RowMeta,
    ) -> FlushReport {
        let mut report = FlushReport::default();
        let pending: Vec<(String, EntityType, String, Value)> = self
            .entries
            .iter()
            .map(|entry| {
                (
                    entry.id.clone(),
                    entry.entity_type,
                    entry.entity_id.clone(),
                    entry.payload.clone(),
                )
            })
            .collect();

        for (entry_id, entity_type, entity_id, payload) in pending {
            let pushed = match encode_payload(entity_type, &payload, meta) {
                Ok(row) => remote.upsert(entity_type, row).await,
                Err(error) => Err(error),
            };

            match pushed {
                Ok(()) => {
                    self.remove_from_outbox(store, &entry_id).await;
                    report.pushed += 1;
                }
                Err(error) => {
                    tracing::warn!(
                        entity = %entity_type,
                        entity_id = %entity_id,
                        "Outbox push failed: {}",
                        error
                    );
                    self.mark_outbox_entry_failed(store, &entry_id, &error.to_string())
                        .await;
                    report.failed += 1;
                }
            }
        }

        if report.pushed > 0 || report.failed > 0 {
            tracing::info!(
                pushed = report.pushed,
                failed = report.failed,
                "Flushed outbox"
            );
        }
        report
    }

    async fn persist<S: KeyValueStore>(&mut self, store: &S) {
        match write_json(store, keys::OUTBOX, &self.entries).await {
            Ok(()) => self.persistence_failure_reported = false,
            Err(error) => {
                tracing::error!("Failed to persist outbox: {}", error);
                if !self.persistence_failure_reported {
                    self.persistence_failure_reported = true;
                    self.notifier.notify(&Notice::PersistenceFailed {
                        message: error.to_string(),
                    });
                }
            }
        }
    }
}
