//! Realtime change dispatch.
//!
//! One multiplexed subscription per signed-in user covers every syncable
//! table. Incoming rows are decoded, echoes of this device's own writes are
//! dropped, and the rest are routed to per-entity callbacks. A supervisor
//! task owns the subscription and reconnects with exponential backoff until
//! the attempt budget runs out.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::wire::{decode_entity, WireEntity};
use crate::config::ReconnectPolicy;
use crate::error::Result;
use crate::models::{Context, EntityType, Preferences, Preset, Reminder, Session, Task};
use crate::state::SyncState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// Row change as delivered by the transport (snake_case rows)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawChange {
    pub table: String,
    pub event_type: ChangeKind,
    #[serde(default)]
    pub new: Option<Value>,
    #[serde(default)]
    pub old: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelStatus {
    Subscribed,
    Closed,
    Error(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelMessage {
    Status(ChannelStatus),
    Change(RawChange),
}

/// Subscribe primitive of the realtime backend
pub trait RealtimeTransport: Send + Sync + 'static {
    /// Open one channel for `user_id` covering `tables`.
    ///
    /// The channel ends when the receiver yields `None`.
    fn subscribe(
        &self,
        user_id: &str,
        tables: &[EntityType],
    ) -> impl Future<Output = Result<mpsc::Receiver<ChannelMessage>>> + Send;
}

/// Decoded change for one entity type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteChange<T> {
    pub kind: ChangeKind,
    /// Id of the changed row, taken from whichever image carried one
    pub id: Option<String>,
    pub current: Option<T>,
    pub previous: Option<T>,
}

/// Callbacks for surviving remote changes. All default to no-ops.
#[allow(unused_variables)]
pub trait RealtimeHandlers: Send + Sync + 'static {
    fn on_context(&self, change: RemoteChange<Context>) {}

    fn on_task(&self, change: RemoteChange<Task>) {}

    fn on_session(&self, change: RemoteChange<Session>) {}

    fn on_reminder(&self, change: RemoteChange<Reminder>) {}

    fn on_preset(&self, change: RemoteChange<Preset>) {}

    fn on_preferences(&self, change: RemoteChange<Preferences>) {}

    fn on_status(&self, status: SyncState) {}
}

#[derive(Debug, Default)]
struct DispatchState {
    user_id: Option<String>,
    status: SyncState,
    attempts: u32,
    generation: u64,
    supervisor: Option<JoinHandle<()>>,
}

fn lock(state: &Mutex<DispatchState>) -> MutexGuard<'_, DispatchState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Owns the realtime subscription for the signed-in user
pub struct RealtimeDispatcher<T: RealtimeTransport> {
    transport: Arc<T>,
    device_id: Arc<str>,
    policy: ReconnectPolicy,
    state: Arc<Mutex<DispatchState>>,
}

impl<T: RealtimeTransport> Clone for RealtimeDispatcher<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            device_id: Arc::clone(&self.device_id),
            policy: self.policy,
            state: Arc::clone(&self.state),
        }
    }
}

impl<T: RealtimeTransport> RealtimeDispatcher<T> {
    pub fn new(transport: T, device_id: impl Into<String>, policy: ReconnectPolicy) -> Self {
        Self {
            transport: Arc::new(transport),
            device_id: Arc::from(device_id.into()),
            policy,
            state: Arc::default(),
        }
    }

    pub fn status(&self) -> SyncState {
        lock(&self.state).status
    }

    pub fn current_user(&self) -> Option<String> {
        lock(&self.state).user_id.clone()
    }

    pub fn reconnect_attempts(&self) -> u32 {
        lock(&self.state).attempts
    }

    /// Subscribe for `user_id`. Must be called inside a Tokio runtime.
    ///
    /// A no-op while a live connection for the same user exists; a different
    /// user replaces the current connection.
    pub fn connect<H: RealtimeHandlers>(&self, user_id: &str, handlers: Arc<H>) {
        let mut state = lock(&self.state);
        let running = state
            .supervisor
            .as_ref()
            .is_some_and(|supervisor| !supervisor.is_finished());
        if running && state.user_id.as_deref() == Some(user_id) {
            tracing::debug!(user_id, "Realtime already connected");
            return;
        }

        if let Some(previous) = state.supervisor.take() {
            tracing::info!(
                previous_user = state.user_id.as_deref().unwrap_or_default(),
                "Replacing realtime connection"
            );
            previous.abort();
        }

        state.generation += 1;
        state.user_id = Some(user_id.to_string());
        state.attempts = 0;
        state.status = SyncState::Syncing;

        let supervisor = Supervisor {
            transport: Arc::clone(&self.transport),
            device_id: Arc::clone(&self.device_id),
            policy: self.policy,
            state: Arc::clone(&self.state),
            generation: state.generation,
            user_id: user_id.to_string(),
        };
        state.supervisor = Some(tokio::spawn(supervisor.run(handlers)));
    }

    /// Drop the subscription and any pending reconnect
    pub fn disconnect(&self) {
        let mut state = lock(&self.state);
        if let Some(supervisor) = state.supervisor.take() {
            supervisor.abort();
        }
        state.generation += 1;
        state.user_id = None;
        state.attempts = 0;
        state.status = SyncState::Offline;
        tracing::info!("Realtime disconnected");
    }
}

struct Supervisor<T> {
    transport: Arc<T>,
    device_id: Arc<str>,
    policy: ReconnectPolicy,
    state: Arc<Mutex<DispatchState>>,
    generation: u64,
    user_id: String,
}

impl<T: RealtimeTransport> Supervisor<T> {
    /// Apply `update` unless a newer connection took over. Returns whether
    /// this supervisor is still current.
    fn update(&self, update: impl FnOnce(&mut DispatchState)) -> bool {
        let mut state = lock(&self.state);
        if state.generation != self.generation {
            return false;
        }
        update(&mut state);
        true
    }

    async fn run<H: RealtimeHandlers>(self, handlers: Arc<H>) {
        handlers.on_status(SyncState::Syncing);

        loop {
            let reason = match self
                .transport
                .subscribe(&self.user_id, &EntityType::ALL)
                .await
            {
                Ok(receiver) => match self.pump(receiver, handlers.as_ref()).await {
                    Some(reason) => reason,
                    None => return,
                },
                Err(error) => error.to_string(),
            };

            let mut attempt = 0;
            let mut exhausted = false;
            let current = self.update(|state| {
                state.status = SyncState::Error;
                attempt = state.attempts;
                exhausted = attempt >= self.policy.max_attempts;
                if !exhausted {
                    state.attempts += 1;
                }
            });
            if !current {
                return;
            }
            handlers.on_status(SyncState::Error);

            if exhausted {
                tracing::error!(
                    attempts = attempt,
                    "Realtime reconnect attempts exhausted: {}",
                    reason
                );
                return;
            }

            let delay = self.policy.delay_for(attempt);
            tracing::warn!(
                attempt = attempt + 1,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "Realtime channel lost, reconnecting: {}",
                reason
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Drain one channel. Returns why it ended, or `None` once superseded.
    async fn pump<H: RealtimeHandlers>(
        &self,
        mut receiver: mpsc::Receiver<ChannelMessage>,
        handlers: &H,
    ) -> Option<String> {
        while let Some(message) = receiver.recv().await {
            match message {
                ChannelMessage::Status(ChannelStatus::Subscribed) => {
                    let current = self.update(|state| {
                        state.status = SyncState::Synced;
                        state.attempts = 0;
                    });
                    if !current {
                        return None;
                    }
                    tracing::info!(user_id = %self.user_id, "Realtime subscribed");
                    handlers.on_status(SyncState::Synced);
                }
                ChannelMessage::Status(ChannelStatus::Closed) => {
                    return Some("channel closed".to_string());
                }
                ChannelMessage::Status(ChannelStatus::Error(message)) => return Some(message),
                ChannelMessage::Change(change) => {
                    dispatch_change(&self.device_id, handlers, change);
                }
            }
        }
        Some("channel ended".to_string())
    }
}

/// Route one raw change to its handler, dropping echoes and malformed rows
pub fn dispatch_change<H: RealtimeHandlers + ?Sized>(
    device_id: &str,
    handlers: &H,
    change: RawChange,
) {
    let Ok(entity_type) = change.table.parse::<EntityType>() else {
        tracing::warn!(table = %change.table, "Ignoring change for unknown table");
        return;
    };
    let RawChange {
        event_type,
        new,
        old,
        ..
    } = change;

    match entity_type {
        EntityType::Context => {
            if let Some(change) = translate(device_id, event_type, new, old) {
                handlers.on_context(change);
            }
        }
        EntityType::Task => {
            if let Some(change) = translate(device_id, event_type, new, old) {
                handlers.on_task(change);
            }
        }
        EntityType::Session => {
            if let Some(change) = translate(device_id, event_type, new, old) {
                handlers.on_session(change);
            }
        }
        EntityType::Reminder => {
            if let Some(change) = translate(device_id, event_type, new, old) {
                handlers.on_reminder(change);
            }
        }
        EntityType::Preset => {
            if let Some(change) = translate(device_id, event_type, new, old) {
                handlers.on_preset(change);
            }
        }
        EntityType::Preferences => {
            if let Some(change) = translate(device_id, event_type, new, old) {
                handlers.on_preferences(change);
            }
        }
    }
}

fn present(row: Option<Value>) -> Option<Value> {
    row.filter(|row| !row.is_null() && !row.as_object().is_some_and(serde_json::Map::is_empty))
}

fn row_id(row: Option<&Value>) -> Option<String> {
    row.and_then(|row| row.get("id"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn translate<T: WireEntity>(
    device_id: &str,
    kind: ChangeKind,
    new: Option<Value>,
    old: Option<Value>,
) -> Option<RemoteChange<T>> {
    let new = present(new);
    let old = present(old);
    let id = row_id(new.as_ref()).or_else(|| row_id(old.as_ref()));

    let current = match new.map(decode_entity::<T>).transpose() {
        Ok(current) => current,
        Err(error) => {
            tracing::warn!(table = %T::ENTITY, "Dropping malformed realtime row: {}", error);
            return None;
        }
    };
    // Old images often carry only the primary key
    let previous = old.and_then(|row| decode_entity::<T>(row).ok());

    let origin = current
        .as_ref()
        .or(previous.as_ref())
        .and_then(|entity| entity.last_modified_by());
    if origin == Some(device_id) {
        tracing::trace!(table = %T::ENTITY, id = ?id, "Skipping own change echo");
        return None;
    }

    Some(RemoteChange {
        kind,
        id,
        current,
        previous,
    })
}
