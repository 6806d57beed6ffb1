//! Conflict resolution between a local and a remote version of one record.
//!
//! Every resolver here is pure: it picks one of its inputs, or builds a
//! structural merge out of values already present in one of them. Nothing is
//! interpolated. Ties on the timestamp go to the remote version.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::models::{
    Context, ContextAllocation, Preferences, Preset, Reminder, Session, Syncable, Task,
};

/// Last-write-wins on `updated_at`; remote wins when it is newer or equal.
///
/// A missing timestamp orders before any present one.
pub fn resolve_lww<T: Syncable>(local: T, remote: T) -> T {
    resolve_lww_by(local, remote, T::updated_at)
}

/// Last-write-wins on a caller-chosen timestamp.
pub fn resolve_lww_by<T, F>(local: T, remote: T, timestamp: F) -> T
where
    F: Fn(&T) -> Option<DateTime<Utc>>,
{
    if timestamp(&remote) >= timestamp(&local) {
        remote
    } else {
        local
    }
}

pub fn resolve_context_conflict(local: Context, remote: Context) -> Context {
    resolve_lww(local, remote)
}

pub fn resolve_task_conflict(local: Task, remote: Task) -> Task {
    resolve_lww(local, remote)
}

pub fn resolve_reminder_conflict(local: Reminder, remote: Reminder) -> Reminder {
    resolve_lww(local, remote)
}

pub fn resolve_preferences_conflict(local: Preferences, remote: Preferences) -> Preferences {
    resolve_lww(local, remote)
}

/// Presets may never have been updated, so `created_at` stands in.
pub fn resolve_preset_conflict(local: Preset, remote: Preset) -> Preset {
    resolve_lww_by(local, remote, |preset| Some(preset.effective_updated_at()))
}

/// Field-level merge of two versions of the same session.
///
/// Allocations are merged per context keeping the larger `used_minutes`, so
/// tracked time survives a partition on either side. All other fields come
/// from the LWW winner when both sides carry `updated_at`, otherwise from the
/// remote version.
pub fn resolve_session_conflict(local: Session, remote: Session) -> Session {
    if local.id != remote.id {
        tracing::warn!(
            local_id = %local.id,
            remote_id = %remote.id,
            "Session conflict between different ids; keeping remote"
        );
        return remote;
    }

    let allocations = merge_allocations(&local.allocations, &remote.allocations);
    let mut merged = match (local.updated_at, remote.updated_at) {
        (Some(local_at), Some(remote_at)) if local_at > remote_at => local,
        _ => remote,
    };
    merged.allocations = allocations;
    merged
}

/// Local order first, then contexts only the remote knows about.
fn merge_allocations(
    local: &[ContextAllocation],
    remote: &[ContextAllocation],
) -> Vec<ContextAllocation> {
    let remote_by_context: HashMap<&str, &ContextAllocation> = remote
        .iter()
        .map(|alloc| (alloc.context_id.as_str(), alloc))
        .collect();

    let mut seen = HashSet::new();
    let mut merged = Vec::with_capacity(local.len().max(remote.len()));

    for alloc in local {
        if !seen.insert(alloc.context_id.as_str()) {
            continue;
        }
        let winner = match remote_by_context.get(alloc.context_id.as_str()) {
            Some(theirs) if theirs.used_minutes >= alloc.used_minutes => *theirs,
            _ => alloc,
        };
        merged.push(winner.clone());
    }

    for alloc in remote {
        if seen.insert(alloc.context_id.as_str()) {
            merged.push(alloc.clone());
        }
    }

    merged
}

/// Outcome of a delete-versus-edit resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteResolution<T> {
    /// Surviving version, if either side still exists
    pub entity: Option<T>,
    pub is_deleted: bool,
}

/// Delete intent wins over a concurrent edit.
///
/// `None` means the record does not exist on that side.
pub fn resolve_delete_vs_edit<T: Syncable>(
    local: Option<T>,
    remote: Option<T>,
) -> DeleteResolution<T> {
    match (local, remote) {
        (None, None) => DeleteResolution {
            entity: None,
            is_deleted: true,
        },
        (Some(only), None) | (None, Some(only)) => DeleteResolution {
            is_deleted: only.is_deleted(),
            entity: Some(only),
        },
        (Some(local), Some(remote)) => match (local.is_deleted(), remote.is_deleted()) {
            (true, true) => DeleteResolution {
                entity: Some(resolve_lww(local, remote)),
                is_deleted: true,
            },
            (true, false) => DeleteResolution {
                entity: Some(local),
                is_deleted: true,
            },
            (false, true) => DeleteResolution {
                entity: Some(remote),
                is_deleted: true,
            },
            (false, false) => DeleteResolution {
                entity: Some(resolve_lww(local, remote)),
                is_deleted: false,
            },
        },
    }
}

/// Union two collections by id, resolving records present on both sides.
///
/// Output keeps local order, followed by remote-only records in remote order.
pub fn merge_entity_arrays<T, F>(local: Vec<T>, remote: Vec<T>, resolver: F) -> Vec<T>
where
    T: Syncable,
    F: Fn(T, T) -> T,
{
    let mut remote_by_id: HashMap<String, T> = HashMap::with_capacity(remote.len());
    let mut remote_order = Vec::with_capacity(remote.len());
    for entity in remote {
        let id = entity.id().to_string();
        if remote_by_id.insert(id.clone(), entity).is_none() {
            remote_order.push(id);
        }
    }

    let mut merged = Vec::with_capacity(local.len() + remote_by_id.len());
    for entity in local {
        match remote_by_id.remove(entity.id()) {
            Some(theirs) => merged.push(resolver(entity, theirs)),
            None => merged.push(entity),
        }
    }
    for id in remote_order {
        if let Some(entity) = remote_by_id.remove(&id) {
            merged.push(entity);
        }
    }
    merged
}
