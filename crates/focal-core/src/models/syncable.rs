//! Shared shape of every record that flows through sync

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Category tag for a syncable collection; doubles as the remote table name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityType {
    #[serde(rename = "contexts")]
    Context,
    #[serde(rename = "tasks")]
    Task,
    #[serde(rename = "sessions")]
    Session,
    #[serde(rename = "reminders")]
    Reminder,
    #[serde(rename = "presets")]
    Preset,
    #[serde(rename = "preferences")]
    Preferences,
}

impl EntityType {
    /// Every syncable collection, in migration dependency order.
    pub const ALL: [Self; 6] = [
        Self::Context,
        Self::Task,
        Self::Reminder,
        Self::Preset,
        Self::Session,
        Self::Preferences,
    ];

    /// Remote table backing this collection.
    pub const fn table_name(self) -> &'static str {
        match self {
            Self::Context => "contexts",
            Self::Task => "tasks",
            Self::Session => "sessions",
            Self::Reminder => "reminders",
            Self::Preset => "presets",
            Self::Preferences => "preferences",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}

impl FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|entity| entity.table_name() == s)
            .ok_or_else(|| format!("unknown entity type '{s}'"))
    }
}

/// A record that can be queued, resolved, and migrated.
pub trait Syncable {
    /// Collection this record belongs to
    const ENTITY: EntityType;

    fn id(&self) -> &str;

    fn set_id(&mut self, id: String);

    /// Last write time; `None` when the record never tracked one
    fn updated_at(&self) -> Option<DateTime<Utc>>;

    fn set_updated_at(&mut self, at: DateTime<Utc>);

    fn deleted_at(&self) -> Option<DateTime<Utc>>;

    fn set_deleted_at(&mut self, at: Option<DateTime<Utc>>);

    /// Device tag of the last writer
    fn last_modified_by(&self) -> Option<&str>;

    fn is_deleted(&self) -> bool {
        self.deleted_at().is_some()
    }
}

/// Generate a client-side temporary id such as `task-0192f3...`.
///
/// The prefix keeps it from parsing as a UUID, which is what marks the
/// record for remapping when the dataset is first uploaded.
#[must_use]
pub fn new_local_id(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::now_v7().simple())
}

macro_rules! impl_syncable {
    ($ty:ty, $entity:expr, required) => {
        impl $crate::models::Syncable for $ty {
            const ENTITY: $crate::models::EntityType = $entity;

            fn id(&self) -> &str {
                &self.id
            }

            fn set_id(&mut self, id: String) {
                self.id = id;
            }

            fn updated_at(&self) -> Option<chrono::DateTime<chrono::Utc>> {
                Some(self.updated_at)
            }

            fn set_updated_at(&mut self, at: chrono::DateTime<chrono::Utc>) {
                self.updated_at = at;
            }

            fn deleted_at(&self) -> Option<chrono::DateTime<chrono::Utc>> {
                self.deleted_at
            }

            fn set_deleted_at(&mut self, at: Option<chrono::DateTime<chrono::Utc>>) {
                self.deleted_at = at;
            }

            fn last_modified_by(&self) -> Option<&str> {
                self.last_modified_by.as_deref()
            }
        }
    };
    ($ty:ty, $entity:expr, optional) => {
        impl $crate::models::Syncable for $ty {
            const ENTITY: $crate::models::EntityType = $entity;

            fn id(&self) -> &str {
                &self.id
            }

            fn set_id(&mut self, id: String) {
                self.id = id;
            }

            fn updated_at(&self) -> Option<chrono::DateTime<chrono::Utc>> {
                self.updated_at
            }

            fn set_updated_at(&mut self, at: chrono::DateTime<chrono::Utc>) {
                self.updated_at = Some(at);
            }

            fn deleted_at(&self) -> Option<chrono::DateTime<chrono::Utc>> {
                self.deleted_at
            }

            fn set_deleted_at(&mut self, at: Option<chrono::DateTime<chrono::Utc>>) {
                self.deleted_at = at;
            }

            fn last_modified_by(&self) -> Option<&str> {
                self.last_modified_by.as_deref()
            }
        }
    };
}

pub(crate) use impl_syncable;
