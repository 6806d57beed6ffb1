//! Task model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::syncable::{impl_syncable, new_local_id};
use super::EntityType;

/// A to-do item, optionally filed under a context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    /// Owning context; `None` means the inbox
    #[serde(default)]
    pub context_id: Option<String>,
    /// Lexicographically sortable ordering key
    pub position: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_modified_by: Option<String>,
}

impl Task {
    /// Create a new, incomplete task with a temporary local id
    #[must_use]
    pub fn new(
        title: impl Into<String>,
        context_id: Option<String>,
        position: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: new_local_id("task"),
            title: title.into(),
            context_id,
            position: position.into(),
            completed: false,
            completed_at: None,
            deadline: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
            last_modified_by: None,
        }
    }

    /// Whether the task lives in the inbox rather than a context
    pub const fn is_inbox(&self) -> bool {
        self.context_id.is_none()
    }
}

impl_syncable!(Task, EntityType::Task, required);
