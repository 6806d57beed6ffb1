//! Reminder model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::syncable::{impl_syncable, new_local_id};
use super::EntityType;

/// A timed nudge shown to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reminder {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub remind_at: DateTime<Utc>,
    #[serde(default)]
    pub acknowledged: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_modified_by: Option<String>,
}

impl Reminder {
    #[must_use]
    pub fn new(title: impl Into<String>, remind_at: DateTime<Utc>) -> Self {
        let now = Utc::now();
        Self {
            id: new_local_id("rem"),
            title: title.into(),
            description: None,
            remind_at,
            acknowledged: false,
            created_at: now,
            updated_at: now,
            deleted_at: None,
            last_modified_by: None,
        }
    }
}

impl_syncable!(Reminder, EntityType::Reminder, required);
