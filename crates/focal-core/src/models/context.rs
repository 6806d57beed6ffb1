//! Context model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::syncable::{impl_syncable, new_local_id};
use super::EntityType;

/// An area of focus that tasks and session time are allocated to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Context {
    /// Temporary local id or server-issued UUID
    pub id: String,
    /// Display name
    pub name: String,
    /// Optional display color (e.g. `#3b82f6`)
    #[serde(default)]
    pub color: Option<String>,
    /// Higher values sort first
    #[serde(default)]
    pub priority: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Soft delete marker for sync
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_modified_by: Option<String>,
}

impl Context {
    /// Create a new context with a temporary local id
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: new_local_id("ctx"),
            name: name.into(),
            color: None,
            priority: 0,
            created_at: now,
            updated_at: now,
            deleted_at: None,
            last_modified_by: None,
        }
    }
}

impl_syncable!(Context, EntityType::Context, required);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Syncable;

    #[test]
    fn test_context_new() {
        let context = Context::new("Deep work");
        assert_eq!(context.name, "Deep work");
        assert!(context.id.starts_with("ctx-"));
        assert!(!context.is_deleted());
        assert_eq!(context.created_at, context.updated_at);
    }

    #[test]
    fn test_context_serializes_camel_case() {
        let context = Context::new("Reading");
        let json = serde_json::to_value(&context).unwrap();
        assert!(json.get("updatedAt").is_some());
        assert!(json.get("lastModifiedBy").is_some());
        assert!(json.get("updated_at").is_none());
    }
}
