//! Session preset model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::syncable::{impl_syncable, new_local_id};
use super::EntityType;

/// Budget line in a preset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresetAllocation {
    pub context_id: String,
    pub allocated_minutes: u32,
}

/// Saved session template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preset {
    pub id: String,
    pub name: String,
    /// Contexts included in the preset, in display order
    #[serde(default)]
    pub context_ids: Vec<String>,
    #[serde(default)]
    pub allocations: Vec<PresetAllocation>,
    pub created_at: DateTime<Utc>,
    /// Absent for presets that were never edited after creation
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_modified_by: Option<String>,
}

impl Preset {
    #[must_use]
    pub fn new(name: impl Into<String>, allocations: Vec<PresetAllocation>) -> Self {
        let context_ids = allocations
            .iter()
            .map(|alloc| alloc.context_id.clone())
            .collect();
        Self {
            id: new_local_id("preset"),
            name: name.into(),
            context_ids,
            allocations,
            created_at: Utc::now(),
            updated_at: None,
            deleted_at: None,
            last_modified_by: None,
        }
    }

    /// Timestamp used for ordering writes: `updated_at`, else `created_at`
    pub fn effective_updated_at(&self) -> DateTime<Utc> {
        self.updated_at.unwrap_or(self.created_at)
    }
}

impl_syncable!(Preset, EntityType::Preset, optional);
