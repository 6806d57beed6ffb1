//! User preferences model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::syncable::{impl_syncable, new_local_id};
use super::EntityType;

/// Theme mode options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    /// Light theme
    Light,
    /// Dark theme
    Dark,
    /// Follow system preference
    #[default]
    System,
}

impl ThemeMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
            Self::System => "system",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "light" => Some(Self::Light),
            "dark" => Some(Self::Dark),
            "system" => Some(Self::System),
            _ => None,
        }
    }
}

/// Per-user application preferences (one record per user)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    pub id: String,
    /// Length used when starting a session without a preset
    pub default_session_minutes: u32,
    pub theme: ThemeMode,
    /// Play a sound when a context's allocation runs out
    pub sound_enabled: bool,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_modified_by: Option<String>,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            id: new_local_id("prefs"),
            default_session_minutes: 50,
            theme: ThemeMode::System,
            sound_enabled: true,
            updated_at: Utc::now(),
            deleted_at: None,
            last_modified_by: None,
        }
    }
}

impl_syncable!(Preferences, EntityType::Preferences, required);
