//! Focus session model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::syncable::{impl_syncable, new_local_id};
use super::EntityType;

/// Lifecycle of a focus session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Timer is running
    #[default]
    Active,
    /// Timer paused by the user
    Paused,
    /// Timer stopped because no device is driving it
    Suspended,
    /// Session finished
    Completed,
}

impl SessionStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Suspended => "suspended",
            Self::Completed => "completed",
        }
    }

    /// Parse the lowercase wire representation
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(Self::Active),
            "paused" => Some(Self::Paused),
            "suspended" => Some(Self::Suspended),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

/// Time budgeted to, and spent on, one context within a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextAllocation {
    pub context_id: String,
    pub allocated_minutes: u32,
    #[serde(default)]
    pub used_minutes: u32,
}

impl ContextAllocation {
    #[must_use]
    pub fn new(context_id: impl Into<String>, allocated_minutes: u32) -> Self {
        Self {
            context_id: context_id.into(),
            allocated_minutes,
            used_minutes: 0,
        }
    }
}

/// A focus session splitting time across several contexts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    /// Ordered per-context budgets
    #[serde(default)]
    pub allocations: Vec<ContextAllocation>,
    /// Context the timer is currently counting against
    #[serde(default)]
    pub active_context_id: Option<String>,
    #[serde(default)]
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    /// Older clients never wrote this field
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    /// Device currently driving the live timer
    #[serde(default)]
    pub active_device_id: Option<String>,
    #[serde(default)]
    pub ownership_claimed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_modified_by: Option<String>,
}

impl Session {
    /// Start a new active session over the given allocations
    #[must_use]
    pub fn start(allocations: Vec<ContextAllocation>) -> Self {
        let now = Utc::now();
        let active_context_id = allocations.first().map(|alloc| alloc.context_id.clone());
        Self {
            id: new_local_id("session"),
            allocations,
            active_context_id,
            status: SessionStatus::Active,
            started_at: now,
            ended_at: None,
            updated_at: Some(now),
            active_device_id: None,
            ownership_claimed_at: None,
            deleted_at: None,
            last_modified_by: None,
        }
    }

    /// Allocation for a given context, if one exists
    pub fn allocation(&self, context_id: &str) -> Option<&ContextAllocation> {
        self.allocations
            .iter()
            .find(|alloc| alloc.context_id == context_id)
    }

    /// Minutes tracked across every context
    pub fn total_used_minutes(&self) -> u32 {
        self.allocations
            .iter()
            .map(|alloc| alloc.used_minutes)
            .fold(0, u32::saturating_add)
    }
}

impl_syncable!(Session, EntityType::Session, optional);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_start_activates_first_context() {
        let session = Session::start(vec![
            ContextAllocation::new("a", 25),
            ContextAllocation::new("b", 50),
        ]);
        assert_eq!(session.active_context_id.as_deref(), Some("a"));
        assert_eq!(session.status, SessionStatus::Active);
        assert!(session.updated_at.is_some());
    }

    #[test]
    fn test_total_used_minutes() {
        let mut session = Session::start(vec![
            ContextAllocation::new("a", 25),
            ContextAllocation::new("b", 50),
        ]);
        session.allocations[0].used_minutes = 20;
        session.allocations[1].used_minutes = 7;
        assert_eq!(session.total_used_minutes(), 27);
        assert_eq!(session.allocation("b").map(|a| a.used_minutes), Some(7));
    }

    #[test]
    fn test_session_status_parse() {
        assert_eq!(SessionStatus::parse("paused"), Some(SessionStatus::Paused));
        assert_eq!(SessionStatus::parse("PAUSED"), None);
        assert_eq!(SessionStatus::Suspended.as_str(), "suspended");
    }
}
