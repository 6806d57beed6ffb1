//! Wire-format adapter between canonical entities and remote rows.
//!
//! Remote rows are snake_case and carry `user_id`; in-memory entities are
//! camelCase when persisted and never see `user_id`. Every field is listed
//! explicitly so malformed rows are rejected here instead of leaking into the
//! resolver.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::models::{
    Context, ContextAllocation, EntityType, Preferences, Preset, PresetAllocation, Reminder,
    Session, SessionStatus, Syncable, Task, ThemeMode,
};

/// Metadata injected into every row written to the remote store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowMeta {
    pub user_id: String,
    /// Device tag written as `last_modified_by`
    pub device_id: String,
    /// Write time stamped as `updated_at`
    pub updated_at: DateTime<Utc>,
}

impl RowMeta {
    pub fn new(user_id: impl Into<String>, device_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            device_id: device_id.into(),
            updated_at: Utc::now(),
        }
    }

    #[must_use]
    pub const fn at(mut self, updated_at: DateTime<Utc>) -> Self {
        self.updated_at = updated_at;
        self
    }
}

/// Entity with an explicit remote row representation
pub trait WireEntity: Syncable + Serialize + DeserializeOwned + Sized {
    type Row: Serialize + DeserializeOwned;

    fn to_row(&self, meta: &RowMeta) -> Self::Row;

    fn from_row(row: Self::Row) -> Result<Self>;
}

/// Encode an entity as a remote row
pub fn encode_entity<T: WireEntity>(entity: &T, meta: &RowMeta) -> Result<Value> {
    Ok(serde_json::to_value(entity.to_row(meta))?)
}

/// Decode a remote row into an entity, rejecting malformed data
pub fn decode_entity<T: WireEntity>(row: Value) -> Result<T> {
    let row: T::Row = serde_json::from_value(row).map_err(|error| malformed(T::ENTITY, error))?;
    T::from_row(row)
}

/// Encode a canonical (camelCase) outbox payload as a remote row
pub fn encode_payload(entity_type: EntityType, payload: &Value, meta: &RowMeta) -> Result<Value> {
    fn convert<T: WireEntity>(payload: &Value, meta: &RowMeta) -> Result<Value> {
        let entity: T = serde_json::from_value(payload.clone())
            .map_err(|error| Error::InvalidInput(format!("{} payload: {error}", T::ENTITY)))?;
        encode_entity(&entity, meta)
    }

    match entity_type {
        EntityType::Context => convert::<Context>(payload, meta),
        EntityType::Task => convert::<Task>(payload, meta),
        EntityType::Session => convert::<Session>(payload, meta),
        EntityType::Reminder => convert::<Reminder>(payload, meta),
        EntityType::Preset => convert::<Preset>(payload, meta),
        EntityType::Preferences => convert::<Preferences>(payload, meta),
    }
}

/// Any decoded record, tagged by collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncRecord {
    Context(Context),
    Task(Task),
    Session(Session),
    Reminder(Reminder),
    Preset(Preset),
    Preferences(Preferences),
}

impl SyncRecord {
    pub const fn entity_type(&self) -> EntityType {
        match self {
            Self::Context(_) => EntityType::Context,
            Self::Task(_) => EntityType::Task,
            Self::Session(_) => EntityType::Session,
            Self::Reminder(_) => EntityType::Reminder,
            Self::Preset(_) => EntityType::Preset,
            Self::Preferences(_) => EntityType::Preferences,
        }
    }

    pub fn last_modified_by(&self) -> Option<&str> {
        match self {
            Self::Context(entity) => entity.last_modified_by(),
            Self::Task(entity) => entity.last_modified_by(),
            Self::Session(entity) => entity.last_modified_by(),
            Self::Reminder(entity) => entity.last_modified_by(),
            Self::Preset(entity) => entity.last_modified_by(),
            Self::Preferences(entity) => entity.last_modified_by(),
        }
    }
}

/// Decode a row from the given table
pub fn decode_row(entity_type: EntityType, row: Value) -> Result<SyncRecord> {
    Ok(match entity_type {
        EntityType::Context => SyncRecord::Context(decode_entity(row)?),
        EntityType::Task => SyncRecord::Task(decode_entity(row)?),
        EntityType::Session => SyncRecord::Session(decode_entity(row)?),
        EntityType::Reminder => SyncRecord::Reminder(decode_entity(row)?),
        EntityType::Preset => SyncRecord::Preset(decode_entity(row)?),
        EntityType::Preferences => SyncRecord::Preferences(decode_entity(row)?),
    })
}

fn malformed(entity_type: EntityType, reason: impl ToString) -> Error {
    Error::MalformedRow {
        table: entity_type.table_name(),
        reason: reason.to_string(),
    }
}

fn require_id(entity_type: EntityType, id: String) -> Result<String> {
    let id = id.trim().to_string();
    if id.is_empty() {
        Err(malformed(entity_type, "id must not be empty"))
    } else {
        Ok(id)
    }
}

fn minutes(entity_type: EntityType, field: &str, value: i64) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| malformed(entity_type, format!("{field} out of range: {value}")))
}

// ---------------------------------------------------------------------------
// Contexts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextRow {
    pub id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub priority: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_modified_by: Option<String>,
}

impl WireEntity for Context {
    type Row = ContextRow;

    fn to_row(&self, meta: &RowMeta) -> ContextRow {
        ContextRow {
            id: self.id.clone(),
            user_id: Some(meta.user_id.clone()),
            name: self.name.clone(),
            color: self.color.clone(),
            priority: self.priority,
            created_at: self.created_at,
            updated_at: meta.updated_at,
            deleted_at: self.deleted_at,
            last_modified_by: Some(meta.device_id.clone()),
        }
    }

    fn from_row(row: ContextRow) -> Result<Self> {
        Ok(Self {
            id: require_id(Self::ENTITY, row.id)?,
            name: row.name,
            color: row.color,
            priority: row.priority,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
            last_modified_by: row.last_modified_by,
        })
    }
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRow {
    pub id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub context_id: Option<String>,
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

impl WireEntity for Task {
    type Row = TaskRow;

    fn to_row(&self, meta: &RowMeta) -> TaskRow {
        TaskRow {
            id: self.id.clone(),
            user_id: Some(meta.user_id.clone()),
            title: self.title.clone(),
            context_id: self.context_id.clone(),
            position: self.position.clone(),
            completed: self.completed,
            completed_at: self.completed_at,
            deadline: self.deadline,
            created_at: self.created_at,
            updated_at: meta.updated_at,
            deleted_at: self.deleted_at,
            last_modified_by: Some(meta.device_id.clone()),
        }
    }

    fn from_row(row: TaskRow) -> Result<Self> {
        Ok(Self {
            id: require_id(Self::ENTITY, row.id)?,
            title: row.title,
            context_id: row.context_id.filter(|id| !id.trim().is_empty()),
            position: row.position,
            completed: row.completed,
            completed_at: row.completed_at,
            deadline: row.deadline,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
            last_modified_by: row.last_modified_by,
        })
    }
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationRow {
    pub context_id: String,
    pub allocated_minutes: i64,
    #[serde(default)]
    pub used_minutes: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRow {
    pub id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub allocations: Vec<AllocationRow>,
    #[serde(default)]
    pub active_context_id: Option<String>,
    pub status: String,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub active_device_id: Option<String>,
    #[serde(default)]
    pub ownership_claimed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_modified_by: Option<String>,
}

impl WireEntity for Session {
    type Row = SessionRow;

    fn to_row(&self, meta: &RowMeta) -> SessionRow {
        SessionRow {
            id: self.id.clone(),
            user_id: Some(meta.user_id.clone()),
            allocations: self
                .allocations
                .iter()
                .map(|alloc| AllocationRow {
                    context_id: alloc.context_id.clone(),
                    allocated_minutes: i64::from(alloc.allocated_minutes),
                    used_minutes: i64::from(alloc.used_minutes),
                })
                .collect(),
            active_context_id: self.active_context_id.clone(),
            status: self.status.as_str().to_string(),
            started_at: self.started_at,
            ended_at: self.ended_at,
            updated_at: Some(meta.updated_at),
            active_device_id: self.active_device_id.clone(),
            ownership_claimed_at: self.ownership_claimed_at,
            deleted_at: self.deleted_at,
            last_modified_by: Some(meta.device_id.clone()),
        }
    }

    fn from_row(row: SessionRow) -> Result<Self> {
        let status = SessionStatus::parse(&row.status)
            .ok_or_else(|| malformed(Self::ENTITY, format!("unknown status '{}'", row.status)))?;
        let allocations = row
            .allocations
            .into_iter()
            .map(|alloc| {
                Ok(ContextAllocation {
                    allocated_minutes: minutes(
                        Self::ENTITY,
                        "allocated_minutes",
                        alloc.allocated_minutes,
                    )?,
                    used_minutes: minutes(Self::ENTITY, "used_minutes", alloc.used_minutes)?,
                    context_id: alloc.context_id,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            id: require_id(Self::ENTITY, row.id)?,
            allocations,
            active_context_id: row.active_context_id,
            status,
            started_at: row.started_at,
            ended_at: row.ended_at,
            updated_at: row.updated_at,
            active_device_id: row.active_device_id,
            ownership_claimed_at: row.ownership_claimed_at,
            deleted_at: row.deleted_at,
            last_modified_by: row.last_modified_by,
        })
    }
}

// ---------------------------------------------------------------------------
// Reminders
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderRow {
    pub id: String,
    #[serde(default)]
    pub user_id: Option<String>,
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

impl WireEntity for Reminder {
    type Row = ReminderRow;

    fn to_row(&self, meta: &RowMeta) -> ReminderRow {
        ReminderRow {
            id: self.id.clone(),
            user_id: Some(meta.user_id.clone()),
            title: self.title.clone(),
            description: self.description.clone(),
            remind_at: self.remind_at,
            acknowledged: self.acknowledged,
            created_at: self.created_at,
            updated_at: meta.updated_at,
            deleted_at: self.deleted_at,
            last_modified_by: Some(meta.device_id.clone()),
        }
    }

    fn from_row(row: ReminderRow) -> Result<Self> {
        Ok(Self {
            id: require_id(Self::ENTITY, row.id)?,
            title: row.title,
            description: row.description,
            remind_at: row.remind_at,
            acknowledged: row.acknowledged,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
            last_modified_by: row.last_modified_by,
        })
    }
}

// ---------------------------------------------------------------------------
// Presets
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresetAllocationRow {
    pub context_id: String,
    pub allocated_minutes: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresetRow {
    pub id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub context_ids: Vec<String>,
    #[serde(default)]
    pub allocations: Vec<PresetAllocationRow>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_modified_by: Option<String>,
}

impl WireEntity for Preset {
    type Row = PresetRow;

    fn to_row(&self, meta: &RowMeta) -> PresetRow {
        PresetRow {
            id: self.id.clone(),
            user_id: Some(meta.user_id.clone()),
            name: self.name.clone(),
            context_ids: self.context_ids.clone(),
            allocations: self
                .allocations
                .iter()
                .map(|alloc| PresetAllocationRow {
                    context_id: alloc.context_id.clone(),
                    allocated_minutes: i64::from(alloc.allocated_minutes),
                })
                .collect(),
            created_at: self.created_at,
            updated_at: Some(meta.updated_at),
            deleted_at: self.deleted_at,
            last_modified_by: Some(meta.device_id.clone()),
        }
    }

    fn from_row(row: PresetRow) -> Result<Self> {
        let allocations = row
            .allocations
            .into_iter()
            .map(|alloc| {
                Ok(PresetAllocation {
                    allocated_minutes: minutes(
                        Self::ENTITY,
                        "allocated_minutes",
                        alloc.allocated_minutes,
                    )?,
                    context_id: alloc.context_id,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            id: require_id(Self::ENTITY, row.id)?,
            name: row.name,
            context_ids: row.context_ids,
            allocations,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
            last_modified_by: row.last_modified_by,
        })
    }
}

// ---------------------------------------------------------------------------
// Preferences
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferencesRow {
    pub id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    pub default_session_minutes: i64,
    pub theme: String,
    #[serde(default)]
    pub sound_enabled: bool,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_modified_by: Option<String>,
}

impl WireEntity for Preferences {
    type Row = PreferencesRow;

    fn to_row(&self, meta: &RowMeta) -> PreferencesRow {
        PreferencesRow {
            id: self.id.clone(),
            user_id: Some(meta.user_id.clone()),
            default_session_minutes: i64::from(self.default_session_minutes),
            theme: self.theme.as_str().to_string(),
            sound_enabled: self.sound_enabled,
            updated_at: meta.updated_at,
            deleted_at: self.deleted_at,
            last_modified_by: Some(meta.device_id.clone()),
        }
    }

    fn from_row(row: PreferencesRow) -> Result<Self> {
        let theme = ThemeMode::parse(&row.theme)
            .ok_or_else(|| malformed(Self::ENTITY, format!("unknown theme '{}'", row.theme)))?;
        Ok(Self {
            id: require_id(Self::ENTITY, row.id)?,
            default_session_minutes: minutes(
                Self::ENTITY,
                "default_session_minutes",
                row.default_session_minutes,
            )?,
            theme,
            sound_enabled: row.sound_enabled,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
            last_modified_by: row.last_modified_by,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn meta() -> RowMeta {
        RowMeta::new("user-1", "device-a").at("2024-05-01T12:00:00Z".parse().unwrap())
    }

    #[test]
    fn encode_injects_row_metadata() {
        let task = Task::new("Plan week", Some("ctx-1".to_string()), "a0");
        let row = encode_entity(&task, &meta()).unwrap();

        assert_eq!(row["user_id"], json!("user-1"));
        assert_eq!(row["last_modified_by"], json!("device-a"));
        assert_eq!(row["updated_at"], json!("2024-05-01T12:00:00Z"));
        assert_eq!(row["context_id"], json!("ctx-1"));
        assert!(row.get("contextId").is_none());
    }

    #[test]
    fn decode_session_row_translates_snake_case() {
        let row = json!({
            "id": "5b1f2c1e-8a77-4a7b-9c7b-6f1d2d3e4f50",
            "user_id": "user-1",
            "allocations": [
                { "context_id": "a", "allocated_minutes": 30, "used_minutes": 12 }
            ],
            "active_context_id": "a",
            "status": "paused",
            "started_at": "2024-05-01T09:00:00+00:00",
            "updated_at": "2024-05-01T09:30:00.250+00:00",
            "last_modified_by": "device-b"
        });

        let SyncRecord::Session(session) = decode_row(EntityType::Session, row).unwrap() else {
            panic!("expected a session");
        };
        assert_eq!(session.status, SessionStatus::Paused);
        assert_eq!(session.allocations[0].used_minutes, 12);
        assert_eq!(session.last_modified_by.as_deref(), Some("device-b"));
    }

    #[test]
    fn decode_rejects_malformed_rows() {
        let negative = json!({
            "id": "s1",
            "allocations": [{ "context_id": "a", "allocated_minutes": 30, "used_minutes": -1 }],
            "status": "active",
            "started_at": "2024-05-01T09:00:00Z"
        });
        assert!(matches!(
            decode_row(EntityType::Session, negative),
            Err(Error::MalformedRow { table: "sessions", .. })
        ));

        let unknown_status = json!({
            "id": "s1",
            "status": "running",
            "started_at": "2024-05-01T09:00:00Z"
        });
        assert!(decode_row(EntityType::Session, unknown_status).is_err());

        let blank_id = json!({
            "id": "  ",
            "name": "Work",
            "created_at": "2024-05-01T09:00:00Z",
            "updated_at": "2024-05-01T09:00:00Z"
        });
        assert!(decode_row(EntityType::Context, blank_id).is_err());

        let missing_field = json!({ "id": "c1" });
        assert!(decode_row(EntityType::Context, missing_field).is_err());
    }

    #[test]
    fn encode_payload_reads_camel_case_snapshots() {
        let preset = Preset::new(
            "Deep work",
            vec![PresetAllocation {
                context_id: "ctx-9".to_string(),
                allocated_minutes: 45,
            }],
        );
        let payload = serde_json::to_value(&preset).unwrap();
        let row = encode_payload(EntityType::Preset, &payload, &meta()).unwrap();

        assert_eq!(row["context_ids"], json!(["ctx-9"]));
        assert_eq!(row["allocations"][0]["allocated_minutes"], json!(45));

        let decoded: Preset = decode_entity(row).unwrap();
        assert_eq!(decoded.name, "Deep work");
        assert_eq!(decoded.last_modified_by.as_deref(), Some("device-a"));
    }

    #[test]
    fn encode_payload_rejects_mismatched_type() {
        let context = Context::new("Work");
        let payload = serde_json::to_value(&context).unwrap();
        assert!(matches!(
            encode_payload(EntityType::Task, &payload, &meta()),
            Err(Error::InvalidInput(_))
        ));
    }
}
