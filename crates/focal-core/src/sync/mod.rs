//! Offline-first sync: outbox, conflict resolution, id migration, and
//! realtime dispatch.

pub mod conflict;
pub mod migration;
pub mod outbox;
pub mod ownership;
pub mod realtime;
pub mod remote;
pub mod wire;

pub use conflict::{
    merge_entity_arrays, resolve_context_conflict, resolve_delete_vs_edit, resolve_lww,
    resolve_lww_by, resolve_preferences_conflict, resolve_preset_conflict,
    resolve_reminder_conflict, resolve_session_conflict, resolve_task_conflict, DeleteResolution,
};
pub use migration::{
    generate_id_mapping, is_uuid, needs_migration, remap_entity_ids, remap_outbox_entries,
    IdMapping, MigrationEngine, MigrationProgress, MigrationState,
};
pub use outbox::{FlushReport, Outbox, OutboxEntry, OutboxOperation};
pub use ownership::{
    claim_session_ownership, evaluate_claim, is_owned_by, release_session_ownership,
    ClaimDecision,
};
pub use realtime::{
    ChangeKind, ChannelMessage, ChannelStatus, RawChange, RealtimeDispatcher, RealtimeHandlers,
    RealtimeTransport, RemoteChange,
};
pub use remote::{MemoryRemoteStore, RemoteStore, RestRemoteStore};
pub use wire::{decode_entity, decode_row, encode_entity, encode_payload, RowMeta, SyncRecord};
