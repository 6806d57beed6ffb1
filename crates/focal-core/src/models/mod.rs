//! Data models for Focal

mod context;
mod preferences;
mod preset;
mod reminder;
mod session;
mod syncable;
mod task;

pub use context::Context;
pub use preferences::{Preferences, ThemeMode};
pub use preset::{Preset, PresetAllocation};
pub use reminder::Reminder;
pub use session::{ContextAllocation, Session, SessionStatus};
pub use syncable::{new_local_id, EntityType, Syncable};
pub use task::Task;
