//! Application services shared by every client.

mod sync;

pub use sync::SyncService;
