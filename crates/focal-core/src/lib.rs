//! focal-core - Offline-first sync core for Focal
//!
//! This crate contains the entity model, local persistence, outbox queue,
//! conflict resolver, id migration engine, and realtime dispatch used by
//! every Focal client.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod notify;
pub mod services;
pub mod state;
pub mod storage;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use models::{EntityType, Syncable};
pub use services::SyncService;
