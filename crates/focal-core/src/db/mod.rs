//! libSQL-backed local persistence

mod connection;
mod kv_repository;
mod migrations;

pub use connection::Database;
pub use kv_repository::LibSqlStore;
