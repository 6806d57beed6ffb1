//! Key-value repository implementation

use libsql::params;

use super::Database;
use crate::error::Result;
use crate::storage::{KeyValueStore, StorageEstimate};

/// libSQL implementation of `KeyValueStore`
pub struct LibSqlStore {
    db: Database,
    quota_bytes: Option<u64>,
}

impl LibSqlStore {
    /// Wrap an opened database
    pub const fn new(db: Database) -> Self {
        Self {
            db,
            quota_bytes: None,
        }
    }

    /// Report usage against this quota in [`KeyValueStore::estimate`]
    #[must_use]
    pub const fn with_quota(mut self, quota_bytes: u64) -> Self {
        self.quota_bytes = Some(quota_bytes);
        self
    }
}

impl KeyValueStore for LibSqlStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut rows = self
            .db
            .connection()
            .query("SELECT value FROM kv_store WHERE key = ?", [key])
            .await?;

        if let Some(row) = rows.next().await? {
            let value: String = row.get(0)?;
            Ok(Some(value))
        } else {
            Ok(None)
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let now = chrono::Utc::now().timestamp_millis();
        self.db
            .connection()
            .execute(
                "INSERT INTO kv_store (key, value, updated_at) VALUES (?, ?, ?)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, value, now],
            )
            .await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.db
            .connection()
            .execute("DELETE FROM kv_store WHERE key = ?", [key])
            .await?;
        Ok(())
    }

    async fn entries(&self) -> Result<Vec<(String, String)>> {
        let mut rows = self
            .db
            .connection()
            .query("SELECT key, value FROM kv_store ORDER BY key", ())
            .await?;

        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            entries.push((row.get::<String>(0)?, row.get::<String>(1)?));
        }
        Ok(entries)
    }

    async fn estimate(&self) -> Result<Option<StorageEstimate>> {
        let Some(quota_bytes) = self.quota_bytes else {
            return Ok(None);
        };
        Ok(Some(StorageEstimate {
            used_bytes: self.db.allocated_bytes().await?,
            quota_bytes,
        }))
    }
}
