use std::fmt::Write;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use focal_core::auth::AuthSession;
use focal_core::config::SyncConfig;
use focal_core::db::{Database, LibSqlStore};
use focal_core::notify::LogNotifier;
use focal_core::storage::StorageHealth;
use focal_core::sync::{IdMapping, MigrationProgress, OutboxEntry, RestRemoteStore};
use focal_core::SyncService;

use crate::config::{load_sync_config, session_from_env};
use crate::error::CliError;

pub type CliSyncService = SyncService<LibSqlStore, RestRemoteStore>;

/// Everything a remote command needs
pub struct RemoteContext {
    pub service: CliSyncService,
    pub session: AuthSession,
}

pub async fn open_store(path: &Path, config: &SyncConfig) -> Result<LibSqlStore, CliError> {
    let db = Database::open(path).await?;
    Ok(LibSqlStore::new(db).with_quota(config.storage_quota_bytes))
}

/// Open the service without a remote store
pub async fn open_local_service(path: &Path) -> Result<CliSyncService, CliError> {
    let config = load_sync_config()?;
    let store = open_store(path, &config).await?;
    Ok(SyncService::open(store, None, config, Arc::new(LogNotifier)).await?)
}

/// Open the service against the configured remote for the env session
pub async fn open_remote_service(path: &Path) -> Result<RemoteContext, CliError> {
    let config = load_sync_config()?;
    let (Some(base_url), Some(anon_key)) =
        (config.remote_base_url(), config.supabase_anon_key.clone())
    else {
        return Err(CliError::RemoteNotConfigured);
    };
    let session = session_from_env()?.ok_or(CliError::NotSignedIn)?;
    if session.is_expired() {
        return Err(CliError::NotSignedIn);
    }

    let remote = RestRemoteStore::for_session(base_url, anon_key, &session)?;
    let store = open_store(path, &config).await?;
    let service = SyncService::open(store, Some(remote), config, Arc::new(LogNotifier)).await?;
    Ok(RemoteContext { service, session })
}

pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

pub fn format_outbox_lines(entries: &[OutboxEntry]) -> Vec<String> {
    entries
        .iter()
        .map(|entry| {
            let mut line = format!(
                "{:<7} {:<11} {}  queued {}",
                entry.operation.as_str(),
                entry.entity_type.table_name(),
                entry.entity_id,
                format_timestamp(entry.created_at)
            );
            if entry.attempts > 0 {
                let _ = write!(line, "  attempts={}", entry.attempts);
            }
            if let Some(error) = &entry.error {
                let _ = write!(line, "  error: {error}");
            }
            line
        })
        .collect()
}

#[allow(clippy::cast_precision_loss)]
fn format_bytes(bytes: u64) -> String {
    const KIB: f64 = 1024.0;
    let bytes = bytes as f64;
    if bytes >= KIB * KIB {
        format!("{:.1} MiB", bytes / (KIB * KIB))
    } else if bytes >= KIB {
        format!("{:.1} KiB", bytes / KIB)
    } else {
        format!("{bytes} B")
    }
}

pub fn format_storage_health(health: &StorageHealth) -> String {
    format!(
        "Storage {}: {} of {} used ({:.1}%)",
        health.status.label(),
        format_bytes(health.used_bytes),
        format_bytes(health.quota_bytes),
        health.percent_used
    )
}

pub fn format_mapping_lines(mapping: &IdMapping) -> Vec<String> {
    [
        ("contexts", &mapping.contexts),
        ("tasks", &mapping.tasks),
        ("reminders", &mapping.reminders),
        ("presets", &mapping.presets),
        ("sessions", &mapping.sessions),
    ]
    .into_iter()
    .flat_map(|(label, map)| {
        map.iter()
            .filter(|(old, new)| old != new)
            .map(move |(old, new)| format!("{label:<9} {old} -> {new}"))
    })
    .collect()
}

pub fn format_progress(progress: &MigrationProgress) -> String {
    let mut line = format!(
        "[{}/{}] {} ({})",
        progress.processed_items,
        progress.total_items,
        progress.current_step,
        progress.state.label()
    );
    if let Some(error) = &progress.error {
        let _ = write!(line, ": {error}");
    }
    line
}
