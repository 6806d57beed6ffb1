use std::path::PathBuf;

use chrono::{TimeZone, Utc};
use focal_core::config::SyncConfig;
use focal_core::models::{Context, EntityType};
use focal_core::notify::LogNotifier;
use focal_core::storage::{keys, load_or_create_device_id, KeyValueStore, LocalSnapshot};
use focal_core::sync::{
    generate_id_mapping, MigrationProgress, MigrationState, Outbox, OutboxEntry, OutboxOperation,
};
use pretty_assertions::assert_eq;
use tempfile::tempdir;

use crate::commands::common::{
    format_mapping_lines, format_outbox_lines, format_progress, format_storage_health,
    format_timestamp, open_store,
};
use crate::commands::device::run_device;
use crate::config::{resolve_db_path, session_from_parts, sync_config_from_sources};
use crate::error::CliError;

#[test]
fn explicit_db_path_wins() {
    let explicit = PathBuf::from("/tmp/focal-explicit.db");
    assert_eq!(resolve_db_path(Some(explicit.clone())), explicit);
}

#[test]
fn env_overrides_replace_file_endpoints() {
    let payload = r#"{
        "supabase_url": "https://file.supabase.co",
        "supabase_anon_key": "file-key",
        "reconnect_max_attempts": 2
    }"#;
    let config = sync_config_from_sources(
        Some(payload),
        Some("https://env.supabase.co/".to_string()),
        None,
    )
    .unwrap();

    assert_eq!(
        config.supabase_url.as_deref(),
        Some("https://env.supabase.co")
    );
    assert_eq!(config.supabase_anon_key.as_deref(), Some("file-key"));
    assert_eq!(config.reconnect_max_attempts, 2);
}

#[test]
fn invalid_config_sources_are_rejected() {
    assert!(matches!(
        sync_config_from_sources(Some("{ not json"), None, None),
        Err(CliError::Config(_))
    ));
    assert!(matches!(
        sync_config_from_sources(Some(r#"{"unknown_field": 1}"#), None, None),
        Err(CliError::Config(_))
    ));
    assert!(sync_config_from_sources(None, Some("example.supabase.co".to_string()), None).is_err());
    assert_eq!(
        sync_config_from_sources(None, None, None).unwrap(),
        SyncConfig::default()
    );
}

#[test]
fn session_requires_token_and_user() {
    assert!(session_from_parts(None, Some("user-1".to_string()), None).is_none());
    assert!(session_from_parts(Some("token".to_string()), Some("  ".to_string()), None).is_none());

    let session = session_from_parts(
        Some(" token ".to_string()),
        Some("user-1".to_string()),
        None,
    )
    .unwrap();
    assert_eq!(session.access_token, "token");
    assert_eq!(session.user_id().unwrap(), "user-1");
    assert!(!session.is_expired());

    let expired = session_from_parts(
        Some("token".to_string()),
        Some("user-1".to_string()),
        Some(0),
    )
    .unwrap();
    assert!(expired.is_expired());
}

#[test]
fn format_timestamp_returns_utc_label() {
    let timestamp = Utc.timestamp_opt(0, 0).unwrap();
    assert_eq!(format_timestamp(timestamp), "1970-01-01 00:00:00 UTC");
}

#[test]
fn outbox_lines_include_failure_details() {
    let entries = vec![OutboxEntry {
        id: "entry-1".to_string(),
        entity_type: EntityType::Task,
        entity_id: "task-1".to_string(),
        operation: OutboxOperation::Update,
        payload: serde_json::json!({}),
        created_at: Utc.timestamp_opt(0, 0).unwrap(),
        attempts: 2,
        last_attempt_at: None,
        error: Some("Remote error: HTTP 503".to_string()),
    }];

    let rendered = format_outbox_lines(&entries);
    assert_eq!(rendered.len(), 1);
    assert!(rendered[0].starts_with("update"));
    assert!(rendered[0].contains("tasks"));
    assert!(rendered[0].contains("task-1"));
    assert!(rendered[0].contains("attempts=2"));
    assert!(rendered[0].contains("HTTP 503"));
}

#[test]
fn mapping_lines_skip_unchanged_ids() {
    let mut snapshot = LocalSnapshot::default();
    let mut kept = Context::new("Kept");
    kept.id = "0192f3a4-5b6c-7d8e-9f00-112233445566".to_string();
    let moved = Context::new("Moved");
    snapshot.contexts = vec![kept, moved.clone()];

    let lines = format_mapping_lines(&generate_id_mapping(&snapshot));
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with("contexts"));
    assert!(lines[0].contains(&moved.id));
}

#[test]
fn progress_line_shows_counts_and_error() {
    let progress = MigrationProgress {
        state: MigrationState::Error,
        total_items: 5,
        processed_items: 2,
        current_step: "Uploading tasks".to_string(),
        error: Some("Remote error: HTTP 500".to_string()),
    };
    assert_eq!(
        format_progress(&progress),
        "[2/5] Uploading tasks (error): Remote error: HTTP 500"
    );
}

#[test]
fn storage_health_line_is_readable() {
    let health = focal_core::storage::StorageHealth::from_usage(4 * 1024 * 1024, 5 * 1024 * 1024);
    assert_eq!(
        format_storage_health(&health),
        "Storage warning: 4.0 MiB of 5.0 MiB used (80.0%)"
    );
}

#[cfg_attr(windows, ignore = "libsql integration is flaky on windows CI")]
#[tokio::test(flavor = "current_thread")]
async fn device_id_persists_in_database_file() {
    let tmp = tempdir().unwrap();
    let db_path = tmp.path().join("nested").join("focal.db");

    run_device(&db_path).await.unwrap();

    let store = open_store(&db_path, &SyncConfig::default()).await.unwrap();
    let first = load_or_create_device_id(&store).await.unwrap();
    let second = load_or_create_device_id(&store).await.unwrap();
    assert_eq!(first, second);
}

#[cfg_attr(windows, ignore = "libsql integration is flaky on windows CI")]
#[tokio::test(flavor = "current_thread")]
async fn outbox_written_by_core_is_readable_from_file() {
    let tmp = tempdir().unwrap();
    let db_path = tmp.path().join("focal.db");

    {
        let store = open_store(&db_path, &SyncConfig::default()).await.unwrap();
        let mut outbox = Outbox::new(LogNotifier);
        outbox
            .record_create(&store, &Context::new("Writing"))
            .await
            .unwrap();
        let raw = store.get(keys::OUTBOX).await.unwrap();
        assert!(raw.is_some());
    }

    let store = open_store(&db_path, &SyncConfig::default()).await.unwrap();
    let outbox = Outbox::load(&store, LogNotifier).await;
    let lines = format_outbox_lines(outbox.entries());
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with("create"));
}
