//! CLI configuration resolved from a config file and environment.

use std::env;
use std::path::{Path, PathBuf};

use focal_core::auth::{AuthSession, AuthUser};
use focal_core::config::{parse_sync_config, SyncConfig};
use focal_core::util::{trimmed_non_empty, unix_timestamp_now};

use crate::error::CliError;

pub const CONFIG_ENV: &str = "FOCAL_CONFIG";
pub const DB_PATH_ENV: &str = "FOCAL_DB_PATH";
pub const SUPABASE_URL_ENV: &str = "FOCAL_SUPABASE_URL";
pub const SUPABASE_ANON_KEY_ENV: &str = "FOCAL_SUPABASE_ANON_KEY";
pub const ACCESS_TOKEN_ENV: &str = "FOCAL_ACCESS_TOKEN";
pub const USER_ID_ENV: &str = "FOCAL_USER_ID";
pub const TOKEN_EXPIRES_AT_ENV: &str = "FOCAL_TOKEN_EXPIRES_AT";

/// Lifetime assumed for an env-provided token without an explicit expiry
const DEFAULT_TOKEN_LIFETIME_SECONDS: i64 = 3600;

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os(DB_PATH_ENV).map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("focal")
        .join("focal.db")
}

fn env_text(name: &str) -> Option<String> {
    trimmed_non_empty(env::var(name).ok())
}

/// Load the sync config from `FOCAL_CONFIG` (if set) with env overrides
pub fn load_sync_config() -> Result<SyncConfig, CliError> {
    let file_payload = match env_text(CONFIG_ENV) {
        Some(path) => Some(read_config_file(Path::new(&path))?),
        None => None,
    };
    sync_config_from_sources(
        file_payload.as_deref(),
        env_text(SUPABASE_URL_ENV),
        env_text(SUPABASE_ANON_KEY_ENV),
    )
}

fn read_config_file(path: &Path) -> Result<String, CliError> {
    std::fs::read_to_string(path).map_err(|error| {
        CliError::Config(format!("cannot read {}: {error}", path.display()))
    })
}

/// Merge a JSON config payload with explicit endpoint overrides
pub fn sync_config_from_sources(
    file_payload: Option<&str>,
    supabase_url: Option<String>,
    supabase_anon_key: Option<String>,
) -> Result<SyncConfig, CliError> {
    let mut config = match file_payload {
        Some(payload) => parse_sync_config(payload).map_err(CliError::Config)?,
        None => SyncConfig::default(),
    };
    if supabase_url.is_some() {
        config.supabase_url = supabase_url;
    }
    if supabase_anon_key.is_some() {
        config.supabase_anon_key = supabase_anon_key;
    }
    config.validated().map_err(CliError::Config)
}

/// Session handed over through the environment, if any
pub fn session_from_env() -> Result<Option<AuthSession>, CliError> {
    let expires_at = match env_text(TOKEN_EXPIRES_AT_ENV) {
        Some(raw) => Some(raw.parse::<i64>().map_err(|_| {
            CliError::Config(format!("{TOKEN_EXPIRES_AT_ENV} must be unix seconds"))
        })?),
        None => None,
    };
    Ok(session_from_parts(
        env_text(ACCESS_TOKEN_ENV),
        env_text(USER_ID_ENV),
        expires_at,
    ))
}

pub fn session_from_parts(
    access_token: Option<String>,
    user_id: Option<String>,
    expires_at: Option<i64>,
) -> Option<AuthSession> {
    let access_token = trimmed_non_empty(access_token)?;
    let user_id = trimmed_non_empty(user_id)?;
    Some(AuthSession {
        access_token,
        refresh_token: String::new(),
        expires_at: expires_at
            .unwrap_or_else(|| unix_timestamp_now() + DEFAULT_TOKEN_LIFETIME_SECONDS),
        user: AuthUser {
            id: user_id,
            email: None,
        },
    })
}
