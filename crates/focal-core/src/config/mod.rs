//! Sync configuration shared by every client.
//!
//! Holds the public remote endpoints plus the tunables of the sync core:
//! reconnect backoff, the local storage quota used when the platform cannot
//! report one, and the session ownership timeout.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::util::{has_http_scheme, trimmed_non_empty};

pub const DEFAULT_RECONNECT_BASE_DELAY_MS: u64 = 1_000;
pub const DEFAULT_RECONNECT_MAX_ATTEMPTS: u32 = 5;
/// Typical browser local storage allowance
pub const DEFAULT_STORAGE_QUOTA_BYTES: u64 = 5 * 1024 * 1024;
pub const DEFAULT_OWNERSHIP_TIMEOUT_MINUTES: i64 = 30;

/// Client configuration.
///
/// Only public values belong here (project URL, anon key). Access tokens come
/// from the authenticated session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    #[serde(default)]
    pub supabase_url: Option<String>,
    #[serde(default)]
    pub supabase_anon_key: Option<String>,
    #[serde(default = "default_reconnect_base_delay_ms")]
    pub reconnect_base_delay_ms: u64,
    #[serde(default = "default_reconnect_max_attempts")]
    pub reconnect_max_attempts: u32,
    #[serde(default = "default_storage_quota_bytes")]
    pub storage_quota_bytes: u64,
    #[serde(default = "default_ownership_timeout_minutes")]
    pub ownership_timeout_minutes: i64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            supabase_url: None,
            supabase_anon_key: None,
            reconnect_base_delay_ms: DEFAULT_RECONNECT_BASE_DELAY_MS,
            reconnect_max_attempts: DEFAULT_RECONNECT_MAX_ATTEMPTS,
            storage_quota_bytes: DEFAULT_STORAGE_QUOTA_BYTES,
            ownership_timeout_minutes: DEFAULT_OWNERSHIP_TIMEOUT_MINUTES,
        }
    }
}

impl SyncConfig {
    /// Check field values, normalizing the remote endpoint.
    pub fn validated(mut self) -> Result<Self, String> {
        self.supabase_url = match trimmed_non_empty(self.supabase_url.take()) {
            Some(url) if has_http_scheme(&url) => Some(url.trim_end_matches('/').to_string()),
            Some(_) => return Err("supabase_url must include http:// or https://".to_string()),
            None => None,
        };
        self.supabase_anon_key = trimmed_non_empty(self.supabase_anon_key.take());

        if self.supabase_url.is_some() != self.supabase_anon_key.is_some() {
            return Err("supabase_url and supabase_anon_key must be set together".to_string());
        }
        if self.reconnect_base_delay_ms == 0 {
            return Err("reconnect_base_delay_ms must be greater than zero".to_string());
        }
        if self.storage_quota_bytes == 0 {
            return Err("storage_quota_bytes must be greater than zero".to_string());
        }
        if self.ownership_timeout_minutes <= 0 {
            return Err("ownership_timeout_minutes must be greater than zero".to_string());
        }
        Ok(self)
    }

    /// Whether a remote project is configured
    pub const fn is_remote_configured(&self) -> bool {
        self.supabase_url.is_some() && self.supabase_anon_key.is_some()
    }

    /// REST endpoint of the remote project (`{supabase_url}/rest/v1`)
    pub fn remote_base_url(&self) -> Option<String> {
        self.supabase_url
            .as_deref()
            .map(|url| format!("{}/rest/v1", url.trim_end_matches('/')))
    }

    pub const fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            base_delay: Duration::from_millis(self.reconnect_base_delay_ms),
            max_attempts: self.reconnect_max_attempts,
        }
    }

    pub fn ownership_timeout(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.ownership_timeout_minutes)
    }
}

/// Parse and validate a JSON config payload.
pub fn parse_sync_config(payload: &str) -> Result<SyncConfig, String> {
    let config: SyncConfig = serde_json::from_str(payload)
        .map_err(|error| format!("invalid sync config JSON: {error}"))?;
    config.validated()
}

/// Exponential backoff for realtime reconnects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    /// Reconnects attempted before giving up
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        SyncConfig::default().reconnect_policy()
    }
}

impl ReconnectPolicy {
    /// `base_delay * 2^attempt`, saturating
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay.checked_mul(factor).unwrap_or(Duration::MAX)
    }
}

const fn default_reconnect_base_delay_ms() -> u64 {
    DEFAULT_RECONNECT_BASE_DELAY_MS
}

const fn default_reconnect_max_attempts() -> u32 {
    DEFAULT_RECONNECT_MAX_ATTEMPTS
}

const fn default_storage_quota_bytes() -> u64 {
    DEFAULT_STORAGE_QUOTA_BYTES
}

const fn default_ownership_timeout_minutes() -> i64 {
    DEFAULT_OWNERSHIP_TIMEOUT_MINUTES
}
