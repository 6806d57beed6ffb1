//! Remote row store used for uploads and reconciliation.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;

use crate::auth::AuthSession;
use crate::error::{Error, Result};
use crate::models::EntityType;
use crate::util::{has_http_scheme, trimmed_non_empty};

/// Table-oriented remote store, scoped to the signed-in user
#[allow(async_fn_in_trait)]
pub trait RemoteStore {
    /// Insert or replace a row keyed by its `id`
    async fn upsert(&self, entity_type: EntityType, row: Value) -> Result<()>;

    /// Fetch one row by id
    async fn fetch(&self, entity_type: EntityType, id: &str) -> Result<Option<Value>>;

    /// Fetch every row visible to the user
    async fn fetch_all(&self, entity_type: EntityType) -> Result<Vec<Value>>;
}

impl<R: RemoteStore + ?Sized> RemoteStore for &R {
    async fn upsert(&self, entity_type: EntityType, row: Value) -> Result<()> {
        (**self).upsert(entity_type, row).await
    }

    async fn fetch(&self, entity_type: EntityType, id: &str) -> Result<Option<Value>> {
        (**self).fetch(entity_type, id).await
    }

    async fn fetch_all(&self, entity_type: EntityType) -> Result<Vec<Value>> {
        (**self).fetch_all(entity_type).await
    }
}

/// PostgREST-style client (`{base}/rest/v1/{table}`)
#[derive(Clone)]
pub struct RestRemoteStore {
    base_url: String,
    anon_key: String,
    access_token: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for RestRemoteStore {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("RestRemoteStore")
            .field("base_url", &self.base_url)
            .field("anon_key", &"[REDACTED]")
            .field("access_token", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl RestRemoteStore {
    pub fn new(
        base_url: impl Into<String>,
        anon_key: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Result<Self> {
        let base_url = normalize_base_url(base_url.into())?;
        let anon_key = trimmed_non_empty(Some(anon_key.into()))
            .ok_or_else(|| Error::InvalidInput("anon key must not be empty".to_string()))?;
        let access_token = trimmed_non_empty(Some(access_token.into()))
            .ok_or(Error::NotAuthenticated)?;

        Ok(Self {
            base_url,
            anon_key,
            access_token,
            client: reqwest::Client::builder().build()?,
        })
    }

    /// Build a client for the session's bearer token
    pub fn for_session(
        base_url: impl Into<String>,
        anon_key: impl Into<String>,
        session: &AuthSession,
    ) -> Result<Self> {
        session.user_id()?;
        Self::new(base_url, anon_key, session.access_token.clone())
    }

    fn table_url(&self, entity_type: EntityType) -> String {
        format!("{}/{}", self.base_url, entity_type.table_name())
    }

    fn request(&self, method: reqwest::Method, entity_type: EntityType) -> reqwest::RequestBuilder {
        self.client
            .request(method, self.table_url(entity_type))
            .header("apikey", &self.anon_key)
            .bearer_auth(&self.access_token)
            .header("Accept", "application/json")
    }

    async fn rows(response: reqwest::Response) -> Result<Vec<Value>> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Remote(parse_api_error(status, &body)));
        }
        Ok(response.json::<Vec<Value>>().await?)
    }
}

impl RemoteStore for RestRemoteStore {
    async fn upsert(&self, entity_type: EntityType, row: Value) -> Result<()> {
        let response = self
            .request(reqwest::Method::POST, entity_type)
            .query(&[("on_conflict", "id")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&row)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Remote(parse_api_error(status, &body)));
        }
        Ok(())
    }

    async fn fetch(&self, entity_type: EntityType, id: &str) -> Result<Option<Value>> {
        let response = self
            .request(reqwest::Method::GET, entity_type)
            .query(&[("select", "*".to_string()), ("id", format!("eq.{id}"))])
            .send()
            .await?;
        Ok(Self::rows(response).await?.into_iter().next())
    }

    async fn fetch_all(&self, entity_type: EntityType) -> Result<Vec<Value>> {
        let response = self
            .request(reqwest::Method::GET, entity_type)
            .query(&[("select", "*")])
            .send()
            .await?;
        Self::rows(response).await
    }
}

#[derive(Debug, Deserialize)]
struct RemoteErrorBody {
    error: Option<String>,
    message: Option<String>,
    details: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<RemoteErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error).or(payload.details) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

fn normalize_base_url(raw: String) -> Result<String> {
    let base_url = trimmed_non_empty(Some(raw))
        .ok_or_else(|| Error::InvalidInput("remote URL must not be empty".to_string()))?;
    if has_http_scheme(&base_url) {
        Ok(base_url.trim_end_matches('/').to_string())
    } else {
        Err(Error::InvalidInput(
            "remote URL must include http:// or https://".to_string(),
        ))
    }
}

/// In-process remote store for offline tooling and tests.
///
/// Tables can be marked as failing to exercise error paths.
#[derive(Debug, Default)]
pub struct MemoryRemoteStore {
    rows: Mutex<BTreeMap<(&'static str, String), Value>>,
    failing: Mutex<HashSet<EntityType>>,
    upserts: Mutex<Vec<(EntityType, String)>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call against `entity_type` fail
    pub fn fail_on(&self, entity_type: EntityType) {
        lock(&self.failing).insert(entity_type);
    }

    pub fn recover(&self, entity_type: EntityType) {
        lock(&self.failing).remove(&entity_type);
    }

    /// Upserted `(table, id)` pairs in call order
    pub fn upserts(&self) -> Vec<(EntityType, String)> {
        lock(&self.upserts).clone()
    }

    /// Seed a row directly, bypassing the upsert log
    pub fn insert(&self, entity_type: EntityType, row: Value) -> Result<()> {
        let id = row_id(entity_type, &row)?;
        lock(&self.rows).insert((entity_type.table_name(), id), row);
        Ok(())
    }

    fn check(&self, entity_type: EntityType) -> Result<()> {
        if lock(&self.failing).contains(&entity_type) {
            Err(Error::Remote(format!("{entity_type} is unavailable")))
        } else {
            Ok(())
        }
    }
}

fn row_id(entity_type: EntityType, row: &Value) -> Result<String> {
    row.get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::MalformedRow {
            table: entity_type.table_name(),
            reason: "row has no string id".to_string(),
        })
}

impl RemoteStore for MemoryRemoteStore {
    async fn upsert(&self, entity_type: EntityType, row: Value) -> Result<()> {
        self.check(entity_type)?;
        let id = row_id(entity_type, &row)?;
        lock(&self.upserts).push((entity_type, id.clone()));
        lock(&self.rows).insert((entity_type.table_name(), id), row);
        Ok(())
    }

    async fn fetch(&self, entity_type: EntityType, id: &str) -> Result<Option<Value>> {
        self.check(entity_type)?;
        Ok(lock(&self.rows)
            .get(&(entity_type.table_name(), id.to_string()))
            .cloned())
    }

    async fn fetch_all(&self, entity_type: EntityType) -> Result<Vec<Value>> {
        self.check(entity_type)?;
        Ok(lock(&self.rows)
            .iter()
            .filter(|((table, _), _)| *table == entity_type.table_name())
            .map(|(_, row)| row.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn base_url_must_be_http() {
        assert!(RestRemoteStore::new("", "anon", "token").is_err());
        assert!(RestRemoteStore::new("example.supabase.co", "anon", "token").is_err());
        assert!(matches!(
            RestRemoteStore::new("https://example.supabase.co/rest/v1", "anon", " "),
            Err(Error::NotAuthenticated)
        ));

        let store =
            RestRemoteStore::new("https://example.supabase.co/rest/v1/", "anon", "token").unwrap();
        assert_eq!(
            store.table_url(EntityType::Task),
            "https://example.supabase.co/rest/v1/tasks"
        );
    }

    #[test]
    fn debug_redacts_credentials() {
        let url = "https://example.supabase.co";
        let store = RestRemoteStore::new(url, "anon-secret", "jwt-secret").unwrap();
        let debug = format!("{store:?}");
        assert!(!debug.contains("anon-secret"));
        assert!(!debug.contains("jwt-secret"));
    }

    #[test]
    fn api_error_prefers_message_field() {
        let body = r#"{"code":"42501","message":"new row violates row-level security policy"}"#;
        assert_eq!(
            parse_api_error(StatusCode::FORBIDDEN, body),
            "new row violates row-level security policy (403)"
        );
        assert_eq!(parse_api_error(StatusCode::BAD_GATEWAY, ""), "HTTP 502");
        assert_eq!(
            parse_api_error(StatusCode::BAD_REQUEST, "plain failure"),
            "plain failure (400)"
        );
    }

    #[tokio::test]
    async fn memory_remote_upserts_and_fails_on_demand() {
        let remote = MemoryRemoteStore::new();
        remote
            .upsert(EntityType::Context, json!({ "id": "c1", "name": "Work" }))
            .await
            .unwrap();
        remote
            .upsert(
                EntityType::Context,
                json!({ "id": "c1", "name": "Deep Work" }),
            )
            .await
            .unwrap();

        let row = remote
            .fetch(EntityType::Context, "c1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row["name"], json!("Deep Work"));
        let contexts = remote.fetch_all(EntityType::Context).await.unwrap();
        assert_eq!(contexts.len(), 1);
        let tasks = remote.fetch_all(EntityType::Task).await.unwrap();
        assert!(tasks.is_empty());

        remote.fail_on(EntityType::Context);
        assert!(remote.fetch(EntityType::Context, "c1").await.is_err());
        remote.recover(EntityType::Context);
        assert!(remote.fetch(EntityType::Context, "c1").await.is_ok());
    }
}
