//! Authenticated session handed to the sync core by the identity provider.
//!
//! Sign-in and token refresh live outside this crate; the core only needs to
//! know who the user is and whether the access token is still usable.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::util::unix_timestamp_now;

const EXPIRY_SKEW_SECONDS: i64 = 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    pub email: Option<String>,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: String,
    /// Unix seconds
    pub expires_at: i64,
    pub user: AuthUser,
}

impl AuthSession {
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at <= unix_timestamp_now() + EXPIRY_SKEW_SECONDS
    }

    /// The user id, provided the session is still usable
    pub fn user_id(&self) -> Result<&str> {
        if self.is_expired() || self.access_token.trim().is_empty() {
            return Err(Error::NotAuthenticated);
        }
        let user_id = self.user.id.trim();
        if user_id.is_empty() {
            return Err(Error::NotAuthenticated);
        }
        Ok(user_id)
    }
}

impl fmt::Debug for AuthSession {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("AuthSession")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("user", &self.user)
            .finish()
    }
}

/// Require a live session before touching the remote store.
pub fn require_session(session: Option<&AuthSession>) -> Result<&AuthSession> {
    let session = session.ok_or(Error::NotAuthenticated)?;
    session.user_id()?;
    Ok(session)
}
