//! Advisory, time-limited ownership of a session's live timer.
//!
//! Claims expire lazily: nothing runs in the background, expiry is checked
//! whenever a claim is evaluated.

use chrono::{DateTime, Duration, Utc};

use super::remote::RemoteStore;
use super::wire::{decode_entity, encode_entity, RowMeta};
use crate::error::{Error, Result};
use crate::models::{EntityType, Session};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimDecision {
    /// No live claim existed; this device now owns the session
    Granted,
    /// This device already held the claim; it is refreshed
    AlreadyOwned,
    /// Another device holds a live claim
    Denied {
        owner: String,
        claimed_at: DateTime<Utc>,
    },
}

impl ClaimDecision {
    pub const fn is_granted(&self) -> bool {
        !matches!(self, Self::Denied { .. })
    }
}

fn claim_is_live(claimed_at: Option<DateTime<Utc>>, now: DateTime<Utc>, timeout: Duration) -> bool {
    claimed_at.is_some_and(|claimed_at| now - claimed_at < timeout)
}

pub fn evaluate_claim(
    session: &Session,
    device_id: &str,
    now: DateTime<Utc>,
    timeout: Duration,
) -> ClaimDecision {
    match session.active_device_id.as_deref() {
        Some(owner) if owner == device_id => ClaimDecision::AlreadyOwned,
        Some(owner) if claim_is_live(session.ownership_claimed_at, now, timeout) => {
            ClaimDecision::Denied {
                owner: owner.to_string(),
                claimed_at: session.ownership_claimed_at.unwrap_or(now),
            }
        }
        _ => ClaimDecision::Granted,
    }
}

/// Whether `device_id` holds a live claim on the session
pub fn is_owned_by(
    session: &Session,
    device_id: &str,
    now: DateTime<Utc>,
    timeout: Duration,
) -> bool {
    session.active_device_id.as_deref() == Some(device_id)
        && claim_is_live(session.ownership_claimed_at, now, timeout)
}

async fn fetch_session<R: RemoteStore>(remote: &R, session_id: &str) -> Result<Session> {
    let row = remote
        .fetch(EntityType::Session, session_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("session {session_id}")))?;
    decode_entity(row)
}

/// Claim the remote session for `meta.device_id` at `now`, writing the claim
/// back unless another device holds a live one.
pub async fn claim_session_ownership<R: RemoteStore>(
    remote: &R,
    meta: &RowMeta,
    session_id: &str,
    now: DateTime<Utc>,
    timeout: Duration,
) -> Result<ClaimDecision> {
    let mut session = fetch_session(remote, session_id).await?;
    let decision = evaluate_claim(&session, &meta.device_id, now, timeout);

    if let ClaimDecision::Denied { owner, .. } = &decision {
        tracing::info!(session_id, owner = %owner, "Session is owned by another device");
        return Ok(decision);
    }

    session.active_device_id = Some(meta.device_id.clone());
    session.ownership_claimed_at = Some(now);
    let row = encode_entity(&session, &meta.clone().at(now))?;
    remote.upsert(EntityType::Session, row).await?;
    tracing::debug!(session_id, device_id = %meta.device_id, "Claimed session ownership");
    Ok(decision)
}

/// Clear the claim if this device holds it. Returns whether anything changed.
pub async fn release_session_ownership<R: RemoteStore>(
    remote: &R,
    meta: &RowMeta,
    session_id: &str,
) -> Result<bool> {
    let mut session = fetch_session(remote, session_id).await?;
    if session.active_device_id.as_deref() != Some(meta.device_id.as_str()) {
        return Ok(false);
    }

    session.active_device_id = None;
    session.ownership_claimed_at = None;
    remote
        .upsert(EntityType::Session, encode_entity(&session, meta)?)
        .await?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_OWNERSHIP_TIMEOUT_MINUTES;
    use crate::models::ContextAllocation;
    use crate::sync::remote::MemoryRemoteStore;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn timeout() -> Duration {
        Duration::minutes(DEFAULT_OWNERSHIP_TIMEOUT_MINUTES)
    }

    fn owned_session(owner: &str, claimed_at: DateTime<Utc>) -> Session {
        let mut session = Session::start(vec![ContextAllocation::new("ctx-1", 25)]);
        session.active_device_id = Some(owner.to_string());
        session.ownership_claimed_at = Some(claimed_at);
        session
    }

    #[test]
    fn unclaimed_session_is_granted() {
        let session = Session::start(Vec::new());
        assert_eq!(
            evaluate_claim(&session, "device-a", Utc::now(), timeout()),
            ClaimDecision::Granted
        );
    }

    #[test]
    fn live_foreign_claim_is_denied() {
        let now = Utc::now();
        let claimed_at = now - Duration::minutes(29);
        let session = owned_session("device-b", claimed_at);

        assert_eq!(
            evaluate_claim(&session, "device-a", now, timeout()),
            ClaimDecision::Denied {
                owner: "device-b".to_string(),
                claimed_at,
            }
        );
        assert!(is_owned_by(&session, "device-b", now, timeout()));
        assert!(!is_owned_by(&session, "device-a", now, timeout()));
    }

    #[test]
    fn expired_claim_can_be_taken_over() {
        let now = Utc::now();
        let session = owned_session("device-b", now - Duration::minutes(30));

        assert_eq!(
            evaluate_claim(&session, "device-a", now, timeout()),
            ClaimDecision::Granted
        );
        assert!(!is_owned_by(&session, "device-b", now, timeout()));
    }

    #[test]
    fn own_claim_is_already_owned() {
        let now = Utc::now();
        let session = owned_session("device-a", now - Duration::hours(2));
        assert_eq!(
            evaluate_claim(&session, "device-a", now, timeout()),
            ClaimDecision::AlreadyOwned
        );
    }

    #[tokio::test]
    async fn claim_and_release_round_trip_through_remote() {
        let remote = MemoryRemoteStore::new();
        let session = Session::start(vec![ContextAllocation::new("ctx-1", 25)]);
        let seed = RowMeta::new("user-1", "device-b");
        remote
            .upsert(EntityType::Session, encode_entity(&session, &seed).unwrap())
            .await
            .unwrap();

        let now = Utc::now();
        let meta_a = RowMeta::new("user-1", "device-a");
        let decision = claim_session_ownership(&remote, &meta_a, &session.id, now, timeout())
            .await
            .unwrap();
        assert_eq!(decision, ClaimDecision::Granted);

        let meta_b = RowMeta::new("user-1", "device-b");
        let decision = claim_session_ownership(&remote, &meta_b, &session.id, now, timeout())
            .await
            .unwrap();
        assert!(!decision.is_granted());

        assert!(!release_session_ownership(&remote, &meta_b, &session.id)
            .await
            .unwrap());
        assert!(release_session_ownership(&remote, &meta_a, &session.id)
            .await
            .unwrap());

        let decision = claim_session_ownership(&remote, &meta_b, &session.id, now, timeout())
            .await
            .unwrap();
        assert_eq!(decision, ClaimDecision::Granted);
    }

    #[tokio::test]
    async fn stale_claim_is_taken_over_at_the_supplied_time() {
        let remote = MemoryRemoteStore::new();
        let claimed_at = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        let session = owned_session("device-b", claimed_at);
        let seed = RowMeta::new("user-1", "device-b").at(claimed_at);
        remote
            .upsert(EntityType::Session, encode_entity(&session, &seed).unwrap())
            .await
            .unwrap();

        let meta = RowMeta::new("user-1", "device-a");
        let early = claimed_at + Duration::minutes(29);
        let decision = claim_session_ownership(&remote, &meta, &session.id, early, timeout())
            .await
            .unwrap();
        assert!(!decision.is_granted());

        let late = claimed_at + Duration::minutes(31);
        let decision = claim_session_ownership(&remote, &meta, &session.id, late, timeout())
            .await
            .unwrap();
        assert_eq!(decision, ClaimDecision::Granted);

        let row = remote
            .fetch(EntityType::Session, &session.id)
            .await
            .unwrap()
            .unwrap();
        let stored: Session = decode_entity(row).unwrap();
        assert_eq!(stored.active_device_id.as_deref(), Some("device-a"));
        assert_eq!(stored.ownership_claimed_at, Some(late));
    }

    #[tokio::test]
    async fn missing_session_is_not_found() {
        let remote = MemoryRemoteStore::new();
        let meta = RowMeta::new("user-1", "device-a");
        assert!(matches!(
            claim_session_ownership(&remote, &meta, "nope", Utc::now(), timeout()).await,
            Err(Error::NotFound(_))
        ));
    }
}
