//! Persisted grant records and their store keys

pub mod credential;

use crate::models::{AccessDescriptor, ClientRef, InteractFinish};
use chrono::{DateTime, TimeDelta, Utc};
use credential::GrantId;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Name of the store collection holding grant records
pub const GRANT_STORE_NAME: &str = "gnap";

/// Longest lifetime accepted for a pending grant or an access token (ten years)
pub const MAX_LIFETIME_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Rejected grant or token lifetime
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum LifetimeError {
    #[error("lifetime must be at least one second")]
    Zero,
    #[error("lifetime of {0}s exceeds the maximum of {max}s", max = MAX_LIFETIME_SECS)]
    TooLong(u64),
}

/// Converts a lifetime in seconds into a delta that can be added to the
/// current time without overflowing.
pub fn checked_lifetime(secs: u64) -> Result<TimeDelta, LifetimeError> {
    if secs == 0 {
        return Err(LifetimeError::Zero);
    }
    if secs > MAX_LIFETIME_SECS {
        return Err(LifetimeError::TooLong(secs));
    }
    i64::try_from(secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .ok_or(LifetimeError::TooLong(secs))
}

/// Store TTL of a record living from `start` until `end`
fn record_ttl(start: DateTime<Utc>, end: DateTime<Utc>) -> Duration {
    (end - start).to_std().unwrap_or_default()
}

/// Store key of a pending grant
pub fn pending_key(grant_id: &GrantId) -> String {
    format!("pending:{grant_id}")
}

/// Store key of an issued access grant, from the token digest
pub fn token_key(token_digest: &str) -> String {
    format!("token:{token_digest}")
}

/// Progress of the resource-owner interaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionState {
    Pending,
    Completed,
}

/// Grant waiting for the resource owner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingGrant {
    pub grant_id: String,
    /// SHA-256 digest of the continuation secret
    pub continue_digest: String,
    /// Rights resolved by the policy when the grant was requested
    pub access: Vec<AccessDescriptor>,
    pub label: Option<String>,
    pub client: Option<ClientRef>,
    /// Lifetime of the token that will be issued, when the policy set one
    pub expires_in: Option<u64>,
    pub finish: Option<InteractFinish>,
    pub server_nonce: String,
    pub state: InteractionState,
    /// Set when the interaction completed
    pub interact_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl PendingGrant {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// How long the store keeps the record: the interaction window
    pub fn store_ttl(&self) -> Duration {
        record_ttl(self.created_at, self.expires_at)
    }
}

/// Finalized grant, looked up by token digest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessGrant {
    pub access: Vec<AccessDescriptor>,
    pub label: Option<String>,
    pub client: Option<ClientRef>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl AccessGrant {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(true, |expires_at| now < expires_at)
    }

    /// How long the store keeps the record; tokens without expiry are kept
    /// until deleted
    pub fn store_ttl(&self) -> Option<Duration> {
        self.expires_at
            .map(|expires_at| record_ttl(self.issued_at, expires_at))
    }

    /// Seconds left until expiry, as reported to the client at issuance
    pub fn expires_in(&self) -> Option<u64> {
        self.expires_at
            .map(|expires_at| (expires_at - self.issued_at).num_seconds().max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn access_grant(expires_at: Option<DateTime<Utc>>) -> AccessGrant {
        AccessGrant {
            access: vec![],
            label: None,
            client: None,
            issued_at: Utc::now(),
            expires_at,
        }
    }

    #[test]
    fn test_access_grant_expiry() {
        let now = Utc::now();
        assert!(access_grant(None).is_active(now));
        assert!(access_grant(Some(now + Duration::seconds(10))).is_active(now));
        assert!(!access_grant(Some(now)).is_active(now));
    }

    #[test]
    fn test_expires_in_is_relative_to_issuance() {
        let mut grant = access_grant(None);
        assert_eq!(grant.expires_in(), None);
        grant.expires_at = Some(grant.issued_at + Duration::seconds(300));
        assert_eq!(grant.expires_in(), Some(300));
    }

    #[test]
    fn test_store_ttl_follows_expiry() {
        let mut grant = access_grant(None);
        assert_eq!(grant.store_ttl(), None);

        grant.expires_at = Some(grant.issued_at + Duration::seconds(7200));
        assert_eq!(grant.store_ttl(), Some(std::time::Duration::from_secs(7200)));

        grant.expires_at = Some(grant.issued_at - Duration::seconds(1));
        assert_eq!(grant.store_ttl(), Some(std::time::Duration::ZERO));
    }

    #[test]
    fn test_checked_lifetime() {
        assert_eq!(checked_lifetime(300), Ok(TimeDelta::seconds(300)));
        assert_eq!(
            checked_lifetime(MAX_LIFETIME_SECS),
            Ok(TimeDelta::seconds(MAX_LIFETIME_SECS as i64))
        );
        assert_eq!(checked_lifetime(0), Err(LifetimeError::Zero));
        assert_eq!(
            checked_lifetime(MAX_LIFETIME_SECS + 1),
            Err(LifetimeError::TooLong(MAX_LIFETIME_SECS + 1))
        );
        assert_eq!(
            checked_lifetime(10_000_000_000_000_000),
            Err(LifetimeError::TooLong(10_000_000_000_000_000))
        );
        assert_eq!(checked_lifetime(u64::MAX), Err(LifetimeError::TooLong(u64::MAX)));
    }

    #[test]
    fn test_keys_are_namespaced() {
        let grant_id = GrantId::parse("AAAAAAAAAAAAAAAAAAAAAA").unwrap();
        assert_eq!(pending_key(&grant_id), "pending:AAAAAAAAAAAAAAAAAAAAAA");
        assert_eq!(token_key("abc"), "token:abc");
    }
}
