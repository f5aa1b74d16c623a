//! Session tokens and their shared store

use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::ClientError;

/// How close to expiry a session is considered due for a refresh.
const REFRESH_WINDOW_SECS: i64 = 600;

/// The current access/refresh/transfer token bundle and its expiry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub transfer_token: String,
    /// Absolute expiry, epoch seconds. Zero when unauthenticated.
    pub expires: i64,
}

impl Session {
    /// True when both tokens are present and an expiry is known.
    pub fn is_authorized(&self) -> bool {
        !self.access_token.is_empty() && !self.refresh_token.is_empty() && self.expires > 0
    }

    /// True when fewer than ten minutes remain before expiry.
    pub fn should_refresh_soon(&self) -> bool {
        self.should_refresh_at(Utc::now().timestamp())
    }

    /// Pure variant of [`Session::should_refresh_soon`] for an explicit
    /// clock value.
    pub fn should_refresh_at(&self, now_epoch_secs: i64) -> bool {
        self.expires - now_epoch_secs < REFRESH_WINDOW_SECS
    }
}

#[derive(Debug, Default, Deserialize)]
struct AuthBody {
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    refresh_token: String,
    #[serde(default)]
    transfer_token: String,
    /// Absolute expiry, epoch seconds
    expires: Option<i64>,
    /// Relative expiry, seconds from now
    expires_in: Option<i64>,
}

/// Shared, lock-guarded holder of the current [`Session`].
///
/// Every outgoing request reads it at send time to stamp the
/// Authorization header; every completed auth exchange replaces it
/// wholesale. It is injected into the [`crate::Client`] rather than
/// living in a process-wide global so tests can run isolated clients.
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    inner: Arc<RwLock<Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A consistent copy of the current session.
    pub fn snapshot(&self) -> Session {
        self.inner.read().clone()
    }

    /// The current access token, if one is set.
    pub fn access_token(&self) -> Option<String> {
        let session = self.inner.read();
        if session.access_token.is_empty() {
            None
        } else {
            Some(session.access_token.clone())
        }
    }

    /// The current refresh token, if one is set.
    pub fn refresh_token(&self) -> Option<String> {
        let session = self.inner.read();
        if session.refresh_token.is_empty() {
            None
        } else {
            Some(session.refresh_token.clone())
        }
    }

    pub fn is_authorized(&self) -> bool {
        self.inner.read().is_authorized()
    }

    pub fn should_refresh_soon(&self) -> bool {
        self.inner.read().should_refresh_soon()
    }

    /// Replace the session from a raw auth response body.
    ///
    /// The body carries either an absolute `expires` or a relative
    /// `expires_in`. On a malformed body the session is reset wholesale,
    /// never left half-applied.
    pub fn set_from_json(&self, body: &str) -> Result<Session, ClientError> {
        let parsed: AuthBody = match serde_json::from_str(body) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!("malformed auth response, resetting session: {err}");
                self.clear();
                return Err(ClientError::Decode(format!("auth response: {err}")));
            }
        };

        let expires = match (parsed.expires, parsed.expires_in) {
            (Some(absolute), _) => absolute,
            (None, Some(relative)) => Utc::now().timestamp() + relative,
            (None, None) => 0,
        };

        let session = Session {
            access_token: parsed.access_token,
            refresh_token: parsed.refresh_token,
            transfer_token: parsed.transfer_token,
            expires,
        };
        debug!(authorized = session.is_authorized(), "session replaced");
        *self.inner.write() = session.clone();
        Ok(session)
    }

    /// Restore a persisted session.
    pub fn set_tokens(
        &self,
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        transfer_token: impl Into<String>,
        expires: i64,
    ) {
        let session = Session {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            transfer_token: transfer_token.into(),
            expires,
        };
        *self.inner.write() = session;
    }

    /// Drop all tokens.
    pub fn clear(&self) {
        *self.inner.write() = Session::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_round_trip_with_relative_expiry() {
        let store = SessionStore::new();
        let session = store
            .set_from_json(r#"{"access_token":"a","refresh_token":"b","expires_in":3600}"#)
            .unwrap();

        assert!(session.is_authorized());
        assert!(!session.should_refresh_soon());

        // Advance the clock to within the refresh window: refresh is due
        // but the session stays authorized.
        let now = Utc::now().timestamp();
        assert!(session.should_refresh_at(now + 3001));
        assert!(session.is_authorized());
    }

    #[test]
    fn test_absolute_expiry_wins_over_relative() {
        let store = SessionStore::new();
        let session = store
            .set_from_json(
                r#"{"access_token":"a","refresh_token":"b","expires":1500000000,"expires_in":3600}"#,
            )
            .unwrap();
        assert_eq!(session.expires, 1_500_000_000);
    }

    #[test]
    fn test_malformed_body_resets_the_session() {
        let store = SessionStore::new();
        store.set_tokens("a", "b", "", 2_000_000_000);
        assert!(store.is_authorized());

        let err = store.set_from_json("definitely { not json");
        assert!(matches!(err, Err(ClientError::Decode(_))));
        assert_eq!(store.snapshot(), Session::default());
        assert!(!store.is_authorized());
    }

    #[test]
    fn test_missing_tokens_leave_session_unauthorized() {
        let store = SessionStore::new();
        let session = store.set_from_json(r#"{"expires_in":3600}"#).unwrap();
        assert!(!session.is_authorized());
        assert!(store.access_token().is_none());
        assert!(store.refresh_token().is_none());
    }

    #[test]
    fn test_transfer_token_is_captured() {
        let store = SessionStore::new();
        let session = store
            .set_from_json(
                r#"{"access_token":"a","refresh_token":"b","transfer_token":"t","expires_in":60}"#,
            )
            .unwrap();
        assert_eq!(session.transfer_token, "t");
    }

    #[test]
    fn test_set_tokens_restores_a_persisted_session() {
        let store = SessionStore::new();
        store.set_tokens("acc", "ref", "tra", 2_000_000_000);
        let session = store.snapshot();
        assert!(session.is_authorized());
        assert_eq!(store.access_token().as_deref(), Some("acc"));
        assert_eq!(store.refresh_token().as_deref(), Some("ref"));

        store.clear();
        assert!(!store.is_authorized());
    }
}
