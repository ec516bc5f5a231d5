//! Session data model and the session-lookup collaborator contract.
//!
//! A [`Session`] only exists when both lookups succeed: the collaborator
//! knows the [`Principal`] *and* can hand out a non-expired [`Credential`]
//! for it.  Anything less is treated as "no session" by the gateway.

use crate::error::SessionError;
use crate::forwarding::SessionCookie;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, OnceLock, PoisonError};

// ─────────────────────────────────────────────────────────────────────────────
// Principal / Credential / Session
// ─────────────────────────────────────────────────────────────────────────────

/// Authenticated identity attached to a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Opaque, stable identifier (e.g. the Supabase user UUID).
    pub id: String,
    /// Contact e-mail, when the identity provider exposes one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl Principal {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

/// Short-lived bearer token proving the principal's identity to a backend.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    token: String,
    expires_at: DateTime<Utc>,
}

impl Credential {
    pub fn new(token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            expires_at,
        }
    }

    /// The raw bearer token.
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// `true` once `now` has reached the expiry instant.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Seconds of validity left at `now`, clamped to zero.
    pub fn remaining_secs_at(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_seconds().max(0)
    }
}

// Tokens must never end up in logs.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// A principal together with its current credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub principal: Principal,
    pub credential: Credential,
}

impl Session {
    pub fn new(principal: Principal, credential: Credential) -> Self {
        Self {
            principal,
            credential,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Request view
// ─────────────────────────────────────────────────────────────────────────────

/// The parts of an inbound request a session lookup is allowed to see.
///
/// Built once per request by the gateway.  The `resolved` slot lets a
/// collaborator remember a credential it had to refresh during
/// `current_principal` so that `current_credential` hands back the same
/// token instead of refreshing twice.  Cookies queued with
/// [`set_response_cookie`](Self::set_response_cookie) are written onto the
/// response, whatever the gateway decides.
#[derive(Debug, Default)]
pub struct RequestCredentials {
    /// Request path without the query string.
    pub path: String,
    /// Cookies sent by the client, by name.
    pub cookies: HashMap<String, String>,
    /// Raw `Authorization` header value, if any.
    pub authorization: Option<String>,
    resolved: OnceLock<Credential>,
    response_cookies: Mutex<Vec<SessionCookie>>,
}

impl RequestCredentials {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Builder helper: parse and merge a raw `Cookie` header.
    ///
    /// Later duplicates of the same cookie name do not overwrite earlier ones,
    /// matching how browsers order the most specific cookie first.
    pub fn with_cookie_header(mut self, header: &str) -> Self {
        for pair in header.split(';') {
            let Some((name, value)) = pair.split_once('=') else {
                continue;
            };
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            self.cookies
                .entry(name.to_string())
                .or_insert_with(|| value.trim().trim_matches('"').to_string());
        }
        self
    }

    /// Builder helper: attach a single cookie.
    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(name.into(), value.into());
        self
    }

    /// Builder helper: attach the `Authorization` header value.
    pub fn with_authorization(mut self, value: impl Into<String>) -> Self {
        self.authorization = Some(value.into());
        self
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    /// Token from an `Authorization: Bearer <token>` header.
    pub fn bearer_token(&self) -> Option<&str> {
        self.authorization
            .as_deref()
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    /// Remember a credential resolved while serving this request.
    /// The first stored value wins.
    pub fn remember_credential(&self, credential: Credential) {
        let _ = self.resolved.set(credential);
    }

    pub fn remembered_credential(&self) -> Option<&Credential> {
        self.resolved.get()
    }

    /// Queue a cookie the response to this request must set.
    pub fn set_response_cookie(&self, cookie: SessionCookie) {
        self.response_cookies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(cookie);
    }

    /// Drain the queued response cookies, in the order they were set.
    pub fn take_response_cookies(&self) -> Vec<SessionCookie> {
        std::mem::take(
            &mut *self
                .response_cookies
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Collaborator contract
// ─────────────────────────────────────────────────────────────────────────────

/// External session-lookup capability consumed by the authenticator.
///
/// The authenticator calls each method at most once per request.  A lookup
/// that rotates the client's session (a token refresh) reports the new
/// cookies through [`RequestCredentials::set_response_cookie`].
#[async_trait]
pub trait SessionLookup: Send + Sync {
    /// Stable, human-readable identifier (used in logs).
    fn name(&self) -> &str;

    /// Resolve the principal attached to the request, if any.
    async fn current_principal(
        &self,
        request: &RequestCredentials,
    ) -> Result<Option<Principal>, SessionError>;

    /// Resolve the principal's current credential, if any.
    async fn current_credential(
        &self,
        request: &RequestCredentials,
    ) -> Result<Option<Credential>, SessionError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn cookie_header_is_split_and_trimmed() {
        let req = RequestCredentials::new("/chainlit")
            .with_cookie_header("a=1; sb-x-auth-token=\"abc\" ;  empty= ;=nameless; junk");
        assert_eq!(req.cookie("a"), Some("1"));
        assert_eq!(req.cookie("sb-x-auth-token"), Some("abc"));
        assert_eq!(req.cookie("empty"), Some(""));
        assert_eq!(req.cookies.len(), 3);
    }

    #[test]
    fn response_cookies_drain_in_order() {
        let req = RequestCredentials::new("/");
        let cookie = |name: &str| SessionCookie {
            name: name.to_string(),
            value: "v".to_string(),
            path: "/".to_string(),
            domain: None,
            max_age: None,
            http_only: false,
            secure: false,
            same_site: crate::forwarding::SameSite::Lax,
        };
        req.set_response_cookie(cookie("a"));
        req.set_response_cookie(cookie("b"));

        let names: Vec<String> = req.take_response_cookies().into_iter().map(|c| c.name).collect();
        assert_eq!(names, ["a", "b"]);
        assert!(req.take_response_cookies().is_empty());
    }

    #[test]
    fn first_duplicate_cookie_wins() {
        let req = RequestCredentials::new("/").with_cookie_header("t=first; t=second");
        assert_eq!(req.cookie("t"), Some("first"));
    }

    #[test]
    fn bearer_token_requires_scheme() {
        let req = RequestCredentials::new("/").with_authorization("Bearer tok");
        assert_eq!(req.bearer_token(), Some("tok"));
        let req = RequestCredentials::new("/").with_authorization("Basic dTpw");
        assert_eq!(req.bearer_token(), None);
        let req = RequestCredentials::new("/").with_authorization("Bearer   ");
        assert_eq!(req.bearer_token(), None);
    }

    #[test]
    fn credential_expiry_and_remaining_lifetime() {
        let now = Utc::now();
        let cred = Credential::new("t", now + Duration::seconds(90));
        assert!(!cred.is_expired_at(now));
        assert_eq!(cred.remaining_secs_at(now), 90);
        assert!(cred.is_expired_at(now + Duration::seconds(90)));
        assert_eq!(cred.remaining_secs_at(now + Duration::hours(1)), 0);
    }

    #[test]
    fn credential_debug_redacts_token() {
        let cred = Credential::new("super-secret", Utc::now());
        let printed = format!("{cred:?}");
        assert!(!printed.contains("super-secret"));
        assert!(printed.contains("<redacted>"));
    }

    #[test]
    fn remembered_credential_keeps_first_value() {
        let req = RequestCredentials::new("/");
        let exp = Utc::now() + Duration::minutes(5);
        req.remember_credential(Credential::new("one", exp));
        req.remember_credential(Credential::new("two", exp));
        assert_eq!(req.remembered_credential().map(Credential::token), Some("one"));
    }
}
