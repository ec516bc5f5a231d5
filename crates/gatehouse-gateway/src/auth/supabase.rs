//! Supabase-backed [`SessionLookup`].
//!
//! Reads the session the Supabase SSR helpers keep in the
//! `sb-<project-ref>-auth-token` cookie (optionally split into `.0`, `.1`, …
//! chunks, percent-encoded by the browser cookie API, and optionally
//! `base64-` encoded), refreshes the access token when it is about to
//! expire, and confirms the principal against `GET /auth/v1/user`.
//!
//! A refresh rotates the refresh token, so the new session is written back
//! to the client in the same cookie format through
//! [`RequestCredentials::set_response_cookie`].

use crate::error::{GatewayError, GatewayResult};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use gatehouse_kernel::{
    Credential, Principal, RequestCredentials, SameSite, SessionCookie, SessionError,
    SessionLookup, SupabaseConfig,
};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, instrument};

/// Tokens this close to expiry are refreshed before use.
const REFRESH_MARGIN_SECS: i64 = 60;

/// Lifetime of the session cookie written back after a refresh (400 days).
const SESSION_COOKIE_MAX_AGE_SECS: i64 = 400 * 24 * 60 * 60;

/// Longest value stored in a single session cookie before it is split into
/// `.0`, `.1`, … chunks.
const MAX_CHUNK_SIZE: usize = 3180;

/// Session payload stored in the auth cookie.
#[derive(Debug, Deserialize)]
struct StoredSession {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    /// Unix seconds.
    #[serde(default)]
    expires_at: Option<i64>,
}

impl StoredSession {
    /// Explicit `expires_at`, or the `exp` claim of the access token.
    fn expiry(&self) -> Option<DateTime<Utc>> {
        self.expires_at
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .or_else(|| jwt_expiry(&self.access_token))
    }
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_at: Option<i64>,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Talks to the Supabase auth API on behalf of the gateway.
pub struct SupabaseSessionLookup {
    base_url: String,
    anon_key: String,
    cookie_name: String,
    secure_cookies: bool,
    client: Client,
}

/// Outcome of a successful refresh: the credential to use now and the full
/// session to store in the cookie.
struct RefreshedSession {
    credential: Credential,
    session: Value,
}

impl SupabaseSessionLookup {
    /// Build the lookup.  `timeout` bounds every HTTP call made to Supabase.
    pub fn new(config: &SupabaseConfig, timeout: Duration) -> GatewayResult<Self> {
        let project_ref = config.project_ref().ok_or_else(|| {
            GatewayError::Internal(format!("cannot derive project ref from '{}'", config.url))
        })?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Internal(format!("failed to build http client: {e}")))?;

        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            anon_key: config.anon_key.clone(),
            cookie_name: format!("sb-{project_ref}-auth-token"),
            secure_cookies: false,
            client,
        })
    }

    /// Builder: mark session cookies written back after a refresh `Secure`.
    pub fn with_secure_cookies(mut self, secure: bool) -> Self {
        self.secure_cookies = secure;
        self
    }

    /// Name of the cookie the session is read from.
    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Whole cookie, or its chunks concatenated in order.
    fn cookie_value(&self, request: &RequestCredentials) -> Option<String> {
        if let Some(value) = request.cookie(&self.cookie_name) {
            return Some(value.to_string());
        }
        let mut joined = String::new();
        for i in 0.. {
            match request.cookie(&format!("{}.{i}", self.cookie_name)) {
                Some(chunk) => joined.push_str(chunk),
                None => break,
            }
        }
        (!joined.is_empty()).then_some(joined)
    }

    fn stored_session(
        &self,
        request: &RequestCredentials,
    ) -> Result<Option<StoredSession>, SessionError> {
        if let Some(raw) = self.cookie_value(request) {
            let raw = urlencoding::decode(&raw)
                .map_err(|e| SessionError::Malformed(format!("percent-encoding: {e}")))?;
            return decode_cookie(&raw).map(Some);
        }
        Ok(request.bearer_token().map(|token| StoredSession {
            access_token: token.to_string(),
            refresh_token: None,
            expires_at: None,
        }))
    }

    /// Current access token for the request, refreshed if needed.  The
    /// result is remembered on the request so both lookups agree.
    async fn resolve_credential(
        &self,
        request: &RequestCredentials,
    ) -> Result<Option<Credential>, SessionError> {
        if let Some(credential) = request.remembered_credential() {
            return Ok(Some(credential.clone()));
        }
        let Some(stored) = self.stored_session(request)? else {
            return Ok(None);
        };

        let now = Utc::now();
        let expiry = stored.expiry();
        let fresh = expiry.is_some_and(|exp| exp - ChronoDuration::seconds(REFRESH_MARGIN_SECS) > now);

        if !fresh {
            if let Some(refresh_token) = stored.refresh_token.as_deref() {
                if let Some(refreshed) = self.refresh(refresh_token).await? {
                    self.write_back(request, &refreshed.session);
                    request.remember_credential(refreshed.credential.clone());
                    return Ok(Some(refreshed.credential));
                }
            }
        }

        // Without a successful refresh the stored token is still usable
        // until it actually expires.
        match expiry {
            Some(exp) if exp > now => {
                let credential = Credential::new(stored.access_token, exp);
                request.remember_credential(credential.clone());
                Ok(Some(credential))
            }
            _ => Ok(None),
        }
    }

    /// Queue the rotated session as `Set-Cookie`s, chunked the same way the
    /// Supabase SSR helpers chunk it, and expire any stale chunk the client
    /// still holds.
    fn write_back(&self, request: &RequestCredentials, session: &Value) {
        let value = format!("base64-{}", URL_SAFE_NO_PAD.encode(session.to_string()));
        let chunks: Vec<&str> = if value.len() <= MAX_CHUNK_SIZE {
            vec![value.as_str()]
        } else {
            // `value` is ASCII, so byte offsets are char boundaries.
            (0..value.len())
                .step_by(MAX_CHUNK_SIZE)
                .map(|start| &value[start..(start + MAX_CHUNK_SIZE).min(value.len())])
                .collect()
        };

        let written: Vec<String> = match chunks.as_slice() {
            [_] => vec![self.cookie_name.clone()],
            _ => (0..chunks.len())
                .map(|i| format!("{}.{i}", self.cookie_name))
                .collect(),
        };
        for (name, chunk) in written.iter().zip(&chunks) {
            request.set_response_cookie(self.session_cookie(name, chunk, SESSION_COOKIE_MAX_AGE_SECS));
        }

        let mut held = Vec::new();
        if request.cookie(&self.cookie_name).is_some() {
            held.push(self.cookie_name.clone());
        }
        for i in 0.. {
            let name = format!("{}.{i}", self.cookie_name);
            if request.cookie(&name).is_none() {
                break;
            }
            held.push(name);
        }
        for name in held.iter().filter(|name| !written.contains(name)) {
            request.set_response_cookie(self.session_cookie(name, "", 0));
        }
        debug!(chunks = written.len(), "queued refreshed supabase session cookie");
    }

    fn session_cookie(&self, name: &str, value: &str, max_age: i64) -> SessionCookie {
        SessionCookie {
            name: name.to_string(),
            value: value.to_string(),
            path: "/".to_string(),
            domain: None,
            max_age: Some(max_age),
            http_only: false,
            secure: self.secure_cookies,
            same_site: SameSite::Lax,
        }
    }

    #[instrument(skip_all)]
    async fn refresh(&self, refresh_token: &str) -> Result<Option<RefreshedSession>, SessionError> {
        let url = format!("{}/auth/v1/token?grant_type=refresh_token", self.base_url);
        debug!("refreshing supabase access token");

        let resp = self
            .client
            .post(&url)
            .header("apikey", &self.anon_key)
            .json(&json!({ "refresh_token": refresh_token }))
            .send()
            .await
            .map_err(|e| SessionError::Unavailable(e.to_string()))?;

        match resp.status() {
            s if s.is_success() => {
                let mut session: Value = resp
                    .json()
                    .await
                    .map_err(|e| SessionError::InvalidResponse(e.to_string()))?;
                let body: TokenResponse = serde_json::from_value(session.clone())
                    .map_err(|e| SessionError::InvalidResponse(e.to_string()))?;
                let expiry = body
                    .expires_at
                    .and_then(|secs| DateTime::from_timestamp(secs, 0))
                    .or_else(|| body.expires_in.map(|secs| Utc::now() + ChronoDuration::seconds(secs)))
                    .or_else(|| jwt_expiry(&body.access_token));
                let Some(expiry) = expiry else {
                    return Err(SessionError::InvalidResponse(
                        "refreshed session has no expiry".to_string(),
                    ));
                };

                // The stored session must carry what the next request needs.
                session["expires_at"] = json!(expiry.timestamp());
                if body.refresh_token.is_none() {
                    session["refresh_token"] = json!(refresh_token);
                }
                Ok(Some(RefreshedSession {
                    credential: Credential::new(body.access_token, expiry),
                    session,
                }))
            }
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                debug!(status = %resp.status(), "refresh token rejected");
                Ok(None)
            }
            s => Err(SessionError::InvalidResponse(format!(
                "token refresh returned {s}"
            ))),
        }
    }

    async fn fetch_user(&self, access_token: &str) -> Result<Option<Principal>, SessionError> {
        let url = format!("{}/auth/v1/user", self.base_url);
        let resp = self
            .client
            .get(&url)
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| SessionError::Unavailable(e.to_string()))?;

        match resp.status() {
            s if s.is_success() => {
                let user: UserResponse = resp
                    .json()
                    .await
                    .map_err(|e| SessionError::InvalidResponse(e.to_string()))?;
                Ok(Some(Principal {
                    id: user.id,
                    email: user.email,
                }))
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Ok(None),
            s => Err(SessionError::InvalidResponse(format!(
                "user lookup returned {s}"
            ))),
        }
    }
}

#[async_trait]
impl SessionLookup for SupabaseSessionLookup {
    fn name(&self) -> &str {
        "supabase"
    }

    async fn current_principal(
        &self,
        request: &RequestCredentials,
    ) -> Result<Option<Principal>, SessionError> {
        match self.resolve_credential(request).await? {
            Some(credential) => self.fetch_user(credential.token()).await,
            None => Ok(None),
        }
    }

    async fn current_credential(
        &self,
        request: &RequestCredentials,
    ) -> Result<Option<Credential>, SessionError> {
        self.resolve_credential(request).await
    }
}

fn decode_cookie(raw: &str) -> Result<StoredSession, SessionError> {
    let json = match raw.strip_prefix("base64-") {
        Some(encoded) => {
            let bytes = URL_SAFE_NO_PAD
                .decode(encoded.trim_end_matches('='))
                .map_err(|e| SessionError::Malformed(format!("base64: {e}")))?;
            String::from_utf8(bytes).map_err(|e| SessionError::Malformed(format!("utf-8: {e}")))?
        }
        None => raw.to_string(),
    };
    serde_json::from_str(&json).map_err(|e| SessionError::Malformed(format!("json: {e}")))
}

fn jwt_expiry(token: &str) -> Option<DateTime<Utc>> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    DateTime::from_timestamp(claims.get("exp")?.as_i64()?, 0)
}
