//! In-memory [`SessionLookup`] implementation.

use async_trait::async_trait;
use gatehouse_kernel::{Credential, Principal, RequestCredentials, Session, SessionError, SessionLookup};
use std::collections::HashMap;

/// [`SessionLookup`] backed by a fixed token → session map.
///
/// The token is read from the configured cookie, falling back to an
/// `Authorization: Bearer` header.  Suitable for local development and
/// tests; real deployments use [`SupabaseSessionLookup`](super::SupabaseSessionLookup).
#[derive(Debug, Default)]
pub struct InMemorySessionLookup {
    cookie_name: String,
    sessions: HashMap<String, Session>,
}

impl InMemorySessionLookup {
    pub fn new(cookie_name: impl Into<String>) -> Self {
        Self {
            cookie_name: cookie_name.into(),
            sessions: HashMap::new(),
        }
    }

    /// Builder: accept `token` as proof of `session`.
    pub fn with_session(mut self, token: impl Into<String>, session: Session) -> Self {
        self.sessions.insert(token.into(), session);
        self
    }

    fn session_for(&self, request: &RequestCredentials) -> Option<&Session> {
        let token = request
            .cookie(&self.cookie_name)
            .or_else(|| request.bearer_token())?;
        self.sessions.get(token)
    }
}

#[async_trait]
impl SessionLookup for InMemorySessionLookup {
    fn name(&self) -> &str {
        "in-memory"
    }

    async fn current_principal(
        &self,
        request: &RequestCredentials,
    ) -> Result<Option<Principal>, SessionError> {
        Ok(self.session_for(request).map(|s| s.principal.clone()))
    }

    async fn current_credential(
        &self,
        request: &RequestCredentials,
    ) -> Result<Option<Credential>, SessionError> {
        Ok(self.session_for(request).map(|s| s.credential.clone()))
    }
}
