//! Session authenticator.
//!
//! [`Authenticator`] asks the injected [`SessionLookup`] for the principal and
//! then for its credential.  Both calls must succeed, each within the
//! configured timeout, and the credential must not be expired; every other
//! combination fails closed.

mod memory;
mod supabase;

pub use memory::InMemorySessionLookup;
pub use supabase::SupabaseSessionLookup;

use gatehouse_kernel::{
    DispatchOutcome, Principal, RequestCredentials, Session, SessionError, SessionLookup,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Why authentication ended the way it did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    /// No principal, or the principal lookup failed or timed out.
    NoPrincipal,
    /// A principal exists but no usable credential was resolved.
    NoCredential(Principal),
    Authenticated(Session),
}

impl AuthOutcome {
    pub fn into_session(self) -> Option<Session> {
        match self {
            AuthOutcome::Authenticated(session) => Some(session),
            _ => None,
        }
    }

    /// Terminal dispatch state for a failed authentication, `None` on success.
    pub fn rejection(&self) -> Option<DispatchOutcome> {
        match self {
            AuthOutcome::NoPrincipal => Some(DispatchOutcome::NoSession),
            AuthOutcome::NoCredential(_) => Some(DispatchOutcome::SessionButNoCredential),
            AuthOutcome::Authenticated(_) => None,
        }
    }
}

/// Resolves the session attached to a request.
#[derive(Clone)]
pub struct Authenticator {
    lookup: Arc<dyn SessionLookup>,
    timeout: Duration,
}

impl Authenticator {
    pub fn new(lookup: Arc<dyn SessionLookup>, timeout: Duration) -> Self {
        Self { lookup, timeout }
    }

    /// `Some(session)` only when both lookups succeed.
    pub async fn authenticate(&self, request: &RequestCredentials) -> Option<Session> {
        self.resolve(request).await.into_session()
    }

    /// Same as [`authenticate`](Self::authenticate) but keeps the failure reason.
    pub async fn resolve(&self, request: &RequestCredentials) -> AuthOutcome {
        let Some(principal) = self
            .bounded("principal", self.lookup.current_principal(request))
            .await
        else {
            return AuthOutcome::NoPrincipal;
        };

        let Some(credential) = self
            .bounded("credential", self.lookup.current_credential(request))
            .await
        else {
            return AuthOutcome::NoCredential(principal);
        };

        if credential.is_expired() {
            debug!(principal = %principal.id, "credential already expired");
            return AuthOutcome::NoCredential(principal);
        }

        AuthOutcome::Authenticated(Session::new(principal, credential))
    }

    /// Run one collaborator call under the timeout.  Errors and timeouts
    /// collapse to `None`.
    async fn bounded<T>(
        &self,
        step: &'static str,
        call: impl Future<Output = Result<Option<T>, SessionError>>,
    ) -> Option<T> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(value)) => value,
            Ok(Err(err)) => {
                warn!(lookup = self.lookup.name(), step, error = %err, "session lookup failed");
                None
            }
            Err(_) => {
                warn!(
                    lookup = self.lookup.name(),
                    step,
                    timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                    "session lookup timed out"
                );
                None
            }
        }
    }
}
