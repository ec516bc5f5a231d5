//! Per-request gateway decisions.
//!
//! ```text
//! request ─► matcher ──no──► OutsideMatcher            ─► Bypass
//!              │yes
//!              ▼
//!          principal? ──no──► NoSession                ─► RejectUnauthenticated
//!              │yes
//!              ▼
//!          credential? ─no──► SessionButNoCredential   ─► RejectUnauthenticated
//!              │yes
//!              ▼
//!          route? ──────no──► AuthenticatedNoRouteMatch ─► Allow
//!              │yes
//!              ▼
//!          AuthenticatedRouteMatch                      ─► Redirect
//! ```

use crate::forwarding::SessionCookie;
use std::fmt;

/// Terminal state reached while evaluating one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatchOutcome {
    /// The path is not covered by the matcher; no authentication happened.
    OutsideMatcher,
    /// No principal, or the collaborator failed.
    NoSession,
    /// A principal exists but no usable credential could be resolved.
    SessionButNoCredential,
    /// Authenticated, but no route rule covers the path.
    AuthenticatedNoRouteMatch,
    /// Authenticated and routed to a backend.
    AuthenticatedRouteMatch,
}

impl DispatchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchOutcome::OutsideMatcher => "outside_matcher",
            DispatchOutcome::NoSession => "no_session",
            DispatchOutcome::SessionButNoCredential => "session_but_no_credential",
            DispatchOutcome::AuthenticatedNoRouteMatch => "authenticated_no_route_match",
            DispatchOutcome::AuthenticatedRouteMatch => "authenticated_route_match",
        }
    }

    /// Whether this outcome sends the caller to the sign-in page.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            DispatchOutcome::NoSession | DispatchOutcome::SessionButNoCredential
        )
    }
}

impl fmt::Display for DispatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the gateway does with the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayDecision {
    /// Outside the matcher: continue to the origin without authentication.
    Bypass,
    /// Authenticated, unrouted: continue to the origin unmodified.
    Allow,
    /// Redirect to the sign-in page.
    RejectUnauthenticated { location: String },
    /// Redirect to a backend target, optionally setting a credential cookie.
    Redirect {
        location: String,
        cookie: Option<SessionCookie>,
    },
}

impl GatewayDecision {
    /// `true` for the two pass-through decisions.
    pub fn is_pass_through(&self) -> bool {
        matches!(self, GatewayDecision::Bypass | GatewayDecision::Allow)
    }
}
