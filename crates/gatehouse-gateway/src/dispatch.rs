//! Per-request gateway state machine.
//!
//! [`Dispatcher::dispatch`] runs matcher → authenticator → router →
//! forwarder and ends in exactly one [`DispatchOutcome`], paired with the
//! [`GatewayDecision`] the HTTP layer acts on.  Authentication always
//! completes before routing, so an unauthenticated request never learns
//! which backend its path maps to.

use crate::auth::{AuthOutcome, Authenticator};
use crate::error::GatewayResult;
use crate::forward::Forwarder;
use crate::router::PrefixRouter;
use gatehouse_kernel::{
    CompiledGateway, DispatchOutcome, GatewayDecision, RequestCredentials, RequestMatcher,
    RouteRule, SessionLookup,
};
use std::sync::Arc;

/// Result of evaluating one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub outcome: DispatchOutcome,
    pub decision: GatewayDecision,
    /// Principal id, when authentication got that far.
    pub principal: Option<String>,
    /// Matched route id, for [`DispatchOutcome::AuthenticatedRouteMatch`].
    pub route: Option<String>,
}

impl Dispatch {
    fn new(outcome: DispatchOutcome, decision: GatewayDecision) -> Self {
        Self {
            outcome,
            decision,
            principal: None,
            route: None,
        }
    }
}

pub struct Dispatcher {
    sign_in_path: String,
    matcher: RequestMatcher,
    authenticator: Authenticator,
    router: PrefixRouter,
    forwarder: Forwarder,
}

impl Dispatcher {
    pub fn new(compiled: &CompiledGateway, lookup: Arc<dyn SessionLookup>) -> Self {
        Self {
            sign_in_path: compiled.sign_in_path.clone(),
            matcher: compiled.matcher.clone(),
            authenticator: Authenticator::new(lookup, compiled.auth_timeout),
            router: PrefixRouter::new(compiled.routes.clone()),
            forwarder: Forwarder::from_compiled(compiled),
        }
    }

    pub fn forwarder(&self) -> &Forwarder {
        &self.forwarder
    }

    pub fn router(&self) -> &PrefixRouter {
        &self.router
    }

    /// Whether the gateway runs on `path` at all.  The sign-in page is never
    /// gated, even when a matcher pattern happens to cover it.
    pub fn is_gated(&self, path: &str) -> bool {
        let sign_in = RouteRule::new("sign-in", self.sign_in_path.as_str(), "");
        !sign_in.matches(path) && self.matcher.matches(path)
    }

    pub async fn dispatch(&self, request: &RequestCredentials) -> GatewayResult<Dispatch> {
        let path = request.path.as_str();
        if !self.is_gated(path) {
            return Ok(Dispatch::new(
                DispatchOutcome::OutsideMatcher,
                GatewayDecision::Bypass,
            ));
        }

        let session = match self.authenticator.resolve(request).await {
            AuthOutcome::Authenticated(session) => session,
            failed => {
                let principal = match &failed {
                    AuthOutcome::NoCredential(p) => Some(p.id.clone()),
                    _ => None,
                };
                let outcome = failed.rejection().unwrap_or(DispatchOutcome::NoSession);
                let mut dispatch = Dispatch::new(
                    outcome,
                    GatewayDecision::RejectUnauthenticated {
                        location: self.sign_in_path.clone(),
                    },
                );
                dispatch.principal = principal;
                return Ok(dispatch);
            }
        };

        let Some(rule) = self.router.resolve(path) else {
            let mut dispatch =
                Dispatch::new(DispatchOutcome::AuthenticatedNoRouteMatch, GatewayDecision::Allow);
            dispatch.principal = Some(session.principal.id);
            return Ok(dispatch);
        };

        let plan = self.forwarder.forward(&rule.target, &session.credential)?;
        Ok(Dispatch {
            outcome: DispatchOutcome::AuthenticatedRouteMatch,
            decision: GatewayDecision::Redirect {
                location: plan.location,
                cookie: plan.cookie,
            },
            principal: Some(session.principal.id),
            route: Some(rule.id.clone()),
        })
    }
}
