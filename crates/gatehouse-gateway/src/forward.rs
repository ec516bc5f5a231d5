//! Credential forwarder.
//!
//! Turns a route target and a credential into the redirect the caller
//! receives, following the single [`ForwardingStrategy`] the gateway was
//! configured with.

use crate::error::{GatewayError, GatewayResult};
use chrono::{DateTime, Utc};
use gatehouse_kernel::{
    CompiledGateway, CookieSettings, Credential, ForwardingStrategy, RouteRule, SameSite,
    SessionCookie,
};
use url::Url;

/// Query parameter carrying the credential under [`ForwardingStrategy::QueryParam`].
pub const ACCESS_TOKEN_PARAM: &str = "access_token";

/// Where to send the caller and what to set on the way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardPlan {
    pub location: String,
    pub cookie: Option<SessionCookie>,
}

#[derive(Debug, Clone)]
pub struct Forwarder {
    strategy: ForwardingStrategy,
    cookie: CookieSettings,
    production: bool,
}

impl Forwarder {
    pub fn new(strategy: ForwardingStrategy, cookie: CookieSettings, production: bool) -> Self {
        Self {
            strategy,
            cookie,
            production,
        }
    }

    pub fn from_compiled(compiled: &CompiledGateway) -> Self {
        Self::new(compiled.forwarding, compiled.cookie.clone(), compiled.production)
    }

    pub fn strategy(&self) -> ForwardingStrategy {
        self.strategy
    }

    pub fn forward(&self, target: &str, credential: &Credential) -> GatewayResult<ForwardPlan> {
        self.forward_at(target, credential, Utc::now())
    }

    /// [`forward`](Self::forward) with an explicit clock, for the cookie's
    /// `Max-Age`.
    pub fn forward_at(
        &self,
        target: &str,
        credential: &Credential,
        now: DateTime<Utc>,
    ) -> GatewayResult<ForwardPlan> {
        match self.strategy {
            ForwardingStrategy::NoForward => Ok(ForwardPlan {
                location: target.to_string(),
                cookie: None,
            }),
            ForwardingStrategy::QueryParam => {
                let mut url = Url::parse(target).map_err(|e| GatewayError::InvalidTarget {
                    target: target.to_string(),
                    reason: e.to_string(),
                })?;
                url.query_pairs_mut()
                    .append_pair(ACCESS_TOKEN_PARAM, credential.token());
                Ok(ForwardPlan {
                    location: url.into(),
                    cookie: None,
                })
            }
            ForwardingStrategy::HttpOnlyCookie => Ok(ForwardPlan {
                location: target.to_string(),
                cookie: Some(SessionCookie {
                    name: self.cookie.name.clone(),
                    value: credential.token().to_string(),
                    path: "/".to_string(),
                    domain: self.cookie.domain.clone(),
                    max_age: Some(credential.remaining_secs_at(now)),
                    http_only: true,
                    secure: self.production,
                    same_site: SameSite::Strict,
                }),
            }),
        }
    }
}

/// Routes whose target a cookie set by the gateway cannot reach: no cookie
/// `Domain` is configured and the target host differs from the origin host.
///
/// Only meaningful for [`ForwardingStrategy::HttpOnlyCookie`]; empty for the
/// other strategies or when no origin is configured.
pub fn cookie_unreachable_routes(compiled: &CompiledGateway) -> Vec<&RouteRule> {
    if compiled.forwarding != ForwardingStrategy::HttpOnlyCookie || compiled.cookie.domain.is_some()
    {
        return Vec::new();
    }
    let Some(origin_host) = compiled
        .origin_url
        .as_deref()
        .and_then(|u| Url::parse(u).ok())
        .and_then(|u| u.host_str().map(str::to_string))
    else {
        return Vec::new();
    };

    compiled
        .routes
        .rules()
        .iter()
        .filter(|rule| {
            Url::parse(&rule.target)
                .ok()
                .and_then(|u| u.host_str().map(|h| h != origin_host))
                .unwrap_or(true)
        })
        .collect()
}
