//! Shared application state for the gateway server

use crate::dispatch::Dispatcher;
use crate::error::GatewayResult;
use crate::forward::cookie_unreachable_routes;
use crate::origin::OriginProxy;
use gatehouse_kernel::{CompiledGateway, ForwardingStrategy, SessionLookup};
use std::sync::Arc;
use tracing::warn;

/// State shared across all requests. Built once at startup, never mutated.
pub struct GatewayState {
    /// Gateway id, used as a log field.
    pub id: String,
    pub dispatcher: Dispatcher,
    /// Where pass-through requests go in standalone mode.
    pub origin: Option<OriginProxy>,
}

impl GatewayState {
    /// Build the state from a compiled configuration and a session
    /// collaborator.
    pub fn new(compiled: &CompiledGateway, lookup: Arc<dyn SessionLookup>) -> GatewayResult<Self> {
        if compiled.forwarding == ForwardingStrategy::QueryParam {
            warn!(
                gateway = %compiled.id,
                "query_param forwarding exposes credentials in URLs and access logs"
            );
        }
        for rule in cookie_unreachable_routes(compiled) {
            warn!(
                gateway = %compiled.id,
                route = %rule.id,
                target = %rule.target,
                "route target is on another host and no cookie domain is set; \
                 the forwarded cookie will not reach it"
            );
        }

        let origin = compiled
            .origin_url
            .as_deref()
            .map(OriginProxy::new)
            .transpose()?;

        Ok(Self {
            id: compiled.id.clone(),
            dispatcher: Dispatcher::new(compiled, lookup),
            origin,
        })
    }
}
