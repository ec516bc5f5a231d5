//! Axum-based HTTP gateway server.
//!
//! [`GatewayServer`] wires the dispatcher, the [`gate`] middleware and the
//! origin pass-through into a running axum service.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/healthz` | Liveness check, never gated. |
//! | `ANY`  | everything else | Gated by the matcher, then redirected or relayed to the origin. |

use crate::error::{GatewayError, GatewayResult};
use crate::middleware::gate;
use crate::state::GatewayState;
use axum::{
    Json, Router,
    extract::{Request, State},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use gatehouse_kernel::{CompiledGateway, SessionLookup};
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

/// High-level gateway server.
pub struct GatewayServer {
    compiled: CompiledGateway,
    lookup: Arc<dyn SessionLookup>,
}

impl GatewayServer {
    pub fn new(compiled: CompiledGateway, lookup: Arc<dyn SessionLookup>) -> Self {
        Self { compiled, lookup }
    }

    /// Build the axum [`Router`]: an origin fallback behind the gate, plus
    /// the health endpoint outside it.
    pub fn build_app(&self) -> GatewayResult<Router> {
        let state = Arc::new(GatewayState::new(&self.compiled, self.lookup.clone())?);

        let gated = protect(
            Router::new().fallback(origin_handler).with_state(state.clone()),
            state,
        );

        Ok(Router::new()
            .route("/healthz", get(health_handler))
            .merge(gated)
            .layer(TraceLayer::new_for_http()))
    }

    /// Bind to `listen_addr` and serve until the process exits.
    pub async fn start(self, listen_addr: &str) -> GatewayResult<()> {
        let app = self.build_app()?;
        info!(
            addr = %listen_addr,
            gateway = %self.compiled.id,
            strategy = %self.compiled.forwarding,
            routes = self.compiled.routes.len(),
            origin = self.compiled.origin_url.as_deref(),
            "gatehouse gateway starting"
        );
        let listener = tokio::net::TcpListener::bind(listen_addr).await?;
        axum::serve(listener, app).await?;
        Ok(())
    }
}

/// Put the gate in front of an existing router. Pass-through requests reach
/// `router` unmodified.
pub fn protect<S>(router: Router<S>, state: Arc<GatewayState>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.layer(middleware::from_fn_with_state(state, gate))
}

/// `GET /healthz`: liveness check.
async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok", "service": "gatehouse" }))
}

/// Fallback for pass-through requests: relay to the origin.
async fn origin_handler(State(state): State<Arc<GatewayState>>, request: Request) -> Response {
    let Some(origin) = state.origin.as_ref() else {
        return GatewayError::NoOrigin(request.uri().path().to_string()).into_response();
    };
    match origin.forward(request).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}
