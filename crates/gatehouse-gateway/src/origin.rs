//! Origin pass-through proxy.
//!
//! When the gateway runs as a standalone process it fronts the application
//! itself, so requests that are not redirected (outside the matcher, or
//! authenticated without a route) are relayed to the configured origin and
//! the origin's response is returned verbatim.
//!
//! The proxy never follows redirects: a `3xx` from the origin is the
//! caller's to follow.

use crate::error::{GatewayError, GatewayResult};
use axum::{
    body::{Body, to_bytes},
    extract::Request,
    http::{HeaderMap, HeaderName, header},
    response::Response,
};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, instrument};

/// Upper bound for a buffered request body.
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Connection-scoped headers that must not be relayed.
const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    header::HOST,
    header::CONTENT_LENGTH,
    header::TRANSFER_ENCODING,
    header::TE,
    header::TRAILER,
    header::UPGRADE,
    header::PROXY_AUTHORIZATION,
];

/// Relays requests to a single origin base URL.
pub struct OriginProxy {
    base_url: String,
    client: Client,
}

impl OriginProxy {
    /// Create a proxy for `base_url`, e.g. `http://127.0.0.1:3001`.
    pub fn new(base_url: impl Into<String>) -> GatewayResult<Self> {
        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| GatewayError::Internal(format!("failed to build http client: {e}")))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Forward `request` to `{base_url}{path_and_query}`.
    #[instrument(skip_all, fields(origin = %self.base_url, path = %request.uri().path()))]
    pub async fn forward(&self, request: Request) -> GatewayResult<Response> {
        let (parts, body) = request.into_parts();
        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let url = format!("{}{}", self.base_url, path_and_query);
        debug!(url = %url, "relaying to origin");

        let body = to_bytes(body, MAX_BODY_BYTES)
            .await
            .map_err(|e| GatewayError::Body(e.to_string()))?;

        let upstream = self
            .client
            .request(parts.method, &url)
            .headers(strip_hop_by_hop(parts.headers))
            .body(body)
            .send()
            .await
            .map_err(GatewayError::Origin)?;

        let status = upstream.status();
        let headers = strip_hop_by_hop(upstream.headers().clone());
        let bytes = upstream.bytes().await.map_err(GatewayError::Origin)?;

        let mut response = Response::new(Body::from(bytes));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}

fn strip_hop_by_hop(mut headers: HeaderMap) -> HeaderMap {
    for name in &HOP_BY_HOP {
        headers.remove(name);
    }
    headers
}
