//! axum middleware that puts the gateway in front of a router.
//!
//! Install with [`axum::middleware::from_fn_with_state`]:
//!
//! ```rust,ignore
//! let app = Router::new()
//!     .fallback(origin)
//!     .layer(axum::middleware::from_fn_with_state(state, gate));
//! ```
//!
//! Pass-through decisions call the inner service untouched; rejections and
//! backend redirects short-circuit with `307 Temporary Redirect`.  Cookies a
//! session lookup queued while serving the request (a rotated Supabase
//! session) are appended to whichever response goes out.

use crate::error::{GatewayError, GatewayResult};
use crate::state::GatewayState;
use axum::{
    extract::{Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use gatehouse_kernel::{GatewayDecision, RequestCredentials, SessionCookie};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Run the dispatcher on `request` and act on its decision.
pub async fn gate(
    State(state): State<Arc<GatewayState>>,
    request: Request,
    next: Next,
) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let credentials = match request_credentials(&request) {
        Ok(credentials) => credentials,
        Err(err) => {
            warn!(
                request_id = %request_id,
                gateway = %state.id,
                path = %request.uri().path(),
                error = %err,
                "request path rejected"
            );
            return err.into_response();
        }
    };

    let dispatch = match state.dispatcher.dispatch(&credentials).await {
        Ok(dispatch) => dispatch,
        Err(err) => {
            warn!(
                request_id = %request_id,
                gateway = %state.id,
                path = %credentials.path,
                error = %err,
                "dispatch failed"
            );
            return err.into_response();
        }
    };

    info!(
        request_id = %request_id,
        gateway = %state.id,
        path = %credentials.path,
        outcome = %dispatch.outcome,
        route = dispatch.route.as_deref(),
        principal = dispatch.principal.as_deref(),
        strategy = %state.dispatcher.forwarder().strategy(),
        "gateway decision"
    );

    let mut response = match dispatch.decision {
        GatewayDecision::Bypass | GatewayDecision::Allow => next.run(request).await,
        GatewayDecision::RejectUnauthenticated { location } => {
            redirect(&location, None).unwrap_or_else(IntoResponse::into_response)
        }
        GatewayDecision::Redirect { location, cookie } => {
            redirect(&location, cookie.as_ref()).unwrap_or_else(IntoResponse::into_response)
        }
    };
    append_cookies(&mut response, &credentials.take_response_cookies(), &request_id);
    response
}

/// Collect what the session collaborator may look at: the decoded path,
/// every `Cookie` header and the `Authorization` header.
pub fn request_credentials(request: &Request) -> GatewayResult<RequestCredentials> {
    let path = decode_path(request.uri().path())?;
    let headers = request.headers();
    let cookie_header = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect::<Vec<_>>()
        .join("; ");

    let mut credentials = RequestCredentials::new(path).with_cookie_header(&cookie_header);
    if let Some(auth) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    {
        credentials = credentials.with_authorization(auth);
    }
    Ok(credentials)
}

/// Percent-decode `raw` once and resolve empty, `.` and `..` segments, so
/// the matcher and router see the path the origin will serve.
///
/// Malformed escapes, invalid UTF-8, encoded separators (`%2F`, `%5C`) and
/// control characters are rejected.
pub fn decode_path(raw: &str) -> GatewayResult<String> {
    let invalid = || GatewayError::InvalidPath(raw.to_string());

    let bytes = raw.as_bytes();
    for (i, _) in raw.match_indices('%') {
        let escape = bytes.get(i + 1..i + 3).ok_or_else(invalid)?;
        if !escape.iter().all(u8::is_ascii_hexdigit) {
            return Err(invalid());
        }
        if escape.eq_ignore_ascii_case(b"2f") || escape.eq_ignore_ascii_case(b"5c") {
            return Err(invalid());
        }
    }

    let decoded = urlencoding::decode(raw).map_err(|_| invalid())?;
    if decoded.chars().any(|c| c.is_control() || c == '\\') {
        return Err(invalid());
    }

    let mut segments: Vec<&str> = Vec::new();
    for segment in decoded.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    Ok(format!("/{}", segments.join("/")))
}

/// `307` to `location`, with an optional `Set-Cookie`.
fn redirect(location: &str, cookie: Option<&SessionCookie>) -> GatewayResult<Response> {
    let location =
        HeaderValue::from_str(location).map_err(|_| GatewayError::InvalidHeader("location"))?;

    let mut response = StatusCode::TEMPORARY_REDIRECT.into_response();
    response.headers_mut().insert(header::LOCATION, location);
    if let Some(cookie) = cookie {
        let value = HeaderValue::from_str(&cookie.to_header_value())
            .map_err(|_| GatewayError::InvalidHeader("set-cookie"))?;
        response.headers_mut().insert(header::SET_COOKIE, value);
    }
    Ok(response)
}

fn append_cookies(response: &mut Response, cookies: &[SessionCookie], request_id: &str) {
    for cookie in cookies {
        match HeaderValue::from_str(&cookie.to_header_value()) {
            Ok(value) => {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
            Err(_) => warn!(
                request_id = %request_id,
                cookie = %cookie.name,
                "session cookie is not a valid header value"
            ),
        }
    }
}
