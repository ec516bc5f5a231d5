//! End-to-end tests: the full axum app driven with `oneshot`.

use async_trait::async_trait;
use axum::{
    Json, Router,
    body::{Body, to_bytes},
    http::{HeaderMap, Request, StatusCode, Uri, header},
    response::{IntoResponse, Response},
    routing::{any, get, post},
};
use chrono::{Duration as ChronoDuration, Utc};
use gatehouse_gateway::auth::{InMemorySessionLookup, SupabaseSessionLookup};
use gatehouse_gateway::server::{GatewayServer, protect};
use gatehouse_gateway::state::GatewayState;
use gatehouse_kernel::{
    BackendConfig, CompiledGateway, Credential, ForwardingStrategy, GatewayConfig, Principal,
    RequestCredentials, RouteConfig, Session, SessionError, SessionLookup, SupabaseConfig,
};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tower::ServiceExt;

const TOKEN: &str = "valid-token";

fn config(strategy: ForwardingStrategy) -> GatewayConfig {
    GatewayConfig::new("it")
        .with_matcher("/chainlit/:path*")
        .with_matcher("/langgraph/:path*")
        .with_matcher("/callbacks/:path*")
        .with_matcher("/unmapped/:path*")
        .with_backend(BackendConfig::new("A", "http://127.0.0.1:8491/"))
        .with_backend(BackendConfig::new("B", "http://127.0.0.1:8492/"))
        .with_backend(BackendConfig::new("C", "http://127.0.0.1:8493/"))
        .with_route(RouteConfig::new("chainlit", "/chainlit", "A"))
        .with_route(RouteConfig::new("langgraph", "/langgraph", "B"))
        .with_route(RouteConfig::new("callbacks", "/callbacks", "C"))
        .with_forwarding(strategy)
        .with_auth_timeout_ms(200)
}

fn lookup() -> Arc<dyn SessionLookup> {
    Arc::new(InMemorySessionLookup::new("sid").with_session(
        TOKEN,
        Session::new(
            Principal::new("user-1"),
            Credential::new("jwt.payload.sig", Utc::now() + ChronoDuration::minutes(30)),
        ),
    ))
}

/// Throwaway origin that echoes the path it received.
async fn spawn_origin() -> String {
    async fn echo(uri: Uri, headers: HeaderMap) -> impl IntoResponse {
        let cookie = headers
            .get(header::COOKIE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        (StatusCode::OK, [("x-origin", "1")], format!("origin {uri} [{cookie}]"))
    }

    let app = Router::new().route("/", any(echo)).route("/{*rest}", any(echo));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

async fn app_with_origin(strategy: ForwardingStrategy) -> Router {
    let compiled = config(strategy)
        .with_origin_url(spawn_origin().await)
        .compile()
        .unwrap();
    GatewayServer::new(compiled, lookup()).build_app().unwrap()
}

fn get_req(path: &str, token: Option<&str>) -> Request<Body> {
    let builder = Request::builder().uri(path);
    let builder = match token {
        Some(t) => builder.header(header::COOKIE, format!("theme=dark; sid={t}")),
        None => builder,
    };
    builder.body(Body::empty()).unwrap()
}

async fn body_string(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), 64 * 1024).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn location(response: &Response) -> &str {
    response.headers()[header::LOCATION].to_str().unwrap()
}

// ─────────────────────────────────────────────────────────────────────────────
// Scenario
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn authenticated_langgraph_request_redirects_to_backend_b() {
    let app = app_with_origin(ForwardingStrategy::NoForward).await;
    let response = app.oneshot(get_req("/langgraph/abc?x=1", Some(TOKEN))).await.unwrap();
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(&response), "http://127.0.0.1:8492/");
    assert!(response.headers().get(header::SET_COOKIE).is_none());
}

#[tokio::test]
async fn authenticated_unmapped_request_passes_through_unmodified() {
    let app = app_with_origin(ForwardingStrategy::HttpOnlyCookie).await;
    let response = app.oneshot(get_req("/unmapped/page?q=2", Some(TOKEN))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-origin"], "1");
    assert!(response.headers().get(header::SET_COOKIE).is_none());
    let body = body_string(response).await;
    assert_eq!(body, format!("origin /unmapped/page?q=2 [theme=dark; sid={TOKEN}]"));
}

#[tokio::test]
async fn unauthenticated_request_goes_to_sign_in() {
    let app = app_with_origin(ForwardingStrategy::HttpOnlyCookie).await;
    for path in ["/chainlit", "/langgraph/abc", "/unmapped"] {
        let response = app.clone().oneshot(get_req(path, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT, "{path}");
        assert_eq!(location(&response), "/signin");
        assert!(response.headers().get(header::SET_COOKIE).is_none());
    }

    let response = app.oneshot(get_req("/chainlit", Some("forged"))).await.unwrap();
    assert_eq!(location(&response), "/signin");
}

#[tokio::test]
async fn paths_outside_the_matcher_skip_authentication() {
    let app = app_with_origin(ForwardingStrategy::HttpOnlyCookie).await;
    for path in ["/", "/pricing", "/chainlitx", "/signin"] {
        let response = app.clone().oneshot(get_req(path, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{path}");
        assert!(body_string(response).await.starts_with(&format!("origin {path}")));
    }
}

#[tokio::test]
async fn percent_encoded_paths_are_gated_like_their_decoded_form() {
    let app = app_with_origin(ForwardingStrategy::NoForward).await;
    for path in ["/%63hainlit/x", "/chain%6Cit", "/%6Canggraph/abc", "/pricing/%2E%2E/callbacks"] {
        let response = app.clone().oneshot(get_req(path, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT, "{path}");
        assert_eq!(location(&response), "/signin", "{path}");
    }

    let response = app.clone().oneshot(get_req("/%6Canggraph/abc", Some(TOKEN))).await.unwrap();
    assert_eq!(location(&response), "http://127.0.0.1:8492/");

    for path in ["/chainlit%2Fx", "/%5Cchainlit", "/chainlit%00", "/chain%FFit"] {
        let response = app.clone().oneshot(get_req(path, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{path}");
        let json: Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(json["error"]["code"], "INVALID_PATH");
    }
}

#[tokio::test]
async fn health_endpoint_is_never_gated() {
    let compiled = config(ForwardingStrategy::HttpOnlyCookie)
        .with_matcher("/:path*")
        .compile()
        .unwrap();
    let app = GatewayServer::new(compiled, lookup()).build_app().unwrap();

    let response = app.oneshot(get_req("/healthz", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json: Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["service"], "gatehouse");
}

// ─────────────────────────────────────────────────────────────────────────────
// Forwarding strategies
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn cookie_strategy_sets_http_only_strict_cookie() {
    for (production, secure) in [(false, false), (true, true)] {
        let compiled = config(ForwardingStrategy::HttpOnlyCookie)
            .with_production(production)
            .compile()
            .unwrap();
        let app = GatewayServer::new(compiled, lookup()).build_app().unwrap();

        let response = app.oneshot(get_req("/chainlit/thread/1", Some(TOKEN))).await.unwrap();
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(location(&response), "http://127.0.0.1:8491/");

        let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        assert!(cookie.starts_with("access_token=jwt.payload.sig;"), "{cookie}");
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Strict"));
        assert!(cookie.contains("Path=/"));
        assert_eq!(cookie.contains("Secure"), secure, "{cookie}");
    }
}

#[tokio::test]
async fn query_param_strategy_puts_token_in_location() {
    let compiled = config(ForwardingStrategy::QueryParam).compile().unwrap();
    let app = GatewayServer::new(compiled, lookup()).build_app().unwrap();

    let response = app.oneshot(get_req("/callbacks", Some(TOKEN))).await.unwrap();
    assert_eq!(
        location(&response),
        "http://127.0.0.1:8493/?access_token=jwt.payload.sig"
    );
    assert!(response.headers().get(header::SET_COOKIE).is_none());
}

#[tokio::test]
async fn no_forward_strategy_carries_no_credential() {
    let compiled = config(ForwardingStrategy::NoForward).compile().unwrap();
    let app = GatewayServer::new(compiled, lookup()).build_app().unwrap();

    let response = app.oneshot(get_req("/chainlit", Some(TOKEN))).await.unwrap();
    assert_eq!(location(&response), "http://127.0.0.1:8491/");
    assert!(!location(&response).contains("jwt"));
    assert!(response.headers().get(header::SET_COOKIE).is_none());
}

#[tokio::test]
async fn bearer_header_authenticates_like_a_cookie() {
    let compiled = config(ForwardingStrategy::NoForward).compile().unwrap();
    let app = GatewayServer::new(compiled, lookup()).build_app().unwrap();

    let request = Request::builder()
        .uri("/langgraph")
        .header(header::AUTHORIZATION, format!("Bearer {TOKEN}"))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(location(&response), "http://127.0.0.1:8492/");
}

// ─────────────────────────────────────────────────────────────────────────────
// Collaborator failures
// ─────────────────────────────────────────────────────────────────────────────

enum Failure {
    Error,
    Hang,
}

struct FailingLookup(Failure);

#[async_trait]
impl SessionLookup for FailingLookup {
    fn name(&self) -> &str {
        "failing"
    }

    async fn current_principal(
        &self,
        _request: &RequestCredentials,
    ) -> Result<Option<Principal>, SessionError> {
        match self.0 {
            Failure::Error => Err(SessionError::Unavailable("connection refused".into())),
            Failure::Hang => {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(Some(Principal::new("late")))
            }
        }
    }

    async fn current_credential(
        &self,
        _request: &RequestCredentials,
    ) -> Result<Option<Credential>, SessionError> {
        Ok(Some(Credential::new("t", Utc::now() + ChronoDuration::minutes(5))))
    }
}

fn compiled_no_origin() -> CompiledGateway {
    config(ForwardingStrategy::HttpOnlyCookie).compile().unwrap()
}

#[tokio::test]
async fn collaborator_error_redirects_to_sign_in() {
    let app = GatewayServer::new(compiled_no_origin(), Arc::new(FailingLookup(Failure::Error)))
        .build_app()
        .unwrap();
    let response = app.oneshot(get_req("/chainlit", Some(TOKEN))).await.unwrap();
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(&response), "/signin");
}

#[tokio::test(start_paused = true)]
async fn collaborator_timeout_redirects_to_sign_in() {
    let app = GatewayServer::new(compiled_no_origin(), Arc::new(FailingLookup(Failure::Hang)))
        .build_app()
        .unwrap();
    let response = app.oneshot(get_req("/langgraph", Some(TOKEN))).await.unwrap();
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(&response), "/signin");
}

// ─────────────────────────────────────────────────────────────────────────────
// Origin handling
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn pass_through_without_origin_is_not_found() {
    let app = GatewayServer::new(compiled_no_origin(), lookup()).build_app().unwrap();
    let response = app.oneshot(get_req("/pricing", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json: Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(json["error"]["code"], "NO_ORIGIN");
}

#[tokio::test]
async fn unreachable_origin_is_bad_gateway() {
    let compiled = config(ForwardingStrategy::HttpOnlyCookie)
        .with_origin_url("http://127.0.0.1:1")
        .compile()
        .unwrap();
    let app = GatewayServer::new(compiled, lookup()).build_app().unwrap();
    let response = app.oneshot(get_req("/pricing", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let json: Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(json["error"]["code"], "ORIGIN_UNAVAILABLE");
}

#[tokio::test]
async fn protect_gates_an_embedded_router() {
    let compiled = compiled_no_origin();
    let state = Arc::new(GatewayState::new(&compiled, lookup()).unwrap());
    let app = protect(
        Router::new()
            .route("/unmapped/{*rest}", get(|| async { "inner app" }))
            .route("/about", get(|| async { "about" })),
        state,
    );

    let response = app.clone().oneshot(get_req("/about", None)).await.unwrap();
    assert_eq!(body_string(response).await, "about");

    let response = app.clone().oneshot(get_req("/unmapped/x", None)).await.unwrap();
    assert_eq!(location(&response), "/signin");

    let response = app.oneshot(get_req("/unmapped/x", Some(TOKEN))).await.unwrap();
    assert_eq!(body_string(response).await, "inner app");
}

// ─────────────────────────────────────────────────────────────────────────────
// Supabase session rotation
// ─────────────────────────────────────────────────────────────────────────────

/// Supabase auth stand-in: `rt-1` refreshes to a rotated session, every
/// bearer token except `bad` is a valid user.
async fn spawn_supabase() -> (String, Arc<AtomicUsize>) {
    let refreshes = Arc::new(AtomicUsize::new(0));

    let counter = refreshes.clone();
    let token = move |Json(body): Json<Value>| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            if body["refresh_token"] == "rt-1" {
                let rotated = json!({ "access_token": "rotated", "refresh_token": "rt-2", "expires_in": 3600 });
                (StatusCode::OK, Json(rotated))
            } else {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": "invalid_grant" })))
            }
        }
    };
    let user = |headers: HeaderMap| async move {
        match headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()) {
            Some("Bearer bad") | None => (StatusCode::UNAUTHORIZED, Json(json!({}))),
            Some(_) => (StatusCode::OK, Json(json!({ "id": "user-1" }))),
        }
    };

    let app = Router::new()
        .route("/auth/v1/token", post(token))
        .route("/auth/v1/user", get(user));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), refreshes)
}

fn cookie_req(path: &str, cookie: &str) -> Request<Body> {
    Request::builder()
        .uri(path)
        .header(header::COOKIE, cookie)
        .body(Body::empty())
        .unwrap()
}

fn set_cookies(response: &Response) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn rotated_supabase_session_is_written_back() {
    let (supabase, refreshes) = spawn_supabase().await;
    let mut sb = SupabaseConfig::new(supabase, "anon");
    sb.project_ref = Some("it".into());
    let lookup = SupabaseSessionLookup::new(&sb, Duration::from_secs(5)).unwrap();
    let compiled = config(ForwardingStrategy::NoForward)
        .with_origin_url(spawn_origin().await)
        .compile()
        .unwrap();
    let app = GatewayServer::new(compiled, Arc::new(lookup)).build_app().unwrap();

    let expiring = json!({
        "access_token": "stale",
        "refresh_token": "rt-1",
        "expires_at": Utc::now().timestamp() + 10,
    });
    let stale = format!("sb-it-auth-token={expiring}");

    // Redirect response carries the rotated session.
    let response = app.clone().oneshot(cookie_req("/langgraph", &stale)).await.unwrap();
    assert_eq!(location(&response), "http://127.0.0.1:8492/");
    let cookies = set_cookies(&response);
    assert_eq!(cookies.len(), 1);
    assert!(cookies[0].starts_with("sb-it-auth-token=base64-"), "{}", cookies[0]);
    assert!(cookies[0].contains("SameSite=Lax"));
    assert!(!cookies[0].contains("HttpOnly"));
    assert_eq!(refreshes.load(Ordering::SeqCst), 1);

    // The browser replays the rotated cookie: no second refresh.
    let rotated = cookies[0].split(';').next().unwrap().to_string();
    let response = app.clone().oneshot(cookie_req("/unmapped/page", &rotated)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(set_cookies(&response).is_empty());
    assert!(body_string(response).await.starts_with("origin /unmapped/page"));
    assert_eq!(refreshes.load(Ordering::SeqCst), 1);

    // Pass-through responses carry a rotation too.
    let response = app.oneshot(cookie_req("/unmapped/page", &stale)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let cookies = set_cookies(&response);
    assert_eq!(cookies.len(), 1);
    assert!(cookies[0].starts_with("sb-it-auth-token=base64-"));
    assert_eq!(refreshes.load(Ordering::SeqCst), 2);
}
