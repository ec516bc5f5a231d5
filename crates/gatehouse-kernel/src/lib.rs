//! Gatehouse kernel contract.
//!
//! This crate defines the *data model, trait interfaces and configuration
//! types* for the Gatehouse edge gateway.  No network I/O lives here; the runtime
//! (authenticator, router, forwarder, axum middleware, Supabase client)
//! belongs in `gatehouse-gateway`.
//!
//! # Architecture mapping
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │              gatehouse-kernel  (this crate)                 │
//! │  SessionLookup trait     RouteRule / RouteTable             │
//! │  ForwardingStrategy      RequestMatcher                     │
//! │  GatewayDecision         GatewayConfig + validate()         │
//! └──────────────────────────┬──────────────────────────────────┘
//!                            │  depends on
//! ┌──────────────────────────▼──────────────────────────────────┐
//! │              gatehouse-gateway  (runtime crate)             │
//! │  Authenticator   PrefixRouter   Forwarder   Dispatcher      │
//! │  SupabaseSessionLookup   OriginProxy   GatewayServer        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use gatehouse_kernel::{BackendConfig, ForwardingStrategy, GatewayConfig, RouteConfig};
//!
//! let config = GatewayConfig::new("edge")
//!     .with_matcher("/chainlit/:path*")
//!     .with_backend(BackendConfig::new("chainlit", "http://127.0.0.1:8491/"))
//!     .with_route(RouteConfig::new("chainlit", "/chainlit", "chainlit"))
//!     .with_forwarding(ForwardingStrategy::HttpOnlyCookie);
//!
//! let compiled = config.compile().expect("gateway config is valid");
//! assert_eq!(compiled.routes.len(), 1);
//! ```

pub mod config;
pub mod decision;
pub mod error;
pub mod forwarding;
pub mod matcher;
pub mod route;
pub mod session;

// ── Flat re-exports ────────────────────────────────────────────────────────

pub use config::{
    BackendConfig, CompiledGateway, CookieSettings, GatewayConfig, RouteConfig, SupabaseConfig,
};
pub use decision::{DispatchOutcome, GatewayDecision};
pub use error::{ConfigError, SessionError};
pub use forwarding::{ForwardingStrategy, SameSite, SessionCookie};
pub use matcher::{MatcherPattern, RequestMatcher};
pub use route::{RouteRule, RouteTable};
pub use session::{Credential, Principal, RequestCredentials, Session, SessionLookup};
