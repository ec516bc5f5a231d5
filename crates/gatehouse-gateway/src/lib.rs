//! `gatehouse-gateway` — authenticated edge gateway runtime.
//!
//! This crate provides the concrete implementations of the contracts defined
//! in `gatehouse-kernel`:
//!
//! | Concern | Implementation |
//! |---------|----------------|
//! | Session authentication | [`auth::Authenticator`] over any [`SessionLookup`](gatehouse_kernel::SessionLookup) |
//! | Session lookup | [`auth::SupabaseSessionLookup`], [`auth::InMemorySessionLookup`] |
//! | Path routing | [`router::PrefixRouter`] |
//! | Credential forwarding | [`forward::Forwarder`] |
//! | Per-request state machine | [`dispatch::Dispatcher`] |
//! | axum integration | [`middleware::gate`], [`server::GatewayServer`] |
//!
//! # Quick start
//!
//! ```rust,no_run
//! use gatehouse_gateway::auth::SupabaseSessionLookup;
//! use gatehouse_gateway::server::GatewayServer;
//! use gatehouse_kernel::{
//!     BackendConfig, ForwardingStrategy, GatewayConfig, RouteConfig, SupabaseConfig,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = GatewayConfig::new("edge")
//!         .with_matcher("/chainlit/:path*")
//!         .with_backend(BackendConfig::new("chainlit", "http://127.0.0.1:8491/"))
//!         .with_route(RouteConfig::new("chainlit", "/chainlit", "chainlit"))
//!         .with_forwarding(ForwardingStrategy::HttpOnlyCookie)
//!         .with_supabase(SupabaseConfig::new("https://abc.supabase.co", "anon-key"));
//!
//!     let compiled = config.compile().unwrap();
//!     let supabase = compiled.supabase.clone().unwrap();
//!     let lookup = SupabaseSessionLookup::new(&supabase, compiled.auth_timeout).unwrap();
//!
//!     GatewayServer::new(compiled, Arc::new(lookup))
//!         .start("0.0.0.0:3000")
//!         .await
//!         .unwrap();
//! }
//! ```

pub mod auth;
pub mod dispatch;
pub mod error;
pub mod forward;
pub mod middleware;
pub mod origin;
pub mod router;
pub mod server;
pub mod state;

// Re-export the kernel contract for convenience.
pub use gatehouse_kernel as kernel;
