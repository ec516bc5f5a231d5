//! Error types for `gatehouse-kernel`.
//!
//! [`ConfigError`] covers every failure mode that can be detected at
//! *definition time* — empty ids, unknown backends, shadowed routes, invalid
//! matcher patterns — before the gateway accepts a single request.
//! [`SessionError`] is what a [`SessionLookup`](crate::SessionLookup)
//! collaborator returns when it cannot answer; the gateway treats it exactly
//! like "no session".

use thiserror::Error;

/// Configuration error type for the gateway kernel contract.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    // ── Identity ────────────────────────────────────────────────────────────
    /// The gateway configuration `id` field is empty or whitespace-only.
    #[error("gateway id cannot be empty")]
    EmptyGatewayId,

    // ── Matcher ─────────────────────────────────────────────────────────────
    /// The matcher list is empty, so the gateway would never run.
    #[error("matcher must contain at least one path pattern")]
    EmptyMatcher,

    /// A matcher pattern is syntactically invalid.
    #[error("matcher pattern '{0}' is invalid: {1}")]
    InvalidMatcherPattern(String, String),

    // ── Routes ──────────────────────────────────────────────────────────────
    /// A route `id` field is empty or whitespace-only.
    #[error("route id cannot be empty")]
    EmptyRouteId,

    /// A route with this id has already been declared.
    #[error("route '{0}' is declared more than once")]
    DuplicateRoute(String),

    /// A route prefix is not an absolute path.
    #[error("route '{0}' has an invalid prefix: {1}")]
    InvalidPrefix(String, String),

    /// A route can never match because an earlier route's prefix covers it.
    #[error("route '{0}' is unreachable: prefix is shadowed by earlier route '{1}'")]
    ShadowedRoute(String, String),

    /// A route references a backend id that is not present in the backend list.
    #[error("route '{0}' references unknown backend '{1}'")]
    UnknownBackend(String, String),

    // ── Backends ────────────────────────────────────────────────────────────
    /// A backend `id` field is empty or whitespace-only.
    #[error("backend id cannot be empty")]
    EmptyBackendId,

    /// A backend with this id has already been declared.
    #[error("backend '{0}' is declared more than once")]
    DuplicateBackend(String),

    /// A backend target URL does not parse as an absolute http(s) URL.
    #[error("backend '{0}' has an invalid target url: {1}")]
    InvalidTargetUrl(String, String),

    // ── Misc settings ───────────────────────────────────────────────────────
    /// The sign-in path is not an absolute path.
    #[error("sign-in path must start with '/': {0}")]
    InvalidSignInPath(String),

    /// The origin URL does not parse.
    #[error("origin url is invalid: {0}")]
    InvalidOriginUrl(String),

    /// `auth_timeout_ms` is zero, which would reject every request.
    #[error("auth timeout must be greater than 0 ms")]
    InvalidTimeout,

    /// The forwarding cookie name is empty or contains forbidden characters.
    #[error("cookie name '{0}' is invalid")]
    InvalidCookieName(String),

    /// The Supabase section is present but incomplete.
    #[error("supabase config is missing required field: {0}")]
    InvalidSupabaseConfig(String),

    // ── Loading ─────────────────────────────────────────────────────────────
    /// Reading the configuration file failed.
    #[error("failed to read config file '{0}': {1}")]
    Io(String, String),

    /// The file extension does not map to a supported format.
    #[error("unsupported config format: {0}")]
    UnsupportedFormat(String),

    /// The configuration source could not be parsed or deserialized.
    #[error("config parsing error: {0}")]
    Parse(String),
}

/// Failure reported by a session-lookup collaborator.
///
/// The gateway never distinguishes between these variants when deciding what
/// to do with a request; they exist for logs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionError {
    /// The collaborator could not be reached (network error, timeout).
    #[error("session backend unavailable: {0}")]
    Unavailable(String),

    /// The collaborator answered with something the gateway cannot use.
    #[error("session backend returned an unexpected response: {0}")]
    InvalidResponse(String),

    /// The session material carried by the request is malformed.
    #[error("malformed session data: {0}")]
    Malformed(String),
}
