//! Gateway configuration, validation and loading.
//!
//! [`GatewayConfig`] is the serde representation read from disk.  Call
//! [`validate()`](GatewayConfig::validate) to check every structural
//! invariant, or [`compile()`](GatewayConfig::compile) to validate and
//! produce the immutable [`CompiledGateway`] the runtime is built from.
//!
//! Files may be TOML, YAML or JSON; `${VAR}` references are substituted from
//! the process environment before parsing, and `GATEHOUSE_*` variables
//! override individual keys (`GATEHOUSE_PRODUCTION=true`,
//! `GATEHOUSE_COOKIE__NAME=sid`, …).
//!
//! ```toml
//! matcher = ["/chainlit/:path*", "/langgraph/:path*"]
//! forwarding = "http_only_cookie"
//!
//! [[backends]]
//! id = "chainlit"
//! url = "http://127.0.0.1:8491/"
//!
//! [[routes]]
//! id = "chainlit"
//! prefix = "/chainlit"
//! backend = "chainlit"
//! ```

use crate::error::ConfigError;
use crate::forwarding::ForwardingStrategy;
use crate::matcher::RequestMatcher;
use crate::route::{RouteRule, RouteTable};
use config::{Config as Cfg, Environment, File, FileFormat};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;
use url::Url;

// ─────────────────────────────────────────────────────────────────────────────
// Sections
// ─────────────────────────────────────────────────────────────────────────────

/// A named backend target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    pub id: String,
    /// Redirect target.  Used verbatim as the `Location` header unless a
    /// query parameter has to be appended.
    pub url: String,
}

impl BackendConfig {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
        }
    }
}

/// A `(prefix → backend id)` routing entry.  Order in the file is the
/// matching order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteConfig {
    pub id: String,
    pub prefix: String,
    pub backend: String,
}

impl RouteConfig {
    pub fn new(
        id: impl Into<String>,
        prefix: impl Into<String>,
        backend: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            prefix: prefix.into(),
            backend: backend.into(),
        }
    }
}

/// Settings for the cookie emitted by [`ForwardingStrategy::HttpOnlyCookie`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CookieSettings {
    pub name: String,
    /// Optional `Domain` attribute, for backends on sibling subdomains.
    pub domain: Option<String>,
}

impl Default for CookieSettings {
    fn default() -> Self {
        Self {
            name: "access_token".to_string(),
            domain: None,
        }
    }
}

/// Connection settings for the Supabase auth API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupabaseConfig {
    pub url: String,
    pub anon_key: String,
    /// Overrides the project ref derived from the URL host (used to name the
    /// `sb-<ref>-auth-token` cookie).
    #[serde(default)]
    pub project_ref: Option<String>,
}

impl SupabaseConfig {
    pub fn new(url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            anon_key: anon_key.into(),
            project_ref: None,
        }
    }

    /// Project ref: the explicit override, or the first label of the host.
    pub fn project_ref(&self) -> Option<String> {
        if let Some(r) = &self.project_ref {
            return Some(r.clone());
        }
        let url = Url::parse(&self.url).ok()?;
        let host = url.host_str()?;
        host.split('.').next().map(str::to_string)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if Url::parse(&self.url).is_err() {
            return Err(ConfigError::InvalidSupabaseConfig("url".to_string()));
        }
        if self.anon_key.trim().is_empty() {
            return Err(ConfigError::InvalidSupabaseConfig("anon_key".to_string()));
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// GatewayConfig
// ─────────────────────────────────────────────────────────────────────────────

/// Top-level gateway configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Instance identifier used in logs.
    pub id: String,
    /// Socket address to bind.
    pub listen_addr: String,
    /// Where unauthenticated callers are sent.
    pub sign_in_path: String,
    /// Application the gateway passes unrouted traffic through to.
    pub origin_url: Option<String>,
    /// Path patterns the gateway runs on.  Everything else bypasses it.
    pub matcher: Vec<String>,
    pub backends: Vec<BackendConfig>,
    /// Ordered; first match wins.
    pub routes: Vec<RouteConfig>,
    pub forwarding: ForwardingStrategy,
    /// Production deployments mark the forwarding cookie `Secure`.
    pub production: bool,
    pub cookie: CookieSettings,
    /// Upper bound for each session-lookup call.
    pub auth_timeout_ms: u64,
    pub supabase: Option<SupabaseConfig>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            id: "gatehouse".to_string(),
            listen_addr: "0.0.0.0:3000".to_string(),
            sign_in_path: "/signin".to_string(),
            origin_url: None,
            matcher: Vec::new(),
            backends: Vec::new(),
            routes: Vec::new(),
            forwarding: ForwardingStrategy::default(),
            production: false,
            cookie: CookieSettings::default(),
            auth_timeout_ms: 5_000,
            supabase: None,
        }
    }
}

impl GatewayConfig {
    /// Construct a config with defaults and the given id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Builder: add a matcher pattern.
    pub fn with_matcher(mut self, pattern: impl Into<String>) -> Self {
        self.matcher.push(pattern.into());
        self
    }

    /// Builder: add a backend.
    pub fn with_backend(mut self, backend: BackendConfig) -> Self {
        self.backends.push(backend);
        self
    }

    /// Builder: append a route (lowest priority so far).
    pub fn with_route(mut self, route: RouteConfig) -> Self {
        self.routes.push(route);
        self
    }

    /// Builder: select the forwarding strategy.
    pub fn with_forwarding(mut self, strategy: ForwardingStrategy) -> Self {
        self.forwarding = strategy;
        self
    }

    /// Builder: mark the deployment as production.
    pub fn with_production(mut self, production: bool) -> Self {
        self.production = production;
        self
    }

    /// Builder: set the origin pass-through URL.
    pub fn with_origin_url(mut self, url: impl Into<String>) -> Self {
        self.origin_url = Some(url.into());
        self
    }

    /// Builder: set the session-lookup timeout.
    pub fn with_auth_timeout_ms(mut self, ms: u64) -> Self {
        self.auth_timeout_ms = ms;
        self
    }

    /// Builder: set the Supabase section.
    pub fn with_supabase(mut self, supabase: SupabaseConfig) -> Self {
        self.supabase = Some(supabase);
        self
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Validation
    // ─────────────────────────────────────────────────────────────────────────

    /// Validate all structural invariants of this configuration.
    ///
    /// Returns the *first* detected [`ConfigError`].  Checks, in order:
    /// 1. Gateway id is non-empty.
    /// 2. Sign-in path is absolute.
    /// 3. `auth_timeout_ms` is non-zero.
    /// 4. The matcher is non-empty and every pattern compiles.
    /// 5. The cookie name is a valid cookie token.
    /// 6. The origin URL, if any, parses.
    /// 7. Backend ids are non-empty and unique; urls are absolute http(s).
    /// 8. Route ids are non-empty and unique; prefixes are absolute; every
    ///    backend reference resolves; no route is shadowed by an earlier one.
    /// 9. The Supabase section, if any, is complete.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_and_resolve().map(|_| ())
    }

    /// Validate and build the immutable runtime view.
    pub fn compile(&self) -> Result<CompiledGateway, ConfigError> {
        let (matcher, routes) = self.validate_and_resolve()?;
        Ok(CompiledGateway {
            id: self.id.clone(),
            sign_in_path: self.sign_in_path.clone(),
            origin_url: self.origin_url.clone(),
            matcher,
            routes,
            forwarding: self.forwarding,
            production: self.production,
            cookie: self.cookie.clone(),
            auth_timeout: Duration::from_millis(self.auth_timeout_ms),
            supabase: self.supabase.clone(),
        })
    }

    fn validate_and_resolve(&self) -> Result<(RequestMatcher, RouteTable), ConfigError> {
        // ── 1–3. Scalars ─────────────────────────────────────────────────────
        if self.id.trim().is_empty() {
            return Err(ConfigError::EmptyGatewayId);
        }
        if !self.sign_in_path.starts_with('/') {
            return Err(ConfigError::InvalidSignInPath(self.sign_in_path.clone()));
        }
        if self.auth_timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout);
        }

        // ── 4. Matcher ───────────────────────────────────────────────────────
        if self.matcher.is_empty() {
            return Err(ConfigError::EmptyMatcher);
        }
        let matcher = RequestMatcher::parse(&self.matcher)?;

        // ── 5. Cookie ────────────────────────────────────────────────────────
        let name = &self.cookie.name;
        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_ascii_graphic() && !"()<>@,;:\\\"/[]?={}".contains(c))
        {
            return Err(ConfigError::InvalidCookieName(name.clone()));
        }

        // ── 6. Origin ────────────────────────────────────────────────────────
        if let Some(origin) = &self.origin_url {
            if parse_http_url(origin).is_none() {
                return Err(ConfigError::InvalidOriginUrl(origin.clone()));
            }
        }

        // ── 7. Backends ──────────────────────────────────────────────────────
        let mut backends: HashMap<&str, &BackendConfig> = HashMap::new();
        for backend in &self.backends {
            if backend.id.trim().is_empty() {
                return Err(ConfigError::EmptyBackendId);
            }
            if parse_http_url(&backend.url).is_none() {
                return Err(ConfigError::InvalidTargetUrl(
                    backend.id.clone(),
                    backend.url.clone(),
                ));
            }
            if backends.insert(backend.id.as_str(), backend).is_some() {
                return Err(ConfigError::DuplicateBackend(backend.id.clone()));
            }
        }

        // ── 8. Routes ────────────────────────────────────────────────────────
        let mut seen = HashSet::new();
        let mut rules: Vec<RouteRule> = Vec::with_capacity(self.routes.len());
        for route in &self.routes {
            if route.id.trim().is_empty() {
                return Err(ConfigError::EmptyRouteId);
            }
            if !seen.insert(route.id.as_str()) {
                return Err(ConfigError::DuplicateRoute(route.id.clone()));
            }
            if !route.prefix.starts_with('/') {
                return Err(ConfigError::InvalidPrefix(
                    route.id.clone(),
                    "prefix must start with '/'".to_string(),
                ));
            }
            if route.prefix.contains(['?', '#']) {
                return Err(ConfigError::InvalidPrefix(
                    route.id.clone(),
                    "prefix must be a bare path".to_string(),
                ));
            }
            let backend = backends.get(route.backend.as_str()).ok_or_else(|| {
                ConfigError::UnknownBackend(route.id.clone(), route.backend.clone())
            })?;
            if let Some(earlier) = rules.iter().find(|r| r.matches(&route.prefix)) {
                return Err(ConfigError::ShadowedRoute(
                    route.id.clone(),
                    earlier.id.clone(),
                ));
            }
            rules.push(RouteRule::new(&route.id, &route.prefix, &backend.url));
        }

        // ── 9. Supabase ──────────────────────────────────────────────────────
        if let Some(supabase) = &self.supabase {
            supabase.validate()?;
        }

        Ok((matcher, RouteTable::new(rules)))
    }
}

fn parse_http_url(raw: &str) -> Option<Url> {
    let url = Url::parse(raw).ok()?;
    (matches!(url.scheme(), "http" | "https") && url.host_str().is_some()).then_some(url)
}

// ─────────────────────────────────────────────────────────────────────────────
// CompiledGateway
// ─────────────────────────────────────────────────────────────────────────────

/// Validated, immutable configuration the runtime is built from.
#[derive(Debug, Clone)]
pub struct CompiledGateway {
    pub id: String,
    pub sign_in_path: String,
    pub origin_url: Option<String>,
    pub matcher: RequestMatcher,
    pub routes: RouteTable,
    pub forwarding: ForwardingStrategy,
    pub production: bool,
    pub cookie: CookieSettings,
    pub auth_timeout: Duration,
    pub supabase: Option<SupabaseConfig>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Loading
// ─────────────────────────────────────────────────────────────────────────────

static ENV_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("env reference pattern is valid")
});

/// Detect the configuration format from a file extension.
pub fn detect_format(path: &str) -> Result<FileFormat, ConfigError> {
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .ok_or_else(|| ConfigError::UnsupportedFormat("no file extension found".to_string()))?;

    match ext.to_lowercase().as_str() {
        "yaml" | "yml" => Ok(FileFormat::Yaml),
        "toml" => Ok(FileFormat::Toml),
        "json" => Ok(FileFormat::Json),
        _ => Err(ConfigError::UnsupportedFormat(ext.to_string())),
    }
}

/// Replace `${VAR}` references with values from the environment.
/// Unknown variables are left untouched.
pub fn substitute_env_vars(content: &str) -> String {
    ENV_REF
        .replace_all(content, |caps: &regex::Captures| {
            std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
        })
        .into_owned()
}

/// Parse configuration from a string with an explicit format.
pub fn from_str<T>(content: &str, format: FileFormat) -> Result<T, ConfigError>
where
    T: DeserializeOwned,
{
    let substituted = substitute_env_vars(content);
    Cfg::builder()
        .add_source(File::from_str(&substituted, format))
        .build()
        .map_err(|e| ConfigError::Parse(e.to_string()))?
        .try_deserialize()
        .map_err(|e| ConfigError::Parse(e.to_string()))
}

/// Load configuration from a file, then apply `GATEHOUSE_*` overrides.
pub fn load_config<T>(path: &str) -> Result<T, ConfigError>
where
    T: DeserializeOwned,
{
    let format = detect_format(path)?;
    let content =
        std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_string(), e.to_string()))?;
    let substituted = substitute_env_vars(&content);

    Cfg::builder()
        .add_source(File::from_str(&substituted, format))
        .add_source(
            Environment::with_prefix("GATEHOUSE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .map_err(|e| ConfigError::Parse(e.to_string()))?
        .try_deserialize()
        .map_err(|e| ConfigError::Parse(e.to_string()))
}
