//! Credential forwarding strategy and the cookie it may emit.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How the resolved credential reaches the chosen backend.
///
/// Exactly one strategy is active for a gateway instance; switching is a
/// configuration change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForwardingStrategy {
    /// Bare redirect, no credential attached.
    NoForward,
    /// `access_token=<value>` appended to the redirect URL.
    ///
    /// The token ends up in browser history, proxy logs and `Referer`
    /// headers.
    QueryParam,
    /// Credential set as an HTTP-only, same-site-strict cookie.
    #[default]
    HttpOnlyCookie,
}

impl ForwardingStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ForwardingStrategy::NoForward => "no_forward",
            ForwardingStrategy::QueryParam => "query_param",
            ForwardingStrategy::HttpOnlyCookie => "http_only_cookie",
        }
    }
}

impl fmt::Display for ForwardingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `SameSite` cookie attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl SameSite {
    pub fn as_str(&self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }
}

/// A `Set-Cookie` the gateway emits: the forwarded credential, or a
/// rotated session written back to the client.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
    pub path: String,
    pub domain: Option<String>,
    pub max_age: Option<i64>,
    pub http_only: bool,
    pub secure: bool,
    pub same_site: SameSite,
}

impl SessionCookie {
    /// Render the value of a `Set-Cookie` header.
    pub fn to_header_value(&self) -> String {
        let mut out = format!("{}={}; Path={}", self.name, self.value, self.path);
        if let Some(domain) = &self.domain {
            out.push_str("; Domain=");
            out.push_str(domain);
        }
        if let Some(max_age) = self.max_age {
            out.push_str(&format!("; Max-Age={max_age}"));
        }
        if self.http_only {
            out.push_str("; HttpOnly");
        }
        if self.secure {
            out.push_str("; Secure");
        }
        out.push_str("; SameSite=");
        out.push_str(self.same_site.as_str());
        out
    }
}

impl fmt::Debug for SessionCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCookie")
            .field("name", &self.name)
            .field("value", &"<redacted>")
            .field("path", &self.path)
            .field("domain", &self.domain)
            .field("max_age", &self.max_age)
            .field("http_only", &self.http_only)
            .field("secure", &self.secure)
            .field("same_site", &self.same_site)
            .finish()
    }
}
