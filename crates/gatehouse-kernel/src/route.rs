//! Prefix route rules.
//!
//! A [`RouteRule`] maps a path prefix to a backend target URL.  Matching is
//! segment-bounded: `/chainlit` covers `/chainlit` and `/chainlit/x` but not
//! `/chainlitfoo`.  Rules live in a [`RouteTable`] in declaration order and
//! the first match wins.

use serde::{Deserialize, Serialize};

/// A single `(prefix → target)` routing rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRule {
    /// Stable identifier used in logs.
    pub id: String,
    /// Absolute path prefix.  A trailing `/` is ignored when matching.
    pub prefix: String,
    /// Backend target URL, exactly as configured.
    pub target: String,
}

impl RouteRule {
    pub fn new(
        id: impl Into<String>,
        prefix: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            prefix: prefix.into(),
            target: target.into(),
        }
    }

    /// Segment-bounded prefix test.
    pub fn matches(&self, path: &str) -> bool {
        let prefix = self.prefix.trim_end_matches('/');
        if prefix.is_empty() {
            return true;
        }
        path.strip_prefix(prefix)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
    }
}

/// Ordered, immutable list of route rules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteTable {
    rules: Vec<RouteRule>,
}

impl RouteTable {
    pub fn new(rules: Vec<RouteRule>) -> Self {
        Self { rules }
    }

    /// First rule, in declaration order, whose prefix covers `path`.
    pub fn resolve(&self, path: &str) -> Option<&RouteRule> {
        self.rules.iter().find(|rule| rule.matches(path))
    }

    pub fn rules(&self) -> &[RouteRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(prefix: &str) -> RouteRule {
        RouteRule::new("r", prefix, "http://backend")
    }

    #[test]
    fn prefix_respects_segment_boundary() {
        let r = rule("/chainlit");
        assert!(r.matches("/chainlit"));
        assert!(r.matches("/chainlit/"));
        assert!(r.matches("/chainlit/x/y"));
        assert!(!r.matches("/chainlitx"));
        assert!(!r.matches("/chainlitfoo/bar"));
        assert!(!r.matches("/other/chainlit"));
    }

    #[test]
    fn trailing_slash_on_prefix_is_ignored() {
        let r = rule("/langgraph/");
        assert!(r.matches("/langgraph"));
        assert!(r.matches("/langgraph/abc"));
        assert!(!r.matches("/langgraphs"));
    }

    #[test]
    fn root_prefix_matches_everything() {
        let r = rule("/");
        assert!(r.matches("/"));
        assert!(r.matches("/anything/at/all"));
    }

    #[test]
    fn table_returns_first_declared_match() {
        let table = RouteTable::new(vec![
            RouteRule::new("specific", "/api/v2", "http://v2"),
            RouteRule::new("general", "/api", "http://api"),
        ]);
        assert_eq!(table.resolve("/api/v2/users").unwrap().id, "specific");
        assert_eq!(table.resolve("/api/v1/users").unwrap().id, "general");
        assert!(table.resolve("/apiary").is_none());
    }
}
