//! Prefix router over the compiled [`RouteTable`].
//!
//! Resolution is a linear scan in declaration order with a
//! segment-bounded prefix test.  Route tables hold a handful of entries, so
//! O(R) per request is both fast enough and trivially correct to verify.

use gatehouse_kernel::{RouteRule, RouteTable};
use tracing::trace;

/// Resolve `path` against `rules`: the first rule whose prefix covers the
/// path, or `None` when the request should pass through.
///
/// Any query string or fragment on `path` is ignored.
pub fn route<'a>(path: &str, rules: &'a RouteTable) -> Option<&'a RouteRule> {
    let path = path.split(['?', '#']).next().unwrap_or(path);
    rules.resolve(path)
}

/// Immutable router built once at startup.
#[derive(Debug, Clone, Default)]
pub struct PrefixRouter {
    table: RouteTable,
}

impl PrefixRouter {
    pub fn new(table: RouteTable) -> Self {
        Self { table }
    }

    pub fn resolve(&self, path: &str) -> Option<&RouteRule> {
        let matched = route(path, &self.table);
        trace!(path, route = matched.map(|r| r.id.as_str()), "route lookup");
        matched
    }

    pub fn rules(&self) -> &[RouteRule] {
        self.table.rules()
    }
}

// =============================================================================
// Tests
// =============================================================================
