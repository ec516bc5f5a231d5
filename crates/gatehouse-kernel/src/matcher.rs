//! Request matcher deciding which paths the gateway runs on at all.
//!
//! Patterns use the named-parameter syntax of Next.js middleware matchers:
//!
//! ```text
//! /chainlit            — exactly `/chainlit`
//! /chainlit/:path      — one extra segment
//! /chainlit/:path?     — zero or one extra segment
//! /chainlit/:path*     — zero or more extra segments
//! /chainlit/:path+     — one or more extra segments
//! ```
//!
//! Matching works on non-empty path segments, so `/chainlit/` and
//! `/chainlit//` both behave like `/chainlit`.

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Repeat {
    One,
    Optional,
    ZeroOrMore,
    OneOrMore,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(Repeat),
}

/// One compiled matcher pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatcherPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl MatcherPattern {
    /// Compile a pattern, rejecting anything outside the supported syntax.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let invalid = |why: &str| ConfigError::InvalidMatcherPattern(raw.to_string(), why.to_string());

        if !raw.starts_with('/') {
            return Err(invalid("pattern must start with '/'"));
        }

        let mut segments = Vec::new();
        for part in raw.split('/').filter(|p| !p.is_empty()) {
            let Some(param) = part.strip_prefix(':') else {
                if part.contains(['*', '+', '?', ':']) {
                    return Err(invalid("modifiers are only allowed on named parameters"));
                }
                segments.push(Segment::Literal(part.to_string()));
                continue;
            };

            let (name, repeat) = match param.char_indices().last() {
                Some((i, '?')) => (&param[..i], Repeat::Optional),
                Some((i, '*')) => (&param[..i], Repeat::ZeroOrMore),
                Some((i, '+')) => (&param[..i], Repeat::OneOrMore),
                _ => (param, Repeat::One),
            };
            if name.is_empty() {
                return Err(invalid("parameter name cannot be empty"));
            }
            if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(invalid("parameter names may only contain [A-Za-z0-9_]"));
            }
            segments.push(Segment::Param(repeat));
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn matches(&self, path: &str) -> bool {
        let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
        match_segments(&self.segments, &parts)
    }
}

fn match_segments(segments: &[Segment], parts: &[&str]) -> bool {
    let Some((head, rest)) = segments.split_first() else {
        return parts.is_empty();
    };
    match head {
        Segment::Literal(lit) => {
            parts.first().is_some_and(|p| *p == lit.as_str()) && match_segments(rest, &parts[1..])
        }
        Segment::Param(Repeat::One) => !parts.is_empty() && match_segments(rest, &parts[1..]),
        Segment::Param(Repeat::Optional) => {
            match_segments(rest, parts) || (!parts.is_empty() && match_segments(rest, &parts[1..]))
        }
        Segment::Param(Repeat::ZeroOrMore) => {
            (0..=parts.len()).any(|taken| match_segments(rest, &parts[taken..]))
        }
        Segment::Param(Repeat::OneOrMore) => {
            (1..=parts.len()).any(|taken| match_segments(rest, &parts[taken..]))
        }
    }
}

/// Set of patterns; a request is gated iff any pattern matches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestMatcher {
    patterns: Vec<MatcherPattern>,
}

impl RequestMatcher {
    pub fn new(patterns: Vec<MatcherPattern>) -> Self {
        Self { patterns }
    }

    /// Compile every raw pattern, failing on the first invalid one.
    pub fn parse<S: AsRef<str>>(raw: &[S]) -> Result<Self, ConfigError> {
        raw.iter()
            .map(|p| MatcherPattern::parse(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()
            .map(Self::new)
    }

    pub fn matches(&self, path: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(path))
    }

    pub fn patterns(&self) -> &[MatcherPattern] {
        &self.patterns
    }
}
