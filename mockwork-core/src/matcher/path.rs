//! Path predicates.

use crate::error::{MockworkError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// How a path pattern is compared with a request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathMatchType {
    /// Full path equality.
    Exact,
    /// Path contains the pattern.
    Contains,
    /// Path starts with the pattern.
    Prefix,
    /// Path matches a regular expression (unanchored unless the pattern anchors).
    Regex,
    /// Anchored glob: `*` matches any run of characters, `?` exactly one.
    Wildcard,
}

/// A compiled path predicate. Comparison is case-sensitive.
#[derive(Debug, Clone)]
pub struct PathPattern {
    kind: PathMatchType,
    pattern: String,
    regex: Option<Regex>,
}

impl PathPattern {
    /// Compile a pattern. Regex and wildcard patterns are validated here so a
    /// malformed matcher fails at setup.
    pub fn compile(kind: PathMatchType, pattern: impl Into<String>) -> Result<Self> {
        let pattern = pattern.into();
        let regex = match kind {
            PathMatchType::Regex => Some(build_regex(&pattern, &pattern)?),
            PathMatchType::Wildcard => Some(build_regex(&wildcard_to_regex(&pattern), &pattern)?),
            _ => None,
        };
        Ok(Self {
            kind,
            pattern,
            regex,
        })
    }

    /// Match type.
    pub fn kind(&self) -> PathMatchType {
        self.kind
    }

    /// Pattern as configured.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Check a request path against this pattern.
    pub fn is_match(&self, path: &str) -> bool {
        match self.kind {
            PathMatchType::Exact => path == self.pattern,
            PathMatchType::Contains => path.contains(&self.pattern),
            PathMatchType::Prefix => path.starts_with(&self.pattern),
            PathMatchType::Regex | PathMatchType::Wildcard => self
                .regex
                .as_ref()
                .is_some_and(|re| re.is_match(path)),
        }
    }
}

fn build_regex(source: &str, pattern: &str) -> Result<Regex> {
    Regex::new(source).map_err(|e| MockworkError::InvalidMatcher {
        pattern: pattern.to_string(),
        cause: e.to_string(),
    })
}

fn wildcard_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 8);
    out.push('^');
    for c in pattern.chars() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }
    out.push('$');
    out
}
