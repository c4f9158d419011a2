//! Declarative request matching.
//!
//! A [`RequestMatcher`] is built fluently during test setup and compiled
//! into a [`CompiledMatcher`] when it is registered. Compilation validates
//! regex/wildcard paths and header names, so misconfiguration surfaces before
//! any request is dispatched.
//!
//! # Example
//!
//! ```
//! use mockwork_core::matcher::{PathMatchType, RequestMatcher};
//! use mockwork_core::http::MockRequest;
//! use http::Method;
//!
//! let matcher = RequestMatcher::create()
//!     .using_get()
//!     .with_path(PathMatchType::Exact, "/api/v1/data")
//!     .compile()
//!     .unwrap();
//!
//! let request = MockRequest::new(Method::GET, "http://localhost/api/v1/data").unwrap();
//! assert!(matcher.matches(&request));
//! ```

mod path;

pub use path::{PathMatchType, PathPattern};

use crate::error::{MockworkError, Result};
use crate::http::MockRequest;
use http::Method;
use http::header::{CONTENT_TYPE, HeaderName};
use std::fmt;

/// Fluent, uncompiled description of the requests a binding applies to.
#[derive(Debug, Clone, Default)]
pub struct RequestMatcher {
    methods: Vec<Method>,
    paths: Vec<(PathMatchType, String)>,
    headers: Vec<(String, String)>,
    query_params: Vec<(String, String)>,
    content_type: Option<String>,
    match_count: Option<usize>,
}

impl RequestMatcher {
    /// Start a matcher that matches every request.
    pub fn create() -> Self {
        Self::default()
    }

    /// Match the given method. Repeated calls accept any of the methods.
    pub fn using_method(mut self, method: Method) -> Self {
        if !self.methods.contains(&method) {
            self.methods.push(method);
        }
        self
    }

    /// Match any method (clears earlier method constraints).
    pub fn using_any_method(mut self) -> Self {
        self.methods.clear();
        self
    }

    /// Match GET.
    pub fn using_get(self) -> Self {
        self.using_method(Method::GET)
    }

    /// Match POST.
    pub fn using_post(self) -> Self {
        self.using_method(Method::POST)
    }

    /// Match PUT.
    pub fn using_put(self) -> Self {
        self.using_method(Method::PUT)
    }

    /// Match PATCH.
    pub fn using_patch(self) -> Self {
        self.using_method(Method::PATCH)
    }

    /// Match DELETE.
    pub fn using_delete(self) -> Self {
        self.using_method(Method::DELETE)
    }

    /// Match a path. Repeated calls accept a request matching any of them.
    pub fn with_path(mut self, kind: PathMatchType, pattern: impl Into<String>) -> Self {
        self.paths.push((kind, pattern.into()));
        self
    }

    /// Require a header with exactly this value.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Require a query parameter with exactly this value.
    pub fn with_query_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_params.push((name.into(), value.into()));
        self
    }

    /// Require the `Content-Type` header to start with this media type.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Stop matching after `n` matched dispatches.
    pub fn with_match_count(mut self, n: usize) -> Self {
        self.match_count = Some(n);
        self
    }

    /// Validate and compile the matcher.
    pub fn compile(self) -> Result<CompiledMatcher> {
        let paths = self
            .paths
            .into_iter()
            .map(|(kind, pattern)| PathPattern::compile(kind, pattern))
            .collect::<Result<Vec<_>>>()?;

        let headers = self
            .headers
            .into_iter()
            .map(|(name, value)| {
                HeaderName::from_bytes(name.as_bytes())
                    .map(|header| (header, value))
                    .map_err(|e| MockworkError::InvalidMatcher {
                        pattern: name.clone(),
                        cause: format!("invalid header name: {}", e),
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        if self.match_count == Some(0) {
            return Err(MockworkError::InvalidMatcher {
                pattern: "match_count".to_string(),
                cause: "match count must be positive".to_string(),
            });
        }

        Ok(CompiledMatcher {
            methods: self.methods,
            paths,
            headers,
            query_params: self.query_params,
            content_type: self.content_type,
            match_count: self.match_count,
        })
    }
}

/// An immutable, validated request predicate.
#[derive(Debug, Clone)]
pub struct CompiledMatcher {
    methods: Vec<Method>,
    paths: Vec<PathPattern>,
    headers: Vec<(HeaderName, String)>,
    query_params: Vec<(String, String)>,
    content_type: Option<String>,
    match_count: Option<usize>,
}

impl CompiledMatcher {
    /// Check the request against every declared constraint.
    pub fn matches(&self, request: &MockRequest) -> bool {
        if !self.methods.is_empty() && !self.methods.contains(&request.method) {
            return false;
        }

        if !self.paths.is_empty() && !self.paths.iter().any(|p| p.is_match(&request.path)) {
            return false;
        }

        let headers_ok = self.headers.iter().all(|(name, expected)| {
            request
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .is_some_and(|actual| actual == expected)
        });
        if !headers_ok {
            return false;
        }

        let query_ok = self
            .query_params
            .iter()
            .all(|(name, expected)| request.query_param(name) == Some(expected.as_str()));
        if !query_ok {
            return false;
        }

        match &self.content_type {
            Some(expected) => request
                .headers
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .is_some_and(|actual| actual.starts_with(expected.as_str())),
            None => true,
        }
    }

    /// Maximum number of matched dispatches, if limited.
    pub fn match_count(&self) -> Option<usize> {
        self.match_count
    }
}

impl fmt::Display for CompiledMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.methods.is_empty() {
            f.write_str("ANY")?;
        } else {
            let methods: Vec<&str> = self.methods.iter().map(Method::as_str).collect();
            f.write_str(&methods.join("|"))?;
        }
        if self.paths.is_empty() {
            f.write_str(" *")
        } else {
            let paths: Vec<String> = self
                .paths
                .iter()
                .map(|p| format!("{:?}({})", p.kind(), p.pattern()))
                .collect();
            write!(f, " {}", paths.join("|"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get(uri: &str) -> MockRequest {
        MockRequest::new(Method::GET, uri).unwrap()
    }

    #[test]
    fn empty_matcher_matches_everything() {
        let m = RequestMatcher::create().compile().unwrap();
        assert!(m.matches(&get("http://localhost/anything")));
    }

    #[test]
    fn method_must_match() {
        let m = RequestMatcher::create().using_post().compile().unwrap();
        assert!(!m.matches(&get("http://localhost/api")));

        let either = RequestMatcher::create()
            .using_get()
            .using_post()
            .compile()
            .unwrap();
        assert!(either.matches(&get("http://localhost/api")));
    }

    #[test]
    fn any_of_several_paths() {
        let m = RequestMatcher::create()
            .with_path(PathMatchType::Exact, "/a")
            .with_path(PathMatchType::Exact, "/b")
            .compile()
            .unwrap();
        assert!(m.matches(&get("http://localhost/a")));
        assert!(m.matches(&get("http://localhost/b")));
        assert!(!m.matches(&get("http://localhost/c")));
    }

    #[test]
    fn required_header_absent_or_different_fails() {
        let m = RequestMatcher::create()
            .with_header("transfer-mode", "chunked")
            .compile()
            .unwrap();

        assert!(!m.matches(&get("http://localhost/upload")));
        assert!(!m.matches(&get("http://localhost/upload").with_header("transfer-mode", "whole")));
        assert!(m.matches(&get("http://localhost/upload").with_header("Transfer-Mode", "chunked")));
        assert!(m.matches(
            &get("http://localhost/upload")
                .with_header("transfer-mode", "chunked")
                .with_header("x-extra", "ignored")
        ));
    }

    #[test]
    fn query_and_content_type() {
        let m = RequestMatcher::create()
            .with_query_param("type", "physical")
            .with_content_type("application/json")
            .compile()
            .unwrap();

        let ok = get("http://localhost/address?type=physical")
            .with_header("content-type", "application/json; charset=utf-8");
        assert!(m.matches(&ok));

        let wrong_query = get("http://localhost/address?type=postal")
            .with_header("content-type", "application/json");
        assert!(!m.matches(&wrong_query));
    }

    #[test]
    fn invalid_header_name_fails_compile() {
        let err = RequestMatcher::create()
            .with_header("bad header", "x")
            .compile()
            .unwrap_err();
        assert_eq!(err.code(), "E401");
    }

    #[test]
    fn zero_match_count_fails_compile() {
        assert!(
            RequestMatcher::create()
                .with_match_count(0)
                .compile()
                .is_err()
        );
    }

    #[test]
    fn display_describes_matcher() {
        let m = RequestMatcher::create()
            .using_get()
            .with_path(PathMatchType::Exact, "/api/v1/data")
            .compile()
            .unwrap();
        assert_eq!(m.to_string(), "GET Exact(/api/v1/data)");
    }
}
