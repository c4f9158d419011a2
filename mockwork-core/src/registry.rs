//! Mock registry and the dispatch algorithm.
//!
//! Dispatch walks a priority-ordered list of [`RequestHandler`]s:
//!
//! 1. the optional dynamic handler, which may decline with `None`;
//! 2. the bindings, most recently registered first, so a test can register a
//!    general default and then specialized overrides;
//! 3. nothing matched: [`MockworkError::UnmatchedRequest`].
//!
//! The registry is mutated only during setup. Once sealed it rejects changes.

use crate::error::{MockworkError, Result};
use crate::http::{MockRequest, MockResponse};
use crate::matcher::{CompiledMatcher, RequestMatcher};
use crate::response::ResponseBuilder;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Anything that can answer an outbound call, or decline it.
pub trait RequestHandler: Send + Sync {
    /// Return a response, or `None` when this handler does not apply.
    fn handle(&self, request: &MockRequest) -> Option<MockResponse>;
}

impl<F> RequestHandler for F
where
    F: Fn(&MockRequest) -> Option<MockResponse> + Send + Sync,
{
    fn handle(&self, request: &MockRequest) -> Option<MockResponse> {
        self(request)
    }
}

/// A compiled matcher paired with a response.
pub struct MockBinding {
    matcher: CompiledMatcher,
    response: ResponseBuilder,
    hits: AtomicUsize,
}

impl MockBinding {
    /// Pair a matcher with a response.
    pub fn new(matcher: CompiledMatcher, response: ResponseBuilder) -> Self {
        Self {
            matcher,
            response,
            hits: AtomicUsize::new(0),
        }
    }

    /// Number of dispatches this binding answered.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    /// The matcher.
    pub fn matcher(&self) -> &CompiledMatcher {
        &self.matcher
    }

    // Claims one use of the binding; fails once the match count is exhausted.
    fn claim(&self) -> bool {
        let limit = self.matcher.match_count();
        self.hits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                limit.is_none_or(|max| n < max).then_some(n + 1)
            })
            .is_ok()
    }
}

impl RequestHandler for MockBinding {
    fn handle(&self, request: &MockRequest) -> Option<MockResponse> {
        if self.matcher.matches(request) && self.claim() {
            Some(self.response.synthesize(request))
        } else {
            None
        }
    }
}

impl fmt::Debug for MockBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockBinding")
            .field("matcher", &self.matcher.to_string())
            .field("status", &self.response.status())
            .field("hits", &self.hits())
            .finish()
    }
}

/// Ordered bindings plus one optional dynamic handler.
#[derive(Default)]
pub struct MockRegistry {
    bindings: Vec<MockBinding>,
    dynamic: Option<Arc<dyn RequestHandler>>,
    sealed: bool,
}

impl MockRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile `matcher` and register it with `response`.
    pub fn add(&mut self, matcher: RequestMatcher, response: ResponseBuilder) -> Result<()> {
        let compiled = matcher.compile()?;
        self.add_binding(MockBinding::new(compiled, response))
    }

    /// Register an already compiled binding.
    pub fn add_binding(&mut self, binding: MockBinding) -> Result<()> {
        self.ensure_open()?;
        binding.response.validate()?;
        tracing::debug!(
            matcher = %binding.matcher,
            position = self.bindings.len(),
            "Registered mock binding"
        );
        self.bindings.push(binding);
        Ok(())
    }

    /// Register the dynamic handler. Only one may be registered.
    pub fn set_dynamic_handler(&mut self, handler: Arc<dyn RequestHandler>) -> Result<()> {
        self.ensure_open()?;
        if self.dynamic.is_some() {
            return Err(MockworkError::DuplicateDynamicHandler);
        }
        self.dynamic = Some(handler);
        Ok(())
    }

    /// Check whether a dynamic handler is registered.
    pub fn has_dynamic_handler(&self) -> bool {
        self.dynamic.is_some()
    }

    /// Freeze the registry. Further registration fails.
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    /// Check whether the registry is sealed.
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Number of bindings.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Check whether no bindings are registered.
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Bindings in registration order.
    pub fn bindings(&self) -> &[MockBinding] {
        &self.bindings
    }

    /// Drop all bindings and the dynamic handler.
    pub fn clear(&mut self) {
        self.bindings.clear();
        self.dynamic = None;
    }

    /// Handlers in dispatch priority order.
    pub fn handlers(&self) -> impl Iterator<Item = &(dyn RequestHandler + 'static)> {
        let bindings = self
            .bindings
            .iter()
            .rev()
            .map(|b| b as &(dyn RequestHandler + 'static));
        self.dynamic.as_deref().into_iter().chain(bindings)
    }

    /// Resolve one outbound call.
    pub fn dispatch(&self, request: &MockRequest) -> Result<MockResponse> {
        match self.handlers().find_map(|h| h.handle(request)) {
            Some(response) => {
                tracing::debug!(
                    method = %request.method,
                    path = %request.path,
                    status = response.status.as_u16(),
                    "Dispatched mock response"
                );
                Ok(response)
            }
            None => {
                tracing::warn!(
                    method = %request.method,
                    uri = %request.uri,
                    "No mock response matched"
                );
                Err(MockworkError::UnmatchedRequest {
                    method: request.method.to_string(),
                    uri: request.uri.clone(),
                })
            }
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.sealed {
            Err(MockworkError::RegistrySealed)
        } else {
            Ok(())
        }
    }
}

impl fmt::Debug for MockRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockRegistry")
            .field("bindings", &self.bindings)
            .field("dynamic", &self.dynamic.is_some())
            .field("sealed", &self.sealed)
            .finish()
    }
}
