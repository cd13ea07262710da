//! Lifecycle-hook middleware: `before`, `after` and `finish`.

use std::fmt;

use tracing::trace;

use super::{BoxedMiddleware, Outcome};
use crate::request::Request;
use crate::response::Response;

/// The lifecycle point a global middleware is attached to.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Hook {
    /// Before routing. The first `Some` short-circuits the whole dispatch.
    Before,
    /// After the route's own after-middleware. Results are discarded.
    After,
    /// After the response was handed to the transport. Results are discarded.
    Finish,
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Before => "before",
            Self::After => "after",
            Self::Finish => "finish",
        })
    }
}

/// Ordered hook lists. Registration order is execution order and
/// registering the same callable twice runs it twice.
#[derive(Default)]
pub struct GlobalMiddleware {
    before: Vec<BoxedMiddleware>,
    after: Vec<BoxedMiddleware>,
    finish: Vec<BoxedMiddleware>,
}

impl GlobalMiddleware {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, hook: Hook, middleware: BoxedMiddleware) {
        self.list_mut(hook).push(middleware);
    }

    pub fn len(&self, hook: Hook) -> usize {
        self.list(hook).len()
    }

    pub fn is_empty(&self, hook: Hook) -> bool {
        self.list(hook).is_empty()
    }

    /// Runs the hook's middleware in order and returns the first `Some`,
    /// without running the ones after it.
    ///
    /// `after` and `finish` callers discard the result; the shared primitive
    /// keeps the three hooks on one code path.
    pub fn call(&self, hook: Hook, request: &Request, response: Option<&Response>) -> Outcome {
        for (index, middleware) in self.list(hook).iter().enumerate() {
            if let Some(response) = middleware.handle(request, response)? {
                trace!(%hook, index, "global middleware produced a response");
                return Ok(Some(response));
            }
        }
        Ok(None)
    }

    fn list(&self, hook: Hook) -> &[BoxedMiddleware] {
        match hook {
            Hook::Before => &self.before,
            Hook::After => &self.after,
            Hook::Finish => &self.finish,
        }
    }

    fn list_mut(&mut self, hook: Hook) -> &mut Vec<BoxedMiddleware> {
        match hook {
            Hook::Before => &mut self.before,
            Hook::After => &mut self.after,
            Hook::Finish => &mut self.finish,
        }
    }
}
