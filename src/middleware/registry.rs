//! Named middleware and URI-pattern bindings.

use std::collections::HashMap;

use tracing::warn;

use super::{BoxedMiddleware, Outcome};
use crate::pattern;
use crate::request::Request;
use crate::response::Response;

/// Named middleware plus the pattern → names bindings that pull them into
/// matching requests.
#[derive(Default)]
pub struct MiddlewareRegistry {
    named: HashMap<String, BoxedMiddleware>,
    // Insertion-ordered; a pattern keeps the slot of its first binding.
    patterns: Vec<(String, Vec<String>)>,
}

impl MiddlewareRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `middleware` under `name`. A later insert with the same name wins.
    pub fn insert(&mut self, name: impl Into<String>, middleware: BoxedMiddleware) {
        self.named.insert(name.into(), middleware);
    }

    pub fn get(&self, name: &str) -> Option<&BoxedMiddleware> {
        self.named.get(name)
    }

    /// Appends `names` to the list bound to `pattern`. Binding the same
    /// pattern again accumulates.
    pub fn bind<I, S>(&mut self, pattern: &str, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let pattern = pattern.trim_start_matches('/');
        let names = names.into_iter().map(Into::into);
        match self.patterns.iter_mut().find(|(p, _)| p == pattern) {
            Some((_, bound)) => bound.extend(names),
            None => self.patterns.push((pattern.to_owned(), names.collect())),
        }
    }

    /// Names bound to every pattern matching `path`, in pattern registration
    /// order and bind order within a pattern.
    pub fn matching(&self, path: &str) -> Vec<String> {
        self.patterns
            .iter()
            .filter(|(p, _)| pattern::is_match(&format!("/{p}"), path))
            .flat_map(|(_, names)| names.iter().cloned())
            .collect()
    }

    /// Invokes a named middleware. Unknown names are skipped.
    pub fn call(&self, name: &str, request: &Request, response: Option<&Response>) -> Outcome {
        match self.named.get(name) {
            Some(middleware) => middleware.handle(request, response),
            None => {
                warn!(middleware = name, path = request.path(), "middleware not registered, skipping");
                Ok(None)
            }
        }
    }
}
