//! Session store contract.
//!
//! The kernel does not own a session implementation. It only attaches a
//! configured store to each request before middleware runs, so that
//! `Request::old`, `Request::flash` and [`Redirect`](crate::Redirect) can
//! reach it. [`MemorySession`] is a process-local store for tests and
//! single-node demos.

use std::collections::HashMap;

use parking_lot::Mutex;

/// Flash storage shared between a request and the redirect it produces.
pub trait SessionStore: Send + Sync {
    /// Stores `value` under `key` for the next request only.
    fn flash(&self, key: &str, value: String);

    /// Replaces the flashed "old input" with `input`.
    fn flash_input(&self, input: HashMap<String, String>);

    /// Reads one item of the previous request's input.
    fn old_input(&self, key: &str) -> Option<String>;

    /// Reads a flashed or stored value.
    fn get(&self, key: &str) -> Option<String>;
}

/// In-memory [`SessionStore`].
#[derive(Debug, Default)]
pub struct MemorySession {
    inner: Mutex<State>,
}

#[derive(Debug, Default)]
struct State {
    values: HashMap<String, String>,
    old_input: HashMap<String, String>,
}

impl MemorySession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the flashed input, mostly useful in tests.
    pub fn flashed_input(&self) -> HashMap<String, String> {
        self.inner.lock().old_input.clone()
    }
}

impl SessionStore for MemorySession {
    fn flash(&self, key: &str, value: String) {
        self.inner.lock().values.insert(key.to_owned(), value);
    }

    fn flash_input(&self, input: HashMap<String, String>) {
        self.inner.lock().old_input = input;
    }

    fn old_input(&self, key: &str) -> Option<String> {
        self.inner.lock().old_input.get(key).cloned()
    }

    fn get(&self, key: &str) -> Option<String> {
        self.inner.lock().values.get(key).cloned()
    }
}
