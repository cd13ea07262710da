//! The request context stack.
//!
//! Exactly one request is "current" at a time. Dispatching a request makes
//! it current for the duration of the call and restores the previous one
//! afterwards, which is what lets a route action dispatch a sub-request
//! against the same application (HMVC) without the outer request losing
//! its identity.
//!
//! The restore is done by a drop guard, so it happens on every exit path:
//! normal return, `Err` propagation, and panic unwinding.
//!
//! The kernel is synchronous and a request runs start to finish on one
//! thread, so the application-wide stack is thread-local. [`RequestStack`]
//! itself is a plain value and can be used on its own.

use std::cell::RefCell;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use crate::request::Request;

/// A LIFO stack of in-flight requests plus the active slot.
#[derive(Debug, Default)]
pub struct RequestStack {
    current: Option<Arc<Request>>,
    stack: Vec<Option<Arc<Request>>>,
}

impl RequestStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes the active request and makes `request` active.
    pub fn enter(&mut self, request: Arc<Request>) {
        let previous = self.current.replace(request);
        self.stack.push(previous);
    }

    /// Pops the previously active request back into the active slot.
    ///
    /// Leaving more often than entering leaves the stack empty with no
    /// active request.
    pub fn leave(&mut self) -> Option<Arc<Request>> {
        let previous = self.stack.pop().flatten();
        std::mem::replace(&mut self.current, previous)
    }

    /// Runs `body` with `request` active and restores the previous request
    /// afterwards, whatever way `body` exits.
    pub fn with_nested<R>(&mut self, request: Arc<Request>, body: impl FnOnce(&mut Self) -> R) -> R {
        self.enter(request);
        let mut guard = Guard(self);
        body(&mut *guard)
    }

    pub fn current(&self) -> Option<&Arc<Request>> {
        self.current.as_ref()
    }

    /// Nesting level: 0 when idle, 1 inside a top-level dispatch.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }
}

struct Guard<'a>(&'a mut RequestStack);

impl Deref for Guard<'_> {
    type Target = RequestStack;
    fn deref(&self) -> &RequestStack { &*self.0 }
}

impl DerefMut for Guard<'_> {
    fn deref_mut(&mut self) -> &mut RequestStack { &mut *self.0 }
}

impl Drop for Guard<'_> {
    fn drop(&mut self) {
        self.0.leave();
    }
}

// ── Thread-local stack ───────────────────────────────────────────────────────

thread_local! {
    static STACK: RefCell<RequestStack> = RefCell::new(RequestStack::new());
}

/// The request currently being dispatched on this thread.
pub fn current() -> Option<Arc<Request>> {
    STACK.with(|stack| stack.borrow().current().cloned())
}

/// Nesting level of the thread's dispatches; 0 outside any dispatch.
pub fn depth() -> usize {
    STACK.with(|stack| stack.borrow().depth())
}

/// Thread-local counterpart of [`RequestStack::with_nested`].
///
/// The `RefCell` borrow is released while `body` runs, so `body` may call
/// `using` again (that is what nested dispatch does).
pub fn using<R>(request: Arc<Request>, body: impl FnOnce() -> R) -> R {
    STACK.with(|stack| stack.borrow_mut().enter(request));
    let _guard = LocalGuard;
    body()
}

struct LocalGuard;

impl Drop for LocalGuard {
    fn drop(&mut self) {
        // `try_with` because a guard may drop during thread teardown.
        let _ = STACK.try_with(|stack| stack.borrow_mut().leave());
    }
}
