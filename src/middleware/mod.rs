//! Middleware layer.
//!
//! Middleware intercepts requests and responses and is the right place for
//! cross-cutting concerns: authentication, request logging, maintenance
//! switches, response decoration.
//!
//! Every piece of middleware, whether registered under a name, bound to a
//! URI pattern, or attached to a lifecycle hook, is stored the same way: as
//! a [`BoxedMiddleware`] that receives the current request (and, for the
//! after/finish stages, the prepared response) and may return a response.
//!
//! ```text
//! |req| -> Option<impl IntoResponse>       ← user writes this
//!        ↓ app.before(..) / app.add_middleware(..)
//! Arc::new(FnMiddleware(..))                ← adapter
//!        ↓ stored as BoxedMiddleware = Arc<dyn Middleware>
//! middleware.handle(&req, None)             ← one vtable call per stage
//!        ↓
//! Ok(Some(Response)) / Ok(None) / Err(Error)
//! ```
//!
//! Returning `Some` means "I produced the response". Whether that stops the
//! pipeline depends on where the middleware sits; see
//! [`GlobalMiddleware`] and the dispatcher.

mod global;
mod registry;

use std::sync::Arc;

pub use global::{GlobalMiddleware, Hook};
pub use registry::MiddlewareRegistry;

use crate::error::Error;
use crate::request::Request;
use crate::response::{IntoResponse, Response};

/// What a middleware invocation produced.
pub type Outcome = Result<Option<Response>, Error>;

/// A unit of cross-cutting logic invoked around route execution.
///
/// Implement it on a struct when the middleware carries configuration or
/// state; plain closures are adapted automatically by the registration
/// methods on [`Application`](crate::Application).
pub trait Middleware: Send + Sync + 'static {
    /// `response` is `None` for before-stage calls and `Some` for the
    /// after and finish stages.
    fn handle(&self, request: &Request, response: Option<&Response>) -> Outcome;
}

/// A type-erased middleware shared between the registry and hook lists.
pub type BoxedMiddleware = Arc<dyn Middleware>;

// ── IntoOutcome ──────────────────────────────────────────────────────────────

/// Coerces a middleware return value into an [`Outcome`].
///
/// `()` and `None` mean "carry on"; `Some(value)` is converted with
/// [`IntoResponse`]; `Err` aborts the dispatch.
pub trait IntoOutcome {
    fn into_outcome(self) -> Outcome;
}

impl IntoOutcome for () {
    fn into_outcome(self) -> Outcome { Ok(None) }
}

impl<T: IntoResponse> IntoOutcome for Option<T> {
    fn into_outcome(self) -> Outcome {
        Ok(self.map(IntoResponse::into_response))
    }
}

impl<T: IntoOutcome, E: Into<Error>> IntoOutcome for Result<T, E> {
    fn into_outcome(self) -> Outcome {
        match self {
            Ok(value) => value.into_outcome(),
            Err(e) => Err(e.into()),
        }
    }
}

// ── Closure adapters ─────────────────────────────────────────────────────────

/// `Fn(&Request, Option<&Response>)`: named middleware, usable both before
/// and after a route.
pub(crate) struct FnMiddleware<F>(pub(crate) F);

impl<F, R> Middleware for FnMiddleware<F>
where
    F: Fn(&Request, Option<&Response>) -> R + Send + Sync + 'static,
    R: IntoOutcome,
{
    fn handle(&self, request: &Request, response: Option<&Response>) -> Outcome {
        (self.0)(request, response).into_outcome()
    }
}

/// `Fn(&Request)`: global `before` hooks, which never see a response.
pub(crate) struct RequestFn<F>(pub(crate) F);

impl<F, R> Middleware for RequestFn<F>
where
    F: Fn(&Request) -> R + Send + Sync + 'static,
    R: IntoOutcome,
{
    fn handle(&self, request: &Request, _response: Option<&Response>) -> Outcome {
        (self.0)(request).into_outcome()
    }
}

/// `Fn(&Request, &Response)`: global `after` and `finish` hooks.
pub(crate) struct ResponseFn<F>(pub(crate) F);

impl<F, R> Middleware for ResponseFn<F>
where
    F: Fn(&Request, &Response) -> R + Send + Sync + 'static,
    R: IntoOutcome,
{
    fn handle(&self, request: &Request, response: Option<&Response>) -> Outcome {
        match response {
            Some(response) => (self.0)(request, response).into_outcome(),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;

    #[test]
    fn unit_and_none_carry_on() {
        assert!(().into_outcome().unwrap().is_none());
        assert!(None::<Response>.into_outcome().unwrap().is_none());
    }

    #[test]
    fn some_is_coerced_into_a_response() {
        let response = Some("stop").into_outcome().unwrap().unwrap();
        assert_eq!(response.body(), b"stop");
    }

    #[test]
    fn errors_pass_through() {
        let outcome = Err::<(), _>(crate::abort(StatusCode::UNAUTHORIZED, "")).into_outcome();
        assert_eq!(outcome.unwrap_err().status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn response_hooks_are_skipped_without_a_response() {
        let hook = ResponseFn(|_: &Request, _: &Response| Some("seen"));
        let request = Request::get("/");
        assert!(hook.handle(&request, None).unwrap().is_none());
        let response = Response::text("x");
        assert!(hook.handle(&request, Some(&response)).unwrap().is_some());
    }
}
