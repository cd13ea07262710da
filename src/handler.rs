//! Route actions and type erasure.
//!
//! # How actions are stored
//!
//! The router holds actions of *different* closure types in one `Vec`, so
//! each one is hidden behind a trait object:
//!
//! ```text
//! |app, req| -> impl Reply                 ← user writes this
//!        ↓ router.get("/", action)
//! Arc::new(FnAction(action))               ← heap-allocated wrapper
//!        ↓ stored as BoxedAction = Arc<dyn ErasedAction>
//! action.call(app, req)  at dispatch time  ← one vtable dispatch
//!        ↓
//! Result<Response, Error>
//! ```
//!
//! Actions receive the [`Application`] so they can dispatch sub-requests
//! against it, generate URLs and read services.

use std::sync::Arc;

use crate::app::Application;
use crate::error::Error;
use crate::request::Request;
use crate::response::{IntoResponse, Response};

/// Conversion of a route action's return value.
///
/// Anything implementing [`IntoResponse`] is a successful reply; a
/// `Result` lets the action fail with any error convertible into [`Error`]
/// (including [`abort`](crate::abort)).
pub trait Reply {
    fn into_reply(self) -> Result<Response, Error>;
}

impl<T: IntoResponse> Reply for T {
    fn into_reply(self) -> Result<Response, Error> {
        Ok(self.into_response())
    }
}

impl<T: IntoResponse, E: Into<Error>> Reply for Result<T, E> {
    fn into_reply(self) -> Result<Response, Error> {
        match self {
            Ok(value) => Ok(value.into_response()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Internal dispatch interface.
#[doc(hidden)]
pub trait ErasedAction {
    fn call(&self, app: &Application, request: &Request) -> Result<Response, Error>;
}

/// A heap-allocated, type-erased action.
#[doc(hidden)]
pub type BoxedAction = Arc<dyn ErasedAction + Send + Sync + 'static>;

/// Newtype wrapper that holds a concrete action `F` and implements
/// [`ErasedAction`], bridging the typed world to the trait-object world.
pub(crate) struct FnAction<F>(pub(crate) F);

impl<F, R> ErasedAction for FnAction<F>
where
    F: Fn(&Application, &Request) -> R + Send + Sync,
    R: Reply,
{
    fn call(&self, app: &Application, request: &Request) -> Result<Response, Error> {
        (self.0)(app, request).into_reply()
    }
}

/// Boxes a closure as an action. The `Fn` bound sits on the function so
/// closure argument types are inferred at the call site.
pub(crate) fn boxed<F, R>(action: F) -> BoxedAction
where
    F: Fn(&Application, &Request) -> R + Send + Sync + 'static,
    R: Reply,
{
    Arc::new(FnAction(action))
}
