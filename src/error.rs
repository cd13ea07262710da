//! Unified error type.
//!
//! Everything that can interrupt a dispatch is an [`Error`]. Routing misses
//! and explicit [`abort`]s carry an [`HttpError`], which the exception
//! pipeline turns straight into a response. Anything else is a fault and is
//! offered to the registered error handlers first.

use std::any::Any;
use std::fmt;

use http::StatusCode;

/// The error type returned by foundry's fallible operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An HTTP-level condition: routing miss, method mismatch or [`abort`].
    #[error(transparent)]
    Http(#[from] HttpError),

    /// A service provider failed while booting. Never handled by the
    /// exception pipeline; it propagates to whoever called `dispatch`.
    #[error("provider `{provider}` failed to boot: {source}")]
    Boot {
        provider: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A fault raised by a route action, middleware or provider code.
    #[error("{0}")]
    Handler(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// A panic caught while dispatching.
    #[error("panic during dispatch: {0}")]
    Panic(String),

    /// A session helper was used on a request without a session store.
    #[error("session store not set on request")]
    MissingSession,

    /// URL generation asked for a route name that was never registered.
    #[error("route `{0}` is not defined")]
    UnknownRoute(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wraps any application error as a fault.
    pub fn handler(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Handler(err.into())
    }

    /// The status code the fallback renderer would use for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Http(e) => e.status(),
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Converts a `catch_unwind` payload into [`Error::Panic`].
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_owned()
        } else {
            "unknown panic payload".to_owned()
        };
        Self::Panic(message)
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Self::Config(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::handler(e)
    }
}

// ── HttpError ────────────────────────────────────────────────────────────────

/// An HTTP status with an optional message and extra response headers.
///
/// Returned by the router for misses and by [`abort`] from user code.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpError {
    status: StatusCode,
    message: String,
    headers: Vec<(String, String)>,
}

impl HttpError {
    pub fn new(status: StatusCode) -> Self {
        Self { status, message: String::new(), headers: Vec::new() }
    }

    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND)
    }

    /// `405` with the `allow` header listing the methods that would match.
    pub fn method_not_allowed(allowed: &[http::Method]) -> Self {
        let allow = allowed.iter().map(http::Method::as_str).collect::<Vec<_>>().join(", ");
        Self::new(StatusCode::METHOD_NOT_ALLOWED).with_header("allow", &allow)
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    pub fn status(&self) -> StatusCode { self.status }
    pub fn message(&self) -> &str { &self.message }
    pub fn headers(&self) -> &[(String, String)] { &self.headers }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "http {}", self.status)?;
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for HttpError {}

/// Builds the error an action returns to stop with a given status.
///
/// ```rust
/// use foundry::{Application, Request, abort};
/// use http::StatusCode;
///
/// let mut app = Application::new();
/// app.router_mut().get("/admin", |_: &Application, _: &Request| {
///     Err::<&str, _>(abort(StatusCode::FORBIDDEN, "staff only"))
/// });
/// ```
pub fn abort(status: StatusCode, message: impl Into<String>) -> Error {
    Error::Http(HttpError::new(status).with_message(message))
}
