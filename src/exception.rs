//! Exception pipeline: error handlers and the fallback renderer.
//!
//! Handlers are tried in registration order and the first one that returns
//! a response wins. When none does, [`render`] turns the error into a
//! response on its own. `render` cannot fail.

use http::StatusCode;
use tracing::{error, warn};

use crate::error::Error;
use crate::middleware::IntoOutcome;
use crate::response::Response;

type Handler = Box<dyn Fn(&Error, StatusCode) -> Result<Option<Response>, Error> + Send + Sync>;

/// Ordered list of registered error handlers.
#[derive(Default)]
pub struct ErrorHandlers {
    handlers: Vec<Handler>,
}

impl ErrorHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<F, R>(&mut self, handler: F)
    where
        F: Fn(&Error, StatusCode) -> R + Send + Sync + 'static,
        R: IntoOutcome,
    {
        self.handlers.push(Box::new(move |err: &Error, status: StatusCode| {
            handler(err, status).into_outcome()
        }));
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// First response produced by a handler, if any. A handler that fails
    /// is logged and skipped.
    pub fn handle(&self, err: &Error) -> Option<Response> {
        let status = err.status();
        for (index, handler) in self.handlers.iter().enumerate() {
            match handler(err, status) {
                Ok(Some(response)) => return Some(response),
                Ok(None) => {}
                Err(failure) => warn!(index, error = %failure, "error handler failed"),
            }
        }
        None
    }
}

/// Builds the last-resort response for `err`.
///
/// HTTP errors keep their status, message and headers. Every other error is
/// a 500; its details are only shown when `debug` is on.
pub fn render(err: &Error, debug: bool) -> Response {
    let status = err.status();
    let reason = status.canonical_reason().unwrap_or("Error");

    let mut body = format!("<h1>{} {}</h1>", status.as_u16(), escape(reason));
    let mut headers: Vec<(String, String)> = Vec::new();

    match err {
        Error::Http(http) => {
            if !http.message().is_empty() {
                body.push_str(&format!("<p>{}</p>", escape(http.message())));
            }
            headers.extend(http.headers().iter().cloned());
        }
        other => {
            error!(error = %other, "unhandled error");
            if debug {
                body.push_str(&format!("<pre>{}</pre>", escape(&chain(other))));
            }
        }
    }

    let mut response = Response::builder().status(status).html(body);
    response.headers.extend(headers);
    response
}

/// `err` and its sources, one per line.
fn chain(err: &Error) -> String {
    let mut out = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        out.push_str("\ncaused by: ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
