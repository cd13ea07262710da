//! Redirect responses that carry flash data.
//!
//! ```rust
//! use foundry::{Application, Redirect, Request};
//!
//! fn save(_: &Application, req: &Request) -> Redirect {
//!     Redirect::to("/profile")
//!         .with("status", "Profile saved")
//!         .with_input(req.except(&["password"]))
//! }
//! ```
//!
//! Flash data is written into the session of the request being dispatched
//! when the redirect is turned into a response.

use std::collections::HashMap;

use http::StatusCode;
use tracing::warn;

use crate::context;
use crate::request::Request;
use crate::response::{IntoResponse, Response};
use crate::session::SessionStore;

#[derive(Clone, Debug)]
pub struct Redirect {
    location: String,
    status: StatusCode,
    flash: Vec<(String, String)>,
    input: Option<HashMap<String, String>>,
}

impl Redirect {
    /// `302 Found` to `location`.
    pub fn to(location: &str) -> Self {
        Self {
            location: location.to_owned(),
            status: StatusCode::FOUND,
            flash: Vec::new(),
            input: None,
        }
    }

    /// Same, with another 3xx status.
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Flashes `key` for the next request.
    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.flash.push((key.to_owned(), value.into()));
        self
    }

    /// Flashes `input` as the next request's old input.
    pub fn with_input(mut self, input: HashMap<String, String>) -> Self {
        self.input = Some(input);
        self
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    /// Writes the pending flash data into `store`.
    pub fn flash_into(&self, store: &dyn SessionStore) {
        for (key, value) in &self.flash {
            store.flash(key, value.clone());
        }
        if let Some(input) = &self.input {
            store.flash_input(input.clone());
        }
    }

    fn has_flash(&self) -> bool {
        !self.flash.is_empty() || self.input.is_some()
    }
}

impl IntoResponse for Redirect {
    fn into_response(self) -> Response {
        if self.has_flash() {
            let current = context::current();
            match current.as_deref().map(Request::session) {
                Some(Ok(store)) => self.flash_into(store.as_ref()),
                _ => warn!(location = %self.location, "redirect flash data dropped: no session on the current request"),
            }
        }
        Response::builder()
            .status(self.status)
            .header("location", &self.location)
            .no_body()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::session::MemorySession;

    #[test]
    fn plain_redirect() {
        let response = Redirect::to("/login").into_response();
        assert_eq!(response.status_code(), StatusCode::FOUND);
        assert_eq!(response.header("location"), Some("/login"));
        assert!(response.body().is_empty());
    }

    #[test]
    fn custom_status() {
        let response = Redirect::to("/new").with_status(StatusCode::MOVED_PERMANENTLY).into_response();
        assert_eq!(response.status_code(), StatusCode::MOVED_PERMANENTLY);
    }

    #[test]
    fn flashes_into_current_session() {
        let store = Arc::new(MemorySession::new());
        let request = Request::get("/form");
        request.attach_session(store.clone());

        let input = HashMap::from([("name".to_owned(), "ada".to_owned())]);
        context::using(Arc::new(request), || {
            Redirect::to("/done").with("status", "saved").with_input(input).into_response()
        });

        assert_eq!(store.get("status").as_deref(), Some("saved"));
        assert_eq!(store.old_input("name").as_deref(), Some("ada"));
    }

    #[test]
    fn flash_without_session_still_redirects() {
        let response = Redirect::to("/x").with("k", "v").into_response();
        assert_eq!(response.status_code(), StatusCode::FOUND);
    }
}
