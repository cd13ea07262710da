//! Outgoing HTTP response type and the [`IntoResponse`] conversion trait.
//!
//! Route actions and middleware may return anything that implements
//! [`IntoResponse`]; the dispatcher coerces it into a [`Response`] and runs
//! [`Response::prepare`] against the request before any after-middleware
//! sees it.

use bytes::Bytes;
use http::{Method, StatusCode, Version};
use serde::Serialize;

use crate::request::Request;

// ── ContentType ───────────────────────────────────────────────────────────────

/// Common content-type values for use with [`ResponseBuilder::bytes`].
pub enum ContentType {
    Csv,          // text/csv
    EventStream,  // text/event-stream  (SSE)
    Html,         // text/html; charset=utf-8
    Json,         // application/json
    OctetStream,  // application/octet-stream  (binary / file download)
    Text,         // text/plain; charset=utf-8
    Xml,          // application/xml
}

impl ContentType {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Csv         => "text/csv",
            Self::EventStream => "text/event-stream",
            Self::Html        => "text/html; charset=utf-8",
            Self::Json        => "application/json",
            Self::OctetStream => "application/octet-stream",
            Self::Text        => "text/plain; charset=utf-8",
            Self::Xml         => "application/xml",
        }
    }
}

// ── Response ─────────────────────────────────────────────────────────────────

/// An outgoing HTTP response.
///
/// ```rust
/// use foundry::Response;
/// use http::StatusCode;
///
/// Response::text("hello");
/// Response::status(StatusCode::NO_CONTENT);
/// Response::builder()
///     .status(StatusCode::CREATED)
///     .header("location", "/users/42")
///     .json(br#"{"id":42}"#.to_vec());
/// ```
#[derive(Clone, Debug)]
pub struct Response {
    pub(crate) status: StatusCode,
    pub(crate) version: Version,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) body: Bytes,
}

impl Response {
    /// `200 OK`, `application/json`.
    pub fn json(body: Vec<u8>) -> Self {
        Self::bytes_raw("application/json", Bytes::from(body))
    }

    /// `200 OK`, `text/plain; charset=utf-8`.
    pub fn text(body: impl Into<String>) -> Self {
        let body: String = body.into();
        Self::bytes_raw("text/plain; charset=utf-8", Bytes::from(body))
    }

    /// `200 OK`, `text/html; charset=utf-8`.
    pub fn html(body: impl Into<String>) -> Self {
        let body: String = body.into();
        Self::bytes_raw("text/html; charset=utf-8", Bytes::from(body))
    }

    /// Response with no body.
    pub fn status(code: StatusCode) -> Self {
        Self { status: code, version: Version::HTTP_11, headers: Vec::new(), body: Bytes::new() }
    }

    /// Builder for responses that need a custom status or extra headers.
    pub fn builder() -> ResponseBuilder {
        ResponseBuilder { headers: Vec::new(), status: StatusCode::OK }
    }

    fn bytes_raw(content_type: &str, body: Bytes) -> Self {
        Self {
            status: StatusCode::OK,
            version: Version::HTTP_11,
            headers: vec![("content-type".to_owned(), content_type.to_owned())],
            body,
        }
    }

    pub fn status_code(&self) -> StatusCode { self.status }
    pub fn version(&self) -> Version { self.version }
    pub fn headers(&self) -> &[(String, String)] { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Sets a header, replacing any existing value with the same name.
    pub fn set_header(&mut self, name: &str, value: &str) {
        self.remove_header(name);
        self.headers.push((name.to_owned(), value.to_owned()));
    }

    pub fn remove_header(&mut self, name: &str) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
    }

    /// Finalizes the response against the request it answers.
    ///
    /// - 1xx, 204 and 304 lose their body and entity headers.
    /// - Everything else gets a `content-length` and, when a body is
    ///   present, a default `text/html` content type.
    /// - `HEAD` keeps the length but drops the body.
    /// - An HTTP/1.0 request gets an HTTP/1.0 response, with `pragma` and
    ///   `expires` mirroring a `no-cache` directive.
    /// - Without any cache header, `cache-control: no-cache, private`.
    pub fn prepare(mut self, request: &Request) -> Self {
        if self.status.is_informational()
            || self.status == StatusCode::NO_CONTENT
            || self.status == StatusCode::NOT_MODIFIED
        {
            self.body = Bytes::new();
            self.remove_header("content-type");
            self.remove_header("content-length");
        } else {
            if self.header("content-type").is_none() && !self.body.is_empty() {
                self.set_header("content-type", ContentType::Html.as_str());
            }
            if self.header("transfer-encoding").is_some() {
                self.remove_header("content-length");
            } else {
                let len = self.body.len().to_string();
                self.set_header("content-length", &len);
            }
            if request.method() == Method::HEAD {
                self.body = Bytes::new();
            }
        }

        let has_validator = ["cache-control", "etag", "last-modified", "expires"]
            .iter()
            .any(|h| self.header(h).is_some());
        if !has_validator {
            self.set_header("cache-control", "no-cache, private");
        }

        if request.version() == Version::HTTP_10 {
            self.version = Version::HTTP_10;
            if self.header("cache-control").is_some_and(|cc| cc.contains("no-cache")) {
                self.set_header("pragma", "no-cache");
                self.set_header("expires", "-1");
            }
        } else {
            self.version = Version::HTTP_11;
        }

        self
    }

    /// Converts into the `http` crate's response type for the transport.
    pub(crate) fn into_http(self) -> http::Response<Bytes> {
        let mut builder = http::Response::builder().status(self.status).version(self.version);
        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder.body(self.body).unwrap_or_else(|e| {
            tracing::error!(error = %e, "response carried an invalid header");
            let mut fallback = http::Response::new(Bytes::new());
            *fallback.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            fallback
        })
    }
}

// ── ResponseBuilder ───────────────────────────────────────────────────────────

/// Fluent builder for [`Response`].
///
/// Obtain via [`Response::builder()`]. Defaults to `200 OK`.
/// Terminated by a body method.
pub struct ResponseBuilder {
    headers: Vec<(String, String)>,
    status: StatusCode,
}

impl ResponseBuilder {
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = code;
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    pub fn headers<'a>(mut self, headers: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        self.headers.extend(headers.into_iter().map(|(k, v)| (k.to_owned(), v.to_owned())));
        self
    }

    /// Terminate with a JSON body (`application/json`).
    pub fn json(self, body: Vec<u8>) -> Response {
        self.finish("application/json", Bytes::from(body))
    }

    /// Terminate with a plain-text body (`text/plain; charset=utf-8`).
    pub fn text(self, body: impl Into<String>) -> Response {
        let body: String = body.into();
        self.finish("text/plain; charset=utf-8", Bytes::from(body))
    }

    /// Terminate with an HTML body (`text/html; charset=utf-8`).
    pub fn html(self, body: impl Into<String>) -> Response {
        let body: String = body.into();
        self.finish("text/html; charset=utf-8", Bytes::from(body))
    }

    /// Terminate with a typed body. Use this for XML, binary, SSE, etc.
    pub fn bytes(self, content_type: ContentType, body: Vec<u8>) -> Response {
        self.finish(content_type.as_str(), Bytes::from(body))
    }

    /// Terminate with a raw body. No content type is set here; `prepare`
    /// defaults it to HTML.
    pub fn body(self, body: impl Into<Bytes>) -> Response {
        Response { status: self.status, version: Version::HTTP_11, headers: self.headers, body: body.into() }
    }

    /// Terminate with no body (e.g. `204 No Content`, `301 Moved Permanently`).
    pub fn no_body(self) -> Response {
        Response { status: self.status, version: Version::HTTP_11, headers: self.headers, body: Bytes::new() }
    }

    fn finish(self, content_type: &str, body: Bytes) -> Response {
        let mut headers = vec![("content-type".to_owned(), content_type.to_owned())];
        headers.extend(self.headers);
        Response { status: self.status, version: Version::HTTP_11, headers, body }
    }
}

// ── IntoResponse ──────────────────────────────────────────────────────────────

/// Conversion into an HTTP [`Response`].
///
/// Implement on your own types to return them directly from route actions
/// and middleware.
pub trait IntoResponse {
    fn into_response(self) -> Response;
}

impl IntoResponse for Response {
    fn into_response(self) -> Response { self }
}

impl IntoResponse for &'static str {
    fn into_response(self) -> Response { Response::text(self) }
}

impl IntoResponse for String {
    fn into_response(self) -> Response { Response::text(self) }
}

/// Return a status directly: `return StatusCode::NOT_FOUND`
impl IntoResponse for StatusCode {
    fn into_response(self) -> Response { Response::status(self) }
}

/// Structured data is rendered as JSON.
impl IntoResponse for serde_json::Value {
    fn into_response(self) -> Response { Json(self).into_response() }
}

/// Override the status of any other response value.
impl<T: IntoResponse> IntoResponse for (StatusCode, T) {
    fn into_response(self) -> Response {
        let mut response = self.1.into_response();
        response.status = self.0;
        response
    }
}

/// Serializes `T` as the JSON body of a `200 OK`.
///
/// ```rust
/// use foundry::{IntoResponse, Json};
///
/// #[derive(serde::Serialize)]
/// struct User { id: u32 }
///
/// let response = Json(User { id: 1 }).into_response();
/// assert_eq!(response.body(), br#"{"id":1}"#);
/// ```
pub struct Json<T>(pub T);

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Response {
        match serde_json::to_vec(&self.0) {
            Ok(bytes) => Response::json(bytes),
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize JSON response");
                Response::status(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }
}
