//! Incoming HTTP request type.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use bytes::Bytes;
use http::{Method, Version};
use serde::de::DeserializeOwned;

use crate::error::Error;
use crate::session::SessionStore;

/// A file received with the request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadedFile {
    pub filename: String,
    pub content_type: String,
    pub bytes: Bytes,
}

/// An incoming HTTP request.
///
/// Built by the transport (or by hand for sub-requests and tests), then
/// shared as `Arc<Request>` once dispatch starts. Two slots are filled in
/// during dispatch and can only be set once: the session store and the
/// route parameters.
#[derive(Clone)]
pub struct Request {
    method: Method,
    path: String,
    version: Version,
    scheme: String,
    authority: String,
    headers: Vec<(String, String)>,
    query: HashMap<String, String>,
    input: HashMap<String, String>,
    cookies: HashMap<String, String>,
    files: HashMap<String, UploadedFile>,
    body: Bytes,
    params: OnceLock<HashMap<String, String>>,
    session: OnceLock<Arc<dyn SessionStore>>,
}

impl Request {
    /// Creates a request for `target`, which may carry a query string.
    ///
    /// ```rust
    /// use foundry::Request;
    /// use http::Method;
    ///
    /// let req = Request::new(Method::GET, "/search?q=rust");
    /// assert_eq!(req.path(), "/search");
    /// assert_eq!(req.query("q"), Some("rust"));
    /// ```
    pub fn new(method: Method, target: &str) -> Self {
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, parse_pairs(query.as_bytes())),
            None => (target, HashMap::new()),
        };
        let path = if path.starts_with('/') { path.to_owned() } else { format!("/{path}") };

        Self {
            method,
            path,
            version: Version::HTTP_11,
            scheme: "http".to_owned(),
            authority: "localhost".to_owned(),
            headers: Vec::new(),
            query,
            input: HashMap::new(),
            cookies: HashMap::new(),
            files: HashMap::new(),
            body: Bytes::new(),
            params: OnceLock::new(),
            session: OnceLock::new(),
        }
    }

    pub fn get(target: &str) -> Self { Self::new(Method::GET, target) }
    pub fn post(target: &str) -> Self { Self::new(Method::POST, target) }

    /// Builds a request from the parts hyper hands the server.
    ///
    /// Cookies come from the `cookie` header; url-encoded form bodies are
    /// decoded into the input bag.
    pub(crate) fn from_parts(parts: http::request::Parts, body: Bytes) -> Self {
        let target = parts.uri.path_and_query().map_or("/", |pq| pq.as_str());
        let mut req = Self::new(parts.method.clone(), target);
        req.version = parts.version;

        if let Some(scheme) = parts.uri.scheme_str() {
            req.scheme = scheme.to_owned();
        }

        for (name, value) in &parts.headers {
            let Ok(value) = value.to_str() else { continue };
            req.headers.push((name.as_str().to_owned(), value.to_owned()));
        }

        if let Some(authority) = parts.uri.authority() {
            req.authority = authority.as_str().to_owned();
        } else if let Some(host) = req.header("host") {
            req.authority = host.to_owned();
        }

        if let Some(cookie) = req.header("cookie") {
            req.cookies = parse_cookies(cookie);
        }

        let is_form = req
            .header("content-type")
            .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));
        if is_form {
            req.input = parse_pairs(&body);
        }
        req.body = body;
        req
    }

    // ── Builder-style setters ────────────────────────────────────────────────

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    /// Sets the `host[:port]` the request was addressed to.
    pub fn with_host(mut self, authority: &str) -> Self {
        self.authority = authority.to_owned();
        self
    }

    pub fn with_scheme(mut self, scheme: &str) -> Self {
        self.scheme = scheme.to_owned();
        self
    }

    pub fn with_version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    pub fn with_query(mut self, key: &str, value: &str) -> Self {
        self.query.insert(key.to_owned(), value.to_owned());
        self
    }

    pub fn with_input(mut self, key: &str, value: &str) -> Self {
        self.input.insert(key.to_owned(), value.to_owned());
        self
    }

    pub fn with_cookie(mut self, key: &str, value: &str) -> Self {
        self.cookies.insert(key.to_owned(), value.to_owned());
        self
    }

    pub fn with_file(mut self, key: &str, file: UploadedFile) -> Self {
        self.files.insert(key.to_owned(), file);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    pub fn method(&self) -> &Method { &self.method }
    pub fn path(&self) -> &str { &self.path }
    pub fn version(&self) -> Version { self.version }
    pub fn scheme(&self) -> &str { &self.scheme }
    pub fn headers(&self) -> &[(String, String)] { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }

    /// Host without the port.
    pub fn host(&self) -> &str {
        let authority = self.authority.as_str();
        if authority.starts_with('[') {
            // IPv6 literal: keep the brackets, drop the port.
            return authority.find(']').map_or(authority, |end| &authority[..=end]);
        }
        authority.split(':').next().unwrap_or(authority)
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get()?.get(key).map(String::as_str)
    }

    pub(crate) fn set_params(&self, params: HashMap<String, String>) {
        // A request is routed once; a second set is a no-op.
        let _ = self.params.set(params);
    }

    pub fn query(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }

    pub fn cookie(&self, key: &str) -> Option<&str> {
        self.cookies.get(key).map(String::as_str)
    }

    pub fn file(&self, key: &str) -> Option<&UploadedFile> {
        self.files.get(key)
    }

    pub fn has_file(&self, key: &str) -> bool {
        self.files.contains_key(key)
    }

    // ── Input helpers ────────────────────────────────────────────────────────

    /// Reads a body input item, falling back to the query string.
    pub fn input(&self, key: &str) -> Option<&str> {
        self.input.get(key).or_else(|| self.query.get(key)).map(String::as_str)
    }

    /// Body input merged with the query string; query values win on conflict.
    pub fn all_input(&self) -> HashMap<String, String> {
        let mut all = self.input.clone();
        all.extend(self.query.iter().map(|(k, v)| (k.clone(), v.clone())));
        all
    }

    /// `true` when the input item exists and is not blank.
    pub fn has(&self, key: &str) -> bool {
        self.input(key).is_some_and(|v| !v.trim().is_empty())
    }

    pub fn only(&self, keys: &[&str]) -> HashMap<String, String> {
        let mut all = self.all_input();
        all.retain(|k, _| keys.contains(&k.as_str()));
        all
    }

    pub fn except(&self, keys: &[&str]) -> HashMap<String, String> {
        let mut all = self.all_input();
        all.retain(|k, _| !keys.contains(&k.as_str()));
        all
    }

    /// Adds items to both the body input and the query bag.
    pub fn merge(&mut self, input: HashMap<String, String>) {
        for (k, v) in input {
            self.query.insert(k.clone(), v.clone());
            self.input.insert(k, v);
        }
    }

    /// Replaces both the body input and the query bag.
    pub fn replace(&mut self, input: HashMap<String, String>) {
        self.query = input.clone();
        self.input = input;
    }

    /// Decodes the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, Error> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// `true` for requests sent with `X-Requested-With: XMLHttpRequest`.
    pub fn ajax(&self) -> bool {
        self.header("x-requested-with") == Some("XMLHttpRequest")
    }

    /// `scheme://host[:port]`, the root every generated URL hangs off.
    pub fn root_url(&self) -> String {
        format!("{}://{}", self.scheme, self.authority)
    }

    // ── Session ──────────────────────────────────────────────────────────────

    /// Attaches a session store. Returns `false` if one was already attached.
    pub fn attach_session(&self, store: Arc<dyn SessionStore>) -> bool {
        self.session.set(store).is_ok()
    }

    pub fn session(&self) -> Result<&Arc<dyn SessionStore>, Error> {
        self.session.get().ok_or(Error::MissingSession)
    }

    /// Reads one item of the input flashed by the previous request.
    pub fn old(&self, key: &str) -> Result<Option<String>, Error> {
        Ok(self.session()?.old_input(key))
    }

    /// Flashes all current input to the session.
    pub fn flash(&self) -> Result<(), Error> {
        self.session()?.flash_input(self.all_input());
        Ok(())
    }

    pub fn flash_only(&self, keys: &[&str]) -> Result<(), Error> {
        self.session()?.flash_input(self.only(keys));
        Ok(())
    }

    pub fn flash_except(&self, keys: &[&str]) -> Result<(), Error> {
        self.session()?.flash_input(self.except(keys));
        Ok(())
    }

    /// Clears any flashed input.
    pub fn flush(&self) -> Result<(), Error> {
        self.session()?.flash_input(HashMap::new());
        Ok(())
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("host", &self.authority)
            .field("session", &self.session.get().is_some())
            .finish_non_exhaustive()
    }
}

fn parse_pairs(raw: &[u8]) -> HashMap<String, String> {
    url::form_urlencoded::parse(raw).into_owned().collect()
}

fn parse_cookies(header: &str) -> HashMap<String, String> {
    header
        .split(';')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.trim().to_owned(), v.trim().to_owned()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MemorySession;

    #[test]
    fn input_falls_back_to_query() {
        let req = Request::post("/users?page=2").with_input("name", "ada");
        assert_eq!(req.input("name"), Some("ada"));
        assert_eq!(req.input("page"), Some("2"));
        assert_eq!(req.input("missing"), None);
    }

    #[test]
    fn query_wins_when_merging_all_input() {
        let req = Request::post("/?name=query").with_input("name", "body").with_input("age", "36");
        let all = req.all_input();
        assert_eq!(all["name"], "query");
        assert_eq!(all["age"], "36");
    }

    #[test]
    fn has_ignores_blank_values() {
        let req = Request::post("/").with_input("blank", "   ").with_input("set", "x");
        assert!(!req.has("blank"));
        assert!(req.has("set"));
        assert!(!req.has("missing"));
    }

    #[test]
    fn only_and_except_filter_keys() {
        let req = Request::post("/").with_input("a", "1").with_input("b", "2").with_input("c", "3");
        assert_eq!(req.only(&["a", "c"]).len(), 2);
        let rest = req.except(&["a"]);
        assert!(!rest.contains_key("a"));
        assert_eq!(rest.len(), 2);
    }

    #[test]
    fn host_strips_port() {
        assert_eq!(Request::get("/").with_host("api.example.com:8080").host(), "api.example.com");
        assert_eq!(Request::get("/").with_host("[::1]:3000").host(), "[::1]");
        assert_eq!(Request::get("/").with_host("api.example.com:8080").root_url(), "http://api.example.com:8080");
    }

    #[test]
    fn headers_are_case_insensitive() {
        let req = Request::get("/").with_header("X-Requested-With", "XMLHttpRequest");
        assert!(req.ajax());
        assert_eq!(req.header("x-requested-with"), Some("XMLHttpRequest"));
    }

    #[test]
    fn session_helpers_require_a_store() {
        let req = Request::post("/").with_input("name", "ada");
        assert!(matches!(req.flash(), Err(Error::MissingSession)));

        let store = Arc::new(MemorySession::new());
        assert!(req.attach_session(store.clone()));
        assert!(!req.attach_session(store.clone()));

        req.flash_only(&["name"]).unwrap();
        assert_eq!(req.old("name").unwrap().as_deref(), Some("ada"));
        req.flush().unwrap();
        assert_eq!(req.old("name").unwrap(), None);
    }

    #[test]
    fn from_parts_reads_cookies_and_form_bodies() {
        let (parts, ()) = http::Request::builder()
            .method(Method::POST)
            .uri("/login?next=%2Fhome")
            .header("host", "example.com")
            .header("cookie", "sid=abc; theme=dark")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(())
            .unwrap()
            .into_parts();
        let req = Request::from_parts(parts, Bytes::from_static(b"user=ada&pass=s3cret"));

        assert_eq!(req.host(), "example.com");
        assert_eq!(req.cookie("theme"), Some("dark"));
        assert_eq!(req.input("user"), Some("ada"));
        assert_eq!(req.query("next"), Some("/home"));
    }

    #[test]
    fn json_body_decodes() {
        let req = Request::post("/").with_body(r#"{"id":7}"#);
        let value: serde_json::Value = req.json().unwrap();
        assert_eq!(value["id"], 7);
    }
}
