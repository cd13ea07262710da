//! Routing.
//!
//! The dispatcher consumes routing through the [`Resolver`] trait: give it a
//! request, get back a matched [`Route`] (with its own before/after
//! middleware names) or an [`HttpError`]. [`Router`] is the default
//! resolver: one radix tree per HTTP method, O(path-length) lookup.

use std::collections::HashMap;

use http::Method;
use matchit::Router as MatchitRouter;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};

use crate::app::Application;
use crate::error::{Error, HttpError};
use crate::handler::{self, BoxedAction, Reply};
use crate::request::Request;
use crate::response::Response;

/// A registered route: the action plus the middleware names wrapped
/// around it.
pub struct Route {
    method: Method,
    path: String,
    name: Option<String>,
    action: BoxedAction,
    before: Vec<String>,
    after: Vec<String>,
}

impl Route {
    /// Appends a before-middleware name. Chainable.
    pub fn before(&mut self, name: &str) -> &mut Self {
        self.before.push(name.to_owned());
        self
    }

    /// Appends an after-middleware name. Chainable.
    pub fn after(&mut self, name: &str) -> &mut Self {
        self.after.push(name.to_owned());
        self
    }

    /// Names the route for URL generation and redirects.
    pub fn named(&mut self, name: &str) -> &mut Self {
        self.name = Some(name.to_owned());
        self
    }

    pub fn method(&self) -> &Method { &self.method }
    pub fn path(&self) -> &str { &self.path }
    pub fn name(&self) -> Option<&str> { self.name.as_deref() }
    pub fn before_middlewares(&self) -> &[String] { &self.before }
    pub fn after_middlewares(&self) -> &[String] { &self.after }

    /// Executes the route's action.
    pub fn run(&self, app: &Application, request: &Request) -> Result<Response, Error> {
        self.action.call(app, request)
    }
}

/// A route matched against a request, with the captured path parameters.
pub struct RouteMatch<'a> {
    pub route: &'a Route,
    pub params: HashMap<String, String>,
}

/// The routing contract the dispatcher depends on.
pub trait Resolver: Send + Sync + 'static {
    /// Finds the route for `request`, or the HTTP error describing the miss.
    fn resolve(&self, request: &Request) -> Result<RouteMatch<'_>, HttpError>;

    /// Builds the path of a named route.
    fn url_for(&self, name: &str, _params: &[(&str, &str)]) -> Result<String, Error> {
        Err(Error::UnknownRoute(name.to_owned()))
    }
}

/// The default radix-tree router.
///
/// Build it once at startup through [`Application::router_mut`]. Each
/// registration returns the new [`Route`] so middleware names chain:
///
/// ```rust
/// use foundry::{Application, Request};
///
/// let mut app = Application::new();
/// app.router_mut()
///     .get("/users/{id}", |_: &Application, req: &Request| {
///         format!("user {}", req.param("id").unwrap_or("?"))
///     })
///     .before("auth")
///     .named("users.show");
/// ```
#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
    trees: HashMap<Method, MatchitRouter<usize>>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an action for a method + path pair.
    ///
    /// Path parameters use `{name}` syntax and catch-alls `{*name}`.
    ///
    /// # Panics
    ///
    /// Panics if the path is not a valid route template or conflicts with
    /// one already registered for the same method.
    pub fn on<F, R>(&mut self, method: Method, path: &str, action: F) -> &mut Route
    where
        F: Fn(&Application, &Request) -> R + Send + Sync + 'static,
        R: Reply,
    {
        let index = self.routes.len();
        self.trees
            .entry(method.clone())
            .or_default()
            .insert(path, index)
            .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));

        self.routes.push(Route {
            method,
            path: path.to_owned(),
            name: None,
            action: handler::boxed(action),
            before: Vec::new(),
            after: Vec::new(),
        });
        &mut self.routes[index]
    }

    pub fn get<F, R>(&mut self, path: &str, action: F) -> &mut Route
    where
        F: Fn(&Application, &Request) -> R + Send + Sync + 'static,
        R: Reply,
    {
        self.on(Method::GET, path, action)
    }

    pub fn post<F, R>(&mut self, path: &str, action: F) -> &mut Route
    where
        F: Fn(&Application, &Request) -> R + Send + Sync + 'static,
        R: Reply,
    {
        self.on(Method::POST, path, action)
    }

    pub fn put<F, R>(&mut self, path: &str, action: F) -> &mut Route
    where
        F: Fn(&Application, &Request) -> R + Send + Sync + 'static,
        R: Reply,
    {
        self.on(Method::PUT, path, action)
    }

    pub fn delete<F, R>(&mut self, path: &str, action: F) -> &mut Route
    where
        F: Fn(&Application, &Request) -> R + Send + Sync + 'static,
        R: Reply,
    {
        self.on(Method::DELETE, path, action)
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    fn lookup(&self, method: &Method, path: &str) -> Option<RouteMatch<'_>> {
        let matched = self.trees.get(method)?.at(path).ok()?;
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some(RouteMatch { route: &self.routes[*matched.value], params })
    }
}

impl Resolver for Router {
    fn resolve(&self, request: &Request) -> Result<RouteMatch<'_>, HttpError> {
        let method = request.method();
        let path = request.path();

        if let Some(found) = self.lookup(method, path) {
            return Ok(found);
        }
        // HEAD is answered by the GET route; the body is dropped in prepare.
        if method == Method::HEAD {
            if let Some(found) = self.lookup(&Method::GET, path) {
                return Ok(found);
            }
        }

        let mut allowed: Vec<Method> = self.trees.iter()
            .filter(|(m, tree)| *m != method && tree.at(path).is_ok())
            .map(|(m, _)| m.clone())
            .collect();

        if allowed.is_empty() {
            Err(HttpError::not_found())
        } else {
            allowed.sort_by(|a, b| a.as_str().cmp(b.as_str()));
            Err(HttpError::method_not_allowed(&allowed))
        }
    }

    fn url_for(&self, name: &str, params: &[(&str, &str)]) -> Result<String, Error> {
        let route = self.routes.iter()
            .find(|r| r.name() == Some(name))
            .ok_or_else(|| Error::UnknownRoute(name.to_owned()))?;
        fill_template(route.path(), params)
            .map_err(|missing| Error::handler(format!("route `{name}` needs parameter `{missing}`")))
    }
}

/// Bytes escaped inside one path segment.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ').add(b'"').add(b'#').add(b'%').add(b'/').add(b'<')
    .add(b'>').add(b'?').add(b'`').add(b'{').add(b'}');

/// Substitutes `{param}` / `{*param}` segments, percent-encoding the values.
/// A catch-all value keeps its `/` separators. Parameters the template does
/// not use are appended as a query string.
fn fill_template(template: &str, params: &[(&str, &str)]) -> Result<String, String> {
    let mut used = Vec::new();
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let Some(close) = rest[open..].find('}') else { break };
        let raw = &rest[open + 1..open + close];
        let key = raw.trim_start_matches('*');
        let value = params.iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| *v)
            .ok_or_else(|| key.to_owned())?;
        if raw.starts_with('*') {
            for (i, part) in value.split('/').enumerate() {
                if i > 0 {
                    out.push('/');
                }
                out.extend(utf8_percent_encode(part, SEGMENT));
            }
        } else {
            out.extend(utf8_percent_encode(value, SEGMENT));
        }
        used.push(key);
        rest = &rest[open + close + 1..];
    }
    out.push_str(rest);

    let extra: Vec<_> = params.iter().filter(|(k, _)| !used.contains(k)).collect();
    if !extra.is_empty() {
        let mut query = url::form_urlencoded::Serializer::new(String::new());
        for (k, v) in extra {
            query.append_pair(k, v);
        }
        out.push('?');
        out.push_str(&query.finish());
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(_: &Application, _: &Request) -> &'static str { "ok" }

    #[test]
    fn captures_params() {
        let mut router = Router::new();
        router.get("/users/{id}", ok).before("auth").after("log");

        let found = router.resolve(&Request::get("/users/42")).ok().unwrap();
        assert_eq!(found.params["id"], "42");
        assert_eq!(found.route.before_middlewares(), ["auth"]);
        assert_eq!(found.route.after_middlewares(), ["log"]);
    }

    #[test]
    fn miss_is_404() {
        let router = Router::new();
        let err = router.resolve(&Request::get("/nowhere")).err().unwrap();
        assert_eq!(err.status(), http::StatusCode::NOT_FOUND);
    }

    #[test]
    fn wrong_method_is_405_with_allow() {
        let mut router = Router::new();
        router.get("/items", ok);
        router.post("/items", ok);

        let err = router.resolve(&Request::new(Method::DELETE, "/items")).err().unwrap();
        assert_eq!(err.status(), http::StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(err.headers()[0].1, "GET, POST");
    }

    #[test]
    fn head_falls_back_to_get() {
        let mut router = Router::new();
        router.get("/", ok);
        assert!(router.resolve(&Request::new(Method::HEAD, "/")).is_ok());
    }

    #[test]
    fn url_for_fills_params_and_appends_extras() {
        let mut router = Router::new();
        router.get("/users/{id}/posts/{post}", ok).named("posts.show");

        let url = router.url_for("posts.show", &[("id", "7"), ("post", "9"), ("ref", "home page")]).unwrap();
        assert_eq!(url, "/users/7/posts/9?ref=home+page");

        assert!(matches!(router.url_for("nope", &[]), Err(Error::UnknownRoute(_))));
        assert!(router.url_for("posts.show", &[("id", "7")]).is_err());
    }

    #[test]
    fn url_for_encodes_segment_values() {
        let mut router = Router::new();
        router.get("/users/{name}", ok).named("users.show");
        router.get("/files/{*path}", ok).named("files");

        let url = router.url_for("users.show", &[("name", "a/b?c#d e%")]).unwrap();
        assert_eq!(url, "/users/a%2Fb%3Fc%23d%20e%25");

        let url = router.url_for("files", &[("path", "docs/my file.txt")]).unwrap();
        assert_eq!(url, "/files/docs/my%20file.txt");
    }
}
