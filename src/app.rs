//! The application object.
//!
//! Everything is configured through `&mut Application` before serving
//! starts; after that the application is shared immutably (typically as an
//! `Arc<Application>`) and every request goes through
//! [`dispatch`](Application::dispatch) / [`handle`](Application::handle).
//!
//! ```rust
//! use foundry::{Application, Request, Response};
//! use http::StatusCode;
//!
//! let mut app = Application::new();
//! app.add_middleware("auth", |req: &Request, _: Option<&Response>| {
//!     req.header("authorization").is_none().then_some(StatusCode::UNAUTHORIZED)
//! });
//! app.match_middleware("admin/*", ["auth"]);
//! app.router_mut().get("/admin/panel", |_: &Application, _: &Request| "panel");
//!
//! let response = app.handle(Request::get("/admin/panel")).unwrap();
//! assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
//! ```

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use bytes::Bytes;
use http::StatusCode;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

use crate::config::Config;
use crate::context;
use crate::error::Error;
use crate::exception::ErrorHandlers;
use crate::middleware::{
    BoxedMiddleware, FnMiddleware, GlobalMiddleware, Hook, IntoOutcome, Middleware,
    MiddlewareRegistry, RequestFn, ResponseFn,
};
use crate::provider::ServiceProvider;
use crate::redirect::Redirect;
use crate::request::Request;
use crate::response::Response;
use crate::router::{Resolver, Router};
use crate::services::Services;
use crate::session::SessionStore;

/// Service key under which the detected environment name is cached.
pub const ENVIRONMENT_KEY: &str = "env";

pub struct Application {
    pub(crate) booted: AtomicBool,
    // Provider name and message of the boot that failed, if any.
    pub(crate) boot_failure: Mutex<Option<(String, String)>>,
    pub(crate) providers: Vec<Arc<dyn ServiceProvider>>,
    pub(crate) registry: MiddlewareRegistry,
    pub(crate) global: GlobalMiddleware,
    pub(crate) errors: ErrorHandlers,
    router: Router,
    resolver: Option<Box<dyn Resolver>>,
    services: Services,
    pub(crate) session: Option<Arc<dyn SessionStore>>,
    pub(crate) config: Config,
}

impl Default for Application {
    fn default() -> Self {
        Self::with_config(Config::default())
    }
}

impl Application {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: Config) -> Self {
        Self {
            booted: AtomicBool::new(false),
            boot_failure: Mutex::new(None),
            providers: Vec::new(),
            registry: MiddlewareRegistry::new(),
            global: GlobalMiddleware::new(),
            errors: ErrorHandlers::new(),
            router: Router::new(),
            resolver: None,
            services: Services::new(),
            session: None,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // ── Providers ────────────────────────────────────────────────────────────

    /// Adds a service provider and runs its `register` step right away.
    /// Its `boot` step runs on the first dispatch.
    pub fn register<P: ServiceProvider>(&mut self, provider: P) -> &mut Self {
        self.register_with(provider, std::iter::empty::<(String, ())>())
    }

    /// Like [`register`](Self::register), then stores each option in the
    /// service registry. Options override defaults the provider set in
    /// `register`.
    pub fn register_with<P, I, K, V>(&mut self, provider: P, options: I) -> &mut Self
    where
        P: ServiceProvider,
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Any + Send + Sync,
    {
        let provider = Arc::new(provider);
        debug!(provider = provider.name(), "registering service provider");
        provider.register(self);
        for (key, value) in options {
            self.services.insert(key, value);
        }
        self.providers.push(provider);
        self
    }

    pub fn providers(&self) -> impl Iterator<Item = &dyn ServiceProvider> {
        self.providers.iter().map(|p| &**p)
    }

    // ── Global middleware ────────────────────────────────────────────────────

    /// Registers a global before hook. The first one returning a response
    /// answers the request; routing never happens.
    pub fn before<F, R>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&Request) -> R + Send + Sync + 'static,
        R: IntoOutcome,
    {
        self.global.push(Hook::Before, Arc::new(RequestFn(hook)));
        self
    }

    /// Registers a global after hook, run once the route's own after
    /// middleware is done.
    pub fn after<F, R>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&Request, &Response) -> R + Send + Sync + 'static,
        R: IntoOutcome,
    {
        self.global.push(Hook::After, Arc::new(ResponseFn(hook)));
        self
    }

    /// Registers a hook run after the response was sent.
    pub fn finish<F, R>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&Request, &Response) -> R + Send + Sync + 'static,
        R: IntoOutcome,
    {
        self.global.push(Hook::Finish, Arc::new(ResponseFn(hook)));
        self
    }

    pub fn global_middleware(&self) -> &GlobalMiddleware {
        &self.global
    }

    // ── Named and pattern middleware ─────────────────────────────────────────

    /// Registers a named middleware. Re-registering a name replaces it.
    pub fn add_middleware<F, R>(&mut self, name: &str, middleware: F) -> &mut Self
    where
        F: Fn(&Request, Option<&Response>) -> R + Send + Sync + 'static,
        R: IntoOutcome,
    {
        self.registry.insert(name, Arc::new(FnMiddleware(middleware)));
        self
    }

    /// Registers a [`Middleware`] implementation under `name`.
    pub fn add_middleware_instance<M: Middleware>(&mut self, name: &str, middleware: M) -> &mut Self {
        self.registry.insert(name, Arc::new(middleware));
        self
    }

    pub fn middleware(&self, name: &str) -> Option<&BoxedMiddleware> {
        self.registry.get(name)
    }

    /// Attaches named middleware to every route whose path matches
    /// `pattern` (`*` matches any run of characters). Repeated calls for one
    /// pattern accumulate.
    ///
    /// A leading `/` is ignored: `"/admin/*"` and `"admin/*"` are the same
    /// binding and both match `/admin/users`.
    pub fn match_middleware<I, S>(&mut self, pattern: &str, names: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.registry.bind(pattern, names);
        self
    }

    /// Names of the pattern middleware that apply to `path`.
    pub fn pattern_middlewares(&self, path: &str) -> Vec<String> {
        self.registry.matching(path)
    }

    // ── Error handlers ───────────────────────────────────────────────────────

    /// Registers an error handler. Handlers run in order; the first to
    /// return a response answers the request.
    pub fn error<F, R>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(&Error) -> R + Send + Sync + 'static,
        R: IntoOutcome,
    {
        self.errors.push(move |err: &Error, _: StatusCode| handler(err));
        self
    }

    /// Like [`error`](Self::error), also passing the error's HTTP status.
    pub fn error_with_status<F, R>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(&Error, StatusCode) -> R + Send + Sync + 'static,
        R: IntoOutcome,
    {
        self.errors.push(handler);
        self
    }

    // ── Routing ──────────────────────────────────────────────────────────────

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn router_mut(&mut self) -> &mut Router {
        &mut self.router
    }

    /// Replaces the built-in router with another resolver.
    pub fn with_resolver<R: Resolver>(&mut self, resolver: R) -> &mut Self {
        self.resolver = Some(Box::new(resolver));
        self
    }

    pub(crate) fn resolver(&self) -> &dyn Resolver {
        match &self.resolver {
            Some(custom) => custom.as_ref(),
            None => &self.router,
        }
    }

    /// Path of the route registered under `name`.
    pub fn url_for(&self, name: &str, params: &[(&str, &str)]) -> Result<String, Error> {
        self.resolver().url_for(name, params)
    }

    // ── Services and session ─────────────────────────────────────────────────

    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Sets the store attached to every dispatched request.
    pub fn set_session_store(&mut self, store: Arc<dyn SessionStore>) -> &mut Self {
        self.session = Some(store);
        self
    }

    pub fn session_store(&self) -> Option<&Arc<dyn SessionStore>> {
        self.session.as_ref()
    }

    // ── Environment ──────────────────────────────────────────────────────────

    /// Picks the environment for the request's host from the configured
    /// environments, falling back to the default name, and caches the
    /// result under [`ENVIRONMENT_KEY`].
    pub fn detect_environment(&self, request: &Request) -> String {
        let env = self.config.detect_environment(request.host()).to_owned();
        debug!(host = request.host(), env = %env, "environment detected");
        self.services.insert(ENVIRONMENT_KEY, env.clone());
        env
    }

    /// The environment cached by the last
    /// [`detect_environment`](Self::detect_environment) call.
    pub fn environment(&self) -> Option<String> {
        self.services.get::<String>(ENVIRONMENT_KEY).map(|env| env.as_ref().clone())
    }

    // ── Request context ──────────────────────────────────────────────────────

    /// Runs `body` with `request` as the current request.
    pub fn using<T>(&self, request: Arc<Request>, body: impl FnOnce() -> T) -> T {
        context::using(request, body)
    }

    /// The request currently being dispatched on this thread.
    pub fn current_request(&self) -> Option<Arc<Request>> {
        context::current()
    }

    // ── Response helpers ─────────────────────────────────────────────────────

    /// A response with a raw body, status and headers.
    pub fn respond(&self, content: impl Into<Bytes>, status: StatusCode, headers: &[(&str, &str)]) -> Response {
        Response::builder()
            .status(status)
            .headers(headers.iter().copied())
            .body(content)
    }

    /// `data` serialized as a JSON response.
    pub fn json<T: Serialize>(&self, data: &T, status: StatusCode, headers: &[(&str, &str)]) -> Result<Response, Error> {
        let body = serde_json::to_vec(data)?;
        Ok(Response::builder()
            .status(status)
            .headers(headers.iter().copied())
            .json(body))
    }

    pub fn redirect(&self, url: &str) -> Redirect {
        Redirect::to(url)
    }

    /// Redirect to a named route.
    pub fn redirect_to_route(&self, name: &str, params: &[(&str, &str)]) -> Result<Redirect, Error> {
        Ok(Redirect::to(&self.url_for(name, params)?))
    }

    /// Handles `request`, hands the response to `send`, then runs the
    /// finish hooks.
    pub fn run<S>(&self, request: Request, send: S) -> Result<(), Error>
    where
        S: FnOnce(&Response),
    {
        let request = Arc::new(request);
        let response = self.handle_shared(Arc::clone(&request))?;
        send(&response);
        self.call_finish_middleware(&request, &response);
        Ok(())
    }
}
