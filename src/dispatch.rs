//! Request dispatch: boot, middleware tiers, routing, error interception.
//!
//! ```text
//! boot (once) → prepare_request → global before ─┐ Some: answer now
//!      → resolve → route + pattern before ───────┤ last Some: skip action
//!      → action → prepare → route after → global after → response
//!                               (after send)     → global finish
//! ```

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::Ordering;

use tracing::{debug, error, info, trace, warn};

use crate::app::Application;
use crate::context;
use crate::error::Error;
use crate::exception;
use crate::middleware::Hook;
use crate::request::Request;
use crate::response::Response;
use crate::router::{Resolver, RouteMatch};

/// Where a request is in its lifecycle.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Stage {
    Received,
    BeforeGlobal,
    Routed,
    BeforeFiltered,
    Executed,
    AfterFiltered,
    AfterGlobal,
    Responded,
    FinishGlobal,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Received => "received",
            Self::BeforeGlobal => "before-global",
            Self::Routed => "routed",
            Self::BeforeFiltered => "before-filtered",
            Self::Executed => "executed",
            Self::AfterFiltered => "after-filtered",
            Self::AfterGlobal => "after-global",
            Self::Responded => "responded",
            Self::FinishGlobal => "finish-global",
        })
    }
}

fn enter(stage: Stage, request: &Request) {
    trace!(%stage, method = %request.method(), path = request.path(), depth = context::depth(), "dispatch stage");
}

impl Application {
    /// Boots every registered provider, in registration order, exactly once.
    ///
    /// Concurrent callers wait for the first one to finish. A failed boot is
    /// final: no provider is booted again and every later call returns the
    /// same [`Error::Boot`]. Providers must not dispatch requests from
    /// `boot`.
    pub fn boot(&self) -> Result<(), Error> {
        if self.booted.load(Ordering::Acquire) {
            return Ok(());
        }
        let mut failure = self.boot_failure.lock();
        if self.booted.load(Ordering::Acquire) {
            return Ok(());
        }
        if let Some((provider, message)) = failure.as_ref() {
            return Err(Error::Boot { provider: provider.clone(), source: message.clone().into() });
        }

        for provider in &self.providers {
            debug!(provider = provider.name(), "booting service provider");
            // Recorded up front so a panicking provider also ends booting.
            *failure = Some((provider.name().to_owned(), "boot did not complete".to_owned()));
            if let Err(source) = provider.boot(self) {
                error!(provider = provider.name(), error = %source, "service provider failed to boot");
                *failure = Some((provider.name().to_owned(), source.to_string()));
                return Err(Error::Boot { provider: provider.name().to_owned(), source: Box::new(source) });
            }
        }

        *failure = None;
        self.booted.store(true, Ordering::Release);
        info!(providers = self.providers.len(), "application booted");
        Ok(())
    }

    pub fn is_booted(&self) -> bool {
        self.booted.load(Ordering::Acquire)
    }

    /// Runs `request` through the full pipeline without error interception.
    ///
    /// Safe to call from inside a route action for a sub-request; the outer
    /// request becomes current again when this returns, whatever the outcome.
    pub fn dispatch(&self, request: Request) -> Result<Response, Error> {
        self.dispatch_shared(Arc::new(request))
    }

    pub fn dispatch_shared(&self, request: Arc<Request>) -> Result<Response, Error> {
        self.boot()?;
        self.prepare_request(&request);
        context::using(Arc::clone(&request), || self.pipeline(&request))
    }

    fn pipeline(&self, request: &Request) -> Result<Response, Error> {
        enter(Stage::Received, request);

        if let Some(response) = self.global.call(Hook::Before, request, None)? {
            enter(Stage::BeforeGlobal, request);
            let response = self.prepare_response(response, request);
            enter(Stage::Responded, request);
            return Ok(response);
        }
        enter(Stage::BeforeGlobal, request);

        let RouteMatch { route, params } = self.resolver().resolve(request)?;
        request.set_params(params);
        enter(Stage::Routed, request);

        // Every before middleware runs; the last response produced wins.
        let names = route.before_middlewares().iter().cloned()
            .chain(self.registry.matching(request.path()));
        let mut short_circuit = None;
        for name in names {
            if let Some(response) = self.registry.call(&name, request, None)? {
                short_circuit = Some(response);
            }
        }
        enter(Stage::BeforeFiltered, request);

        let response = match short_circuit {
            Some(response) => response,
            None => {
                let response = route.run(self, request)?;
                enter(Stage::Executed, request);
                response
            }
        };
        let response = self.prepare_response(response, request);

        for name in route.after_middlewares() {
            self.registry.call(name, request, Some(&response))?;
        }
        enter(Stage::AfterFiltered, request);

        self.global.call(Hook::After, request, Some(&response))?;
        enter(Stage::AfterGlobal, request);

        enter(Stage::Responded, request);
        Ok(response)
    }

    /// Like [`dispatch`](Self::dispatch), converting every error except a
    /// boot failure into a response. Panics raised while dispatching are
    /// caught and treated as errors.
    pub fn handle(&self, request: Request) -> Result<Response, Error> {
        self.handle_shared(Arc::new(request))
    }

    pub fn handle_shared(&self, request: Arc<Request>) -> Result<Response, Error> {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.dispatch_shared(Arc::clone(&request))));
        let err = match outcome {
            Ok(Ok(response)) => return Ok(response),
            Ok(Err(err)) => err,
            Err(payload) => Error::from_panic(payload),
        };
        if matches!(err, Error::Boot { .. }) {
            return Err(err);
        }
        // Handlers see the failed request as current, so a redirect they
        // return can flash into its session.
        Ok(context::using(Arc::clone(&request), || self.handle_error(&err, &request)))
    }

    /// Turns `err` into a response: the first error handler that answers,
    /// otherwise the fallback renderer.
    pub fn handle_error(&self, err: &Error, request: &Request) -> Response {
        debug!(error = %err, status = %err.status(), path = request.path(), "handling error");
        match self.errors.handle(err) {
            Some(response) => self.prepare_response(response, request),
            None => exception::render(err, self.config.debug),
        }
    }

    /// Attaches the session store, if one is configured.
    pub fn prepare_request(&self, request: &Request) {
        if let Some(store) = &self.session {
            request.attach_session(Arc::clone(store));
        }
    }

    pub fn prepare_response(&self, response: Response, request: &Request) -> Response {
        response.prepare(request)
    }

    /// Runs the finish hooks. Call after the response was sent.
    pub fn call_finish_middleware(&self, request: &Request, response: &Response) {
        enter(Stage::FinishGlobal, request);
        if let Err(err) = self.global.call(Hook::Finish, request, Some(response)) {
            warn!(error = %err, path = request.path(), "finish middleware failed");
        }
    }
}
