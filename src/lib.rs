//! # foundry
//!
//! The request-dispatch kernel of a web application: service providers,
//! middleware tiers, routing and exception handling composed into one
//! deterministic request lifecycle.
//!
//! ## The lifecycle
//!
//! 1. Providers boot once, in registration order, on the first request.
//! 2. Global `before` hooks run; the first response returned answers the
//!    request and nothing else runs.
//! 3. The router resolves the route (404 / 405 otherwise).
//! 4. The route's before middleware and every pattern-bound middleware all
//!    run; if any of them returns a response, the last one is used instead
//!    of running the action.
//! 5. The response is prepared (headers finalized), then route `after`
//!    and global `after` hooks see it.
//! 6. The transport sends it; global `finish` hooks run last.
//!
//! Errors and panics from any step are offered to the registered error
//! handlers by [`Application::handle`], with a fallback error page when
//! none of them answers.
//!
//! Actions may dispatch sub-requests against the application; the request
//! context is restored on every exit path.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use foundry::{abort, Application, Json, Request, Server};
//! use http::StatusCode;
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut app = Application::new();
//!
//!     app.before(|req: &Request| {
//!         (req.path() == "/down").then_some((StatusCode::SERVICE_UNAVAILABLE, "maintenance"))
//!     });
//!
//!     app.router_mut()
//!         .get("/users/{id}", |_: &Application, req: &Request| {
//!             let id: u32 = req.param("id").unwrap_or("").parse()
//!                 .map_err(|_| abort(StatusCode::BAD_REQUEST, "id must be numeric"))?;
//!             Ok::<_, foundry::Error>(Json(serde_json::json!({ "id": id })))
//!         })
//!         .named("users.show");
//!
//!     Server::bind("0.0.0.0:3000").serve(app).await.unwrap();
//! }
//! ```

mod app;
mod config;
mod dispatch;
mod error;
mod exception;
mod handler;
mod pattern;
mod provider;
mod redirect;
mod request;
mod response;
mod router;
mod server;
mod services;
mod session;

pub mod context;
pub mod middleware;

pub use app::{Application, ENVIRONMENT_KEY};
pub use config::{Config, EnvironmentRule, Environments};
pub use dispatch::Stage;
pub use error::{abort, Error, HttpError};
pub use exception::{render as render_error, ErrorHandlers};
pub use handler::Reply;
pub use middleware::{Hook, IntoOutcome, Middleware};
pub use pattern::is_match;
pub use provider::ServiceProvider;
pub use redirect::Redirect;
pub use request::{Request, UploadedFile};
pub use response::{ContentType, IntoResponse, Json, Response, ResponseBuilder};
pub use router::{Resolver, Route, RouteMatch, Router};
pub use server::{serve_listener, Server};
pub use services::Services;
pub use session::{MemorySession, SessionStore};
