//! Minimal foundry application: providers, middleware tiers, nested
//! dispatch and error handling.
//!
//! Run with:
//!   RUST_LOG=foundry=trace,info cargo run --example basic
//!
//! Try:
//!   curl http://localhost:3000/users/42
//!   curl http://localhost:3000/admin/stats                 # 401
//!   curl -H 'authorization: x' http://localhost:3000/admin/stats
//!   curl http://localhost:3000/dashboard                   # nested dispatch
//!   curl -X POST -d 'name=alice&password=hunter2' http://localhost:3000/profile

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use foundry::{
    abort, Application, Config, Error, Json, MemorySession, Redirect, Request, Response, Server,
    ServiceProvider,
};
use http::StatusCode;
use tracing::info;
use tracing_subscriber::EnvFilter;

const CONFIG: &str = r#"
debug = true

[[environments]]
name = "local"
hosts = ["localhost", "127.0.0.1"]
"#;

/// Counts served requests; the counter lives in the service registry.
struct MetricsProvider;

impl ServiceProvider for MetricsProvider {
    fn name(&self) -> &str {
        "metrics"
    }

    fn register(&self, app: &mut Application) {
        app.services().insert("metrics.served", AtomicU64::new(0));
    }

    fn boot(&self, app: &Application) -> Result<(), Error> {
        info!(services = ?app.services().keys(), "metrics provider booted");
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::from_toml_str(CONFIG).expect("demo config");
    let mut app = Application::with_config(config);
    app.register(MetricsProvider);
    app.set_session_store(Arc::new(MemorySession::new()));

    app.before(|req: &Request| {
        (req.path() == "/maintenance").then_some((StatusCode::SERVICE_UNAVAILABLE, "back soon"))
    });
    app.finish(|req: &Request, res: &Response| {
        info!(path = req.path(), status = %res.status_code(), "finished");
    });

    app.add_middleware("auth", |req: &Request, _: Option<&Response>| {
        req.header("authorization").is_none().then_some(StatusCode::UNAUTHORIZED)
    });
    app.match_middleware("admin/*", ["auth"]);

    app.error_with_status(|err: &Error, status: StatusCode| {
        (status == StatusCode::NOT_FOUND).then(|| Json(serde_json::json!({ "error": err.to_string() })))
    });

    let router = app.router_mut();
    router
        .get("/users/{id}", |app: &Application, req: &Request| {
            let id: u64 = req.param("id").unwrap_or("").parse()
                .map_err(|_| abort(StatusCode::BAD_REQUEST, "id must be numeric"))?;
            if let Some(served) = app.services().get::<AtomicU64>("metrics.served") {
                served.fetch_add(1, Ordering::Relaxed);
            }
            Ok::<_, Error>(Json(serde_json::json!({ "id": id, "name": "alice" })))
        })
        .named("users.show");
    router.get("/admin/stats", |app: &Application, _: &Request| {
        let served = app.services().get::<AtomicU64>("metrics.served")
            .map_or(0, |served| served.load(Ordering::Relaxed));
        Json(serde_json::json!({ "served": served }))
    });
    router.get("/dashboard", |app: &Application, req: &Request| {
        let env = app.detect_environment(req);
        let user = app.dispatch(Request::get("/users/1"))?;
        Ok::<_, Error>(format!("[{env}] user: {}", String::from_utf8_lossy(user.body())))
    });
    router.post("/profile", |app: &Application, req: &Request| {
        Ok::<_, Error>(app.redirect_to_route("users.show", &[("id", "1")])?
            .with("status", "Profile saved")
            .with_input(req.except(&["password"])))
    });

    Server::bind("0.0.0.0:3000")
        .serve(app)
        .await
        .expect("server error");
}
