use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use foundry::context::{self, RequestStack};
use foundry::{
    abort, Application, Config, Error, HttpError, MemorySession, Redirect, Request, Resolver,
    Response, RouteMatch, Router, ServiceProvider, SessionStore,
};
use http::{Method, StatusCode};

type Log = Arc<Mutex<Vec<String>>>;

fn log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

fn body(response: &Response) -> &str {
    std::str::from_utf8(response.body()).unwrap()
}

/// Wraps the default router and counts how often routing happens.
struct CountingResolver {
    inner: Router,
    calls: Arc<AtomicUsize>,
}

impl Resolver for CountingResolver {
    fn resolve(&self, request: &Request) -> Result<RouteMatch<'_>, HttpError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.resolve(request)
    }
}

#[test]
fn global_before_first_response_short_circuits() {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = log();

    let mut inner = Router::new();
    inner.get("/", |_: &Application, _: &Request| "route");

    let mut app = Application::new();
    app.with_resolver(CountingResolver { inner, calls: Arc::clone(&calls) });

    let (a, b, c) = (seen.clone(), seen.clone(), seen.clone());
    app.before(move |_: &Request| {
        a.lock().unwrap().push("first".into());
        None::<Response>
    });
    app.before(move |_: &Request| {
        b.lock().unwrap().push("second".into());
        Some("from before")
    });
    app.before(move |_: &Request| {
        c.lock().unwrap().push("third".into());
        Some("never")
    });

    let response = app.dispatch(Request::get("/")).unwrap();

    assert_eq!(body(&response), "from before");
    assert_eq!(entries(&seen), ["first", "second"]);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn short_circuit_response_is_prepared() {
    let mut app = Application::new();
    app.before(|_: &Request| Some("stop"));

    let response = app.dispatch(Request::get("/anything")).unwrap();
    assert_eq!(response.header("content-length"), Some("4"));
}

#[test]
fn route_before_runs_all_and_last_response_wins() {
    let seen = log();
    let action_ran = Arc::new(AtomicUsize::new(0));
    let mut app = Application::new();

    let (a, b, c) = (seen.clone(), seen.clone(), seen.clone());
    app.add_middleware("one", move |_: &Request, _: Option<&Response>| {
        a.lock().unwrap().push("one".into());
        Some("from one")
    });
    app.add_middleware("two", move |_: &Request, _: Option<&Response>| {
        b.lock().unwrap().push("two".into());
        Some("from two")
    });
    app.add_middleware("three", move |_: &Request, _: Option<&Response>| {
        c.lock().unwrap().push("three".into());
    });

    let ran = Arc::clone(&action_ran);
    app.router_mut()
        .get("/guarded", move |_: &Application, _: &Request| {
            ran.fetch_add(1, Ordering::SeqCst);
            "action"
        })
        .before("one")
        .before("missing")
        .before("two")
        .before("three");

    let response = app.dispatch(Request::get("/guarded")).unwrap();

    assert_eq!(body(&response), "from two");
    assert_eq!(entries(&seen), ["one", "two", "three"]);
    assert_eq!(action_ran.load(Ordering::SeqCst), 0);
}

#[test]
fn pattern_bindings_accumulate_in_order() {
    let seen = log();
    let mut app = Application::new();

    for name in ["auth", "logging"] {
        let seen = seen.clone();
        app.add_middleware(name, move |_: &Request, _: Option<&Response>| {
            seen.lock().unwrap().push(name.to_owned());
        });
    }
    app.match_middleware("admin/*", ["auth"]);
    app.match_middleware("admin/*", ["logging"]);

    let action_seen = seen.clone();
    app.router_mut().get("/admin/users", move |_: &Application, _: &Request| {
        action_seen.lock().unwrap().push("action".into());
        "users"
    });

    assert_eq!(app.pattern_middlewares("/admin/users"), ["auth", "logging"]);
    app.dispatch(Request::get("/admin/users")).unwrap();
    assert_eq!(entries(&seen), ["auth", "logging", "action"]);
}

#[test]
fn auth_on_secure_pattern_runs_before_action() {
    let seen = log();
    let mut app = Application::new();

    let auth_seen = seen.clone();
    app.add_middleware("auth", move |_: &Request, _: Option<&Response>| {
        auth_seen.lock().unwrap().push("auth".into());
    });
    app.match_middleware("secure/*", ["auth"]);

    let action_seen = seen.clone();
    app.router_mut().get("/secure/data", move |_: &Application, _: &Request| {
        action_seen.lock().unwrap().push("action".into());
        "data"
    });

    let response = app.dispatch(Request::get("/secure/data")).unwrap();
    assert_eq!(body(&response), "data");
    assert_eq!(entries(&seen), ["auth", "action"]);
}

#[test]
fn route_before_runs_ahead_of_pattern_middleware() {
    let seen = log();
    let mut app = Application::new();
    for name in ["route", "pattern"] {
        let seen = seen.clone();
        app.add_middleware(name, move |_: &Request, _: Option<&Response>| {
            seen.lock().unwrap().push(name.to_owned());
        });
    }
    app.match_middleware("*", ["pattern"]);
    app.router_mut().get("/x", |_: &Application, _: &Request| "x").before("route");

    app.dispatch(Request::get("/x")).unwrap();
    assert_eq!(entries(&seen), ["route", "pattern"]);
}

#[test]
fn hello_round_trip() {
    let mut app = Application::new();
    app.router_mut().get("/", |_: &Application, _: &Request| "hello");

    let response = app.handle(Request::get("/")).unwrap();
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(body(&response), "hello");
}

#[test]
fn hook_order_across_tiers() {
    let seen = log();
    let mut app = Application::new();

    let s = seen.clone();
    app.before(move |_: &Request| s.lock().unwrap().push("global before".into()));
    let s = seen.clone();
    app.after(move |_: &Request, _: &Response| s.lock().unwrap().push("global after".into()));
    let s = seen.clone();
    app.finish(move |_: &Request, _: &Response| s.lock().unwrap().push("finish".into()));
    let s = seen.clone();
    app.add_middleware("route-after", move |_: &Request, response: Option<&Response>| {
        assert!(response.is_some());
        s.lock().unwrap().push("route after".into());
    });
    let s = seen.clone();
    app.router_mut()
        .get("/", move |_: &Application, _: &Request| {
            s.lock().unwrap().push("action".into());
            "ok"
        })
        .after("route-after");

    let sent = seen.clone();
    app.run(Request::get("/"), |_| sent.lock().unwrap().push("send".into())).unwrap();

    assert_eq!(
        entries(&seen),
        ["global before", "action", "route after", "global after", "send", "finish"]
    );
}

#[test]
fn nested_dispatch_restores_outer_request() {
    let mut app = Application::new();
    app.router_mut().get("/inner", |app: &Application, _: &Request| {
        let current = app.current_request().map(|r| r.path().to_owned());
        format!("inner saw {} at depth {}", current.unwrap_or_default(), context::depth())
    });
    app.router_mut().get("/fails", |_: &Application, _: &Request| {
        Err::<&str, _>(abort(StatusCode::CONFLICT, "inner failure"))
    });
    app.router_mut().get("/outer", |app: &Application, _: &Request| {
        let inner = app.dispatch(Request::get("/inner"))?;
        let failed = app.dispatch(Request::get("/fails"));
        let after = app.current_request().map(|r| r.path().to_owned()).unwrap_or_default();
        Ok::<_, Error>(format!(
            "{} | failed: {} | back on {after}",
            String::from_utf8_lossy(inner.body()),
            failed.err().map(|e| e.status().as_u16()).unwrap_or(0),
        ))
    });

    let response = app.dispatch(Request::get("/outer")).unwrap();
    assert_eq!(body(&response), "inner saw /inner at depth 2 | failed: 409 | back on /outer");
    assert!(context::current().is_none());
}

#[test]
fn request_stack_restores_on_error() {
    let outer = Arc::new(Request::get("/a"));
    let inner = Arc::new(Request::get("/b"));

    let mut stack = RequestStack::new();
    stack.enter(Arc::clone(&outer));

    let result: Result<(), &str> = stack.with_nested(inner, |stack| {
        assert_eq!(stack.current().map(|r| r.path()), Some("/b"));
        Err("X")
    });

    assert_eq!(result, Err("X"));
    assert_eq!(stack.current().map(|r| r.path()), Some("/a"));
}

#[test]
fn environment_detection() {
    let config = Config::from_toml_str(
        r#"
        [[environments]]
        name = "production"
        hosts = ["*.example.com"]

        [[environments]]
        name = "local"
        hosts = ["localhost"]
        "#,
    )
    .unwrap();
    let app = Application::with_config(config);

    assert_eq!(app.detect_environment(&Request::get("/").with_host("api.example.com")), "production");
    assert_eq!(app.detect_environment(&Request::get("/").with_host("dev.test")), "default");
    assert_eq!(app.environment().as_deref(), Some("default"));
}

#[test]
fn wrong_method_is_405_with_allow_header() {
    let mut app = Application::new();
    app.router_mut().get("/items", |_: &Application, _: &Request| "list");
    app.router_mut().post("/items", |_: &Application, _: &Request| "create");

    let response = app.handle(Request::new(Method::DELETE, "/items")).unwrap();
    assert_eq!(response.status_code(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(response.header("allow"), Some("GET, POST"));
}

#[test]
fn providers_boot_once_in_order() {
    struct Recording(&'static str, Log);

    impl ServiceProvider for Recording {
        fn name(&self) -> &str {
            self.0
        }

        fn boot(&self, _: &Application) -> Result<(), Error> {
            self.1.lock().unwrap().push(self.0.to_owned());
            Ok(())
        }
    }

    let seen = log();
    let mut app = Application::new();
    app.register(Recording("first", seen.clone()));
    app.register(Recording("second", seen.clone()));
    app.router_mut().get("/", |_: &Application, _: &Request| "ok");

    assert!(!app.is_booted());
    app.dispatch(Request::get("/")).unwrap();
    app.dispatch(Request::get("/")).unwrap();

    assert!(app.is_booted());
    assert_eq!(entries(&seen), ["first", "second"]);
}

#[test]
fn concurrent_first_requests_boot_once() {
    struct Counting(Arc<AtomicUsize>);

    impl ServiceProvider for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        fn boot(&self, _: &Application) -> Result<(), Error> {
            self.0.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(20));
            Ok(())
        }
    }

    let boots = Arc::new(AtomicUsize::new(0));
    let mut app = Application::new();
    app.register(Counting(Arc::clone(&boots)));
    app.router_mut().get("/", |_: &Application, _: &Request| "ok");
    let app = Arc::new(app);

    let workers: Vec<_> = (0..8)
        .map(|_| {
            let app = Arc::clone(&app);
            std::thread::spawn(move || app.handle(Request::get("/")).unwrap().status_code())
        })
        .collect();
    for worker in workers {
        assert_eq!(worker.join().unwrap(), StatusCode::OK);
    }
    assert_eq!(boots.load(Ordering::SeqCst), 1);
}

#[test]
fn boot_failure_is_not_handled() {
    struct Failing;

    impl ServiceProvider for Failing {
        fn name(&self) -> &str {
            "db"
        }

        fn boot(&self, _: &Application) -> Result<(), Error> {
            Err(Error::handler("connection refused"))
        }
    }

    let handled = Arc::new(AtomicUsize::new(0));
    let mut app = Application::new();
    app.register(Failing);
    let counter = Arc::clone(&handled);
    app.error(move |_: &Error| {
        counter.fetch_add(1, Ordering::SeqCst);
        Some("handled")
    });

    let err = app.handle(Request::get("/")).unwrap_err();
    assert!(matches!(err, Error::Boot { .. }));
    assert!(err.to_string().contains("db"));
    assert_eq!(handled.load(Ordering::SeqCst), 0);
}

#[test]
fn failed_boot_is_not_retried() {
    struct Counted(&'static str, Arc<AtomicUsize>);

    impl ServiceProvider for Counted {
        fn name(&self) -> &str {
            self.0
        }

        fn boot(&self, _: &Application) -> Result<(), Error> {
            self.1.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Failing(Arc<AtomicUsize>);

    impl ServiceProvider for Failing {
        fn name(&self) -> &str {
            "queue"
        }

        fn boot(&self, _: &Application) -> Result<(), Error> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(Error::handler("broker unreachable"))
        }
    }

    let (cache, queue) = (Arc::new(AtomicUsize::new(0)), Arc::new(AtomicUsize::new(0)));
    let mut app = Application::new();
    app.router_mut().get("/", |_: &Application, _: &Request| "home");
    app.register(Counted("cache", Arc::clone(&cache)));
    app.register(Failing(Arc::clone(&queue)));

    for _ in 0..3 {
        let err = app.dispatch(Request::get("/")).unwrap_err();
        assert!(matches!(err, Error::Boot { ref provider, .. } if provider == "queue"), "{err}");
        assert!(err.to_string().contains("broker unreachable"), "{err}");
    }
    assert_eq!(cache.load(Ordering::SeqCst), 1);
    assert_eq!(queue.load(Ordering::SeqCst), 1);
    assert!(!app.is_booted());
}

#[test]
fn run_skips_send_and_finish_when_boot_fails() {
    struct Failing;

    impl ServiceProvider for Failing {
        fn name(&self) -> &str {
            "db"
        }

        fn boot(&self, _: &Application) -> Result<(), Error> {
            Err(Error::handler("connection refused"))
        }
    }

    let finished = Arc::new(AtomicUsize::new(0));
    let mut app = Application::new();
    app.router_mut().get("/", |_: &Application, _: &Request| "home");
    app.register(Failing);
    let counter = Arc::clone(&finished);
    app.finish(move |_: &Request, _: &Response| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let mut sent = false;
    let result = app.run(Request::get("/"), |_| sent = true);

    assert!(matches!(result, Err(Error::Boot { .. })));
    assert!(!sent);
    assert_eq!(finished.load(Ordering::SeqCst), 0);
}

#[test]
fn after_hook_responses_are_ignored() {
    let mut app = Application::new();
    app.add_middleware("tag", |_: &Request, _: Option<&Response>| Some("from route after"));
    app.router_mut().get("/", |_: &Application, _: &Request| "action").after("tag");
    app.after(|_: &Request, _: &Response| Some((StatusCode::ACCEPTED, "from global after")));

    let response = app.dispatch(Request::get("/")).unwrap();
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(body(&response), "action");
}

#[test]
fn error_handlers_receive_status_and_first_answer_wins() {
    let mut app = Application::new();
    app.router_mut().get("/teapot", |_: &Application, _: &Request| {
        Err::<&str, _>(abort(StatusCode::IM_A_TEAPOT, "short and stout"))
    });
    app.error(|_: &Error| None::<Response>);
    app.error_with_status(|err: &Error, status: StatusCode| {
        Some((status, format!("handled: {err}")))
    });
    app.error(|_: &Error| Some("unreachable"));

    let response = app.handle(Request::get("/teapot")).unwrap();
    assert_eq!(response.status_code(), StatusCode::IM_A_TEAPOT);
    assert!(body(&response).starts_with("handled: "));
    assert!(body(&response).ends_with("short and stout"));
    assert!(response.header("content-length").is_some());
}

#[test]
fn panics_reach_the_error_handlers() {
    let mut app = Application::new();
    app.router_mut().get("/panic", |_: &Application, _: &Request| -> String {
        panic!("index out of range")
    });
    app.error(|err: &Error| match err {
        Error::Panic(message) => Some(format!("recovered: {message}")),
        _ => None,
    });

    let response = app.handle(Request::get("/panic")).unwrap();
    assert_eq!(body(&response), "recovered: index out of range");
    assert!(context::current().is_none());
}

#[test]
fn unhandled_fault_uses_fallback_page() {
    let mut app = Application::with_config(Config { debug: true, ..Config::default() });
    app.router_mut().get("/", |_: &Application, _: &Request| {
        Err::<&str, _>(Error::handler("disk full"))
    });

    let response = app.handle(Request::get("/")).unwrap();
    assert_eq!(response.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body(&response).contains("disk full"));
}

#[test]
fn middleware_error_aborts_dispatch() {
    let mut app = Application::new();
    app.add_middleware("deny", |_: &Request, _: Option<&Response>| {
        Err::<(), _>(abort(StatusCode::FORBIDDEN, "nope"))
    });
    app.router_mut().get("/", |_: &Application, _: &Request| "ok").before("deny");

    let err = app.dispatch(Request::get("/")).unwrap_err();
    assert_eq!(err.status(), StatusCode::FORBIDDEN);
}

#[test]
fn session_is_attached_and_redirect_flashes_into_it() {
    let store = Arc::new(MemorySession::new());
    let mut app = Application::new();
    app.set_session_store(store.clone());

    app.router_mut()
        .get("/profile", |_: &Application, req: &Request| {
            Ok::<_, Error>(format!("old name: {}", req.old("name")?.unwrap_or_default()))
        })
        .named("profile");
    app.router_mut().post("/profile", |app: &Application, req: &Request| {
        Ok::<Redirect, Error>(
            app.redirect_to_route("profile", &[])?
                .with("status", "saved")
                .with_input(req.except(&["password"])),
        )
    });

    let post = Request::post("/profile")
        .with_input("name", "ada")
        .with_input("password", "secret");
    let response = app.dispatch(post).unwrap();

    assert_eq!(response.status_code(), StatusCode::FOUND);
    assert_eq!(response.header("location"), Some("/profile"));
    assert_eq!(store.get("status").as_deref(), Some("saved"));
    assert_eq!(
        store.flashed_input(),
        HashMap::from([("name".to_owned(), "ada".to_owned())])
    );

    let response = app.dispatch(Request::get("/profile")).unwrap();
    assert_eq!(body(&response), "old name: ada");
}

#[test]
fn redirect_from_error_handler_flashes_into_session() {
    let store = Arc::new(MemorySession::new());
    let mut app = Application::new();
    app.set_session_store(store.clone());
    app.router_mut().post("/orders", |_: &Application, _: &Request| -> Result<&'static str, Error> {
        Err(abort(StatusCode::UNPROCESSABLE_ENTITY, "quantity must be positive"))
    });
    app.error(|err: &Error| Some(Redirect::to("/cart").with("error", err.to_string())));

    let response = app.handle(Request::post("/orders").with_input("qty", "0")).unwrap();

    assert_eq!(response.status_code(), StatusCode::FOUND);
    assert_eq!(response.header("location"), Some("/cart"));
    let flashed = store.get("error").unwrap_or_default();
    assert!(flashed.ends_with("quantity must be positive"), "{flashed}");
    assert!(context::current().is_none());
}

#[test]
fn session_helpers_fail_without_store() {
    let mut app = Application::new();
    app.router_mut().get("/", |_: &Application, req: &Request| {
        req.flash().map(|()| "flashed")
    });

    let err = app.dispatch(Request::get("/")).unwrap_err();
    assert!(matches!(err, Error::MissingSession));
}

#[test]
fn head_request_gets_headers_without_body() {
    let mut app = Application::new();
    app.router_mut().get("/", |_: &Application, _: &Request| "hello");

    let response = app.dispatch(Request::new(Method::HEAD, "/")).unwrap();
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.header("content-length"), Some("5"));
    assert!(response.body().is_empty());
}
