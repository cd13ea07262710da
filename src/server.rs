//! HTTP server and graceful shutdown.
//!
//! Each connection runs on its own task. Requests are collected, converted
//! to a [`Request`] and handed to the application on the blocking pool,
//! since dispatch is synchronous. The response body is wrapped so that the
//! application's finish hooks run once hyper is done with it.
//!
//! # Graceful shutdown
//!
//! On SIGTERM or Ctrl-C the server stops accepting, lets every in-flight
//! connection run to completion and then returns from
//! [`Server::serve`].

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use http_body::{Body, Frame, SizeHint};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::app::Application;
use crate::error::Error;
use crate::exception;
use crate::request::Request;
use crate::response::Response;

pub struct Server {
    addr: SocketAddr,
}

impl Server {
    /// Configures the server to bind to `addr` when [`serve`](Server::serve)
    /// is called.
    ///
    /// # Panics
    ///
    /// Panics if `addr` is not a valid `host:port` string.
    ///
    /// ```rust,no_run
    /// use foundry::Server;
    /// let server = Server::bind("0.0.0.0:3000");
    /// ```
    pub fn bind(addr: &str) -> Self {
        let addr: SocketAddr = addr.parse().expect("invalid socket address");
        Self { addr }
    }

    /// Serves `app` until SIGTERM or Ctrl-C, then drains in-flight
    /// connections.
    pub async fn serve(self, app: Application) -> Result<(), Error> {
        let listener = TcpListener::bind(self.addr).await?;
        serve_listener(listener, Arc::new(app), shutdown_signal()).await
    }
}

/// Accept loop over an already bound listener. Returns once `shutdown`
/// resolves and every connection accepted before it has finished.
///
/// The application is booted before the first connection is accepted. A
/// boot failure is returned without serving anything.
pub async fn serve_listener(
    listener: TcpListener,
    app: Arc<Application>,
    shutdown: impl Future<Output = ()>,
) -> Result<(), Error> {
    let boot_app = Arc::clone(&app);
    tokio::task::spawn_blocking(move || boot_app.boot())
        .await
        .map_err(|join| Error::Panic(join.to_string()))??;

    info!(addr = %listener.local_addr()?, "foundry listening");

    let mut tasks = tokio::task::JoinSet::new();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            // Checked first so a signal stops accepting even under load.
            biased;

            () = &mut shutdown => {
                info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                break;
            }

            res = listener.accept() => {
                let (stream, peer) = match res {
                    Ok(v) => v,
                    Err(e) => {
                        error!("accept error: {e}");
                        continue;
                    }
                };

                let app = Arc::clone(&app);
                let io = TokioIo::new(stream);

                tasks.spawn(async move {
                    let svc = service_fn(move |req| {
                        let app = Arc::clone(&app);
                        async move { serve_request(app, req, peer).await }
                    });

                    if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                        .serve_connection(io, svc)
                        .await
                    {
                        error!(%peer, "connection error: {e}");
                    }
                });
            }

            Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
        }
    }

    while tasks.join_next().await.is_some() {}

    info!("foundry stopped");
    Ok(())
}

async fn serve_request(
    app: Arc<Application>,
    req: hyper::Request<Incoming>,
    peer: SocketAddr,
) -> Result<http::Response<FinishBody>, Infallible> {
    let (parts, body) = req.into_parts();
    let bytes = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!(%peer, "failed to read request body: {e}");
            let response = Response::status(http::StatusCode::BAD_REQUEST).into_http();
            return Ok(response.map(|body| FinishBody::new(body, None)));
        }
    };

    let request = Arc::new(Request::from_parts(parts, bytes));
    let (task_app, task_request) = (Arc::clone(&app), Arc::clone(&request));
    let handled = tokio::task::spawn_blocking(move || task_app.handle_shared(task_request)).await;

    let (response, finish) = match handled {
        Ok(Ok(response)) => {
            let finish = Finish { app: Arc::clone(&app), request: Arc::clone(&request), response: response.clone() };
            (response, Some(finish))
        }
        Ok(Err(err)) => {
            error!(%peer, error = %err, "request failed before dispatch");
            (exception::render(&err, app.config().debug), None)
        }
        Err(join) => {
            error!(%peer, "dispatch task failed: {join}");
            (exception::render(&Error::Panic(join.to_string()), app.config().debug), None)
        }
    };

    debug!(%peer, method = %request.method(), path = request.path(), status = %response.status_code(), "request served");
    Ok(response.into_http().map(|body| FinishBody::new(body, finish)))
}

// ── Finish hooks ──────────────────────────────────────────────────────────────

struct Finish {
    app: Arc<Application>,
    request: Arc<Request>,
    response: Response,
}

impl Finish {
    fn run(self) {
        self.app.call_finish_middleware(&self.request, &self.response);
    }
}

/// Response body that runs the finish hooks when hyper drops it, which
/// happens after the last frame was written (or the client went away).
struct FinishBody {
    inner: Full<Bytes>,
    finish: Option<Finish>,
}

impl FinishBody {
    fn new(body: Bytes, finish: Option<Finish>) -> Self {
        Self { inner: Full::new(body), finish }
    }
}

impl Body for FinishBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        Pin::new(&mut self.get_mut().inner).poll_frame(cx)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl Drop for FinishBody {
    fn drop(&mut self) {
        let Some(finish) = self.finish.take() else { return };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || finish.run());
            }
            Err(_) => finish.run(),
        }
    }
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on SIGTERM or SIGINT (Ctrl-C); Ctrl-C only on non-Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}
