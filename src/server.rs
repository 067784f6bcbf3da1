//! HTTP transport and graceful shutdown.
//!
//! Each request is dispatched on its own task. The task hands the response
//! back to hyper, waits until hyper has consumed (or dropped) the body, then
//! runs the terminate phase, so terminators always observe a response that
//! has left the pipeline and a disconnecting client cannot cancel them.
//!
//! # Graceful shutdown
//!
//! On SIGTERM or Ctrl-C (or the future given to
//! [`Server::serve_with_shutdown`]) the server:
//! 1. stops accepting connections,
//! 2. asks every open connection to finish its in-flight request and close,
//! 3. waits for all connection tasks,
//! 4. returns once every request task has finished its terminate phase.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::{Body as HttpBody, Frame, Incoming, SizeHint};
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info};

use crate::config::AppConfig;
use crate::error::Error;
use crate::exception::{DefaultExceptionHandler, HttpError};
use crate::pipeline::App;
use crate::request::Request;
use crate::response::{Body, encode};

/// The HTTP server.
pub struct Server {
    addr: SocketAddr,
}

impl Server {
    /// Configures the server to listen on `addr` (`host:port`).
    ///
    /// ```rust
    /// use trellis::Server;
    /// assert!(Server::bind("0.0.0.0:3333").is_ok());
    /// assert!(Server::bind("localhost").is_err());
    /// ```
    pub fn bind(addr: &str) -> Result<Self, Error> {
        let addr = addr.parse().map_err(|_| Error::InvalidAddress(addr.to_owned()))?;
        Ok(Self { addr })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, Error> {
        Self::bind(&config.http.address)
    }

    pub fn addr(&self) -> SocketAddr { self.addr }

    /// Serves `app` until SIGTERM or Ctrl-C, then drains.
    pub async fn serve(self, app: App) -> Result<(), Error> {
        self.serve_with_shutdown(app, shutdown_signal()).await
    }

    /// Serves `app` until `signal` resolves, then drains.
    pub async fn serve_with_shutdown<S>(self, app: App, signal: S) -> Result<(), Error>
    where
        S: Future<Output = ()>,
    {
        let listener = TcpListener::bind(self.addr).await?;
        serve_listener(listener, app, signal).await
    }
}

/// Serves `app` on an already bound listener until `signal` resolves.
pub async fn serve_listener<S>(listener: TcpListener, app: App, signal: S) -> Result<(), Error>
where
    S: Future<Output = ()>,
{
    let addr = listener.local_addr()?;
    info!(addr = %addr, routes = app.routes().len(), "trellis listening");

    let (drain_tx, drain_rx) = watch::channel(false);
    // Every request task holds a sender; `recv` yields `None` once all are gone.
    let (in_flight, mut requests_done) = mpsc::channel::<()>(1);
    let mut tasks = tokio::task::JoinSet::new();
    tokio::pin!(signal);

    loop {
        tokio::select! {
            biased;

            () = &mut signal => {
                info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                break;
            }

            accepted = listener.accept() => {
                let (stream, remote_addr) = match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        error!("accept error: {e}");
                        continue;
                    }
                };
                let app = app.clone();
                let mut drain = drain_rx.clone();
                let in_flight = in_flight.clone();

                tasks.spawn(async move {
                    let svc = service_fn(move |req| {
                        dispatch(app.clone(), req, remote_addr, in_flight.clone())
                    });
                    let builder = ConnBuilder::new(TokioExecutor::new());
                    let conn = builder.serve_connection(TokioIo::new(stream), svc);
                    tokio::pin!(conn);

                    let served = tokio::select! {
                        served = conn.as_mut() => served,
                        _ = drain.changed() => {
                            conn.as_mut().graceful_shutdown();
                            conn.as_mut().await
                        }
                    };
                    if let Err(e) = served {
                        debug!(peer = %remote_addr, "connection error: {e}");
                    }
                });
            }

            Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
        }
    }

    drop(listener);
    drain_tx.send(true).ok();
    while tasks.join_next().await.is_some() {}

    drop(in_flight);
    debug!("connections closed, waiting for terminators");
    requests_done.recv().await;

    info!("trellis stopped");
    Ok(())
}

// ── Request dispatch ──────────────────────────────────────────────────────────

async fn dispatch(
    app: App,
    req: hyper::Request<Incoming>,
    remote_addr: SocketAddr,
    in_flight: mpsc::Sender<()>,
) -> Result<http::Response<SentBody>, Infallible> {
    let request = match Request::from_hyper(req, remote_addr).await {
        Ok(request) => request,
        Err(error) => return Ok(unparsed(&error)),
    };

    let (response_tx, response_rx) = oneshot::channel();
    let (flushed_tx, flushed_rx) = oneshot::channel();

    tokio::spawn(async move {
        let _in_flight = in_flight;
        let (sent, terminate) = app.handle(request).await.into_parts();
        if response_tx.send(sent).is_err() {
            debug!("client went away before the response was ready");
        }
        // Err means the body (or the whole response) was dropped unsent.
        flushed_rx.await.ok();
        terminate.run().await;
    });

    let response = match response_rx.await {
        Ok(sent) => sent.into_http().map(|body| SentBody::new(body, Some(flushed_tx))),
        Err(_) => {
            error!("dispatch task ended without a response");
            unparsed(&HttpError::msg("dispatch task ended without a response"))
        }
    };
    Ok(response)
}

/// Requests that never became a [`Request`] (unsupported method, unreadable
/// body) skip the pipeline and get the stock error body.
fn unparsed(error: &HttpError) -> http::Response<SentBody> {
    let rendered = DefaultExceptionHandler::new().render(error);
    let body = Body::json(&rendered).unwrap_or_else(|_| Body::Text(rendered.message.clone()));
    encode(error.status(), http::HeaderMap::new(), &body).map(|body| SentBody::new(body, None))
}

/// The response body handed to hyper. Signals once it has been read to the
/// end or dropped.
pub struct SentBody {
    inner: Full<Bytes>,
    flushed: Option<oneshot::Sender<()>>,
}

impl SentBody {
    fn new(inner: Full<Bytes>, flushed: Option<oneshot::Sender<()>>) -> Self {
        Self { inner, flushed }
    }

    fn signal(&mut self) {
        if let Some(flushed) = self.flushed.take() {
            flushed.send(()).ok();
        }
    }
}

impl HttpBody for SentBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, Infallible>>> {
        let polled = Pin::new(&mut self.inner).poll_frame(cx);
        if let Poll::Ready(None) = polled {
            self.signal();
        }
        polled
    }

    fn is_end_stream(&self) -> bool { self.inner.is_end_stream() }

    fn size_hint(&self) -> SizeHint { self.inner.size_hint() }
}

impl Drop for SentBody {
    fn drop(&mut self) { self.signal(); }
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on SIGTERM (Unix) or Ctrl-C. A handler that cannot be installed
/// is logged and never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("cannot listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("cannot listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c  => {}
        () = sigterm => {}
    }
}
