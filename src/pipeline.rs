//! The three-phase request pipeline.
//!
//! ```text
//! MATCHED → HANDLE → HANDLER → INTERCEPT → RESPONSE_SENT → TERMINATE → DONE
//!              │         │          ▲
//!              └── ERROR ┴──────────┘   (exception handler writes the body)
//! ```
//!
//! * **handle**: global middleware, then the route's. A middleware that calls
//!   [`Context::send`] ends the phase early and the handler is skipped.
//! * **handler**: its return value becomes the response unless something was
//!   already sent.
//! * **intercept**: global interceptors, then the route's, each fed the
//!   previous one's body. An error here is rendered by the exception handler
//!   and the remaining interceptors are skipped.
//! * **terminate**: global terminators, then the route's, after the response
//!   has left. Failures are logged and never reach the client.
//!
//! Errors and panics from the handle phase or the handler, and the request
//! timeout, go to the single [`ExceptionHandler`]; interceptors and
//! terminators still run afterwards.
//!
//! [`Kernel`] holds the global chains; [`App`] pairs it with a
//! [`RouteTable`] and is what the server (or a test) calls.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use http::header::{ALLOW, HeaderValue};
use http::{HeaderMap, StatusCode};
use tracing::{Instrument, Span, debug, error, info, info_span};

use crate::config::AppConfig;
use crate::container::Container;
use crate::context::{Context, RouteInfo, Stage};
use crate::error::Error;
use crate::exception::{DefaultExceptionHandler, ExceptionHandler, HttpError};
use crate::middleware::{
    Bound, Handle, Intercept, MiddlewareRecord, MiddlewareRef, Phase, Terminate, Terminator,
    resolve,
};
use crate::request::Request;
use crate::response::{Body, encode};
use crate::router::{Lookup, RouteTable, TransportRoute};

// ── Kernel ────────────────────────────────────────────────────────────────────

/// Global middleware, the exception handler and the request timeout.
///
/// Configured during boot through `&mut self`, then shared behind an `Arc`.
pub struct Kernel {
    pub(crate) container: Arc<Container>,
    pub(crate) global: MiddlewareRecord,
    exception_handler: Arc<dyn ExceptionHandler>,
    request_timeout: Option<Duration>,
}

impl Kernel {
    pub fn new(container: Arc<Container>) -> Self {
        Self {
            container,
            global: MiddlewareRecord::default(),
            exception_handler: Arc::new(DefaultExceptionHandler::new()),
            request_timeout: None,
        }
    }

    /// A kernel whose exception handler and timeout follow `config`.
    pub fn from_config(container: Arc<Container>, config: &AppConfig) -> Self {
        let mut kernel = Self::new(container);
        kernel.exception_handler = Arc::new(DefaultExceptionHandler::from_config(config));
        kernel.request_timeout = config.http.request_timeout();
        kernel
    }

    pub fn container(&self) -> &Arc<Container> { &self.container }

    /// The global chains, run before every route's own.
    pub fn global(&self) -> &MiddlewareRecord { &self.global }

    /// Attaches a global handler to phase `P`, at the front when `prepend`.
    pub fn attach<P: Phase>(
        &mut self,
        reference: impl Into<MiddlewareRef<P>>,
        prepend: bool,
    ) -> Result<&mut Self, Error> {
        let bound = resolve(&self.container, reference.into())?;
        info!(phase = P::NAME, middleware = bound.label(), "global middleware registered");
        self.global.attach::<P>(bound, prepend);
        Ok(self)
    }

    pub fn middleware(&mut self, reference: impl Into<MiddlewareRef<Handle>>) -> Result<&mut Self, Error> {
        self.attach::<Handle>(reference, false)
    }

    pub fn intercept(&mut self, reference: impl Into<MiddlewareRef<Intercept>>) -> Result<&mut Self, Error> {
        self.attach::<Intercept>(reference, false)
    }

    pub fn terminate(&mut self, reference: impl Into<MiddlewareRef<Terminate>>) -> Result<&mut Self, Error> {
        self.attach::<Terminate>(reference, false)
    }

    pub fn set_exception_handler(&mut self, handler: impl ExceptionHandler) -> &mut Self {
        self.exception_handler = Arc::new(handler);
        self
    }

    /// Bounds the handle phase plus the handler. `None` disables the bound.
    pub fn set_request_timeout(&mut self, timeout: Option<Duration>) -> &mut Self {
        self.request_timeout = timeout;
        self
    }

    pub fn request_timeout(&self) -> Option<Duration> { self.request_timeout }

    /// Drops every global handler and container binding, so the kernel can
    /// be set up again from scratch.
    pub fn teardown(&mut self) {
        self.global = MiddlewareRecord::default();
        self.container.clear();
    }

    // ── Dispatch ─────────────────────────────────────────────────────────────

    /// Runs `route` for the request in `ctx` up to the point where the
    /// response is ready. The terminate phase is returned, not run.
    pub async fn dispatch(&self, route: &TransportRoute, ctx: Context) -> Dispatched {
        let span = request_span(&ctx);
        async {
            let before = self.guarded(self.before(route, &ctx)).await;
            if let Err(error) = before {
                self.fail(error, &ctx).await;
            }
            self.finish(ctx, Some(route))
                .await
        }
        .instrument(span)
        .await
    }

    /// Answers a request that matched no route with `error`. Only the global
    /// intercept and terminate chains run.
    pub async fn reject(&self, error: HttpError, ctx: Context) -> Dispatched {
        let span = request_span(&ctx);
        async {
            self.fail(error, &ctx).await;
            self.finish(ctx, None).await
        }
        .instrument(span)
        .await
    }

    async fn before(&self, route: &TransportRoute, ctx: &Context) -> Result<(), HttpError> {
        ctx.enter(Stage::Handle);
        for middleware in self.global.handle.iter().chain(&route.middleware.handle) {
            middleware.handler.handle(ctx).await?;
            if ctx.is_sent() {
                debug!(middleware = middleware.label(), "handle phase short-circuited");
                return Ok(());
            }
        }

        ctx.enter(Stage::Handler);
        let response = route.handler.call(ctx.clone()).await?;
        ctx.apply(response);
        Ok(())
    }

    /// Catches panics from `fut` and applies the request timeout.
    async fn guarded<F>(&self, fut: F) -> Result<(), HttpError>
    where
        F: Future<Output = Result<(), HttpError>>,
    {
        let fut = AssertUnwindSafe(fut).catch_unwind();
        let caught = match self.request_timeout {
            Some(limit) => match tokio::time::timeout(limit, fut).await {
                Ok(caught) => caught,
                Err(_) => {
                    return Err(HttpError::new(StatusCode::REQUEST_TIMEOUT, "Request timed out")
                        .with_code("E_REQUEST_TIMEOUT")
                        .with_name("TimeoutException"));
                }
            },
            None => fut.await,
        };
        caught.unwrap_or_else(|payload| Err(panic_error(payload)))
    }

    /// Renders `error` through the exception handler. A handler that panics
    /// is replaced by the stock one for this request.
    async fn fail(&self, error: HttpError, ctx: &Context) {
        ctx.enter(Stage::Error);
        let handled = AssertUnwindSafe(self.exception_handler.handle(error, ctx))
            .catch_unwind()
            .await;
        if let Err(payload) = handled {
            let error = panic_error(payload);
            error!(error = %error, "exception handler panicked");
            DefaultExceptionHandler::new().handle(error, ctx).await;
        }
    }

    async fn finish(&self, ctx: Context, route: Option<&TransportRoute>) -> Dispatched {
        ctx.enter(Stage::Intercept);
        let mut body = ctx.take_body();
        let route_interceptors = route.map(|r| r.middleware.intercept.as_slice()).unwrap_or_default();

        for interceptor in self.global.intercept.iter().chain(route_interceptors) {
            let intercepted = AssertUnwindSafe(interceptor.handler.intercept(&ctx, body))
                .catch_unwind()
                .await
                .unwrap_or_else(|payload| Err(panic_error(payload)));
            match intercepted {
                Ok(next) => body = next,
                Err(error) => {
                    debug!(interceptor = interceptor.label(), "interceptor failed");
                    self.fail(error, &ctx).await;
                    body = ctx.take_body();
                    break;
                }
            }
        }

        let (status, headers) = ctx.seal(body.clone());
        info!(
            status = status.as_u16(),
            elapsed_ms = ctx.elapsed().as_millis() as u64,
            "request completed"
        );

        let mut chain = self.global.terminate.clone();
        if let Some(route) = route {
            chain.extend(route.middleware.terminate.iter().cloned());
        }

        Dispatched {
            sent: Sent { status, headers, body },
            terminate: PendingTerminate { ctx, chain, span: Span::current() },
        }
    }
}

fn request_span(ctx: &Context) -> Span {
    let request = ctx.request();
    info_span!(
        "request",
        method = %request.method(),
        path = request.path(),
        route = ctx.route().url.as_str(),
    )
}

fn panic_error(payload: Box<dyn Any + Send>) -> HttpError {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "handler panicked".to_owned());
    HttpError::msg(message)
}

// ── Dispatch results ──────────────────────────────────────────────────────────

/// What goes on the wire.
#[derive(Debug, Clone)]
pub struct Sent {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Body,
}

impl Sent {
    pub fn into_http(self) -> http::Response<http_body_util::Full<bytes::Bytes>> {
        encode(self.status, self.headers, &self.body)
    }
}

/// A response ready to send and the terminate phase still to run.
pub struct Dispatched {
    sent: Sent,
    terminate: PendingTerminate,
}

impl Dispatched {
    pub fn sent(&self) -> &Sent { &self.sent }

    /// Splits the response from the terminate phase so a transport can run
    /// the latter once the response has been flushed.
    pub fn into_parts(self) -> (Sent, PendingTerminate) {
        (self.sent, self.terminate)
    }

    /// Runs the terminate phase immediately and returns the response.
    /// For in-process callers that have no transport to flush.
    pub async fn complete(self) -> Sent {
        self.terminate.run().await;
        self.sent
    }
}

/// The terminate chain of one request, not yet run.
pub struct PendingTerminate {
    ctx: Context,
    chain: Vec<Bound<dyn Terminator>>,
    span: Span,
}

impl PendingTerminate {
    pub fn context(&self) -> &Context { &self.ctx }

    /// Runs every terminator in order. A failing or panicking terminator is
    /// logged and the next one still runs.
    pub async fn run(self) {
        let Self { ctx, chain, span } = self;
        async move {
            ctx.enter(Stage::Terminate);
            for terminator in &chain {
                let result = AssertUnwindSafe(terminator.handler.terminate(&ctx))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|payload| Err(panic_error(payload)));
                if let Err(e) = result {
                    error!(terminator = terminator.label(), error = %e, "terminator failed");
                }
            }
            ctx.enter(Stage::Done);
        }
        .instrument(span)
        .await
    }
}

// ── App ───────────────────────────────────────────────────────────────────────

/// A kernel and a route table: everything needed to answer a request.
#[derive(Clone)]
pub struct App {
    kernel: Arc<Kernel>,
    table: Arc<RouteTable>,
}

impl App {
    pub fn new(kernel: Kernel, table: RouteTable) -> Self {
        Self { kernel: Arc::new(kernel), table: Arc::new(table) }
    }

    pub fn kernel(&self) -> &Kernel { &self.kernel }

    pub fn routes(&self) -> &RouteTable { &self.table }

    /// Matches `request` and runs it through the pipeline. Unknown paths are
    /// rejected with `404 E_ROUTE_NOT_FOUND`; known paths under another
    /// method with `405 E_METHOD_NOT_ALLOWED` and an `allow` header.
    pub async fn handle(&self, mut request: Request) -> Dispatched {
        let method = request.method();
        match self.table.lookup(method, request.path()) {
            Lookup::Found { route, params } => {
                request.params = params;
                let ctx = Context::new(request, route.info());
                self.kernel.dispatch(&route, ctx).await
            }
            Lookup::MethodNotAllowed(allowed) => {
                let ctx = Context::new(request, RouteInfo::default());
                let allow = allowed.iter().map(|m| m.as_str()).collect::<Vec<_>>().join(", ");
                if let Ok(value) = HeaderValue::from_str(&allow) {
                    ctx.set_header(ALLOW, value);
                }
                let error = HttpError::new(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
                    .with_code("E_METHOD_NOT_ALLOWED");
                self.kernel.reject(error, ctx).await
            }
            Lookup::NotFound => {
                let message = format!("Cannot {method}:{}", request.path());
                let ctx = Context::new(request, RouteInfo::default());
                self.kernel.reject(HttpError::not_found(message), ctx).await
            }
        }
    }
}
