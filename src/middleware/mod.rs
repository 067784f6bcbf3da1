//! The three middleware phases.
//!
//! | Phase | Trait | Runs | Can |
//! |---|---|---|---|
//! | handle | [`Middleware`] | before the handler | short-circuit with [`Context::send`] |
//! | intercept | [`Interceptor`] | after the handler, before send | rewrite the body |
//! | terminate | [`Terminator`] | after the response left | observe only |
//!
//! Each phase runs the kernel's global chain first, then the route's own
//! chain, in insertion order. Prepending puts a handler at the front of its
//! chain.
//!
//! Handlers are structs implementing a phase trait, or closures wrapped with
//! [`from_fn`]:
//!
//! ```rust
//! use trellis::{Body, Context, middleware};
//!
//! let stamp = middleware::from_fn(|ctx: Context| async move {
//!     ctx.set_data("seen", true);
//! });
//! let wrap = middleware::from_fn(|_ctx: Context, body: Body| async move {
//!     Body::Json(serde_json::json!({ "data": body.as_json().cloned() }))
//! });
//! # let _ = (stamp, wrap);
//! ```

mod resolver;

use std::any::type_name;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::context::Context;
use crate::exception::HttpError;
use crate::response::Body;

pub use resolver::{Handle, Intercept, MiddlewareRef, Phase, Terminate};
pub(crate) use resolver::resolve;

// ── Phase traits ──────────────────────────────────────────────────────────────

/// A handle-phase middleware.
#[async_trait]
pub trait Middleware: Send + Sync + 'static {
    async fn handle(&self, ctx: &Context) -> Result<(), HttpError>;
}

/// An intercept-phase handler. Receives the current body and returns the
/// body the next interceptor (or the client) sees.
///
/// Interceptors should be pure functions of `(ctx, body)`: the same chain
/// over the same body must give the same result.
#[async_trait]
pub trait Interceptor: Send + Sync + 'static {
    async fn intercept(&self, ctx: &Context, body: Body) -> Result<Body, HttpError>;
}

/// A terminate-phase handler. Failures are logged and otherwise ignored.
#[async_trait]
pub trait Terminator: Send + Sync + 'static {
    async fn terminate(&self, ctx: &Context) -> Result<(), HttpError>;
}

// ── Closure adapters ──────────────────────────────────────────────────────────

/// Wraps a closure as a phase handler.
///
/// `Fn(Context) -> impl Future` works as a [`Middleware`] or a
/// [`Terminator`]; `Fn(Context, Body) -> impl Future` works as an
/// [`Interceptor`]. The closure may return `()`/`Body` or a `Result` of them.
pub fn from_fn<F>(f: F) -> FromFn<F> {
    FromFn(f)
}

/// See [`from_fn`].
#[derive(Clone, Copy)]
pub struct FromFn<F>(F);

impl<F> fmt::Debug for FromFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FromFn").field(&type_name::<F>()).finish()
    }
}

/// What a phase closure may return.
pub trait Outcome<T> {
    fn into_outcome(self) -> Result<T, HttpError>;
}

impl Outcome<()> for () {
    fn into_outcome(self) -> Result<(), HttpError> { Ok(()) }
}

impl<E: Into<HttpError>> Outcome<()> for Result<(), E> {
    fn into_outcome(self) -> Result<(), HttpError> { self.map_err(Into::into) }
}

impl Outcome<Body> for Body {
    fn into_outcome(self) -> Result<Body, HttpError> { Ok(self) }
}

impl<E: Into<HttpError>> Outcome<Body> for Result<Body, E> {
    fn into_outcome(self) -> Result<Body, HttpError> { self.map_err(Into::into) }
}

#[async_trait]
impl<F, Fut, R> Middleware for FromFn<F>
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: Outcome<()> + Send + 'static,
{
    async fn handle(&self, ctx: &Context) -> Result<(), HttpError> {
        (self.0)(ctx.clone()).await.into_outcome()
    }
}

#[async_trait]
impl<F, Fut, R> Terminator for FromFn<F>
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: Outcome<()> + Send + 'static,
{
    async fn terminate(&self, ctx: &Context) -> Result<(), HttpError> {
        (self.0)(ctx.clone()).await.into_outcome()
    }
}

#[async_trait]
impl<F, Fut, R> Interceptor for FromFn<F>
where
    F: Fn(Context, Body) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: Outcome<Body> + Send + 'static,
{
    async fn intercept(&self, ctx: &Context, body: Body) -> Result<Body, HttpError> {
        (self.0)(ctx.clone(), body).await.into_outcome()
    }
}

// ── Bound handlers and the per-route record ───────────────────────────────────

/// A resolved handler together with the label listings show for it
/// (the container alias, or the Rust type name).
pub struct Bound<T: ?Sized> {
    pub(crate) label: Arc<str>,
    pub(crate) handler: Arc<T>,
}

impl<T: ?Sized> Bound<T> {
    pub(crate) fn new(label: impl Into<Arc<str>>, handler: Arc<T>) -> Self {
        Self { label: label.into(), handler }
    }

    pub fn label(&self) -> &str { &self.label }
}

impl<T: ?Sized> Clone for Bound<T> {
    fn clone(&self) -> Self {
        Self { label: Arc::clone(&self.label), handler: Arc::clone(&self.handler) }
    }
}

impl<T: ?Sized> fmt::Debug for Bound<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

/// The three ordered handler chains attached to a route (or to the kernel).
#[derive(Clone, Debug, Default)]
pub struct MiddlewareRecord {
    pub(crate) handle: Vec<Bound<dyn Middleware>>,
    pub(crate) intercept: Vec<Bound<dyn Interceptor>>,
    pub(crate) terminate: Vec<Bound<dyn Terminator>>,
}

impl MiddlewareRecord {
    pub(crate) fn attach<P: Phase>(&mut self, bound: Bound<P::Handler>, prepend: bool) {
        let chain = P::chain(self);
        if prepend {
            chain.insert(0, bound);
        } else {
            chain.push(bound);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.handle.is_empty() && self.intercept.is_empty() && self.terminate.is_empty()
    }

    pub fn handle_labels(&self) -> Vec<String> { labels(&self.handle) }
    pub fn intercept_labels(&self) -> Vec<String> { labels(&self.intercept) }
    pub fn terminate_labels(&self) -> Vec<String> { labels(&self.terminate) }
}

fn labels<T: ?Sized>(chain: &[Bound<T>]) -> Vec<String> {
    chain.iter().map(|b| b.label.to_string()).collect()
}
