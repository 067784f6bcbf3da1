//! Route handler trait and type erasure.
//!
//! The route table holds handlers of many concrete types in one `Vec`, so
//! each is erased behind `dyn ErasedHandler` and shared as an `Arc`:
//!
//! ```text
//! async fn show(ctx: Context) -> Json<User> { … }   ← user writes this
//!        ↓ router.get("/users/{id}", show)
//! show.into_route_handler()                       ← Handler blanket impl
//!        ↓
//! Arc::new(FnHandler(show))                       ← stored as BoxedHandler
//!        ↓
//! handler.call(ctx) at request time               ← one vtable dispatch
//! ```
//!
//! A route may instead name a controller action (`"UserController.show"`);
//! that reference is resolved against the container when the route table is
//! built.

use std::any::type_name;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::Context;
use crate::controller::Action;
use crate::exception::HttpError;
use crate::response::{Responder, Response};

// ── Internal types ────────────────────────────────────────────────────────────

/// A heap-allocated, type-erased future resolving to a handler's outcome.
pub(crate) type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// Internal dispatch interface.
///
/// `#[doc(hidden)] pub` because it appears in [`BoxedHandler`], which
/// controllers expose.
#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, ctx: Context) -> BoxFuture<Result<Response, HttpError>>;
}

/// A type-erased handler shared across concurrent requests.
#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

/// What a route declaration captured: a ready handler, or an action still to
/// be looked up.
///
/// `#[doc(hidden)] pub` because it is the return type of the sealed
/// [`Handler`] trait's conversion method.
#[doc(hidden)]
#[derive(Clone)]
pub enum RouteHandler {
    Resolved { handler: BoxedHandler, label: String },
    Action(Action),
}

impl RouteHandler {
    pub(crate) fn label(&self) -> String {
        match self {
            Self::Resolved { label, .. } => label.clone(),
            Self::Action(action) => action.to_string(),
        }
    }
}

// ── Public Handler trait ──────────────────────────────────────────────────────

/// Implemented for every valid route handler.
///
/// You never implement this yourself. It is satisfied by:
///
/// ```text
/// async fn name(ctx: Context) -> impl Responder
/// ```
///
/// and by [`Action`] references to controller methods. The trait is sealed.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_route_handler(self) -> RouteHandler;
}

mod private {
    pub trait Sealed {}
}

// ── Blanket implementations ───────────────────────────────────────────────────

impl<F, Fut, R> private::Sealed for F
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: Responder + Send + 'static,
{
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: Responder + Send + 'static,
{
    fn into_route_handler(self) -> RouteHandler {
        RouteHandler::Resolved { handler: boxed(self), label: type_name::<F>().to_owned() }
    }
}

impl private::Sealed for Action {}

impl Handler for Action {
    fn into_route_handler(self) -> RouteHandler {
        RouteHandler::Action(self)
    }
}

/// Erases a handler function.
pub(crate) fn boxed<F, Fut, R>(f: F) -> BoxedHandler
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: Responder + Send + 'static,
{
    Arc::new(FnHandler(f))
}

// ── Concrete wrapper ──────────────────────────────────────────────────────────

/// Bridges a concrete handler `F` to the trait-object world.
struct FnHandler<F>(F);

impl<F, Fut, R> ErasedHandler for FnHandler<F>
where
    F: Fn(Context) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: Responder + Send + 'static,
{
    fn call(&self, ctx: Context) -> BoxFuture<Result<Response, HttpError>> {
        let fut = (self.0)(ctx);
        Box::pin(async move { fut.await.respond() })
    }
}
