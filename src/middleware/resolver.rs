//! Turns middleware references into bound handlers.
//!
//! A reference is either a short name looked up in the container under the
//! phase's namespace, or a handler value. Resolution happens once, when the
//! reference is attached, so the dispatch path never inspects references.

use std::any::type_name;
use std::sync::Arc;

use super::{Bound, Interceptor, Middleware, MiddlewareRecord, Terminator};
use crate::container::Container;
use crate::error::Error;

/// One of the three pipeline phases, as a type.
///
/// Sealed; the implementors are [`Handle`], [`Intercept`] and [`Terminate`].
pub trait Phase: sealed::Sealed + Send + Sync + 'static {
    /// The handler trait object of this phase.
    type Handler: ?Sized + Send + Sync + 'static;

    /// Phase name used in errors and logs.
    const NAME: &'static str;

    /// Container namespace for short names.
    const NAMESPACE: &'static str;

    #[doc(hidden)]
    fn chain(record: &mut MiddlewareRecord) -> &mut Vec<Bound<Self::Handler>>;

    /// The fully qualified container alias for `name`. Names containing a
    /// `/` are already qualified.
    fn alias(name: &str) -> String {
        if name.contains('/') {
            name.to_owned()
        } else {
            format!("{}/{name}", Self::NAMESPACE)
        }
    }
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::Handle {}
    impl Sealed for super::Intercept {}
    impl Sealed for super::Terminate {}
}

/// The handle (pre-handler) phase.
#[derive(Debug)]
pub enum Handle {}

/// The intercept (post-handler, pre-send) phase.
#[derive(Debug)]
pub enum Intercept {}

/// The terminate (post-send) phase.
#[derive(Debug)]
pub enum Terminate {}

impl Phase for Handle {
    type Handler = dyn Middleware;
    const NAME: &'static str = "handle";
    const NAMESPACE: &'static str = "App/Middleware";

    fn chain(record: &mut MiddlewareRecord) -> &mut Vec<Bound<dyn Middleware>> {
        &mut record.handle
    }
}

impl Phase for Intercept {
    type Handler = dyn Interceptor;
    const NAME: &'static str = "intercept";
    const NAMESPACE: &'static str = "App/Interceptors";

    fn chain(record: &mut MiddlewareRecord) -> &mut Vec<Bound<dyn Interceptor>> {
        &mut record.intercept
    }
}

impl Phase for Terminate {
    type Handler = dyn Terminator;
    const NAME: &'static str = "terminate";
    const NAMESPACE: &'static str = "App/Terminators";

    fn chain(record: &mut MiddlewareRecord) -> &mut Vec<Bound<dyn Terminator>> {
        &mut record.terminate
    }
}

/// A reference to a phase handler: a container name, or a handler value.
///
/// Converts from `&str`/`String` (named), from any type implementing the
/// phase trait, and from an already shared `Arc<dyn …>`.
pub enum MiddlewareRef<P: Phase> {
    Named(String),
    Instance(Bound<P::Handler>),
}

impl<P: Phase> From<&str> for MiddlewareRef<P> {
    fn from(name: &str) -> Self { Self::Named(name.to_owned()) }
}

impl<P: Phase> From<String> for MiddlewareRef<P> {
    fn from(name: String) -> Self { Self::Named(name) }
}

impl<M: Middleware> From<M> for MiddlewareRef<Handle> {
    fn from(m: M) -> Self {
        Self::Instance(Bound::new(type_name::<M>(), Arc::new(m) as Arc<dyn Middleware>))
    }
}

impl<I: Interceptor> From<I> for MiddlewareRef<Intercept> {
    fn from(i: I) -> Self {
        Self::Instance(Bound::new(type_name::<I>(), Arc::new(i) as Arc<dyn Interceptor>))
    }
}

impl<T: Terminator> From<T> for MiddlewareRef<Terminate> {
    fn from(t: T) -> Self {
        Self::Instance(Bound::new(type_name::<T>(), Arc::new(t) as Arc<dyn Terminator>))
    }
}

impl From<Arc<dyn Middleware>> for MiddlewareRef<Handle> {
    fn from(m: Arc<dyn Middleware>) -> Self { Self::Instance(Bound::new("dyn Middleware", m)) }
}

impl From<Arc<dyn Interceptor>> for MiddlewareRef<Intercept> {
    fn from(i: Arc<dyn Interceptor>) -> Self { Self::Instance(Bound::new("dyn Interceptor", i)) }
}

impl From<Arc<dyn Terminator>> for MiddlewareRef<Terminate> {
    fn from(t: Arc<dyn Terminator>) -> Self { Self::Instance(Bound::new("dyn Terminator", t)) }
}

/// Resolves `reference` for phase `P`.
///
/// Named handlers are stored in the container as `Arc<P::Handler>`
/// (e.g. `Arc<dyn Middleware>`); the registry helpers bind them that way.
pub(crate) fn resolve<P: Phase>(
    container: &Container,
    reference: MiddlewareRef<P>,
) -> Result<Bound<P::Handler>, Error> {
    match reference {
        MiddlewareRef::Instance(bound) => Ok(bound),
        MiddlewareRef::Named(name) => {
            let alias = P::alias(&name);
            match container.resolve::<Arc<P::Handler>>(&alias)? {
                Some(handler) => Ok(Bound::new(alias, Arc::clone(handler.as_ref()))),
                None => Err(Error::MiddlewareNotFound { phase: P::NAME, name, alias }),
            }
        }
    }
}
