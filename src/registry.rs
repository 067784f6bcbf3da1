//! Explicit registration of middleware, interceptors, terminators and
//! controllers.
//!
//! Each `register_*` call binds a constructor in the container under the
//! kind's namespace, so routes can refer to it by short name. A registration
//! marked [`global`](Registration::global) is also attached to the kernel's
//! chain for its phase, running for every route.
//!
//! Registering an alias the container already knows is a no-op returning
//! `Ok(false)`; in particular a global handler is never attached twice.
//!
//! ```rust
//! use std::sync::Arc;
//! use trellis::{Container, Context, Kernel, Registration, middleware};
//!
//! let mut kernel = Kernel::new(Arc::new(Container::new()));
//! let registered = kernel.register_middleware(Registration::new("stamp").global(), |_| {
//!     middleware::from_fn(|ctx: Context| async move { ctx.set_data("stamped", true) })
//! })?;
//! assert!(registered);
//! assert_eq!(kernel.global().handle_labels(), ["App/Middleware/stamp"]);
//! # Ok::<(), trellis::Error>(())
//! ```

use std::sync::Arc;

use tracing::debug;

use crate::container::Container;
use crate::controller::{Controller, controller_alias};
use crate::error::Error;
use crate::middleware::{
    Handle, Intercept, Interceptor, Middleware, MiddlewareRef, Phase, Terminate, Terminator,
};
use crate::pipeline::Kernel;

/// How often a registration's constructor runs.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Lifetime {
    /// Once, on first resolution.
    #[default]
    Singleton,
    /// On every resolution.
    Transient,
}

/// Static metadata for one registration.
#[derive(Clone, Debug)]
pub struct Registration {
    name: String,
    alias: Option<String>,
    global: bool,
    lifetime: Lifetime,
}

impl Registration {
    /// A registration under `<namespace>/<name>`.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), alias: None, global: false, lifetime: Lifetime::Singleton }
    }

    /// Overrides the fully qualified container alias.
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Also attach to the kernel's global chain. Ignored for controllers.
    pub fn global(mut self) -> Self {
        self.global = true;
        self
    }

    pub fn transient(mut self) -> Self {
        self.lifetime = Lifetime::Transient;
        self
    }

    pub fn name(&self) -> &str { &self.name }
    pub fn is_global(&self) -> bool { self.global }
    pub fn lifetime(&self) -> Lifetime { self.lifetime }
}

impl Kernel {
    pub fn register_middleware<M, F>(&mut self, registration: Registration, ctor: F) -> Result<bool, Error>
    where
        M: Middleware,
        F: Fn(&Container) -> M + Send + Sync + 'static,
    {
        self.register_phase::<Handle, _>(registration, move |c| Arc::new(ctor(c)) as Arc<dyn Middleware>)
    }

    pub fn register_interceptor<I, F>(&mut self, registration: Registration, ctor: F) -> Result<bool, Error>
    where
        I: Interceptor,
        F: Fn(&Container) -> I + Send + Sync + 'static,
    {
        self.register_phase::<Intercept, _>(registration, move |c| Arc::new(ctor(c)) as Arc<dyn Interceptor>)
    }

    pub fn register_terminator<T, F>(&mut self, registration: Registration, ctor: F) -> Result<bool, Error>
    where
        T: Terminator,
        F: Fn(&Container) -> T + Send + Sync + 'static,
    {
        self.register_phase::<Terminate, _>(registration, move |c| Arc::new(ctor(c)) as Arc<dyn Terminator>)
    }

    /// Binds a controller under `App/Controllers/<name>` for
    /// [`Action`](crate::Action) routes and resources.
    pub fn register_controller<F>(&mut self, registration: Registration, ctor: F) -> Result<bool, Error>
    where
        F: Fn(&Container) -> Controller + Send + Sync + 'static,
    {
        let alias = registration
            .alias
            .clone()
            .unwrap_or_else(|| controller_alias(&registration.name, None));
        if self.container.has_registration(&alias) {
            debug!(alias = %alias, "controller already registered");
            return Ok(false);
        }
        match registration.lifetime {
            Lifetime::Singleton => self.container.register_singleton(alias, ctor),
            Lifetime::Transient => self.container.register_transient(alias, ctor),
        }
        Ok(true)
    }

    fn register_phase<P, F>(&mut self, registration: Registration, factory: F) -> Result<bool, Error>
    where
        P: Phase,
        F: Fn(&Container) -> Arc<P::Handler> + Send + Sync + 'static,
    {
        let alias = registration.alias.clone().unwrap_or_else(|| P::alias(&registration.name));
        if self.container.has_registration(&alias) {
            debug!(phase = P::NAME, alias = %alias, "already registered");
            return Ok(false);
        }
        match registration.lifetime {
            Lifetime::Singleton => self.container.register_singleton(alias.clone(), factory),
            Lifetime::Transient => self.container.register_transient(alias.clone(), factory),
        }
        if registration.global {
            self.attach::<P>(MiddlewareRef::Named(alias), false)?;
        }
        Ok(true)
    }
}
