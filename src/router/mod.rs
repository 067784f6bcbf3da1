//! Route table.
//!
//! Declaring routes and serving them are two separate steps. During boot a
//! [`Router`] collects routes, groups and resources and lets builders mutate
//! them (prefixes, names, middleware). [`Router::build`] then resolves
//! controller actions, applies prefixes, and mounts everything into an
//! immutable [`RouteTable`]: one radix tree per method, O(path-length)
//! lookup, shared across requests without locks.
//!
//! ```rust
//! use std::sync::Arc;
//! use trellis::{Container, Context, Router};
//!
//! async fn index(_ctx: Context) -> &'static str { "[]" }
//! async fn show(ctx: Context) -> String { ctx.param("id").unwrap_or("").to_owned() }
//!
//! let mut router = Router::new(Arc::new(Container::new()));
//! router
//!     .group(|r| {
//!         r.get("/users", index).as_name("users.index");
//!         r.get("/users/:id", show).as_name("users.show");
//!         Ok(())
//!     })?
//!     .prefix("/api")
//!     .as_name("api")?;
//!
//! let table = router.build()?;
//! assert_eq!(table.url_for("api.users.show", &[("id", "7")])?, "/api/users/7");
//! # Ok::<(), trellis::Error>(())
//! ```

mod group;
mod resource;
mod route;
mod table;

use std::sync::Arc;

use serde_json::Value;

use crate::container::Container;
use crate::controller::{Controller, ControllerRef, controller_alias};
use crate::error::Error;
use crate::handler::{BoxedHandler, Handler, RouteHandler};
use crate::method::Method;
use crate::middleware::{Handle, Intercept, MiddlewareRef, Phase, Terminate, resolve};

pub use group::GroupBuilder;
pub use resource::{ResourceAction, ResourceBuilder};
pub use route::{MiddlewareJson, Route, RouteId, RouteJson, normalize};
pub use table::{RouteTable, TransportRoute};

pub(crate) use resource::Resource;
pub(crate) use table::Lookup;

/// A node of the declaration tree: what a group can contain.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Node {
    Route(usize),
    Resource(usize),
    Group(usize),
}

/// Collects route declarations during boot.
pub struct Router {
    container: Arc<Container>,
    pub(crate) routes: Vec<Route>,
    pub(crate) resources: Vec<Resource>,
    pub(crate) groups: Vec<Vec<Node>>,
    /// Open `group(...)` scopes, innermost last.
    scopes: Vec<Vec<Node>>,
}

impl Router {
    pub fn new(container: Arc<Container>) -> Self {
        Self {
            container,
            routes: Vec::new(),
            resources: Vec::new(),
            groups: Vec::new(),
            scopes: Vec::new(),
        }
    }

    pub fn container(&self) -> &Arc<Container> { &self.container }

    // ── Declaration ──────────────────────────────────────────────────────────

    /// Registers `handler` for every method in `methods` at `url`.
    ///
    /// Registering the same method and URL twice is not checked here;
    /// [`build`](Self::build) rejects it when mounting.
    pub fn route(&mut self, methods: &[Method], url: &str, handler: impl Handler) -> RouteBuilder<'_> {
        let id = self.push_route(Route::new(methods, url, handler.into_route_handler()));
        self.capture(Node::Route(id));
        RouteBuilder { router: self, id }
    }

    /// `GET` and `HEAD`.
    pub fn get(&mut self, url: &str, handler: impl Handler) -> RouteBuilder<'_> {
        self.route(&[Method::Get, Method::Head], url, handler)
    }

    pub fn post(&mut self, url: &str, handler: impl Handler) -> RouteBuilder<'_> {
        self.route(&[Method::Post], url, handler)
    }

    pub fn put(&mut self, url: &str, handler: impl Handler) -> RouteBuilder<'_> {
        self.route(&[Method::Put], url, handler)
    }

    pub fn patch(&mut self, url: &str, handler: impl Handler) -> RouteBuilder<'_> {
        self.route(&[Method::Patch], url, handler)
    }

    pub fn delete(&mut self, url: &str, handler: impl Handler) -> RouteBuilder<'_> {
        self.route(&[Method::Delete], url, handler)
    }

    pub fn options(&mut self, url: &str, handler: impl Handler) -> RouteBuilder<'_> {
        self.route(&[Method::Options], url, handler)
    }

    /// Every routable method.
    pub fn any(&mut self, url: &str, handler: impl Handler) -> RouteBuilder<'_> {
        self.route(&Method::ALL, url, handler)
    }

    /// Runs `declare` in a scope that captures every route, resource and
    /// group it declares into a new group.
    pub fn group<F>(&mut self, declare: F) -> Result<GroupBuilder<'_>, Error>
    where
        F: FnOnce(&mut Router) -> Result<(), Error>,
    {
        self.scopes.push(Vec::new());
        let declared = declare(self);
        let children = self.scopes.pop().unwrap_or_default();
        declared?;

        let id = self.groups.len();
        self.groups.push(children);
        self.capture(Node::Group(id));
        Ok(GroupBuilder::new(self, id))
    }

    /// Declares the five CRUD routes of a resource bound to `controller`.
    /// See [`ResourceAction`] for the routes.
    pub fn resource(&mut self, base: &str, controller: impl Into<ControllerRef>) -> ResourceBuilder<'_> {
        let id = Resource::declare(self, base, controller.into());
        self.capture(Node::Resource(id));
        ResourceBuilder::new(self, id)
    }

    pub(crate) fn push_route(&mut self, route: Route) -> usize {
        self.routes.push(route);
        self.routes.len() - 1
    }

    fn capture(&mut self, node: Node) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.push(node);
        }
    }

    /// Every route under `root`, in declaration order, each exactly once.
    /// Iterative so deeply nested groups cannot exhaust the stack.
    pub(crate) fn leaves(&self, root: Node) -> Vec<usize> {
        let mut leaves = Vec::new();
        let mut pending = vec![root];
        while let Some(node) = pending.pop() {
            match node {
                Node::Route(id) => leaves.push(id),
                Node::Resource(id) => {
                    pending.extend(self.resources[id].route_ids().rev().map(Node::Route));
                }
                Node::Group(id) => pending.extend(self.groups[id].iter().rev().copied()),
            }
        }
        leaves
    }

    // ── Introspection and finalisation ───────────────────────────────────────

    /// All live routes in declaration order, with prefixes applied.
    pub fn list(&self) -> Vec<RouteJson> {
        self.routes.iter().filter(|r| !r.deleted).map(Route::to_json).collect()
    }

    pub fn get_route(&self, id: RouteId) -> Option<&Route> {
        self.routes.get(id.0)
    }

    /// One finalised row per live route, with handlers resolved.
    pub fn transport_routes(&self) -> Result<Vec<TransportRoute>, Error> {
        self.routes
            .iter()
            .filter(|route| !route.deleted)
            .map(|route| {
                let (handler, label) = self.resolve_handler(route)?;
                Ok(TransportRoute {
                    methods: route.methods.clone(),
                    url: route.resolved_url(),
                    name: route.name.clone(),
                    handler_label: label,
                    handler,
                    middleware: route.middleware.clone(),
                    options: route.options.clone(),
                })
            })
            .collect()
    }

    /// Resolves and mounts every live route.
    pub fn build(&self) -> Result<RouteTable, Error> {
        let table = RouteTable::mount(self.transport_routes()?)?;
        tracing::debug!(routes = table.len(), "route table built");
        Ok(table)
    }

    fn resolve_handler(&self, route: &Route) -> Result<(BoxedHandler, String), Error> {
        let action = match &route.handler {
            RouteHandler::Resolved { handler, label } => {
                return Ok((Arc::clone(handler), label.clone()));
            }
            RouteHandler::Action(action) => action,
        };

        let controller = match action.controller() {
            ControllerRef::Instance(controller) => Arc::clone(controller),
            ControllerRef::Named(name) => {
                let alias = controller_alias(name, route.namespace.as_deref());
                self.container
                    .resolve::<Controller>(&alias)?
                    .ok_or_else(|| Error::ControllerNotFound { name: name.clone(), alias })?
            }
        };

        let handler = controller.get(action.method()).ok_or_else(|| Error::ActionNotFound {
            controller: controller.name().to_owned(),
            action: action.method().to_owned(),
        })?;
        Ok((handler, action.to_string()))
    }

    /// Resolves a middleware reference and attaches it to each route in `ids`.
    /// Resolution happens once; every route shares the handler.
    pub(crate) fn attach_all<P: Phase>(
        &mut self,
        ids: &[usize],
        reference: MiddlewareRef<P>,
        prepend: bool,
    ) -> Result<(), Error> {
        let bound = resolve(&self.container, reference)?;
        for &id in ids {
            self.routes[id].middleware.attach::<P>(bound.clone(), prepend);
        }
        Ok(())
    }
}

// ── RouteBuilder ──────────────────────────────────────────────────────────────

/// Chained configuration of one freshly declared route.
pub struct RouteBuilder<'r> {
    router: &'r mut Router,
    id: usize,
}

impl RouteBuilder<'_> {
    pub fn id(&self) -> RouteId { RouteId(self.id) }

    fn route(&mut self) -> &mut Route { &mut self.router.routes[self.id] }

    /// Names the route (replacing any earlier name).
    pub fn as_name(mut self, name: &str) -> Self {
        self.route().name = Some(name.to_owned());
        self
    }

    pub fn prefix(mut self, prefix: &str) -> Self {
        self.route().prefix(prefix);
        self
    }

    /// Controller namespace used when this route's [`Action`](crate::Action)
    /// is resolved.
    pub fn namespace(mut self, namespace: &str) -> Self {
        self.route().namespace(namespace);
        self
    }

    /// Stores an opaque option for the transport.
    pub fn option(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.route().options.insert(key.to_owned(), value.into());
        self
    }

    /// Excludes the route from listing and mounting.
    pub fn remove(mut self) {
        self.route().deleted = true;
    }

    /// Attaches a handler to phase `P`, at the front when `prepend`.
    pub fn attach<P: Phase>(mut self, reference: impl Into<MiddlewareRef<P>>, prepend: bool) -> Result<Self, Error> {
        self.router.attach_all(&[self.id], reference.into(), prepend)?;
        Ok(self)
    }

    pub fn middleware(self, reference: impl Into<MiddlewareRef<Handle>>) -> Result<Self, Error> {
        self.attach::<Handle>(reference, false)
    }

    pub fn prepend_middleware(self, reference: impl Into<MiddlewareRef<Handle>>) -> Result<Self, Error> {
        self.attach::<Handle>(reference, true)
    }

    pub fn intercept(self, reference: impl Into<MiddlewareRef<Intercept>>) -> Result<Self, Error> {
        self.attach::<Intercept>(reference, false)
    }

    pub fn prepend_intercept(self, reference: impl Into<MiddlewareRef<Intercept>>) -> Result<Self, Error> {
        self.attach::<Intercept>(reference, true)
    }

    pub fn terminate(self, reference: impl Into<MiddlewareRef<Terminate>>) -> Result<Self, Error> {
        self.attach::<Terminate>(reference, false)
    }

    pub fn prepend_terminate(self, reference: impl Into<MiddlewareRef<Terminate>>) -> Result<Self, Error> {
        self.attach::<Terminate>(reference, true)
    }
}
