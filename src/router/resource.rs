//! Resourceful routes.
//!
//! `router.resource("/users", "UserController")` declares:
//!
//! | Action | Methods | URL | Name |
//! |---|---|---|---|
//! | index | GET, HEAD | `/users` | `users.index` |
//! | store | POST | `/users` | `users.store` |
//! | show | GET, HEAD | `/users/{id}` | `users.show` |
//! | update | PUT, PATCH | `/users/{id}` | `users.update` |
//! | delete | DELETE | `/users/{id}` | `users.delete` |
//!
//! Each route points at the controller method of the same name. Missing
//! methods are reported when the route table is built, so disabling an
//! action with [`only`](ResourceBuilder::only) or
//! [`except`](ResourceBuilder::except) removes the requirement.

use serde::Serialize;

use super::{Route, RouteId, Router};
use crate::controller::{Action, ControllerRef};
use crate::error::Error;
use crate::handler::Handler;
use crate::method::Method;
use crate::middleware::{Handle, Intercept, MiddlewareRef, Phase, Terminate};

/// One of the five conventional actions.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceAction {
    Index,
    Store,
    Show,
    Update,
    Delete,
}

impl ResourceAction {
    /// Declaration order.
    pub const ALL: [ResourceAction; 5] = [
        ResourceAction::Index,
        ResourceAction::Store,
        ResourceAction::Show,
        ResourceAction::Update,
        ResourceAction::Delete,
    ];

    /// The controller method and route-name suffix.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Index  => "index",
            Self::Store  => "store",
            Self::Show   => "show",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    fn methods(self) -> &'static [Method] {
        match self {
            Self::Index | Self::Show => &[Method::Get, Method::Head],
            Self::Store  => &[Method::Post],
            Self::Update => &[Method::Put, Method::Patch],
            Self::Delete => &[Method::Delete],
        }
    }

    /// Whether the action addresses one member (`/users/{id}`).
    fn is_member(self) -> bool {
        matches!(self, Self::Show | Self::Update | Self::Delete)
    }
}

/// A resource's base and the routes it declared.
pub(crate) struct Resource {
    base: String,
    routes: Vec<(ResourceAction, usize)>,
}

impl Resource {
    /// Declares the resource's routes (uncaptured; the caller captures the
    /// resource as a whole) and returns the resource id.
    pub(crate) fn declare(router: &mut Router, base: &str, controller: ControllerRef) -> usize {
        let base = super::normalize(base);
        let name = default_name(&base);
        let param = "id";

        let routes = ResourceAction::ALL
            .iter()
            .map(|&action| {
                let url = member_url(&base, param, action);
                let handler = Action::bind(controller.clone(), action.as_str()).into_route_handler();
                let mut route = Route::new(action.methods(), &url, handler);
                route.name = Some(action_name(&name, action));
                (action, router.push_route(route))
            })
            .collect();

        router.resources.push(Resource { base, routes });
        router.resources.len() - 1
    }

    pub(crate) fn route_ids(&self) -> impl DoubleEndedIterator<Item = usize> + '_ {
        self.routes.iter().map(|&(_, id)| id)
    }

    fn ids_for(&self, actions: &[ResourceAction]) -> Vec<usize> {
        self.routes
            .iter()
            .filter(|(action, _)| actions.contains(action))
            .map(|&(_, id)| id)
            .collect()
    }
}

/// `/users` → `users`, `/users/{user}/posts` → `users.posts`.
fn default_name(base: &str) -> String {
    base.split('/')
        .filter(|segment| !segment.is_empty() && !segment.starts_with('{'))
        .collect::<Vec<_>>()
        .join(".")
}

/// `users.show`, or a bare `show` for a resource mounted at `/`.
fn action_name(base_name: &str, action: ResourceAction) -> String {
    if base_name.is_empty() {
        action.as_str().to_owned()
    } else {
        format!("{base_name}.{}", action.as_str())
    }
}

fn member_url(base: &str, param: &str, action: ResourceAction) -> String {
    if action.is_member() {
        format!("{base}/{{{param}}}")
    } else {
        base.to_owned()
    }
}

/// Chained configuration of a resource returned by [`Router::resource`].
pub struct ResourceBuilder<'r> {
    router: &'r mut Router,
    id: usize,
}

impl<'r> ResourceBuilder<'r> {
    pub(crate) fn new(router: &'r mut Router, id: usize) -> Self {
        Self { router, id }
    }

    fn resource(&self) -> &Resource { &self.router.resources[self.id] }

    /// The route declared for `action`.
    pub fn route(&self, action: ResourceAction) -> RouteId {
        let id = self.resource().ids_for(&[action])[0];
        RouteId(id)
    }

    /// Removes every route not in `actions`. Routes already removed stay
    /// removed.
    pub fn only(mut self, actions: &[ResourceAction]) -> Self {
        let ids: Vec<_> = self.resource().routes.clone();
        for (action, id) in ids {
            if !actions.contains(&action) {
                self.router.routes[id].deleted = true;
            }
        }
        self
    }

    /// Removes the routes of `actions`.
    pub fn except(mut self, actions: &[ResourceAction]) -> Self {
        for id in self.resource().ids_for(actions) {
            self.router.routes[id].deleted = true;
        }
        self
    }

    /// Replaces the base of the route names (`users.show` → `{name}.show`).
    pub fn as_name(mut self, name: &str) -> Self {
        let routes = self.resource().routes.clone();
        for (action, id) in routes {
            self.router.routes[id].name = Some(action_name(name, action));
        }
        self
    }

    /// Renames the member parameter (`{id}` by default).
    pub fn param_name(mut self, param: &str) -> Self {
        let resource = self.resource();
        let (base, routes) = (resource.base.clone(), resource.routes.clone());
        for (action, id) in routes {
            self.router.routes[id].url = member_url(&base, param, action);
        }
        self
    }

    pub fn prefix(mut self, prefix: &str) -> Self {
        for id in self.resource().route_ids().collect::<Vec<_>>() {
            self.router.routes[id].prefix(prefix);
        }
        self
    }

    /// Attaches a handler to phase `P` on the routes of `actions`.
    pub fn attach_for<P: Phase>(
        mut self,
        actions: &[ResourceAction],
        reference: impl Into<MiddlewareRef<P>>,
        prepend: bool,
    ) -> Result<Self, Error> {
        let ids = self.resource().ids_for(actions);
        self.router.attach_all(&ids, reference.into(), prepend)?;
        Ok(self)
    }

    pub fn middleware(self, reference: impl Into<MiddlewareRef<Handle>>) -> Result<Self, Error> {
        self.attach_for::<Handle>(&ResourceAction::ALL, reference, false)
    }

    pub fn middleware_for(
        self,
        actions: &[ResourceAction],
        reference: impl Into<MiddlewareRef<Handle>>,
    ) -> Result<Self, Error> {
        self.attach_for::<Handle>(actions, reference, false)
    }

    pub fn intercept(self, reference: impl Into<MiddlewareRef<Intercept>>) -> Result<Self, Error> {
        self.attach_for::<Intercept>(&ResourceAction::ALL, reference, false)
    }

    pub fn terminate(self, reference: impl Into<MiddlewareRef<Terminate>>) -> Result<Self, Error> {
        self.attach_for::<Terminate>(&ResourceAction::ALL, reference, false)
    }
}
