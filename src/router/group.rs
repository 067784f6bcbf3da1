//! Bulk operations over groups.
//!
//! A group holds no routes of its own, only references to routes, resources
//! and nested groups. Every operation fans out to the routes underneath,
//! however deep, and reaches each exactly once.

use super::{Node, RouteId, Router};
use crate::error::Error;
use crate::middleware::{Handle, Intercept, MiddlewareRef, Phase, Terminate};

/// Chained configuration of a group returned by [`Router::group`].
pub struct GroupBuilder<'r> {
    router: &'r mut Router,
    id: usize,
}

impl<'r> GroupBuilder<'r> {
    pub(crate) fn new(router: &'r mut Router, id: usize) -> Self {
        Self { router, id }
    }

    fn leaves(&self) -> Vec<usize> {
        self.router.leaves(Node::Group(self.id))
    }

    /// Every route in the group, in declaration order.
    pub fn routes(&self) -> Vec<RouteId> {
        self.leaves().into_iter().map(RouteId).collect()
    }

    pub fn prefix(mut self, prefix: &str) -> Self {
        for id in self.leaves() {
            self.router.routes[id].prefix(prefix);
        }
        self
    }

    /// Prefixes every route name with `name.`.
    ///
    /// Fails without renaming anything when some live route has no name: a
    /// group name cannot be given to anonymous routes. Removed routes are
    /// ignored.
    pub fn as_name(mut self, name: &str) -> Result<Self, Error> {
        let leaves = self.leaves();
        let unnamed = leaves.iter().find(|&&id| {
            let route = &self.router.routes[id];
            !route.deleted && route.name.is_none()
        });
        if let Some(&unnamed) = unnamed {
            return Err(Error::GroupName {
                group: name.to_owned(),
                url: self.router.routes[unnamed].resolved_url(),
            });
        }
        for id in leaves {
            self.router.routes[id].prefix_name(name);
        }
        Ok(self)
    }

    /// Controller namespace for routes that do not set their own.
    pub fn namespace(mut self, namespace: &str) -> Self {
        for id in self.leaves() {
            self.router.routes[id].namespace(namespace);
        }
        self
    }

    /// Attaches a handler to phase `P` on every route in the group.
    pub fn attach<P: Phase>(mut self, reference: impl Into<MiddlewareRef<P>>, prepend: bool) -> Result<Self, Error> {
        let leaves = self.leaves();
        self.router.attach_all(&leaves, reference.into(), prepend)?;
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

    pub fn terminate(self, reference: impl Into<MiddlewareRef<Terminate>>) -> Result<Self, Error> {
        self.attach::<Terminate>(reference, false)
    }
}
