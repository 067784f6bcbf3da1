//! Controllers: named tables of handler methods.
//!
//! A controller groups the handlers of one resource under action names so
//! routes can point at them by string (`"UserController.show"`) and
//! [`Router::resource`](crate::Router::resource) can bind the five CRUD
//! actions in one call.
//!
//! ```rust
//! use trellis::{Context, Controller};
//!
//! async fn index(_ctx: Context) -> &'static str { "[]" }
//! async fn show(ctx: Context) -> String { format!("user {}", ctx.param("id").unwrap_or("?")) }
//!
//! let users = Controller::new("UserController")
//!     .action("index", index)
//!     .action("show", show);
//! assert!(users.has_action("show"));
//! ```

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::context::Context;
use crate::handler::{BoxedHandler, boxed};
use crate::response::Responder;

/// Container namespace controllers are registered under.
pub const CONTROLLER_NAMESPACE: &str = "App/Controllers";

/// A named table of handler methods.
pub struct Controller {
    name: String,
    actions: HashMap<String, BoxedHandler>,
}

impl Controller {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), actions: HashMap::new() }
    }

    /// Adds (or replaces) the handler for `action`.
    pub fn action<F, Fut, R>(mut self, action: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: Responder + Send + 'static,
    {
        self.actions.insert(action.into(), boxed(handler));
        self
    }

    pub fn name(&self) -> &str { &self.name }

    pub fn has_action(&self, action: &str) -> bool { self.actions.contains_key(action) }

    pub fn get(&self, action: &str) -> Option<BoxedHandler> {
        self.actions.get(action).map(Arc::clone)
    }

    /// Action names, sorted.
    pub fn actions(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.actions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("name", &self.name)
            .field("actions", &self.actions())
            .finish()
    }
}

/// Where a controller comes from: the container, or a value in hand.
#[derive(Clone, Debug)]
pub enum ControllerRef {
    Named(String),
    Instance(Arc<Controller>),
}

impl ControllerRef {
    pub fn display_name(&self) -> &str {
        match self {
            Self::Named(name) => name,
            Self::Instance(controller) => controller.name(),
        }
    }
}

impl From<&str> for ControllerRef {
    fn from(name: &str) -> Self { Self::Named(name.to_owned()) }
}

impl From<String> for ControllerRef {
    fn from(name: String) -> Self { Self::Named(name) }
}

impl From<Controller> for ControllerRef {
    fn from(controller: Controller) -> Self { Self::Instance(Arc::new(controller)) }
}

impl From<Arc<Controller>> for ControllerRef {
    fn from(controller: Arc<Controller>) -> Self { Self::Instance(controller) }
}

/// A route handler that names a controller method.
///
/// ```rust
/// use trellis::Action;
///
/// let action = Action::parse("Admin/UserController.show");
/// assert_eq!(action.method(), "show");
/// assert_eq!(action.to_string(), "Admin/UserController.show");
/// ```
#[derive(Clone, Debug)]
pub struct Action {
    controller: ControllerRef,
    method: String,
}

impl Action {
    /// Parses `"Controller.method"`. A reference without a dot names the
    /// controller's `handle` action.
    pub fn parse(reference: &str) -> Self {
        let (controller, method) = reference.rsplit_once('.').unwrap_or((reference, "handle"));
        Self { controller: ControllerRef::Named(controller.to_owned()), method: method.to_owned() }
    }

    pub fn bind(controller: impl Into<ControllerRef>, method: impl Into<String>) -> Self {
        Self { controller: controller.into(), method: method.into() }
    }

    pub fn controller(&self) -> &ControllerRef { &self.controller }
    pub fn method(&self) -> &str { &self.method }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.controller.display_name(), self.method)
    }
}

/// The container alias for a controller name under an optional namespace.
/// Names that already contain a `/` are taken as fully qualified.
pub(crate) fn controller_alias(name: &str, namespace: Option<&str>) -> String {
    if name.contains('/') && namespace.is_none() {
        return name.to_owned();
    }
    match namespace {
        Some(ns) => format!("{CONTROLLER_NAMESPACE}/{}/{name}", ns.trim_matches('/')),
        None => format!("{CONTROLLER_NAMESPACE}/{name}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_splits_on_last_dot() {
        let action = Action::parse("UserController.show");
        assert_eq!(action.controller().display_name(), "UserController");
        assert_eq!(action.method(), "show");
        assert_eq!(Action::parse("Health").method(), "handle");
    }

    #[test]
    fn aliases_follow_namespace() {
        assert_eq!(controller_alias("Users", None), "App/Controllers/Users");
        assert_eq!(controller_alias("Users", Some("/Admin/")), "App/Controllers/Admin/Users");
        assert_eq!(controller_alias("Custom/Users", None), "Custom/Users");
    }
}
