//! The route entity and URL normalisation.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::handler::RouteHandler;
use crate::method::Method;
use crate::middleware::MiddlewareRecord;

/// Handle to a declared route inside its [`Router`](super::Router).
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct RouteId(pub(crate) usize);

/// One method-set + URL + handler registration.
///
/// Routes are owned by the router; groups and resources refer to them by id.
/// The URL is stored normalised; prefixes are kept separately, in the order
/// they were applied, and joined only when the route is listed or mounted.
pub struct Route {
    pub(crate) methods: Vec<Method>,
    pub(crate) url: String,
    pub(crate) name: Option<String>,
    pub(crate) handler: RouteHandler,
    pub(crate) middleware: MiddlewareRecord,
    pub(crate) prefixes: Vec<String>,
    pub(crate) namespace: Option<String>,
    pub(crate) deleted: bool,
    pub(crate) options: Map<String, Value>,
}

impl Route {
    pub(crate) fn new(methods: &[Method], url: &str, handler: RouteHandler) -> Self {
        let mut unique = Vec::with_capacity(methods.len());
        for method in methods {
            if !unique.contains(method) {
                unique.push(*method);
            }
        }
        Self {
            methods: unique,
            url: normalize(url),
            name: None,
            handler,
            middleware: MiddlewareRecord::default(),
            prefixes: Vec::new(),
            namespace: None,
            deleted: false,
            options: Map::new(),
        }
    }

    pub fn methods(&self) -> &[Method] { &self.methods }
    pub fn name(&self) -> Option<&str> { self.name.as_deref() }
    pub fn is_deleted(&self) -> bool { self.deleted }
    pub fn middleware(&self) -> &MiddlewareRecord { &self.middleware }

    /// The URL with every prefix applied. Later prefixes end up outermost,
    /// so an enclosing group's prefix wraps an inner group's.
    pub fn resolved_url(&self) -> String {
        let mut full = String::new();
        for prefix in self.prefixes.iter().rev() {
            full.push('/');
            full.push_str(prefix);
        }
        full.push('/');
        full.push_str(&self.url);
        normalize(&full)
    }

    pub(crate) fn prefix(&mut self, prefix: &str) {
        self.prefixes.push(prefix.to_owned());
    }

    /// Prepends a group name (`api` + `users.index` → `api.users.index`).
    /// Callers check that the route is named first.
    pub(crate) fn prefix_name(&mut self, group: &str) {
        if let Some(name) = &self.name {
            self.name = Some(format!("{group}.{name}"));
        }
    }

    /// Sets the controller namespace unless an inner scope already did.
    pub(crate) fn namespace(&mut self, namespace: &str) {
        if self.namespace.is_none() {
            self.namespace = Some(namespace.to_owned());
        }
    }

    pub(crate) fn to_json(&self) -> RouteJson {
        RouteJson {
            methods: self.methods.clone(),
            url: self.resolved_url(),
            name: self.name.clone(),
            handler: self.handler.label(),
            middleware: MiddlewareJson::from(&self.middleware),
        }
    }
}

/// A route as shown by listings.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RouteJson {
    pub methods: Vec<Method>,
    pub url: String,
    pub name: Option<String>,
    pub handler: String,
    pub middleware: MiddlewareJson,
}

/// Labels of a route's three chains.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct MiddlewareJson {
    pub handle: Vec<String>,
    pub intercept: Vec<String>,
    pub terminate: Vec<String>,
}

impl From<&MiddlewareRecord> for MiddlewareJson {
    fn from(record: &MiddlewareRecord) -> Self {
        Self {
            handle: record.handle_labels(),
            intercept: record.intercept_labels(),
            terminate: record.terminate_labels(),
        }
    }
}

/// Normalises a route URL: one leading slash, no empty segments, no trailing
/// slash except for the root, and `:name` segments rewritten to `{name}`.
///
/// ```rust
/// assert_eq!(trellis::router::normalize("//a//b/"), "/a/b");
/// assert_eq!(trellis::router::normalize("users/:id"), "/users/{id}");
/// assert_eq!(trellis::router::normalize(""), "/");
/// ```
pub fn normalize(url: &str) -> String {
    let segments: Vec<String> = url
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| match segment.strip_prefix(':') {
            Some(name) if !name.is_empty() => format!("{{{name}}}"),
            _ => segment.to_owned(),
        })
        .collect();

    if segments.is_empty() {
        "/".to_owned()
    } else {
        format!("/{}", segments.join("/"))
    }
}
