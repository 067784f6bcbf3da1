//! The finalised, immutable route table.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use matchit::Router as MatchitRouter;
use serde_json::{Map, Value};

use super::{MiddlewareJson, RouteJson};
use crate::context::RouteInfo;
use crate::error::Error;
use crate::handler::BoxedHandler;
use crate::method::Method;
use crate::middleware::MiddlewareRecord;

/// One mounted route: resolved URL, handler and middleware, ready to dispatch.
pub struct TransportRoute {
    pub methods: Vec<Method>,
    pub url: String,
    pub name: Option<String>,
    pub handler_label: String,
    pub(crate) handler: BoxedHandler,
    pub middleware: MiddlewareRecord,
    pub options: Map<String, Value>,
}

impl TransportRoute {
    pub(crate) fn info(&self) -> RouteInfo {
        RouteInfo { url: self.url.clone(), name: self.name.clone() }
    }

    pub fn to_json(&self) -> RouteJson {
        RouteJson {
            methods: self.methods.clone(),
            url: self.url.clone(),
            name: self.name.clone(),
            handler: self.handler_label.clone(),
            middleware: MiddlewareJson::from(&self.middleware),
        }
    }
}

/// Result of matching a request against the table.
pub(crate) enum Lookup {
    Found {
        route: Arc<TransportRoute>,
        params: HashMap<String, String>,
    },
    /// The path exists under these other methods.
    MethodNotAllowed(Vec<Method>),
    NotFound,
}

/// One radix tree per method, over routes shared by `Arc`.
///
/// Built once by [`Router::build`](super::Router::build); read without locks
/// afterwards.
pub struct RouteTable {
    routes: Vec<Arc<TransportRoute>>,
    trees: HashMap<Method, MatchitRouter<usize>>,
    names: HashMap<String, usize>,
}

impl RouteTable {
    /// Mounts `routes`. The same method and URL twice is an error, as is a
    /// URL the radix tree cannot hold (e.g. two different parameter names at
    /// the same position).
    pub fn mount(routes: Vec<TransportRoute>) -> Result<Self, Error> {
        let mut table = Self {
            routes: Vec::with_capacity(routes.len()),
            trees: HashMap::new(),
            names: HashMap::new(),
        };
        let mut seen = HashSet::new();

        for route in routes {
            let index = table.routes.len();
            for &method in &route.methods {
                if !seen.insert((method, route.url.clone())) {
                    return Err(Error::DuplicateRoute { method, url: route.url.clone() });
                }
                table
                    .trees
                    .entry(method)
                    .or_default()
                    .insert(route.url.clone(), index)
                    .map_err(|e| Error::InvalidRoute { url: route.url.clone(), reason: e.to_string() })?;
            }
            if let Some(name) = &route.name {
                // First declaration keeps the name.
                table.names.entry(name.clone()).or_insert(index);
            }
            table.routes.push(Arc::new(route));
        }
        Ok(table)
    }

    pub(crate) fn lookup(&self, method: Method, path: &str) -> Lookup {
        if let Some(matched) = self.trees.get(&method).and_then(|tree| tree.at(path).ok()) {
            let params = matched
                .params
                .iter()
                .map(|(k, v)| (k.to_owned(), v.to_owned()))
                .collect();
            return Lookup::Found { route: Arc::clone(&self.routes[*matched.value]), params };
        }

        let mut allowed: Vec<Method> = self
            .trees
            .iter()
            .filter(|(m, tree)| **m != method && tree.at(path).is_ok())
            .map(|(m, _)| *m)
            .collect();
        if allowed.is_empty() {
            Lookup::NotFound
        } else {
            allowed.sort();
            Lookup::MethodNotAllowed(allowed)
        }
    }

    /// Mounted routes in declaration order.
    pub fn routes(&self) -> &[Arc<TransportRoute>] { &self.routes }

    pub fn list(&self) -> Vec<RouteJson> {
        self.routes.iter().map(|route| route.to_json()).collect()
    }

    pub fn len(&self) -> usize { self.routes.len() }

    pub fn is_empty(&self) -> bool { self.routes.is_empty() }

    /// Builds the URL of the route called `name`, filling each `{param}` from
    /// `params`. Catch-all segments (`{*rest}`) are filled the same way.
    pub fn url_for(&self, name: &str, params: &[(&str, &str)]) -> Result<String, Error> {
        let &index = self.names.get(name).ok_or_else(|| Error::UrlFor {
            name: name.to_owned(),
            reason: "no route has this name".to_owned(),
        })?;

        let mut url = String::new();
        for segment in self.routes[index].url.split('/').filter(|s| !s.is_empty()) {
            url.push('/');
            let Some(param) = segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) else {
                url.push_str(segment);
                continue;
            };
            let param = param.trim_start_matches('*');
            let value = params.iter().find(|(k, _)| *k == param).map(|(_, v)| *v).ok_or_else(|| {
                Error::UrlFor { name: name.to_owned(), reason: format!("missing parameter `{param}`") }
            })?;
            url.push_str(value);
        }
        if url.is_empty() {
            url.push('/');
        }
        Ok(url)
    }
}

impl std::fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.routes.iter().map(|r| (&r.methods, &r.url))).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::handler::boxed;

    fn route(methods: &[Method], url: &str, name: Option<&str>) -> TransportRoute {
        TransportRoute {
            methods: methods.to_vec(),
            url: url.to_owned(),
            name: name.map(str::to_owned),
            handler_label: "test".to_owned(),
            handler: boxed(|_ctx: Context| async { "ok" }),
            middleware: MiddlewareRecord::default(),
            options: Map::new(),
        }
    }

    #[test]
    fn lookup_extracts_params() {
        let table = RouteTable::mount(vec![route(&[Method::Get], "/users/{id}", None)]).unwrap();
        match table.lookup(Method::Get, "/users/42") {
            Lookup::Found { params, .. } => assert_eq!(params["id"], "42"),
            _ => panic!("expected a match"),
        }
    }

    #[test]
    fn other_methods_give_method_not_allowed() {
        let table = RouteTable::mount(vec![
            route(&[Method::Post], "/users", None),
            route(&[Method::Delete], "/users", None),
        ])
        .unwrap();
        match table.lookup(Method::Get, "/users") {
            Lookup::MethodNotAllowed(allowed) => assert_eq!(allowed, [Method::Post, Method::Delete]),
            _ => panic!("expected 405"),
        }
        assert!(matches!(table.lookup(Method::Get, "/nope"), Lookup::NotFound));
    }

    #[test]
    fn duplicate_method_and_url_is_rejected() {
        let err = RouteTable::mount(vec![
            route(&[Method::Get], "/a", None),
            route(&[Method::Get, Method::Post], "/a", None),
        ])
        .unwrap_err();
        assert!(matches!(err, Error::DuplicateRoute { method: Method::Get, .. }));
    }

    #[test]
    fn url_for_fills_params() {
        let table = RouteTable::mount(vec![
            route(&[Method::Get], "/", Some("home")),
            route(&[Method::Get], "/users/{user}/posts/{id}", Some("posts.show")),
        ])
        .unwrap();
        assert_eq!(table.url_for("home", &[]).unwrap(), "/");
        assert_eq!(
            table.url_for("posts.show", &[("user", "3"), ("id", "9")]).unwrap(),
            "/users/3/posts/9"
        );
        assert!(table.url_for("posts.show", &[("user", "3")]).is_err());
        assert!(table.url_for("missing", &[]).is_err());
    }
}
