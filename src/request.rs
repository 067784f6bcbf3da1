//! Incoming HTTP request facade.

use std::collections::HashMap;
use std::net::SocketAddr;

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::HeaderMap;
use http_body_util::BodyExt;

use crate::exception::HttpError;
use crate::method::Method;

/// An incoming HTTP request with its body fully buffered.
///
/// Requests built by hand (for in-process dispatch or tests) start with no
/// headers and an empty body:
///
/// ```rust
/// use trellis::{Method, Request};
///
/// let req = Request::new(Method::Post, "/users?notify=1")
///     .with_header("content-type", "application/json")
///     .with_body(r#"{"name":"alice"}"#);
/// assert_eq!(req.path(), "/users");
/// assert_eq!(req.query("notify").as_deref(), Some("1"));
/// ```
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    path: String,
    query: Option<String>,
    headers: HeaderMap,
    body: Bytes,
    pub(crate) params: HashMap<String, String>,
    remote_addr: Option<SocketAddr>,
}

impl Request {
    pub fn new(method: Method, target: &str) -> Self {
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path.to_owned(), Some(query.to_owned())),
            None => (target.to_owned(), None),
        };
        Self {
            method,
            path,
            query,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            params: HashMap::new(),
            remote_addr: None,
        }
    }

    /// Adds a header; invalid names or values are ignored.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Buffers a hyper request. Fails with `400` when the body cannot be read
    /// and `405` for methods no route can carry.
    pub(crate) async fn from_hyper(
        req: hyper::Request<hyper::body::Incoming>,
        remote_addr: SocketAddr,
    ) -> Result<Self, HttpError> {
        let (parts, body) = req.into_parts();
        let method = Method::try_from(&parts.method).map_err(|()| {
            HttpError::new(http::StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
                .with_code("E_METHOD_NOT_ALLOWED")
        })?;
        let body = body
            .collect()
            .await
            .map_err(|e| {
                HttpError::new(http::StatusCode::BAD_REQUEST, format!("unreadable body: {e}"))
                    .with_code("E_BAD_REQUEST")
            })?
            .to_bytes();

        Ok(Self {
            method,
            path: parts.uri.path().to_owned(),
            query: parts.uri.query().map(str::to_owned),
            headers: parts.headers,
            body,
            params: HashMap::new(),
            remote_addr: Some(remote_addr),
        })
    }

    pub fn method(&self) -> Method { self.method }
    pub fn path(&self) -> &str { &self.path }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }
    pub fn remote_addr(&self) -> Option<SocketAddr> { self.remote_addr }

    /// Case-insensitive header lookup. Non-UTF-8 values read as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn params(&self) -> &HashMap<String, String> { &self.params }

    /// Returns the first percent-decoded query value for `key`.
    pub fn query(&self, key: &str) -> Option<String> {
        let query = self.query.as_deref()?;
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    /// All percent-decoded query pairs, in order of appearance.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        self.query
            .as_deref()
            .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
            .unwrap_or_default()
    }
}
