//! Per-request state shared by every phase.
//!
//! A [`Context`] is a cheap handle (one `Arc`) to the request, the response
//! being assembled, and a free-form data bag. Every middleware, the handler,
//! every interceptor and every terminator receives the same context, so a
//! value stored by an auth middleware is visible to a terminator that writes
//! audit logs.
//!
//! Some fields only mean something late in the request: the response time and
//! the sent body read as `None` until the pipeline reaches the intercept and
//! terminate phases respectively.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, StatusCode};
use parking_lot::Mutex;
use serde_json::Value;

use crate::request::Request;
use crate::response::{Body, Response};

/// Where a request currently is in the pipeline.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Stage {
    Matched,
    Handle,
    Handler,
    Error,
    Intercept,
    ResponseSent,
    Terminate,
    Done,
}

/// The matched route as seen from inside a request.
#[derive(Clone, Debug, Default)]
pub struct RouteInfo {
    pub url: String,
    pub name: Option<String>,
}

struct Inner {
    request: Request,
    route: RouteInfo,
    started: Instant,
    response: Mutex<ResponseState>,
    data: Mutex<HashMap<String, Value>>,
}

#[derive(Debug)]
struct ResponseState {
    stage: Stage,
    status: StatusCode,
    headers: HeaderMap,
    body: Body,
    sent: bool,
    response_time: Option<Duration>,
    final_body: Option<Body>,
}

/// Per-request mutable carrier threaded through handle → handler → intercept → terminate.
#[derive(Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

impl Context {
    pub fn new(request: Request, route: RouteInfo) -> Self {
        Self {
            inner: Arc::new(Inner {
                request,
                route,
                started: Instant::now(),
                response: Mutex::new(ResponseState {
                    stage: Stage::Matched,
                    status: StatusCode::OK,
                    headers: HeaderMap::new(),
                    body: Body::Empty,
                    sent: false,
                    response_time: None,
                    final_body: None,
                }),
                data: Mutex::new(HashMap::new()),
            }),
        }
    }

    // ── Request side ─────────────────────────────────────────────────────────

    pub fn request(&self) -> &Request { &self.inner.request }

    pub fn param(&self, name: &str) -> Option<&str> { self.inner.request.param(name) }

    pub fn route(&self) -> &RouteInfo { &self.inner.route }

    pub fn stage(&self) -> Stage { self.inner.response.lock().stage }

    // ── Data bag ─────────────────────────────────────────────────────────────

    /// Stores a value for later phases, replacing any previous value.
    pub fn set_data(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.inner.data.lock().insert(key.into(), value.into());
    }

    pub fn data(&self, key: &str) -> Option<Value> {
        self.inner.data.lock().get(key).cloned()
    }

    pub fn remove_data(&self, key: &str) -> Option<Value> {
        self.inner.data.lock().remove(key)
    }

    // ── Response side ────────────────────────────────────────────────────────

    pub fn status(&self) -> StatusCode { self.inner.response.lock().status }

    pub fn set_status(&self, status: StatusCode) {
        self.inner.response.lock().status = status;
    }

    pub fn set_header(&self, name: HeaderName, value: HeaderValue) {
        self.inner.response.lock().headers.insert(name, value);
    }

    pub fn response_header(&self, name: &str) -> Option<HeaderValue> {
        self.inner.response.lock().headers.get(name).cloned()
    }

    /// Sends `body` as the response. During the handle phase this
    /// short-circuits: the remaining middleware and the handler are skipped.
    pub fn send(&self, body: impl Into<Body>) {
        let mut state = self.inner.response.lock();
        state.body = body.into();
        state.sent = true;
    }

    /// Whether [`send`](Self::send) was called.
    pub fn is_sent(&self) -> bool { self.inner.response.lock().sent }

    /// Time from context creation to the end of the handler (intercept phase)
    /// or to the response being handed to the transport (terminate phase).
    pub fn response_time(&self) -> Option<Duration> {
        self.inner.response.lock().response_time
    }

    /// The body that was sent. `None` before the terminate phase.
    pub fn sent_body(&self) -> Option<Body> {
        self.inner.response.lock().final_body.clone()
    }

    pub fn elapsed(&self) -> Duration { self.inner.started.elapsed() }

    // ── Pipeline hooks ───────────────────────────────────────────────────────

    pub(crate) fn enter(&self, stage: Stage) {
        let mut state = self.inner.response.lock();
        state.stage = stage;
        if stage == Stage::Intercept {
            state.response_time = Some(self.inner.started.elapsed());
        }
    }

    /// Folds a handler's return value into the response. An explicit
    /// [`send`](Self::send) from inside the handler wins over the return value.
    pub(crate) fn apply(&self, response: Response) {
        let mut state = self.inner.response.lock();
        if state.sent {
            if !response.body.is_empty() {
                tracing::debug!("handler returned a body after sending; keeping the sent body");
            }
            return;
        }
        if let Some(status) = response.status {
            state.status = status;
        }
        for (name, value) in response.headers.iter() {
            state.headers.append(name.clone(), value.clone());
        }
        state.body = response.body;
    }

    pub(crate) fn take_body(&self) -> Body {
        std::mem::take(&mut self.inner.response.lock().body)
    }

    /// Freezes the response and returns what goes on the wire.
    pub(crate) fn seal(&self, body: Body) -> (StatusCode, HeaderMap) {
        let mut state = self.inner.response.lock();
        state.stage = Stage::ResponseSent;
        state.response_time = Some(self.inner.started.elapsed());
        state.final_body = Some(body);
        (state.status, state.headers.clone())
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("method", &self.inner.request.method())
            .field("path", &self.inner.request.path())
            .field("route", &self.inner.route)
            .field("stage", &self.stage())
            .finish_non_exhaustive()
    }
}
