//! Response bodies, the [`Response`] value, and the [`Responder`] conversion trait.
//!
//! A handler returns anything [`Responder`]. Interceptors then see the
//! resulting [`Body`] and may rewrite it before the bytes go out, so bodies
//! stay structured (JSON stays a [`serde_json::Value`]) until the very end.

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use http::{HeaderMap, StatusCode};
use http_body_util::Full;
use serde::Serialize;
use serde_json::Value;

use crate::exception::HttpError;

// ── ContentType ───────────────────────────────────────────────────────────────

/// Common content-type values for [`Body::Bytes`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ContentType {
    Csv,          // text/csv
    EventStream,  // text/event-stream  (SSE)
    FormData,     // application/x-www-form-urlencoded
    Html,         // text/html; charset=utf-8
    Json,         // application/json
    OctetStream,  // application/octet-stream  (binary / file download)
    Pdf,          // application/pdf
    Text,         // text/plain; charset=utf-8
    Xml,          // application/xml
}

impl ContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Csv         => "text/csv",
            Self::EventStream => "text/event-stream",
            Self::FormData    => "application/x-www-form-urlencoded",
            Self::Html        => "text/html; charset=utf-8",
            Self::Json        => "application/json",
            Self::OctetStream => "application/octet-stream",
            Self::Pdf         => "application/pdf",
            Self::Text        => "text/plain; charset=utf-8",
            Self::Xml         => "application/xml",
        }
    }
}

// ── Body ──────────────────────────────────────────────────────────────────────

/// A response body as it travels through the intercept phase.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Body {
    #[default]
    Empty,
    Text(String),
    Json(Value),
    Bytes { content_type: ContentType, bytes: Bytes },
}

impl Body {
    /// Serialises `value` into a [`Body::Json`].
    pub fn json<T: Serialize>(value: &T) -> Result<Self, HttpError> {
        Ok(Self::Json(serde_json::to_value(value)?))
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(text) => text.is_empty(),
            Self::Json(_) => false,
            Self::Bytes { bytes, .. } => bytes.is_empty(),
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_json_mut(&mut self) -> Option<&mut Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn content_type(&self) -> Option<&'static str> {
        match self {
            Self::Empty => None,
            Self::Text(_) => Some(ContentType::Text.as_str()),
            Self::Json(_) => Some(ContentType::Json.as_str()),
            Self::Bytes { content_type, .. } => Some(content_type.as_str()),
        }
    }

    /// Encodes the body into wire bytes.
    pub fn to_bytes(&self) -> Bytes {
        match self {
            Self::Empty => Bytes::new(),
            Self::Text(text) => Bytes::from(text.clone()),
            Self::Json(value) => Bytes::from(value.to_string()),
            Self::Bytes { bytes, .. } => bytes.clone(),
        }
    }
}

impl From<&'static str> for Body {
    fn from(text: &'static str) -> Self { Self::Text(text.to_owned()) }
}

impl From<String> for Body {
    fn from(text: String) -> Self { Self::Text(text) }
}

impl From<Value> for Body {
    fn from(value: Value) -> Self { Self::Json(value) }
}

impl From<()> for Body {
    fn from((): ()) -> Self { Self::Empty }
}

// ── Response ─────────────────────────────────────────────────────────────────

/// A handler's answer: an optional status, extra headers, and a body.
///
/// A bare body returned from a handler carries no status, which leaves
/// whatever status the context already holds (200 unless a middleware or the
/// handler changed it).
///
/// ```rust
/// use trellis::{Response, ContentType};
/// use http::StatusCode;
///
/// Response::json(serde_json::json!({ "id": 1 }));
/// Response::text("hello");
/// Response::status(StatusCode::NO_CONTENT);
///
/// Response::builder()
///     .status(StatusCode::CREATED)
///     .header("location", "/users/42")
///     .json(serde_json::json!({ "id": 42 }));
///
/// Response::builder().bytes(ContentType::Xml, b"<ok/>".to_vec());
/// ```
#[derive(Debug, Default)]
pub struct Response {
    pub(crate) status: Option<StatusCode>,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Body,
}

impl Response {
    /// `200 OK`, `application/json`.
    pub fn json(value: Value) -> Self {
        Self::ok(Body::Json(value))
    }

    /// `200 OK`, `text/plain; charset=utf-8`.
    pub fn text(body: impl Into<String>) -> Self {
        Self::ok(Body::Text(body.into()))
    }

    /// Response with no body.
    pub fn status(code: StatusCode) -> Self {
        Self { status: Some(code), headers: HeaderMap::new(), body: Body::Empty }
    }

    /// Builder for responses that need a custom status or extra headers.
    pub fn builder() -> ResponseBuilder {
        ResponseBuilder { headers: HeaderMap::new(), status: StatusCode::OK }
    }

    pub(crate) fn from_body(body: Body) -> Self {
        Self { status: None, headers: HeaderMap::new(), body }
    }

    fn ok(body: Body) -> Self {
        Self { status: Some(StatusCode::OK), headers: HeaderMap::new(), body }
    }

    pub fn status_code(&self) -> Option<StatusCode> { self.status }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &Body { &self.body }
}

// ── ResponseBuilder ───────────────────────────────────────────────────────────

/// Fluent builder for [`Response`].
///
/// Obtain via [`Response::builder()`]. Defaults to `200 OK`.
/// Terminated by a typed body method.
pub struct ResponseBuilder {
    headers: HeaderMap,
    status: StatusCode,
}

impl ResponseBuilder {
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = code;
        self
    }

    /// Appends a header. Names or values that are not valid HTTP are dropped
    /// with a warning.
    pub fn header<K, V>(mut self, name: K, value: V) -> Self
    where
        HeaderName: TryFrom<K>,
        HeaderValue: TryFrom<V>,
    {
        match (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            (Ok(name), Ok(value)) => {
                self.headers.append(name, value);
            }
            _ => tracing::warn!("dropping invalid response header"),
        }
        self
    }

    pub fn json(self, value: Value) -> Response {
        self.finish(Body::Json(value))
    }

    pub fn text(self, body: impl Into<String>) -> Response {
        self.finish(Body::Text(body.into()))
    }

    /// Terminate with a typed body. Use this for XML, HTML, binary, SSE, etc.
    pub fn bytes(self, content_type: ContentType, body: impl Into<Bytes>) -> Response {
        self.finish(Body::Bytes { content_type, bytes: body.into() })
    }

    /// Terminate with no body (e.g. `204 No Content`, redirects).
    pub fn no_body(self) -> Response {
        self.finish(Body::Empty)
    }

    fn finish(self, body: Body) -> Response {
        Response { status: Some(self.status), headers: self.headers, body }
    }
}

// ── Responder ─────────────────────────────────────────────────────────────────

/// Conversion of a handler's return value into a [`Response`], or into the
/// [`HttpError`] the exception handler should render instead.
///
/// # Example: returning a serializable type
///
/// ```rust,ignore
/// use trellis::{Context, Json};
///
/// async fn show(ctx: Context) -> Result<Json<User>, HttpError> {
///     let user = load(ctx.param("id")).await?;
///     Ok(Json(user))
/// }
/// ```
pub trait Responder {
    fn respond(self) -> Result<Response, HttpError>;
}

impl Responder for Response {
    fn respond(self) -> Result<Response, HttpError> { Ok(self) }
}

impl Responder for Body {
    fn respond(self) -> Result<Response, HttpError> { Ok(Response::from_body(self)) }
}

impl Responder for &'static str {
    fn respond(self) -> Result<Response, HttpError> { Body::from(self).respond() }
}

impl Responder for String {
    fn respond(self) -> Result<Response, HttpError> { Body::Text(self).respond() }
}

impl Responder for Value {
    fn respond(self) -> Result<Response, HttpError> { Body::Json(self).respond() }
}

impl Responder for () {
    fn respond(self) -> Result<Response, HttpError> { Body::Empty.respond() }
}

/// Return a status directly from a handler: `return StatusCode::NO_CONTENT`
impl Responder for StatusCode {
    fn respond(self) -> Result<Response, HttpError> { Ok(Response::status(self)) }
}

impl Responder for HttpError {
    fn respond(self) -> Result<Response, HttpError> { Err(self) }
}

impl<T, E> Responder for Result<T, E>
where
    T: Responder,
    E: Into<HttpError>,
{
    fn respond(self) -> Result<Response, HttpError> {
        self.map_err(Into::into)?.respond()
    }
}

/// Serialises `T` as the JSON body.
pub struct Json<T>(pub T);

impl<T: Serialize> Responder for Json<T> {
    fn respond(self) -> Result<Response, HttpError> {
        Body::json(&self.0)?.respond()
    }
}

// ── Wire encoding ─────────────────────────────────────────────────────────────

/// Builds the transport response from the final status, headers and body.
/// The body's content type is added unless a header already names one.
pub(crate) fn encode(
    status: StatusCode,
    mut headers: HeaderMap,
    body: &Body,
) -> http::Response<Full<Bytes>> {
    if !headers.contains_key(CONTENT_TYPE) {
        if let Some(content_type) = body.content_type() {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        }
    }
    let mut response = http::Response::new(Full::new(body.to_bytes()));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_bodies_leave_status_alone() {
        let response = serde_json::json!({ "a": 1 }).respond().unwrap();
        assert_eq!(response.status_code(), None);
        assert_eq!(response.body().as_json(), Some(&serde_json::json!({ "a": 1 })));
    }

    #[test]
    fn errors_pass_through_results() {
        let result: Result<&'static str, HttpError> =
            Err(HttpError::new(StatusCode::CONFLICT, "taken"));
        let err = result.respond().unwrap_err();
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn encode_sets_content_type_from_body() {
        let response = encode(StatusCode::OK, HeaderMap::new(), &Body::Text("hi".into()));
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "text/plain; charset=utf-8"
        );
    }

    #[test]
    fn builder_drops_invalid_headers() {
        let response = Response::builder()
            .header("bad header", "x")
            .header("location", "/users/1")
            .no_body();
        assert_eq!(response.headers().len(), 1);
    }
}
