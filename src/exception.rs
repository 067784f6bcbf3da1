//! Runtime errors and the exception handler.
//!
//! Anything that goes wrong while serving a request becomes an [`HttpError`].
//! The pipeline hands it to one [`ExceptionHandler`], which writes a status
//! and a JSON body into the [`Context`]; interceptors then run over that body
//! like over any other.
//!
//! ```json
//! { "statusCode": 422, "code": "E_VALIDATION", "name": "ValidationError",
//!   "message": "email is required", "help": "..." }
//! ```

use std::backtrace::{Backtrace, BacktraceStatus};
use std::collections::HashSet;
use std::error::Error as StdError;
use std::fmt;

use async_trait::async_trait;
use http::StatusCode;
use serde::Serialize;

use crate::config::AppConfig;
use crate::context::Context;
use crate::response::Body;

const INTERNAL_CODE: &str = "E_RUNTIME_EXCEPTION";
const HTTP_CODE: &str = "E_HTTP_EXCEPTION";

// ── HttpError ─────────────────────────────────────────────────────────────────

/// An error raised while handling a request.
///
/// Like `anyhow::Error`, `HttpError` deliberately does not implement
/// [`std::error::Error`], so every `E: std::error::Error + Send + Sync` converts
/// into it and `?` works inside handlers and middleware. Converted errors are
/// *internal*: they render as `500` and hide their message outside debug mode.
/// Errors built with [`HttpError::new`] carry an explicit status that is sent
/// verbatim.
pub struct HttpError {
    status: StatusCode,
    explicit: bool,
    code: Option<String>,
    name: String,
    message: String,
    help: Option<String>,
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
    backtrace: Backtrace,
}

impl HttpError {
    /// An error with an explicit status.
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            explicit: true,
            code: None,
            name: "HttpException".to_owned(),
            message: message.into(),
            help: None,
            source: None,
            backtrace: Backtrace::capture(),
        }
    }

    /// An internal error wrapping `source`.
    pub fn internal<E>(source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        let mut error = Self::msg(source.to_string());
        error.source = Some(Box::new(source));
        error
    }

    /// An internal error with only a message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            explicit: false,
            code: None,
            name: "Exception".to_owned(),
            message: message.into(),
            help: None,
            source: None,
            backtrace: Backtrace::capture(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message).with_code("E_ROUTE_NOT_FOUND")
    }

    pub fn unprocessable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, message)
            .with_code("E_VALIDATION")
            .with_name("ValidationException")
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn status(&self) -> StatusCode { self.status }
    pub fn is_explicit(&self) -> bool { self.explicit }
    pub fn name(&self) -> &str { &self.name }
    pub fn message(&self) -> &str { &self.message }
    pub fn help(&self) -> Option<&str> { self.help.as_deref() }

    /// The error code, falling back to a generic code for the error's kind.
    pub fn code(&self) -> &str {
        match &self.code {
            Some(code) => code,
            None if self.explicit => HTTP_CODE,
            None => INTERNAL_CODE,
        }
    }

    pub fn source(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.source.as_deref()
    }

    /// The message followed by each `source()` in the chain, then the
    /// captured backtrace frames when `RUST_BACKTRACE` enabled capture.
    pub fn stack(&self) -> Vec<String> {
        let mut stack = vec![format!("{}: {}", self.name, self.message)];
        let mut next: Option<&(dyn StdError + 'static)> = match &self.source {
            Some(source) => source.source(),
            None => None,
        };
        while let Some(cause) = next {
            stack.push(format!("caused by: {cause}"));
            next = cause.source();
        }
        if self.backtrace.status() == BacktraceStatus::Captured {
            stack.extend(self.backtrace.to_string().lines().map(|l| l.trim().to_owned()));
        }
        stack
    }
}

impl<E> From<E> for HttpError
where
    E: StdError + Send + Sync + 'static,
{
    fn from(source: E) -> Self {
        Self::internal(source)
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.code(), self.status.as_u16(), self.message)
    }
}

impl fmt::Debug for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpError")
            .field("status", &self.status)
            .field("code", &self.code())
            .field("name", &self.name)
            .field("message", &self.message)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

// ── Rendered body ─────────────────────────────────────────────────────────────

/// The JSON shape clients receive for every error.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub status_code: u16,
    pub code: String,
    pub name: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<Vec<String>>,
}

// ── ExceptionHandler ──────────────────────────────────────────────────────────

/// Converts an [`HttpError`] into the response written to the context.
///
/// Implementations must leave a status and body on `ctx`; the pipeline reads
/// both back before the intercept phase.
#[async_trait]
pub trait ExceptionHandler: Send + Sync + 'static {
    async fn handle(&self, error: HttpError, ctx: &Context);
}

/// The stock exception handler.
///
/// - explicit statuses are honoured, internal errors become `500`
/// - internal messages are replaced by `"Internal Server Error"` unless `debug`
/// - `debug` adds a `stack` array to the body
/// - codes and statuses listed as ignored are not logged
#[derive(Debug, Clone, Default)]
pub struct DefaultExceptionHandler {
    debug: bool,
    ignore_codes: HashSet<String>,
    ignore_statuses: HashSet<u16>,
}

impl DefaultExceptionHandler {
    pub fn new() -> Self { Self::default() }

    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            debug: config.http.debug,
            ignore_codes: config.exceptions.ignore_codes.iter().cloned().collect(),
            ignore_statuses: config.exceptions.ignore_statuses.iter().copied().collect(),
        }
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn ignore_code(mut self, code: impl Into<String>) -> Self {
        self.ignore_codes.insert(code.into());
        self
    }

    pub fn ignore_status(mut self, status: StatusCode) -> Self {
        self.ignore_statuses.insert(status.as_u16());
        self
    }

    /// Whether `error` should be logged.
    pub fn should_report(&self, error: &HttpError) -> bool {
        !self.ignore_codes.contains(error.code())
            && !self.ignore_statuses.contains(&error.status().as_u16())
    }

    pub fn render(&self, error: &HttpError) -> ErrorBody {
        let message = if error.is_explicit() || self.debug {
            error.message().to_owned()
        } else {
            "Internal Server Error".to_owned()
        };
        ErrorBody {
            status_code: error.status().as_u16(),
            code: error.code().to_owned(),
            name: error.name().to_owned(),
            message,
            help: error.help().map(str::to_owned),
            stack: self.debug.then(|| error.stack()),
        }
    }

    fn report(&self, error: &HttpError, ctx: &Context) {
        if !self.should_report(error) {
            return;
        }
        let request = ctx.request();
        if error.status().is_server_error() {
            tracing::error!(
                method = %request.method(),
                path = request.path(),
                status = error.status().as_u16(),
                code = error.code(),
                error = ?error,
                "request failed",
            );
        } else {
            tracing::warn!(
                method = %request.method(),
                path = request.path(),
                status = error.status().as_u16(),
                code = error.code(),
                message = error.message(),
                "request rejected",
            );
        }
    }
}

#[async_trait]
impl ExceptionHandler for DefaultExceptionHandler {
    async fn handle(&self, error: HttpError, ctx: &Context) {
        self.report(&error, ctx);
        let body = self.render(&error);
        ctx.set_status(error.status());
        match Body::json(&body) {
            Ok(body) => ctx.send(body),
            Err(_) => ctx.send(Body::Text(body.message)),
        }
    }
}
