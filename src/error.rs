//! Boot-time error type.
//!
//! Everything here is fatal: registration and resolution failures surface to
//! the code that builds the application, which is expected to stop. Failures
//! while *serving* a request are [`HttpError`](crate::HttpError)s instead and
//! never leave the pipeline.

use thiserror::Error as ThisError;

use crate::method::Method;

/// The error type returned by trellis's fallible boot and transport operations.
#[derive(Debug, ThisError)]
pub enum Error {
    /// A group was named while one of its routes had no name of its own.
    #[error("cannot define group name `{group}`: route `{url}` has no name to prefix")]
    GroupName { group: String, url: String },

    /// A string-referenced middleware is not registered in the container.
    #[error("{phase} middleware `{name}` not found (looked up `{alias}`)")]
    MiddlewareNotFound {
        phase: &'static str,
        name: String,
        alias: String,
    },

    /// A string-referenced controller is not registered in the container.
    #[error("controller `{name}` not found (looked up `{alias}`)")]
    ControllerNotFound { name: String, alias: String },

    /// A controller exists but does not expose the requested action.
    #[error("controller `{controller}` has no action `{action}`")]
    ActionNotFound { controller: String, action: String },

    /// A container binding resolved to a value of the wrong type.
    #[error("binding `{alias}` does not hold a {expected}")]
    BindingType { alias: String, expected: &'static str },

    /// Two live routes claim the same method and URL.
    #[error("duplicate route {method} {url}")]
    DuplicateRoute { method: Method, url: String },

    /// The radix tree refused a route pattern.
    #[error("invalid route `{url}`: {reason}")]
    InvalidRoute { url: String, reason: String },

    /// `url_for` was given a name no route carries, or is missing a parameter.
    #[error("cannot build url for route `{name}`: {reason}")]
    UrlFor { name: String, reason: String },

    #[error("invalid socket address `{0}`")]
    InvalidAddress(String),

    #[error("config: {0}")]
    Config(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
