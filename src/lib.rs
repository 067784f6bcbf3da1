//! # trellis
//!
//! An HTTP application framework on hyper: a route table with groups and
//! resources, a three-phase middleware pipeline, and an explicit
//! dependency-injection registry in place of decorators.
//!
//! ## Request lifecycle
//!
//! ```text
//! match route ─▶ handle (global, route) ─▶ handler ─▶ intercept (global, route)
//!                    │ errors / panics / timeout ──▶ exception handler ──┘
//!             ─▶ response flushed ─▶ terminate (global, route)
//! ```
//!
//! * **handle** middleware can short-circuit by sending a response.
//! * **intercept** handlers rewrite the body, each seeing the previous one's
//!   output.
//! * **terminate** handlers run after the response has left; their failures
//!   are only logged.
//!
//! ## Boot
//!
//! Everything that can fail does so while the application is assembled:
//! unknown middleware names, missing controller actions, unnamed routes in a
//! named group, duplicate routes. Serving never panics on user input.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use trellis::{App, Container, Context, HttpError, Json, Kernel, Router, Server, health};
//!
//! async fn show(ctx: Context) -> Result<Json<serde_json::Value>, HttpError> {
//!     let id: u64 = ctx.param("id").unwrap_or("").parse()?;
//!     Ok(Json(serde_json::json!({ "id": id })))
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), trellis::Error> {
//!     let container = Arc::new(Container::new());
//!
//!     let mut router = Router::new(Arc::clone(&container));
//!     router.get("/users/:id", show).as_name("users.show");
//!     router.get("/healthz", health::liveness);
//!
//!     let app = App::new(Kernel::new(container), router.build()?);
//!     Server::bind("0.0.0.0:3333")?.serve(app).await
//! }
//! ```

mod container;
mod context;
mod controller;
mod error;
mod exception;
mod handler;
mod method;
mod pipeline;
mod registry;
mod request;
mod response;
mod server;

pub mod config;
pub mod health;
pub mod logging;
pub mod middleware;
pub mod router;

pub use config::AppConfig;
pub use container::{Container, Instance};
pub use context::{Context, RouteInfo, Stage};
pub use controller::{Action, CONTROLLER_NAMESPACE, Controller, ControllerRef};
pub use error::Error;
pub use exception::{DefaultExceptionHandler, ErrorBody, ExceptionHandler, HttpError};
pub use handler::Handler;
pub use method::Method;
pub use middleware::{Interceptor, Middleware, MiddlewareRef, Terminator};
pub use pipeline::{App, Dispatched, Kernel, PendingTerminate, Sent};
pub use registry::{Lifetime, Registration};
pub use request::Request;
pub use response::{Body, ContentType, Json, Responder, Response, ResponseBuilder};
pub use router::{ResourceAction, RouteJson, RouteTable, Router};
pub use server::{SentBody, Server, serve_listener};
