//! Built-in health-check handlers.
//!
//! | Probe | Path | Question |
//! |---|---|---|
//! | **Liveness** | `/healthz` | Is the process alive? Failure → restart. |
//! | **Readiness** | `/readyz` | Can the pod serve traffic? Failure → pulled from load-balancer. |
//!
//! ```rust
//! use std::sync::Arc;
//! use trellis::{Container, Router, health};
//!
//! let mut router = Router::new(Arc::new(Container::new()));
//! router.get("/healthz", health::liveness).as_name("health.live");
//! router.get("/readyz", health::readiness).as_name("health.ready");
//! ```
//!
//! Gate readiness on your own dependencies by registering a different
//! handler under `/readyz`.

use crate::context::Context;
use crate::response::Response;

/// Always `200 ok`. If the process can answer HTTP at all, it is alive.
pub async fn liveness(_ctx: Context) -> Response {
    Response::text("ok")
}

/// `200 ready`.
pub async fn readiness(_ctx: Context) -> Response {
    Response::text("ready")
}
