//! A small users API: a resource backed by a controller, a guarded admin
//! group, a response envelope interceptor and a timing terminator.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example basic
//!
//! Try:
//!   curl http://localhost:3333/api/users/42
//!   curl -X POST http://localhost:3333/api/users -d '{"name":"alice"}'
//!   curl http://localhost:3333/api/admin/stats                 # 401
//!   curl -H 'x-admin: 1' http://localhost:3333/api/admin/stats
//!   curl http://localhost:3333/healthz

use std::sync::Arc;

use http::StatusCode;
use serde_json::{Value, json};
use trellis::middleware::from_fn;
use trellis::{
    App, AppConfig, Body, Container, Context, Controller, HttpError, Json, Kernel, Registration,
    ResourceAction, Response, Router, Server, health, logging,
};

#[tokio::main]
async fn main() -> Result<(), trellis::Error> {
    let config = AppConfig::default();
    logging::init(&config.logging)?;

    let container = Arc::new(Container::new());
    let mut kernel = Kernel::from_config(Arc::clone(&container), &config);

    kernel.register_controller(Registration::new("UserController"), |_| users())?;
    kernel.register_middleware(Registration::new("admin"), |_| {
        from_fn(|ctx: Context| async move {
            if ctx.request().header("x-admin").is_none() {
                return Err(HttpError::new(StatusCode::UNAUTHORIZED, "admins only"));
            }
            Ok(())
        })
    })?;
    kernel.register_interceptor(Registration::new("envelope").global(), |_| {
        from_fn(|ctx: Context, body: Body| async move {
            match body {
                Body::Json(data) if ctx.status().is_success() => Body::Json(json!({ "data": data })),
                other => other,
            }
        })
    })?;
    kernel.register_terminator(Registration::new("timing").global(), |_| {
        from_fn(|ctx: Context| async move {
            tracing::info!(
                route = ctx.route().name.as_deref().unwrap_or("-"),
                status = ctx.status().as_u16(),
                response_ms = ctx.response_time().map_or(0, |t| t.as_millis() as u64),
                "request finished",
            );
        })
    })?;

    let mut router = Router::new(Arc::clone(&container));
    router
        .group(|r| {
            r.resource("/users", "UserController")
                .except(&[ResourceAction::Update]);
            r.group(|r| {
                r.get("/stats", stats).as_name("stats");
                Ok(())
            })?
            .prefix("/admin")
            .as_name("admin")?
            .middleware("admin")?;
            Ok(())
        })?
        .prefix("/api")
        .as_name("api")?;
    router.get("/healthz", health::liveness).as_name("health.live");
    router.get("/readyz", health::readiness).as_name("health.ready");

    for route in router.list() {
        tracing::info!(methods = ?route.methods, url = %route.url, name = ?route.name, "route");
    }

    let app = App::new(kernel, router.build()?);
    Server::from_config(&config)?.serve(app).await
}

fn users() -> Controller {
    Controller::new("UserController")
        .action("index", |_ctx: Context| async { json!([{ "id": "1", "name": "alice" }]) })
        .action("show", show_user)
        .action("store", store_user)
        .action("delete", |_ctx: Context| async { StatusCode::NO_CONTENT })
}

async fn show_user(ctx: Context) -> Json<Value> {
    Json(json!({ "id": ctx.param("id"), "name": "alice" }))
}

async fn store_user(ctx: Context) -> Result<Response, HttpError> {
    let input: Value = serde_json::from_slice(ctx.request().body())
        .map_err(|e| HttpError::new(StatusCode::BAD_REQUEST, e.to_string()))?;
    let name = input.get("name").and_then(Value::as_str).ok_or_else(|| {
        HttpError::unprocessable("name is required").with_help("send {\"name\": \"...\"}")
    })?;
    Ok(Response::builder()
        .status(StatusCode::CREATED)
        .header("location", "/api/users/99")
        .json(json!({ "id": "99", "name": name })))
}

async fn stats(_ctx: Context) -> Value {
    json!({ "users": 1 })
}
