mod common;

use std::time::Duration;

use async_trait::async_trait;
use common::{Log, container, ok};
use http::StatusCode;
use serde_json::{Value, json};
use trellis::middleware::from_fn;
use trellis::{
    App, Body, Context, Controller, Error, ExceptionHandler, HttpError, Interceptor, Json, Kernel,
    Method, Registration, Request, Router, Sent, Stage, Terminator,
};

fn app(kernel: Kernel, router: Router) -> App {
    App::new(kernel, router.build().expect("routes mount"))
}

async fn send(app: &App, method: Method, target: &str) -> Sent {
    app.handle(Request::new(method, target)).await.complete().await
}

fn json_body(sent: &Sent) -> &Value {
    sent.body.as_json().expect("json body")
}

/// Inserts `key: true` into a JSON object body.
struct Tag(&'static str);

#[async_trait]
impl Interceptor for Tag {
    async fn intercept(&self, _ctx: &Context, mut body: Body) -> Result<Body, HttpError> {
        if let Some(object) = body.as_json_mut().and_then(Value::as_object_mut) {
            object.insert(self.0.to_owned(), json!(true));
        }
        Ok(body)
    }
}

/// Appends its label to the `seen` array of a JSON body.
struct Seen(&'static str);

#[async_trait]
impl Interceptor for Seen {
    async fn intercept(&self, _ctx: &Context, mut body: Body) -> Result<Body, HttpError> {
        if let Some(seen) = body.as_json_mut().and_then(|v| v["seen"].as_array_mut()) {
            seen.push(json!(self.0));
        }
        Ok(body)
    }
}

#[tokio::test]
async fn global_handle_middleware_runs_before_route_middleware() -> Result<(), Error> {
    let log = Log::default();
    let container = container();

    let mut router = Router::new(container.clone());
    let handler_log = log.clone();
    router
        .get("/", move |_ctx: Context| {
            let log = handler_log.clone();
            async move {
                log.push("handler");
                "ok"
            }
        })
        .middleware(log.step("R1"))?;

    // Globals attached after the route still run first.
    let mut kernel = Kernel::new(container);
    kernel.middleware(log.step("G1"))?.middleware(log.step("G2"))?;

    let sent = send(&app(kernel, router), Method::Get, "/").await;
    assert_eq!(sent.status, StatusCode::OK);
    assert_eq!(log.entries(), ["G1", "G2", "R1", "handler"]);
    Ok(())
}

#[tokio::test]
async fn prepended_middleware_runs_first() -> Result<(), Error> {
    let log = Log::default();
    let mut router = Router::new(container());
    router
        .get("/", ok)
        .middleware(log.step("appended"))?
        .prepend_middleware(log.step("first"))?
        .prepend_middleware(log.step("very first"))?;

    send(&app(Kernel::new(container()), router), Method::Get, "/").await;
    assert_eq!(log.entries(), ["very first", "first", "appended"]);
    Ok(())
}

#[tokio::test]
async fn interceptors_compose_in_order() -> Result<(), Error> {
    let mut router = Router::new(container());
    router
        .get("/", |_ctx: Context| async { json!({ "data": 1 }) })
        .intercept(Tag("a"))?
        .intercept(from_fn(|_ctx: Context, mut body: Body| async move {
            let saw_a = body.as_json().is_some_and(|v| v.get("a").is_some());
            if let Some(object) = body.as_json_mut().and_then(Value::as_object_mut) {
                object.insert("b".to_owned(), json!(saw_a));
            }
            body
        }))?;

    let sent = send(&app(Kernel::new(container()), router), Method::Get, "/").await;
    assert_eq!(json_body(&sent), &json!({ "data": 1, "a": true, "b": true }));
    Ok(())
}

#[tokio::test]
async fn handler_errors_are_rendered_and_still_intercepted() -> Result<(), Error> {
    let mut router = Router::new(container());
    router
        .post("/users", |_ctx: Context| async {
            Err::<Json<Value>, _>(HttpError::unprocessable("email is required"))
        })
        .intercept(Tag("intercepted"))?;

    let sent = send(&app(Kernel::new(container()), router), Method::Post, "/users").await;
    assert_eq!(sent.status, StatusCode::UNPROCESSABLE_ENTITY);
    let body = json_body(&sent);
    assert_eq!(body["statusCode"], 422);
    assert_eq!(body["code"], "E_VALIDATION");
    assert_eq!(body["message"], "email is required");
    assert_eq!(body["intercepted"], true);
    Ok(())
}

#[tokio::test]
async fn middleware_send_short_circuits_the_handler() -> Result<(), Error> {
    let log = Log::default();
    let mut router = Router::new(container());
    let handler_log = log.clone();
    router
        .get("/admin", move |_ctx: Context| {
            let log = handler_log.clone();
            async move {
                log.push("handler");
                "secret"
            }
        })
        .middleware(from_fn(|ctx: Context| async move {
            ctx.set_status(StatusCode::UNAUTHORIZED);
            ctx.send(json!({ "error": "login first" }));
        }))?
        .middleware(log.step("after guard"))?
        .intercept(Tag("intercepted"))?
        .terminate(log.step("terminated"))?;

    let sent = send(&app(Kernel::new(container()), router), Method::Get, "/admin").await;
    assert_eq!(sent.status, StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(&sent), &json!({ "error": "login first", "intercepted": true }));
    assert_eq!(log.entries(), ["terminated"]);
    Ok(())
}

struct Failing;

#[async_trait]
impl Terminator for Failing {
    async fn terminate(&self, _ctx: &Context) -> Result<(), HttpError> {
        Err(HttpError::msg("audit sink unavailable"))
    }
}

#[tokio::test]
async fn failing_terminator_does_not_stop_the_next_one() -> Result<(), Error> {
    let log = Log::default();
    let seen = Log::default();
    let mut router = Router::new(container());
    let seen_in_terminator = seen.clone();
    router
        .get("/", ok)
        .terminate(Failing)?
        .terminate(from_fn(move |ctx: Context| {
            let seen = seen_in_terminator.clone();
            async move {
                assert_eq!(ctx.stage(), Stage::Terminate);
                if let Some(Body::Text(text)) = ctx.sent_body() {
                    seen.push(text);
                }
            }
        }))?
        .terminate(log.step("second"))?;

    let dispatched = app(Kernel::new(container()), router).handle(Request::new(Method::Get, "/")).await;
    assert_eq!(dispatched.sent().status, StatusCode::OK);
    let sent = dispatched.complete().await;

    assert_eq!(sent.body, Body::Text("ok".into()));
    assert_eq!(log.entries(), ["second"]);
    assert_eq!(seen.entries(), ["ok"]);
    Ok(())
}

#[tokio::test]
async fn terminators_run_only_when_the_transport_says_so() -> Result<(), Error> {
    let log = Log::default();
    let mut router = Router::new(container());
    router.get("/", ok).terminate(log.step("late"))?;

    let dispatched = app(Kernel::new(container()), router).handle(Request::new(Method::Get, "/")).await;
    let (sent, terminate) = dispatched.into_parts();
    assert_eq!(sent.status, StatusCode::OK);
    assert!(log.entries().is_empty());
    assert_eq!(terminate.context().stage(), Stage::ResponseSent);

    terminate.run().await;
    assert_eq!(log.entries(), ["late"]);
    Ok(())
}

#[tokio::test]
async fn panics_become_internal_errors() -> Result<(), Error> {
    let mut router = Router::new(container());
    router.get("/boom", |_ctx: Context| async {
        if true {
            panic!("handler exploded");
        }
        "unreachable"
    });

    let sent = send(&app(Kernel::new(container()), router), Method::Get, "/boom").await;
    assert_eq!(sent.status, StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(&sent);
    assert_eq!(body["code"], "E_RUNTIME_EXCEPTION");
    assert_eq!(body["message"], "Internal Server Error");
    Ok(())
}

#[tokio::test]
async fn slow_handlers_time_out_and_still_terminate() -> Result<(), Error> {
    let log = Log::default();
    let mut router = Router::new(container());
    router
        .get("/slow", |_ctx: Context| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            "too late"
        })
        .terminate(log.step("terminated"))?;

    let mut kernel = Kernel::new(container());
    kernel.set_request_timeout(Some(Duration::from_millis(20)));

    let sent = send(&app(kernel, router), Method::Get, "/slow").await;
    assert_eq!(sent.status, StatusCode::REQUEST_TIMEOUT);
    assert_eq!(json_body(&sent)["code"], "E_REQUEST_TIMEOUT");
    assert_eq!(log.entries(), ["terminated"]);
    Ok(())
}

#[tokio::test]
async fn unmatched_requests_go_through_global_interceptors() -> Result<(), Error> {
    let log = Log::default();
    let mut router = Router::new(container());
    router.post("/users", ok);

    let mut kernel = Kernel::new(container());
    kernel.intercept(Tag("global"))?.terminate(log.step("global terminator"))?;
    let app = app(kernel, router);

    let missing = send(&app, Method::Get, "/nowhere").await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
    assert_eq!(json_body(&missing)["code"], "E_ROUTE_NOT_FOUND");
    assert_eq!(json_body(&missing)["global"], true);

    let wrong_method = send(&app, Method::Get, "/users").await;
    assert_eq!(wrong_method.status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(wrong_method.headers["allow"], "POST");

    assert_eq!(log.entries(), ["global terminator", "global terminator"]);
    Ok(())
}

#[tokio::test]
async fn params_and_data_flow_through_the_context() -> Result<(), Error> {
    let mut router = Router::new(container());
    router
        .get("/users/:id", |ctx: Context| async move {
            json!({
                "id": ctx.param("id"),
                "user": ctx.data("user"),
                "route": ctx.route().name,
            })
        })
        .as_name("users.show")
        .middleware(from_fn(|ctx: Context| async move {
            ctx.set_data("user", "alice");
        }))?;

    let sent = send(&app(Kernel::new(container()), router), Method::Get, "/users/7").await;
    assert_eq!(json_body(&sent), &json!({ "id": "7", "user": "alice", "route": "users.show" }));
    Ok(())
}

#[tokio::test]
async fn registered_controllers_serve_resources() -> Result<(), Error> {
    let mut kernel = Kernel::new(container());
    kernel.register_controller(Registration::new("UserController"), |_| {
        Controller::new("UserController")
            .action("index", |_ctx: Context| async { json!([]) })
            .action("show", |ctx: Context| async move {
                json!({ "id": ctx.param("user") })
            })
    })?;

    let mut router = Router::new(kernel.container().clone());
    router
        .resource("/users", "UserController")
        .only(&[trellis::ResourceAction::Index, trellis::ResourceAction::Show])
        .param_name("user");
    let app = app(kernel, router);

    let sent = send(&app, Method::Get, "/users/12").await;
    assert_eq!(json_body(&sent), &json!({ "id": "12" }));
    let sent = send(&app, Method::Head, "/users").await;
    assert_eq!(sent.status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn registered_global_middleware_runs_once_per_request() -> Result<(), Error> {
    let log = Log::default();
    let mut kernel = Kernel::new(container());
    for _ in 0..3 {
        let log = log.clone();
        kernel.register_middleware(Registration::new("count").global(), move |_| log.step("count"))?;
    }

    let mut router = Router::new(kernel.container().clone());
    router.get("/", ok);
    send(&app(kernel, router), Method::Get, "/").await;
    assert_eq!(log.entries(), ["count"]);
    Ok(())
}

#[tokio::test]
async fn debug_mode_exposes_internal_messages() -> Result<(), Error> {
    let mut config = trellis::AppConfig::default();
    config.http.debug = true;

    let mut router = Router::new(container());
    router.get("/", |_ctx: Context| async {
        "x".parse::<u32>().map(|n| n.to_string())
    });

    let sent = send(&app(Kernel::from_config(container(), &config), router), Method::Get, "/").await;
    let body = json_body(&sent);
    assert_eq!(sent.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["message"], "invalid digit found in string");
    assert!(body["stack"].is_array());
    Ok(())
}

#[tokio::test]
async fn global_interceptors_and_terminators_run_before_route_ones() -> Result<(), Error> {
    let log = Log::default();
    let mut router = Router::new(container());
    router
        .get("/", |_ctx: Context| async { json!({ "seen": [] }) })
        .intercept(Seen("route"))?
        .terminate(log.step("route"))?;

    let mut kernel = Kernel::new(container());
    kernel.intercept(Seen("global"))?.terminate(log.step("global"))?;

    let sent = send(&app(kernel, router), Method::Get, "/").await;
    assert_eq!(json_body(&sent)["seen"], json!(["global", "route"]));
    assert_eq!(log.entries(), ["global", "route"]);
    Ok(())
}

#[tokio::test]
async fn failing_handle_middleware_skips_the_rest_of_the_chain() -> Result<(), Error> {
    let log = Log::default();
    let mut router = Router::new(container());
    let handler_log = log.clone();
    router
        .get("/", move |_ctx: Context| {
            let log = handler_log.clone();
            async move {
                log.push("handler");
                "ok"
            }
        })
        .middleware(from_fn(|_ctx: Context| async {
            Err::<(), _>(HttpError::new(StatusCode::FORBIDDEN, "not yours"))
        }))?
        .middleware(log.step("after guard"))?
        .intercept(Tag("intercepted"))?
        .terminate(log.step("terminated"))?;

    let sent = send(&app(Kernel::new(container()), router), Method::Get, "/").await;
    assert_eq!(sent.status, StatusCode::FORBIDDEN);
    let body = json_body(&sent);
    assert_eq!(body["message"], "not yours");
    assert_eq!(body["intercepted"], true);
    assert_eq!(log.entries(), ["terminated"]);
    Ok(())
}

#[tokio::test]
async fn failing_interceptor_renders_its_error_and_skips_the_rest() -> Result<(), Error> {
    let log = Log::default();
    let mut router = Router::new(container());
    router
        .get("/", |_ctx: Context| async { json!({ "data": 1 }) })
        .intercept(Tag("first"))?
        .intercept(from_fn(|_ctx: Context, _body: Body| async {
            Err::<Body, _>(HttpError::new(StatusCode::CONFLICT, "stale version"))
        }))?
        .intercept(Tag("skipped"))?
        .terminate(log.step("terminated"))?;

    let sent = send(&app(Kernel::new(container()), router), Method::Get, "/").await;
    assert_eq!(sent.status, StatusCode::CONFLICT);
    let body = json_body(&sent);
    assert_eq!(body["message"], "stale version");
    assert!(body.get("first").is_none());
    assert!(body.get("skipped").is_none());
    assert_eq!(log.entries(), ["terminated"]);
    Ok(())
}

#[tokio::test]
async fn panicking_interceptor_becomes_an_internal_error() -> Result<(), Error> {
    let log = Log::default();
    let mut router = Router::new(container());
    router
        .get("/", ok)
        .intercept(from_fn(|_ctx: Context, body: Body| async move {
            if true {
                panic!("interceptor exploded");
            }
            body
        }))?
        .terminate(log.step("terminated"))?;

    let sent = send(&app(Kernel::new(container()), router), Method::Get, "/").await;
    assert_eq!(sent.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json_body(&sent)["code"], "E_RUNTIME_EXCEPTION");
    assert_eq!(log.entries(), ["terminated"]);
    Ok(())
}

#[tokio::test]
async fn panicking_terminator_does_not_stop_the_next_one() -> Result<(), Error> {
    let log = Log::default();
    let mut router = Router::new(container());
    router
        .get("/", ok)
        .terminate(from_fn(|_ctx: Context| async {
            if true {
                panic!("terminator exploded");
            }
        }))?
        .terminate(log.step("after panic"))?;

    let sent = send(&app(Kernel::new(container()), router), Method::Get, "/").await;
    assert_eq!(sent.status, StatusCode::OK);
    assert_eq!(log.entries(), ["after panic"]);
    Ok(())
}

struct Exploding;

#[async_trait]
impl ExceptionHandler for Exploding {
    async fn handle(&self, _error: HttpError, _ctx: &Context) {
        if true {
            panic!("renderer exploded");
        }
    }
}

#[tokio::test]
async fn panicking_exception_handler_falls_back_to_the_default() -> Result<(), Error> {
    let log = Log::default();
    let mut router = Router::new(container());
    router
        .get("/", |_ctx: Context| async {
            Err::<Json<Value>, _>(HttpError::unprocessable("bad input"))
        })
        .terminate(log.step("terminated"))?;

    let mut kernel = Kernel::new(container());
    kernel.set_exception_handler(Exploding);

    let sent = send(&app(kernel, router), Method::Get, "/").await;
    assert_eq!(sent.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json_body(&sent)["code"], "E_RUNTIME_EXCEPTION");
    assert_eq!(log.entries(), ["terminated"]);
    Ok(())
}
