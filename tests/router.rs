mod common;

use common::{container, ok};
use trellis::{
    Action, Context, Controller, Error, Kernel, Method, Registration, ResourceAction, Router,
};

#[test]
fn listed_urls_are_normalised() {
    let mut router = Router::new(container());
    router.get("//a//b/", ok);
    router.post("/", ok);
    router.put("users/:id/", ok);

    let urls: Vec<_> = router.list().into_iter().map(|r| r.url).collect();
    assert_eq!(urls, ["/a/b", "/", "/users/{id}"]);
}

#[test]
fn get_also_answers_head() {
    let mut router = Router::new(container());
    router.get("/", ok);
    assert_eq!(router.list()[0].methods, [Method::Get, Method::Head]);
}

#[test]
fn group_prefix_reaches_every_route_in_order() -> Result<(), Error> {
    let mut router = Router::new(container());
    router
        .group(|r| {
            r.get("/a", ok).as_name("a");
            r.get("/b", ok).as_name("b");
            Ok(())
        })?
        .prefix("/api");

    let listed = router.list();
    let urls: Vec<_> = listed.iter().map(|r| r.url.as_str()).collect();
    let names: Vec<_> = listed.iter().map(|r| r.name.as_deref()).collect();
    assert_eq!(urls, ["/api/a", "/api/b"]);
    assert_eq!(names, [Some("a"), Some("b")]);
    Ok(())
}

#[test]
fn nested_groups_apply_outer_prefix_outermost() -> Result<(), Error> {
    let mut router = Router::new(container());
    router
        .group(|r| {
            r.group(|r| {
                r.get("/{id}", ok).as_name("show");
                Ok(())
            })?
            .prefix("/users")
            .as_name("users")?;
            r.get("/status", ok).as_name("status");
            Ok(())
        })?
        .prefix("/v1")
        .as_name("v1")?;

    let listed = router.list();
    assert_eq!(listed[0].url, "/v1/users/{id}");
    assert_eq!(listed[0].name.as_deref(), Some("v1.users.show"));
    assert_eq!(listed[1].url, "/v1/status");
    assert_eq!(listed[1].name.as_deref(), Some("v1.status"));
    Ok(())
}

#[test]
fn naming_a_group_with_an_unnamed_route_fails_without_renaming() -> Result<(), Error> {
    let mut router = Router::new(container());
    let err = router
        .group(|r| {
            r.get("/a", ok).as_name("a");
            r.get("/anonymous", ok);
            Ok(())
        })?
        .as_name("api")
        .err()
        .expect("naming should fail");

    assert!(matches!(&err, Error::GroupName { url, .. } if url == "/anonymous"));
    assert!(err.to_string().starts_with("cannot define group name"));
    assert_eq!(router.list()[0].name.as_deref(), Some("a"));
    Ok(())
}

#[test]
fn unknown_middleware_name_reports_short_and_full_alias() -> Result<(), Error> {
    let mut router = Router::new(container());
    let err = router
        .group(|r| {
            r.get("/a", ok);
            Ok(())
        })?
        .middleware("auth")
        .err()
        .expect("auth is not registered");

    match &err {
        Error::MiddlewareNotFound { phase, name, alias } => {
            assert_eq!(*phase, "handle");
            assert_eq!(name, "auth");
            assert_eq!(alias, "App/Middleware/auth");
        }
        other => panic!("unexpected error: {other}"),
    }
    let message = err.to_string();
    assert!(message.contains("`auth`") && message.contains("App/Middleware/auth"));
    Ok(())
}

#[test]
fn group_middleware_is_attached_once_per_route() -> Result<(), Error> {
    let log = common::Log::default();
    let mut router = Router::new(container());
    router
        .group(|r| {
            r.get("/a", ok);
            r.group(|r| {
                r.get("/b", ok);
                Ok(())
            })?;
            Ok(())
        })?
        .middleware(log.step("outer"))?;

    for route in router.list() {
        assert_eq!(route.middleware.handle.len(), 1, "{}", route.url);
    }
    Ok(())
}

#[test]
fn resource_declares_five_named_routes() {
    let mut router = Router::new(container());
    router.resource("/users/:user/posts", "PostController");

    let listed = router.list();
    let rows: Vec<_> = listed
        .iter()
        .map(|r| (r.name.as_deref().unwrap_or(""), r.url.as_str(), r.handler.as_str()))
        .collect();
    assert_eq!(
        rows,
        [
            ("users.posts.index", "/users/{user}/posts", "PostController.index"),
            ("users.posts.store", "/users/{user}/posts", "PostController.store"),
            ("users.posts.show", "/users/{user}/posts/{id}", "PostController.show"),
            ("users.posts.update", "/users/{user}/posts/{id}", "PostController.update"),
            ("users.posts.delete", "/users/{user}/posts/{id}", "PostController.delete"),
        ]
    );
    assert_eq!(listed[3].methods, [Method::Put, Method::Patch]);
}

#[test]
fn resource_options_shape_the_routes() {
    let mut router = Router::new(container());
    router
        .resource("/photos", "PhotoController")
        .only(&[ResourceAction::Index, ResourceAction::Show])
        .as_name("gallery")
        .param_name("photo");

    let listed = router.list();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[1].name.as_deref(), Some("gallery.show"));
    assert_eq!(listed[1].url, "/photos/{photo}");
}

fn user_controller(actions: &[&'static str]) -> Controller {
    actions.iter().fold(Controller::new("UserController"), |c, &action| {
        c.action(action, move |_ctx: Context| async move { action })
    })
}

#[test]
fn resource_requires_its_controller_actions() -> Result<(), Error> {
    let mut kernel = Kernel::new(container());
    kernel.register_controller(Registration::new("UserController"), |_| {
        user_controller(&["index", "show"])
    })?;

    let mut router = Router::new(kernel.container().clone());
    router.resource("/users", "UserController");
    let err = router.build().expect_err("store is missing");
    assert!(matches!(err, Error::ActionNotFound { ref action, .. } if action == "store"));

    let mut router = Router::new(kernel.container().clone());
    router
        .resource("/users", "UserController")
        .except(&[ResourceAction::Store, ResourceAction::Update, ResourceAction::Delete]);
    assert_eq!(router.build()?.len(), 2);
    Ok(())
}

#[test]
fn unknown_controller_is_a_build_error() {
    let mut router = Router::new(container());
    router.get("/users", Action::parse("UserController.index"));
    let err = router.build().expect_err("nothing is registered");
    assert!(matches!(
        err,
        Error::ControllerNotFound { ref alias, .. } if alias == "App/Controllers/UserController"
    ));
}

#[test]
fn namespace_changes_the_controller_alias() -> Result<(), Error> {
    let mut kernel = Kernel::new(container());
    kernel.register_controller(
        Registration::new("UserController").alias("App/Controllers/Admin/UserController"),
        |_| user_controller(&["index"]),
    )?;

    let mut router = Router::new(kernel.container().clone());
    router
        .group(|r| {
            r.get("/users", Action::parse("UserController.index"));
            Ok(())
        })?
        .namespace("Admin");
    assert_eq!(router.build()?.len(), 1);
    Ok(())
}

#[test]
fn url_for_builds_named_urls() -> Result<(), Error> {
    let mut router = Router::new(container());
    router
        .group(|r| {
            r.get("/users/:id", ok).as_name("users.show");
            Ok(())
        })?
        .prefix("/api")
        .as_name("api")?;

    let table = router.build()?;
    assert_eq!(table.url_for("api.users.show", &[("id", "7")])?, "/api/users/7");
    assert!(matches!(table.url_for("users.show", &[]), Err(Error::UrlFor { .. })));
    Ok(())
}

#[test]
fn duplicate_method_and_url_fail_the_build() {
    let mut router = Router::new(container());
    router.get("/a", ok);
    router.route(&[Method::Head], "/a/", ok);

    let err = router.build().expect_err("HEAD /a is declared twice");
    assert!(matches!(err, Error::DuplicateRoute { method: Method::Head, ref url } if url == "/a"));
}

#[test]
fn removed_routes_are_neither_listed_nor_mounted() -> Result<(), Error> {
    let mut router = Router::new(container());
    router.get("/a", ok);
    router.get("/a", ok).remove();

    assert_eq!(router.list().len(), 1);
    assert_eq!(router.build()?.len(), 1);
    Ok(())
}

#[test]
fn listing_serialises_for_tooling() {
    let mut router = Router::new(container());
    router.post("/users", ok).as_name("users.store");

    let json = serde_json::to_value(router.list()).unwrap();
    assert_eq!(json[0]["methods"], serde_json::json!(["POST"]));
    assert_eq!(json[0]["name"], "users.store");
    assert_eq!(json[0]["middleware"]["handle"], serde_json::json!([]));
}

#[test]
fn root_resource_names_are_bare_actions() {
    let mut router = Router::new(container());
    router.resource("/", "HomeController");

    let names: Vec<_> = router.list().into_iter().filter_map(|r| r.name).collect();
    assert_eq!(names, ["index", "store", "show", "update", "delete"]);
}

#[test]
fn removed_routes_do_not_block_group_names() -> Result<(), Error> {
    let mut router = Router::new(container());
    router
        .group(|r| {
            r.get("/a", ok).as_name("a");
            r.get("/draft", ok).remove();
            Ok(())
        })?
        .as_name("api")?;

    let names: Vec<_> = router.list().into_iter().map(|r| r.name).collect();
    assert_eq!(names, [Some("api.a".to_owned())]);
    Ok(())
}

#[test]
fn only_does_not_restore_removed_actions() {
    let mut router = Router::new(container());
    router
        .resource("/photos", "PhotoController")
        .except(&[ResourceAction::Show])
        .only(&[ResourceAction::Index, ResourceAction::Show]);

    let names: Vec<_> = router.list().into_iter().filter_map(|r| r.name).collect();
    assert_eq!(names, ["photos.index"]);
}
