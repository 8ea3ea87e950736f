//! Scope isolation: prefixes, hook visibility, descriptor accumulation

use minima_core::*;
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn test_nested_prefix_composition() {
    let app = App::new();
    app.register_with(
        Plugin::new_sync("api", |scope, _opts| {
            scope.register_with(
                Plugin::new_sync("v1", |scope, _opts| {
                    scope.get("/users", |_ctx| async { "users" })
                }),
                PluginOptions::new().with_prefix("/v1"),
            )
        }),
        PluginOptions::new().with_prefix("/api"),
    )
    .unwrap();
    app.ready().await.unwrap();

    let resp = app.handle(HttpRequest::get("/api/v1/users")).await.unwrap();
    assert_eq!(resp.status, 200);
    assert_eq!(resp.body_ref(), b"users");

    // The unprefixed path does not exist.
    let resp = app.handle(HttpRequest::get("/users")).await.unwrap();
    assert_eq!(resp.status, 404);
}

#[tokio::test]
async fn test_skip_override_routes_are_owned_by_parent() {
    let app = App::new();
    app.register_with(
        Plugin::new_sync("cross", |scope, _opts| {
            scope.get("/injected", |_ctx| async { "from parent scope" })
        })
        .skip_override(),
        // The prefix is ignored because no child scope is created.
        PluginOptions::new().with_prefix("/ignored"),
    )
    .unwrap();
    app.ready().await.unwrap();

    let resp = app.handle(HttpRequest::get("/injected")).await.unwrap();
    assert_eq!(resp.status, 200);
}

#[tokio::test]
async fn test_child_hooks_invisible_to_parent_routes() {
    let app = App::new();
    let hook_runs = Arc::new(Mutex::new(0u32));

    let runs = hook_runs.clone();
    app.register(Plugin::new_sync("child", move |scope, _opts| {
        let runs = runs.clone();
        scope.on_request(move |_ctx| {
            let runs = runs.clone();
            async move {
                *runs.lock() += 1;
                Ok(None)
            }
        })?;
        scope.get("/in-child", |_ctx| async { "child" })
    }))
    .unwrap();
    app.get("/in-root", |_ctx| async { "root" }).unwrap();
    app.ready().await.unwrap();

    app.handle(HttpRequest::get("/in-root")).await.unwrap();
    assert_eq!(*hook_runs.lock(), 0);

    app.handle(HttpRequest::get("/in-child")).await.unwrap();
    assert_eq!(*hook_runs.lock(), 1);
}

#[tokio::test]
async fn test_root_hooks_visible_to_child_routes() {
    let app = App::new();
    let hook_runs = Arc::new(Mutex::new(0u32));

    let runs = hook_runs.clone();
    app.on_request(move |_ctx| {
        let runs = runs.clone();
        async move {
            *runs.lock() += 1;
            Ok(None)
        }
    })
    .unwrap();

    app.register(Plugin::new_sync("child", |scope, _opts| {
        scope.get("/nested", |_ctx| async { "ok" })
    }))
    .unwrap();
    app.ready().await.unwrap();

    app.handle(HttpRequest::get("/nested")).await.unwrap();
    assert_eq!(*hook_runs.lock(), 1);
}

#[tokio::test]
async fn test_hooks_aggregate_innermost_first() {
    let app = App::new();
    let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

    let o = order.clone();
    app.on_request(move |_ctx| {
        let o = o.clone();
        async move {
            o.lock().push("root");
            Ok(None)
        }
    })
    .unwrap();

    let o = order.clone();
    app.register(Plugin::new_sync("child", move |scope, _opts| {
        let o = o.clone();
        scope.on_request(move |_ctx| {
            let o = o.clone();
            async move {
                o.lock().push("child");
                Ok(None)
            }
        })?;
        scope.get("/deep", |_ctx| async { "ok" })
    }))
    .unwrap();
    app.ready().await.unwrap();

    app.handle(HttpRequest::get("/deep")).await.unwrap();
    assert_eq!(*order.lock(), vec!["child", "root"]);
}

#[tokio::test]
async fn test_innermost_error_hook_wins() {
    let app = App::new();

    app.on_error(|_err, _ctx| async { Payload::json(&json!({"handled_by": "root"})) })
        .unwrap();

    app.register(Plugin::new_sync("child", |scope, _opts| {
        scope.on_error(|_err, _ctx| async { Payload::json(&json!({"handled_by": "child"})) })?;
        scope.get("/fail", |_ctx| async {
            Err::<(), Error>(Error::http(400, "nope"))
        })
    }))
    .unwrap();
    app.get("/root-fail", |_ctx| async {
        Err::<(), Error>(Error::http(400, "nope"))
    })
    .unwrap();
    app.ready().await.unwrap();

    let resp = app.handle(HttpRequest::get("/fail")).await.unwrap();
    let body: serde_json::Value = resp.json().unwrap();
    assert_eq!(body["handled_by"], "child");

    let resp = app.handle(HttpRequest::get("/root-fail")).await.unwrap();
    let body: serde_json::Value = resp.json().unwrap();
    assert_eq!(body["handled_by"], "root");
}

#[tokio::test]
async fn test_scope_descriptors_reach_routes_registered_below() {
    let app = App::new();
    app.add_descriptor(RouteDescriptor::meta("audit", json!(true)))
        .unwrap();

    let observed = Arc::new(Mutex::new(None));
    let o = observed.clone();
    app.register(Plugin::new_sync("child", move |scope, _opts| {
        let o = o.clone();
        scope.get("/traced", move |ctx: Context| {
            let o = o.clone();
            async move {
                let route = ctx.route().unwrap();
                *o.lock() = route.meta("audit").cloned();
                "ok"
            }
        })
    }))
    .unwrap();
    app.ready().await.unwrap();

    app.handle(HttpRequest::get("/traced")).await.unwrap();
    assert_eq!(*observed.lock(), Some(json!(true)));
}

#[tokio::test]
async fn test_per_route_descriptor_overrides_scope_descriptor() {
    let app = App::new();
    app.add_descriptor(RouteDescriptor::meta("tier", json!("default")))
        .unwrap();
    app.route(
        RouteConfig::get("/special").describe(RouteDescriptor::meta("tier", json!("gold"))),
        |ctx: Context| async move {
            let route = ctx.route().unwrap();
            route.meta("tier").cloned().unwrap_or(json!(null))
        },
    )
    .unwrap();
    app.ready().await.unwrap();

    let resp = app.handle(HttpRequest::get("/special")).await.unwrap();
    let body: serde_json::Value = resp.json().unwrap();
    assert_eq!(body, json!("gold"));
}

#[tokio::test]
async fn test_mutator_descriptor_edits_route_record() {
    let app = App::new();
    app.route(
        RouteConfig::get("/mutated").describe(RouteDescriptor::mutate(|route| {
            route.metadata.insert("stamped", json!("yes"));
        })),
        |ctx: Context| async move {
            ctx.route()
                .unwrap()
                .meta("stamped")
                .cloned()
                .unwrap_or(json!(null))
        },
    )
    .unwrap();
    app.ready().await.unwrap();

    let resp = app.handle(HttpRequest::get("/mutated")).await.unwrap();
    let body: serde_json::Value = resp.json().unwrap();
    assert_eq!(body, json!("yes"));
}

#[tokio::test]
async fn test_ambient_context_matches_request() {
    let app = App::new();
    app.get("/ambient/:id", |_ctx| async {
        // Reached through the task-local, not the handler argument.
        let ctx = Context::current().expect("ambient context in handler task");
        ctx.param("id").unwrap_or_default().to_string()
    })
    .unwrap();
    app.ready().await.unwrap();

    let resp = app.handle(HttpRequest::get("/ambient/9")).await.unwrap();
    assert_eq!(resp.body_ref(), b"9");
    assert!(Context::current().is_none());
}

#[tokio::test]
async fn test_duplicate_route_fails_registration() {
    let app = App::new();
    app.get("/dup", |_ctx| async { "a" }).unwrap();
    let err = app.get("/dup", |_ctx| async { "b" }).unwrap_err();
    assert!(matches!(err, Error::DuplicateRoute { .. }));
}

#[tokio::test]
async fn test_trailing_slash_equivalence_through_app() {
    let app = App::new();
    app.get("/foo", |_ctx| async { "ok" }).unwrap();
    app.ready().await.unwrap();

    let resp = app.handle(HttpRequest::get("/foo/")).await.unwrap();
    assert_eq!(resp.status, 200);

    let strict = App::with_trailing_slash(TrailingSlash::Strict);
    strict.get("/foo", |_ctx| async { "ok" }).unwrap();
    strict.ready().await.unwrap();
    let resp = strict.handle(HttpRequest::get("/foo/")).await.unwrap();
    assert_eq!(resp.status, 404);
}

#[tokio::test]
async fn test_provided_state_reachable_from_handlers() {
    struct Greeting(&'static str);

    let app = App::new();
    app.provide(Greeting("hello from the container")).unwrap();
    app.register(Plugin::new_sync("child", |scope, _opts| {
        scope.get("/greet", |ctx: Context| async move {
            let greeting = ctx.app().resolve::<Greeting>().unwrap();
            greeting.0
        })
    }))
    .unwrap();
    app.ready().await.unwrap();

    let resp = app.handle(HttpRequest::get("/greet")).await.unwrap();
    assert_eq!(resp.body_ref(), b"hello from the container");
}
