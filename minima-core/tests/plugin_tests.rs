//! Built-in plugin behavior through the full pipeline

use async_trait::async_trait;
use minima_core::*;
use parking_lot::Mutex;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[tokio::test]
async fn test_body_parser_json() {
    let app = App::new();
    app.register(body_parser(BodyParserOptions::default())).unwrap();
    app.post("/echo", |ctx: Context| async move {
        match parsed_body(&ctx).as_deref() {
            Some(ParsedBody::Json(value)) => value.clone(),
            other => json!({ "unexpected": format!("{:?}", other) }),
        }
    })
    .unwrap();
    app.ready().await.unwrap();

    let req = HttpRequest::post("/echo").with_json(&json!({"a": 1})).unwrap();
    let resp = app.handle(req).await.unwrap();
    let body: serde_json::Value = resp.json().unwrap();
    assert_eq!(body, json!({"a": 1}));
}

#[tokio::test]
async fn test_body_parser_form() {
    let app = App::new();
    app.register(body_parser(BodyParserOptions::default())).unwrap();
    app.post("/form", |ctx: Context| async move {
        match parsed_body(&ctx).as_deref() {
            Some(ParsedBody::Form(fields)) => fields.get("name").cloned().unwrap_or_default(),
            _ => "no form".to_string(),
        }
    })
    .unwrap();
    app.ready().await.unwrap();

    let req = HttpRequest::post("/form")
        .with_header("content-type", "application/x-www-form-urlencoded")
        .with_body("name=ada&role=admin");
    let resp = app.handle(req).await.unwrap();
    assert_eq!(resp.body_ref(), b"ada");
}

#[tokio::test]
async fn test_body_parser_text_and_bytes() {
    let app = App::new();
    app.register(body_parser(BodyParserOptions::default())).unwrap();
    app.post("/kind", |ctx: Context| async move {
        match parsed_body(&ctx).as_deref() {
            Some(ParsedBody::Text(_)) => "text",
            Some(ParsedBody::Bytes(_)) => "bytes",
            Some(ParsedBody::Json(_)) => "json",
            Some(ParsedBody::Form(_)) => "form",
            _ => "none",
        }
    })
    .unwrap();
    app.ready().await.unwrap();

    let req = HttpRequest::post("/kind")
        .with_header("content-type", "text/plain")
        .with_body("hi");
    assert_eq!(app.handle(req).await.unwrap().body_ref(), b"text");

    let req = HttpRequest::post("/kind")
        .with_header("content-type", "application/octet-stream")
        .with_body(vec![1u8, 2, 3]);
    assert_eq!(app.handle(req).await.unwrap().body_ref(), b"bytes");
}

#[tokio::test]
async fn test_body_parser_skip_descriptor() {
    let app = App::new();
    app.register(body_parser(BodyParserOptions::default())).unwrap();
    app.route(
        RouteConfig::post("/raw").describe(skip_body_parsing()),
        |ctx: Context| async move {
            match parsed_body(&ctx) {
                None => "skipped",
                Some(_) => "parsed",
            }
        },
    )
    .unwrap();
    app.ready().await.unwrap();

    let req = HttpRequest::post("/raw").with_json(&json!({"a": 1})).unwrap();
    let resp = app.handle(req).await.unwrap();
    assert_eq!(resp.body_ref(), b"skipped");
}

#[tokio::test]
async fn test_body_parser_failure_leaves_sentinel() {
    let app = App::new();
    app.register(body_parser(BodyParserOptions::default())).unwrap();
    app.post("/bad", |ctx: Context| async move {
        match parsed_body(&ctx).as_deref() {
            // Parsing was attempted and failed: the sentinel stays, the
            // request is not rejected.
            Some(ParsedBody::Unparsed) => "attempted",
            other => {
                let _ = other;
                "unexpected"
            }
        }
    })
    .unwrap();
    app.ready().await.unwrap();

    let req = HttpRequest::post("/bad")
        .with_header("content-type", "application/json")
        .with_body("{not json");
    let resp = app.handle(req).await.unwrap();
    assert_eq!(resp.status, 200);
    assert_eq!(resp.body_ref(), b"attempted");
}

#[tokio::test]
async fn test_proxy_ip_extraction_first_strategy() {
    let app = App::new();
    app.register(proxy(ProxyOptions::default())).unwrap();
    app.get("/ip", |ctx: Context| async move {
        client_ip(&ctx).unwrap_or_else(|| "unknown".to_string())
    })
    .unwrap();
    app.ready().await.unwrap();

    let req = HttpRequest::get("/ip")
        .with_header("X-Forwarded-For", "203.0.113.195, 70.41.3.18");
    let resp = app.handle(req).await.unwrap();
    assert_eq!(resp.body_ref(), b"203.0.113.195");
}

#[tokio::test]
async fn test_proxy_host_rewrite_feeds_full_url() {
    let app = App::new();
    app.register(proxy(ProxyOptions::default())).unwrap();
    app.get("/where", |ctx: Context| async move { ctx.full_url() })
        .unwrap();
    app.ready().await.unwrap();

    let req = HttpRequest::get("/where?x=1")
        .with_header("Host", "backend.internal")
        .with_header("X-Forwarded-Host", "www.example.com")
        .with_header("X-Forwarded-Proto", "https");
    let resp = app.handle(req).await.unwrap();
    assert_eq!(resp.body_ref(), b"https://www.example.com/where?x=1");
}

#[tokio::test]
async fn test_cors_preflight_short_circuits() {
    let app = App::new();
    app.register(cors(CorsOptions::new().allow_origin("https://app.example")))
        .unwrap();
    app.get("/data", |_ctx| async { "payload" }).unwrap();
    app.ready().await.unwrap();

    let req = HttpRequest::new(Method::Options, "/data");
    let resp = app.handle(req).await.unwrap();
    assert_eq!(resp.status, 204);
    assert_eq!(
        resp.header("access-control-allow-origin"),
        Some("https://app.example")
    );
    assert!(resp.header("access-control-allow-methods").is_some());
}

#[tokio::test]
async fn test_cors_headers_on_normal_response() {
    let app = App::new();
    app.register(cors(CorsOptions::new())).unwrap();
    app.get("/data", |_ctx| async { "payload" }).unwrap();
    app.ready().await.unwrap();

    let resp = app.handle(HttpRequest::get("/data")).await.unwrap();
    assert_eq!(resp.status, 200);
    assert_eq!(resp.header("access-control-allow-origin"), Some("*"));
}

#[tokio::test]
async fn test_request_logger_is_transparent() {
    let app = App::new();
    app.register(request_logger()).unwrap();
    app.get("/logged", |_ctx| async { "ok" }).unwrap();
    app.ready().await.unwrap();

    let resp = app.handle(HttpRequest::get("/logged")).await.unwrap();
    assert_eq!(resp.status, 200);
    assert_eq!(resp.body_ref(), b"ok");
}

/// Adapter double recording close calls; listen is never used in these
/// tests.
struct RecordingAdapter {
    closed: AtomicBool,
}

#[async_trait]
impl Adapter for RecordingAdapter {
    async fn listen(&self, _app: Scope, _opts: ListenOptions) -> Result<AddressInfo, Error> {
        Err(Error::internal("not a real transport"))
    }

    async fn close(&self) -> Result<(), Error> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn test_close_invokes_adapter_then_close_hooks() {
    let adapter = Arc::new(RecordingAdapter {
        closed: AtomicBool::new(false),
    });
    let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

    let app = App::new();
    app.set_adapter(adapter.clone()).unwrap();

    let o = order.clone();
    app.on_close(move |_scope| {
        let o = o.clone();
        async move {
            o.lock().push("close-hook");
            Ok(())
        }
    })
    .unwrap();
    app.ready().await.unwrap();

    app.close().await.unwrap();
    assert!(adapter.closed.load(Ordering::SeqCst));
    assert_eq!(*order.lock(), vec!["close-hook"]);
}

#[tokio::test]
async fn test_failing_close_hook_does_not_stop_close() {
    let adapter = Arc::new(RecordingAdapter {
        closed: AtomicBool::new(false),
    });
    let second_ran = Arc::new(AtomicBool::new(false));

    let app = App::new();
    app.set_adapter(adapter.clone()).unwrap();
    app.on_close(|_scope| async { Err(Error::internal("cleanup failed")) })
        .unwrap();
    let flag = second_ran.clone();
    app.on_close(move |_scope| {
        let flag = flag.clone();
        async move {
            flag.store(true, Ordering::SeqCst);
            Ok(())
        }
    })
    .unwrap();
    app.ready().await.unwrap();

    app.close().await.unwrap();
    assert!(adapter.closed.load(Ordering::SeqCst));
    assert!(second_ran.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_graceful_shutdown_plugin_registers_cleanly() {
    use std::time::Duration;

    let app = App::new();
    app.register(graceful_shutdown(ShutdownOptions {
        signals: vec![ShutdownSignal::Terminate],
        timeout: Duration::from_millis(100),
    }))
    .unwrap();
    app.get("/alive", |_ctx| async { "yes" }).unwrap();
    app.ready().await.unwrap();

    // The signal task is armed; the app still serves normally.
    let resp = app.handle(HttpRequest::get("/alive")).await.unwrap();
    assert_eq!(resp.body_ref(), b"yes");
}

#[tokio::test]
async fn test_compose_bundles_cross_cutting_plugins() {
    let app = App::new();
    app.register(compose(
        "defaults",
        vec![
            body_parser(BodyParserOptions::default()),
            proxy(ProxyOptions::default()),
            request_logger(),
        ],
    ))
    .unwrap();
    app.post("/combo", |ctx: Context| async move {
        let ip = client_ip(&ctx).unwrap_or_default();
        let parsed = matches!(parsed_body(&ctx).as_deref(), Some(ParsedBody::Json(_)));
        json!({ "ip": ip, "parsed": parsed })
    })
    .unwrap();
    app.ready().await.unwrap();

    let req = HttpRequest::post("/combo")
        .with_header("X-Real-IP", "192.0.2.1")
        .with_json(&json!({"ok": true}))
        .unwrap();
    let resp = app.handle(req).await.unwrap();
    let body: serde_json::Value = resp.json().unwrap();
    assert_eq!(body["ip"], "192.0.2.1");
    assert_eq!(body["parsed"], true);
}
