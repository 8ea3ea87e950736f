//! Default hyper transport, exercised over real sockets

use minima_core::*;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

async fn raw_request(host: &str, port: u16, request: &str) -> String {
    let mut stream = TcpStream::connect((host, port)).await.expect("connect");
    stream.write_all(request.as_bytes()).await.expect("write");
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await.expect("read");
    String::from_utf8_lossy(&buf).into_owned()
}

#[tokio::test]
async fn test_http_adapter_serves_requests() {
    let app = App::new();
    app.get("/ping", |_ctx| async { "pong" }).unwrap();

    let address = app
        .listen(ListenOptions::new(0).with_host("127.0.0.1"))
        .await
        .unwrap();
    assert_eq!(address.protocol, "http");
    assert_eq!(address.family, "IPv4");
    assert!(address.port != 0);

    let reply = raw_request(
        &address.hostname,
        address.port,
        "GET /ping HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
    )
    .await;
    assert!(reply.starts_with("HTTP/1.1 200"), "reply was: {}", reply);
    assert!(reply.ends_with("pong"), "reply was: {}", reply);

    app.close().await.unwrap();
}

#[tokio::test]
async fn test_http_adapter_json_and_params() {
    let app = App::new();
    app.get("/users/:id", |ctx: Context| async move {
        serde_json::json!({ "id": ctx.param("id").unwrap_or_default() })
    })
    .unwrap();

    let address = app
        .listen(ListenOptions::new(0).with_host("127.0.0.1"))
        .await
        .unwrap();

    let reply = raw_request(
        &address.hostname,
        address.port,
        "GET /users/77 HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
    )
    .await;
    assert!(reply.starts_with("HTTP/1.1 200"), "reply was: {}", reply);
    assert!(reply.contains("content-type: application/json"), "reply was: {}", reply);
    assert!(reply.ends_with(r#"{"id":"77"}"#), "reply was: {}", reply);

    app.close().await.unwrap();
}

#[tokio::test]
async fn test_http_adapter_post_body_roundtrip() {
    let app = App::new();
    app.register(body_parser(BodyParserOptions::default())).unwrap();
    app.post("/echo", |ctx: Context| async move {
        match parsed_body(&ctx).as_deref() {
            Some(ParsedBody::Json(value)) => value.clone(),
            _ => serde_json::Value::Null,
        }
    })
    .unwrap();

    let address = app
        .listen(ListenOptions::new(0).with_host("127.0.0.1"))
        .await
        .unwrap();

    let body = r#"{"msg":"hi"}"#;
    let request = format!(
        "POST /echo HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    let reply = raw_request(&address.hostname, address.port, &request).await;
    assert!(reply.starts_with("HTTP/1.1 200"), "reply was: {}", reply);
    assert!(reply.ends_with(r#"{"msg":"hi"}"#), "reply was: {}", reply);

    app.close().await.unwrap();
}

#[tokio::test]
async fn test_listen_hooks_run_after_bind() {
    let app = App::new();
    let log: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

    let l = log.clone();
    app.on_listen(move |_scope| {
        let l = l.clone();
        async move {
            l.lock().push("listen");
            Ok(())
        }
    })
    .unwrap();
    let l = log.clone();
    app.on_ready(move |_scope| {
        let l = l.clone();
        async move {
            l.lock().push("ready");
            Ok(())
        }
    })
    .unwrap();

    app.listen(ListenOptions::new(0).with_host("127.0.0.1"))
        .await
        .unwrap();
    assert_eq!(*log.lock(), vec!["ready", "listen"]);
    app.close().await.unwrap();
}

#[tokio::test]
async fn test_close_stops_accepting_connections() {
    let app = App::new();
    app.get("/x", |_ctx| async { "x" }).unwrap();

    let address = app
        .listen(ListenOptions::new(0).with_host("127.0.0.1"))
        .await
        .unwrap();
    app.close().await.unwrap();

    // The accept loop exits and drops the listener; give it a moment.
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    let connect = TcpStream::connect((address.hostname.as_str(), address.port)).await;
    assert!(connect.is_err());
}

#[tokio::test]
async fn test_unknown_route_over_the_wire() {
    let app = App::new();

    let address = app
        .listen(ListenOptions::new(0).with_host("127.0.0.1"))
        .await
        .unwrap();

    let reply = raw_request(
        &address.hostname,
        address.port,
        "GET /ghost HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
    )
    .await;
    assert!(reply.starts_with("HTTP/1.1 404"), "reply was: {}", reply);

    app.close().await.unwrap();
}
