// Transport adapter: the only contract the dispatcher depends on

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming as IncomingBody;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use parking_lot::Mutex;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

use crate::context::{Context, ContextOverrides};
use crate::error::Error;
use crate::http::{HttpRequest, HttpResponse, Method};
use crate::scope::Scope;

/// Where to bind the transport.
#[derive(Debug, Clone, Default)]
pub struct ListenOptions {
    pub port: u16,
    pub host: Option<String>,
}

impl ListenOptions {
    pub fn new(port: u16) -> Self {
        Self { port, host: None }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }
}

/// The bound address, reported back from `listen`.
#[derive(Debug, Clone)]
pub struct AddressInfo {
    pub hostname: String,
    pub port: u16,
    pub family: String,
    pub protocol: String,
    pub href: String,
}

/// Transport-independent server contract.
///
/// The core never touches sockets directly: it asks the adapter to listen
/// and close, and the adapter feeds requests back through
/// [`Scope::handle_with`].
#[async_trait]
pub trait Adapter: Send + Sync {
    async fn listen(&self, app: Scope, opts: ListenOptions) -> Result<AddressInfo, Error>;

    /// Stop accepting new connections.
    async fn close(&self) -> Result<(), Error>;

    /// The peer address for a request, when the transport knows it.
    fn remote_addr(&self, ctx: &Context) -> Option<SocketAddr> {
        ctx.remote_addr()
    }
}

struct ServerHandle {
    shutdown: watch::Sender<bool>,
    local_addr: SocketAddr,
}

/// Default HTTP/1.1 transport on tokio + hyper.
pub struct HttpAdapter {
    handle: Mutex<Option<ServerHandle>>,
}

impl HttpAdapter {
    pub fn new() -> Self {
        Self {
            handle: Mutex::new(None),
        }
    }

    /// The bound address while listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.handle.lock().as_ref().map(|h| h.local_addr)
    }
}

impl Default for HttpAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Adapter for HttpAdapter {
    async fn listen(&self, app: Scope, opts: ListenOptions) -> Result<AddressInfo, Error> {
        let host = opts.host.unwrap_or_else(|| "0.0.0.0".to_string());
        let addr: SocketAddr = format!("{}:{}", host, opts.port)
            .parse()
            .map_err(|e| Error::Internal(format!("invalid listen address: {}", e)))?;

        debug!(address = %addr, "binding listener");
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        *self.handle.lock() = Some(ServerHandle {
            shutdown: shutdown_tx,
            local_addr,
        });

        tokio::spawn(accept_loop(listener, app, shutdown_rx));

        info!(address = %local_addr, "HTTP server listening");
        Ok(AddressInfo {
            hostname: local_addr.ip().to_string(),
            port: local_addr.port(),
            family: if local_addr.is_ipv4() {
                "IPv4".to_string()
            } else {
                "IPv6".to_string()
            },
            protocol: "http".to_string(),
            href: format!("http://{}:{}/", local_addr.ip(), local_addr.port()),
        })
    }

    async fn close(&self) -> Result<(), Error> {
        if let Some(handle) = self.handle.lock().take() {
            debug!("closing listener");
            let _ = handle.shutdown.send(true);
        }
        Ok(())
    }
}

async fn accept_loop(listener: TcpListener, app: Scope, mut shutdown: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                debug!("listener stopped accepting connections");
                break;
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        trace!(client = %peer, "connection accepted");
                        let app = app.clone();
                        tokio::spawn(async move {
                            serve_connection(stream, peer, app).await;
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "failed to accept connection");
                    }
                }
            }
        }
    }
}

async fn serve_connection(stream: tokio::net::TcpStream, peer: SocketAddr, app: Scope) {
    let io = TokioIo::new(stream);
    let service = service_fn(move |req: Request<IncomingBody>| {
        let app = app.clone();
        async move { handle_hyper_request(app, req, peer).await }
    });

    if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
        error!(error = %e, client = %peer, "error serving connection");
    }
}

async fn handle_hyper_request(
    app: Scope,
    req: Request<IncomingBody>,
    peer: SocketAddr,
) -> Result<Response<Full<Bytes>>, Error> {
    let request = convert_request(req).await?;

    // The token fires if hyper drops this future (client reset); the guard
    // is disarmed once the dispatcher has produced a response.
    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();

    let response = app
        .handle_with(
            request,
            ContextOverrides {
                remote_addr: Some(peer),
                cancel: Some(cancel),
            },
        )
        .await?;

    guard.disarm();
    Ok(convert_response(response))
}

async fn convert_request(req: Request<IncomingBody>) -> Result<HttpRequest, Error> {
    let method = Method::parse(req.method().as_str())
        .ok_or_else(|| Error::http(501, format!("unsupported method {}", req.method())))?;
    let uri = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| req.uri().to_string());

    let mut request = HttpRequest::new(method, uri);
    for (name, value) in req.headers() {
        if let Ok(value) = value.to_str() {
            request.insert_header(name.as_str(), value);
        }
    }

    let body = req
        .into_body()
        .collect()
        .await
        .map_err(|e| Error::Internal(format!("failed to read request body: {}", e)))?
        .to_bytes();
    if !body.is_empty() {
        request = request.with_body(body);
    }
    Ok(request)
}

fn convert_response(response: HttpResponse) -> Response<Full<Bytes>> {
    let mut builder = Response::builder().status(response.status);
    for (name, value) in &response.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
        .body(Full::new(response.into_body_bytes()))
        .unwrap_or_else(|e| {
            error!(error = %e, "failed to build wire response");
            let mut fallback = Response::new(Full::new(Bytes::new()));
            *fallback.status_mut() = http::StatusCode::INTERNAL_SERVER_ERROR;
            fallback
        })
}
