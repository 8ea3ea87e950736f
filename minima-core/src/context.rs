// Per-request context and ambient task-local lookup

use parking_lot::RwLock;
use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::http::{path_span, HttpRequest};
use crate::locals::Locals;
use crate::router::Route;
use crate::scope::Scope;

tokio::task_local! {
    static CURRENT_CONTEXT: Context;
}

/// URL scheme hint recorded by proxy extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

/// Mutable response state accumulated while a request is processed.
///
/// The dispatcher reads it when it builds the final response; by the time
/// `sent` hooks run, `status` reflects the status actually written.
#[derive(Debug, Clone, Default)]
pub struct ResponseState {
    pub status: Option<u16>,
    pub status_text: Option<String>,
    pub headers: HashMap<String, String>,
}

/// Server-derived request metadata: proxy hints plus the cached path offsets
/// used to reconstruct the full URL after proxy rewrites.
#[derive(Debug, Clone)]
struct ServerMeta {
    proto_hint: Option<Scheme>,
    host_hint: Option<String>,
    path_start: usize,
    path_end: usize,
}

/// Inputs the adapter may thread into a request's context.
#[derive(Default)]
pub struct ContextOverrides {
    pub remote_addr: Option<SocketAddr>,
    pub cancel: Option<CancellationToken>,
}

struct ContextInner {
    app: Scope,
    request: HttpRequest,
    route: Option<Arc<Route>>,
    params: HashMap<String, String>,
    locals: RwLock<Locals>,
    response: RwLock<ResponseState>,
    meta: RwLock<ServerMeta>,
    cancel: CancellationToken,
    remote_addr: Option<SocketAddr>,
}

/// The per-request record.
///
/// Cheap to clone; lives from dispatch entry until the `sent` hooks have
/// completed. Retrievable without parameter threading via
/// [`Context::current`] anywhere inside the request task.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

impl Context {
    pub(crate) fn for_request(
        app: Scope,
        request: HttpRequest,
        route: Option<Arc<Route>>,
        params: HashMap<String, String>,
        overrides: ContextOverrides,
    ) -> Self {
        let (path_start, path_end) = path_span(request.uri());
        Self {
            inner: Arc::new(ContextInner {
                app,
                request,
                route,
                params,
                locals: RwLock::new(Locals::new()),
                response: RwLock::new(ResponseState::default()),
                meta: RwLock::new(ServerMeta {
                    proto_hint: None,
                    host_hint: None,
                    path_start,
                    path_end,
                }),
                cancel: overrides.cancel.unwrap_or_default(),
                remote_addr: overrides.remote_addr,
            }),
        }
    }

    /// The context of the request the current task is serving, if any.
    ///
    /// Returns `None` outside a request task. Nested calls within the same
    /// task observe the same context.
    pub fn current() -> Option<Context> {
        CURRENT_CONTEXT.try_with(|ctx| ctx.clone()).ok()
    }

    /// Run a future with this context installed as the ambient one.
    pub(crate) async fn run_scoped<F, T>(&self, fut: F) -> T
    where
        F: Future<Output = T>,
    {
        CURRENT_CONTEXT.scope(self.clone(), fut).await
    }

    /// The scope owning the matched route, or the root when none matched.
    pub fn app(&self) -> Scope {
        self.inner.app.clone()
    }

    pub fn request(&self) -> &HttpRequest {
        &self.inner.request
    }

    pub fn route(&self) -> Option<Arc<Route>> {
        self.inner.route.clone()
    }

    pub fn method(&self) -> crate::http::Method {
        self.inner.request.method
    }

    /// The path component, from the offsets cached at context creation.
    pub fn path(&self) -> &str {
        let meta = self.inner.meta.read();
        &self.inner.request.uri()[meta.path_start..meta.path_end]
    }

    pub fn header(&self, name: &str) -> Option<String> {
        self.inner.request.header(name).map(|s| s.to_string())
    }

    pub fn params(&self) -> &HashMap<String, String> {
        &self.inner.params
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.inner.params.get(name).map(|s| s.as_str())
    }

    pub fn query(&self, name: &str) -> Option<String> {
        self.inner.request.query(name)
    }

    // ------------------------------------------------------------------
    // Locals
    // ------------------------------------------------------------------

    pub fn insert_local<T: Send + Sync + 'static>(&self, value: T) {
        self.inner.locals.write().insert(value);
    }

    pub fn local<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.inner.locals.read().get::<T>()
    }

    pub fn remove_local<T: Send + Sync + 'static>(&self) -> bool {
        self.inner.locals.write().remove::<T>()
    }

    // ------------------------------------------------------------------
    // Response state
    // ------------------------------------------------------------------

    pub fn set_status(&self, status: u16) {
        self.inner.response.write().status = Some(status);
    }

    pub fn status(&self) -> Option<u16> {
        self.inner.response.read().status
    }

    pub fn set_status_text(&self, text: impl Into<String>) {
        self.inner.response.write().status_text = Some(text.into());
    }

    pub fn set_header(&self, name: impl AsRef<str>, value: impl Into<String>) {
        self.inner
            .response
            .write()
            .headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
    }

    /// Set a response header only if it is not already present.
    pub fn set_default_header(&self, name: impl AsRef<str>, value: impl Into<String>) {
        let key = name.as_ref().to_ascii_lowercase();
        let mut state = self.inner.response.write();
        state.headers.entry(key).or_insert_with(|| value.into());
    }

    pub fn response_header(&self, name: &str) -> Option<String> {
        self.inner
            .response
            .read()
            .headers
            .get(&name.to_ascii_lowercase())
            .cloned()
    }

    pub(crate) fn response_state(&self) -> ResponseState {
        self.inner.response.read().clone()
    }

    // ------------------------------------------------------------------
    // Cancellation and connection metadata
    // ------------------------------------------------------------------

    /// The cancellation token tied to the request connection.
    pub fn cancellation(&self) -> CancellationToken {
        self.inner.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.inner.remote_addr
    }

    pub fn set_proto_hint(&self, scheme: Scheme) {
        self.inner.meta.write().proto_hint = Some(scheme);
    }

    pub fn proto_hint(&self) -> Option<Scheme> {
        self.inner.meta.read().proto_hint
    }

    pub fn set_host_hint(&self, host: impl Into<String>) {
        self.inner.meta.write().host_hint = Some(host.into());
    }

    pub fn host_hint(&self) -> Option<String> {
        self.inner.meta.read().host_hint.clone()
    }

    /// Reconstruct the request URL, honoring proxy-provided scheme and host
    /// hints over what the socket saw.
    pub fn full_url(&self) -> String {
        let meta = self.inner.meta.read();
        let scheme = meta.proto_hint.unwrap_or_else(|| {
            if self.inner.request.uri().starts_with("https://") {
                Scheme::Https
            } else {
                Scheme::Http
            }
        });
        let host = meta
            .host_hint
            .clone()
            .or_else(|| self.inner.request.header("host").map(|h| h.to_string()))
            .unwrap_or_else(|| "localhost".to_string());
        let target = &self.inner.request.uri()[meta.path_start..];
        format!("{}://{}{}", scheme.as_str(), host, target)
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("method", &self.inner.request.method)
            .field("uri", &self.inner.request.uri())
            .field("route", &self.inner.route.as_ref().map(|r| r.path.clone()))
            .field("params", &self.inner.params)
            .finish()
    }
}
