// Scope tree and the application facade

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use tracing::{debug, error, info};

use crate::adapter::{Adapter, AddressInfo, HttpAdapter, ListenOptions};
use crate::boot::{self, BootEntry};
use crate::container::{CloneSlot, Container, ModuleRef};
use crate::context::Context;
use crate::dispatch;
use crate::error::Error;
use crate::handler::{into_handler, HandlerFn, IntoReply};
use crate::hooks::SendFlow;
use crate::http::{HttpRequest, HttpResponse, Method};
use crate::plugin::{Plugin, PluginOptions};
use crate::router::{Route, RouteDescriptor, Router, TrailingSlash};
use crate::serialize::{Payload, SerializerFn};

/// The root handle of an application is just the root scope.
pub type App = Scope;

/// Options for a dynamic prefix adjustment.
#[derive(Debug, Clone, Default)]
pub struct PrefixOptions {
    /// Route paths the adjustment does not apply to.
    pub exclude: Vec<String>,
}

struct PrefixRule {
    value: String,
    exclude: Vec<String>,
}

/// A node in the plugin registration tree.
pub(crate) struct ScopeNode {
    pub(crate) name: String,
    /// Root-to-here prefix fixed at scope creation.
    base_prefix: String,
    /// Adjustment installed by `Scope::prefix`, applied to later routes.
    dynamic_prefix: RwLock<Option<PrefixRule>>,
    pub(crate) parent: Option<Weak<ScopeNode>>,
    pub(crate) container: RwLock<Container>,
    pub(crate) pending: Mutex<VecDeque<BootEntry>>,
}

impl ScopeNode {
    /// Prefix for a route about to be registered at this scope.
    fn prefix_for_route(&self, path: &str) -> String {
        let rule = self.dynamic_prefix.read();
        match rule.as_ref() {
            Some(rule) if !rule.exclude.iter().any(|p| p == path) => {
                format!("{}{}", self.base_prefix, rule.value)
            }
            _ => self.base_prefix.clone(),
        }
    }

    /// Prefix inherited by a child scope created now.
    fn prefix_for_child(&self) -> String {
        let rule = self.dynamic_prefix.read();
        match rule.as_ref() {
            Some(rule) => format!("{}{}", self.base_prefix, rule.value),
            None => self.base_prefix.clone(),
        }
    }
}

/// Root-owned singletons: the router, the adapter, and lifecycle flags.
pub(crate) struct RootState {
    pub(crate) router: RwLock<Router>,
    adapter: RwLock<Arc<dyn Adapter>>,
    /// Registration surface closed; set once boot completes.
    pub(crate) frozen: AtomicBool,
    /// `ready()` ran to completion.
    pub(crate) ready_done: AtomicBool,
    root_node: OnceLock<Arc<ScopeNode>>,
}

/// A scope in the registration tree; the root scope doubles as the
/// application handle.
///
/// Cloning is cheap and clones share the same underlying node.
#[derive(Clone)]
pub struct Scope {
    pub(crate) node: Arc<ScopeNode>,
    pub(crate) root: Arc<RootState>,
}

impl Scope {
    /// Create a new application (root scope).
    pub fn new() -> Self {
        Self::with_trailing_slash(TrailingSlash::default())
    }

    /// Create a new application with an explicit trailing-slash policy.
    pub fn with_trailing_slash(policy: TrailingSlash) -> Self {
        let root = Arc::new(RootState {
            router: RwLock::new(Router::with_trailing_slash(policy)),
            adapter: RwLock::new(Arc::new(HttpAdapter::new()) as Arc<dyn Adapter>),
            frozen: AtomicBool::new(false),
            ready_done: AtomicBool::new(false),
            root_node: OnceLock::new(),
        });
        let node = Arc::new(ScopeNode {
            name: "root".to_string(),
            base_prefix: String::new(),
            dynamic_prefix: RwLock::new(None),
            parent: None,
            container: RwLock::new(Container::new()),
            pending: Mutex::new(VecDeque::new()),
        });
        let _ = root.root_node.set(node.clone());
        Self { node, root }
    }

    pub fn name(&self) -> &str {
        &self.node.name
    }

    pub fn is_root(&self) -> bool {
        self.node.parent.is_none()
    }

    /// The prefix routes registered here would currently receive.
    pub fn current_prefix(&self) -> String {
        self.node.prefix_for_child()
    }

    pub fn parent(&self) -> Option<Scope> {
        let parent = self.node.parent.as_ref()?.upgrade()?;
        Some(Scope {
            node: parent,
            root: self.root.clone(),
        })
    }

    /// The root scope of this application.
    pub fn root_scope(&self) -> Scope {
        let node = self
            .root
            .root_node
            .get()
            .expect("root node is set at construction")
            .clone();
        Scope {
            node,
            root: self.root.clone(),
        }
    }

    pub(crate) fn node_arc(&self) -> Arc<ScopeNode> {
        self.node.clone()
    }

    /// This scope's ancestry, innermost first, ending at the root.
    pub(crate) fn chain(&self) -> Vec<Arc<ScopeNode>> {
        let mut chain = vec![self.node.clone()];
        let mut current = self.node.clone();
        while let Some(parent) = current.parent.as_ref().and_then(|w| w.upgrade()) {
            chain.push(parent.clone());
            current = parent;
        }
        chain
    }

    fn ensure_open(&self, what: &str) -> Result<(), Error> {
        if self.root.frozen.load(Ordering::Acquire) {
            return Err(Error::Lifecycle(format!(
                "cannot add {} after ready() has completed",
                what
            )));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Plugin registration
    // ------------------------------------------------------------------

    /// Enqueue a plugin for boot. Resolved when `ready()` drains the queue.
    pub fn register(&self, plugin: Plugin) -> Result<(), Error> {
        self.register_with(plugin, PluginOptions::default())
    }

    pub fn register_with(&self, plugin: Plugin, opts: PluginOptions) -> Result<(), Error> {
        self.ensure_open("plugins")?;
        debug!(
            plugin = plugin.name(),
            scope = %self.node.name,
            "plugin enqueued"
        );
        self.node.pending.lock().push_back(BootEntry { plugin, opts });
        Ok(())
    }

    /// Create the child scope for a non-skip-override plugin.
    pub(crate) fn descend(&self, plugin_name: &str, opts: &PluginOptions) -> Scope {
        let name = opts
            .name
            .clone()
            .unwrap_or_else(|| plugin_name.to_string());
        let base_prefix = match &opts.prefix {
            Some(prefix) => format!("{}{}", self.node.prefix_for_child(), prefix),
            None => self.node.prefix_for_child(),
        };
        let container = self.node.container.read().descend();
        let node = Arc::new(ScopeNode {
            name,
            base_prefix,
            dynamic_prefix: RwLock::new(None),
            parent: Some(Arc::downgrade(&self.node)),
            container: RwLock::new(container),
            pending: Mutex::new(VecDeque::new()),
        });
        node.container.write().push_module(ModuleRef {
            name: node.name.clone(),
            node: Arc::downgrade(&node),
        });
        Scope {
            node,
            root: self.root.clone(),
        }
    }

    /// The scopes recorded on this scope's modules chain.
    pub fn modules(&self) -> Vec<Scope> {
        self.node
            .container
            .read()
            .modules_chain()
            .iter()
            .filter_map(|m| m.node())
            .map(|node| Scope {
                node,
                root: self.root.clone(),
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Routes
    // ------------------------------------------------------------------

    /// Register a route. Single entry point; the method helpers below are
    /// thin wrappers that fix the method token.
    pub fn route<F, Fut, R>(&self, config: RouteConfig, handler: F) -> Result<(), Error>
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoReply + 'static,
    {
        self.route_boxed(config, into_handler(handler))
    }

    pub(crate) fn route_boxed(&self, config: RouteConfig, handler: HandlerFn) -> Result<(), Error> {
        self.ensure_open("routes")?;
        let full_path = format!("{}{}", self.node.prefix_for_route(&config.path), config.path);
        let mut route = Route {
            methods: config.methods,
            path: full_path,
            metadata: HashMap::new(),
            handler,
            owner: self.node.clone(),
        };

        // Scope-accumulated descriptors (root-to-leaf) first, then per-route.
        let scoped: Vec<RouteDescriptor> =
            self.node.container.read().route_descriptors().to_vec();
        for descriptor in scoped.iter().chain(config.descriptors.iter()) {
            descriptor.apply(&mut route);
        }

        let added = self.root.router.write().add(route)?;
        debug!(
            methods = ?added.methods,
            path = %added.path,
            scope = %self.node.name,
            "route registered"
        );
        Ok(())
    }

    pub fn get<F, Fut, R>(&self, path: &str, handler: F) -> Result<(), Error>
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoReply + 'static,
    {
        self.route(RouteConfig::new(Method::Get, path), handler)
    }

    pub fn post<F, Fut, R>(&self, path: &str, handler: F) -> Result<(), Error>
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoReply + 'static,
    {
        self.route(RouteConfig::new(Method::Post, path), handler)
    }

    pub fn put<F, Fut, R>(&self, path: &str, handler: F) -> Result<(), Error>
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoReply + 'static,
    {
        self.route(RouteConfig::new(Method::Put, path), handler)
    }

    pub fn delete<F, Fut, R>(&self, path: &str, handler: F) -> Result<(), Error>
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoReply + 'static,
    {
        self.route(RouteConfig::new(Method::Delete, path), handler)
    }

    pub fn patch<F, Fut, R>(&self, path: &str, handler: F) -> Result<(), Error>
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoReply + 'static,
    {
        self.route(RouteConfig::new(Method::Patch, path), handler)
    }

    pub fn head<F, Fut, R>(&self, path: &str, handler: F) -> Result<(), Error>
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoReply + 'static,
    {
        self.route(RouteConfig::new(Method::Head, path), handler)
    }

    pub fn options<F, Fut, R>(&self, path: &str, handler: F) -> Result<(), Error>
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoReply + 'static,
    {
        self.route(RouteConfig::new(Method::Options, path), handler)
    }

    /// Register the handler for every method token.
    pub fn all<F, Fut, R>(&self, path: &str, handler: F) -> Result<(), Error>
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoReply + 'static,
    {
        self.route(
            RouteConfig::with_methods(Method::all().to_vec(), path),
            handler,
        )
    }

    /// Install a dynamic prefix applying to routes registered after this
    /// call. Paths listed in `opts.exclude` keep the undecorated prefix.
    pub fn prefix(&self, value: impl Into<String>, opts: PrefixOptions) -> Result<(), Error> {
        self.ensure_open("prefixes")?;
        *self.node.dynamic_prefix.write() = Some(PrefixRule {
            value: value.into(),
            exclude: opts.exclude,
        });
        Ok(())
    }

    /// Append a route descriptor applied to every route registered at this
    /// scope or its descendants from now on.
    pub fn add_descriptor(&self, descriptor: RouteDescriptor) -> Result<(), Error> {
        self.ensure_open("route descriptors")?;
        self.node.container.write().push_descriptor(descriptor);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Hooks
    // ------------------------------------------------------------------

    pub fn on_request<F, Fut>(&self, hook: F) -> Result<(), Error>
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<HttpResponse>, Error>> + Send + 'static,
    {
        self.ensure_open("hooks")?;
        self.node
            .container
            .write()
            .hooks_mut()
            .add_request(Arc::new(move |ctx| Box::pin(hook(ctx))));
        Ok(())
    }

    pub fn on_transform<F, Fut>(&self, hook: F) -> Result<(), Error>
    where
        F: Fn(Payload, Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Payload, Error>> + Send + 'static,
    {
        self.ensure_open("hooks")?;
        self.node
            .container
            .write()
            .hooks_mut()
            .add_transform(Arc::new(move |payload, ctx| Box::pin(hook(payload, ctx))));
        Ok(())
    }

    pub fn on_send<F, Fut>(&self, hook: F) -> Result<(), Error>
    where
        F: Fn(Bytes, Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<SendFlow, Error>> + Send + 'static,
    {
        self.ensure_open("hooks")?;
        self.node
            .container
            .write()
            .hooks_mut()
            .add_send(Arc::new(move |body, ctx| Box::pin(hook(body, ctx))));
        Ok(())
    }

    pub fn on_sent<F, Fut>(&self, hook: F) -> Result<(), Error>
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), Error>> + Send + 'static,
    {
        self.ensure_open("hooks")?;
        self.node
            .container
            .write()
            .hooks_mut()
            .add_sent(Arc::new(move |ctx| Box::pin(hook(ctx))));
        Ok(())
    }

    pub fn on_error<F, Fut>(&self, hook: F) -> Result<(), Error>
    where
        F: Fn(Arc<Error>, Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Payload, Error>> + Send + 'static,
    {
        self.ensure_open("hooks")?;
        self.node
            .container
            .write()
            .hooks_mut()
            .add_error(Arc::new(move |err, ctx| Box::pin(hook(err, ctx))));
        Ok(())
    }

    pub fn on_error_sent<F, Fut>(&self, hook: F) -> Result<(), Error>
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), Error>> + Send + 'static,
    {
        self.ensure_open("hooks")?;
        self.node
            .container
            .write()
            .hooks_mut()
            .add_error_sent(Arc::new(move |ctx| Box::pin(hook(ctx))));
        Ok(())
    }

    /// `ready`/`close`/`listen` are application-wide events: hooks land on
    /// the root store in global registration order, which is the order the
    /// coordinators run them in.
    pub fn on_ready<F, Fut>(&self, hook: F) -> Result<(), Error>
    where
        F: Fn(Scope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), Error>> + Send + 'static,
    {
        self.ensure_open("hooks")?;
        self.root_scope()
            .node
            .container
            .write()
            .hooks_mut()
            .add_ready(Arc::new(move |scope| Box::pin(hook(scope))));
        Ok(())
    }

    pub fn on_close<F, Fut>(&self, hook: F) -> Result<(), Error>
    where
        F: Fn(Scope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), Error>> + Send + 'static,
    {
        self.ensure_open("hooks")?;
        self.root_scope()
            .node
            .container
            .write()
            .hooks_mut()
            .add_close(Arc::new(move |scope| Box::pin(hook(scope))));
        Ok(())
    }

    pub fn on_listen<F, Fut>(&self, hook: F) -> Result<(), Error>
    where
        F: Fn(Scope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), Error>> + Send + 'static,
    {
        self.ensure_open("hooks")?;
        self.root_scope()
            .node
            .container
            .write()
            .hooks_mut()
            .add_listen(Arc::new(move |scope| Box::pin(hook(scope))));
        Ok(())
    }

    /// Runs when a plugin registers below this scope, with the plugin's new
    /// scope as argument, before the plugin body.
    pub fn on_register<F, Fut>(&self, hook: F) -> Result<(), Error>
    where
        F: Fn(Scope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), Error>> + Send + 'static,
    {
        self.ensure_open("hooks")?;
        self.node
            .container
            .write()
            .hooks_mut()
            .add_register(Arc::new(move |scope| Box::pin(hook(scope))));
        Ok(())
    }

    // ------------------------------------------------------------------
    // Container access
    // ------------------------------------------------------------------

    /// Share a value by reference with this scope and its descendants.
    pub fn provide<T: Send + Sync + 'static>(&self, value: T) -> Result<(), Error> {
        self.ensure_open("container values")?;
        self.node.container.write().insert_shared(Arc::new(value));
        Ok(())
    }

    /// Store a value cloned per scope on descent.
    pub fn provide_cloned<T: CloneSlot>(&self, value: T) -> Result<(), Error> {
        self.ensure_open("container values")?;
        self.node.container.write().insert_owned(value);
        Ok(())
    }

    /// Resolve a shared value from this scope's container.
    pub fn resolve<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.node.container.read().get_shared::<T>()
    }

    /// Override the serializer for this scope and its descendants.
    pub fn set_serializer<F>(&self, serializer: F) -> Result<(), Error>
    where
        F: Fn(Payload, &Context) -> Result<Bytes, Error> + Send + Sync + 'static,
    {
        self.ensure_open("serializers")?;
        self.node
            .container
            .write()
            .set_serializer(Arc::new(serializer) as SerializerFn);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Drain the plugin boot queue. Idempotent once complete.
    pub async fn ready(&self) -> Result<(), Error> {
        boot::run_ready(self.root_scope()).await
    }

    pub fn is_ready(&self) -> bool {
        self.root.ready_done.load(Ordering::Acquire)
    }

    /// Replace the transport adapter. Must happen before `ready()`.
    pub fn set_adapter(&self, adapter: Arc<dyn Adapter>) -> Result<(), Error> {
        self.ensure_open("adapters")?;
        *self.root.adapter.write() = adapter;
        Ok(())
    }

    pub fn adapter(&self) -> Arc<dyn Adapter> {
        self.root.adapter.read().clone()
    }

    /// Bind the transport and start serving. Runs `ready()` first if needed,
    /// then the `listen` hooks.
    pub async fn listen(&self, opts: ListenOptions) -> Result<AddressInfo, Error> {
        self.ready().await?;
        let app = self.root_scope();
        let address = self.adapter().listen(app.clone(), opts).await?;
        info!(href = %address.href, "server listening");

        let hooks = app.node.container.read().hooks().listen().to_vec();
        for hook in hooks {
            hook(app.clone()).await?;
        }
        Ok(address)
    }

    /// Stop accepting connections, then run `close` hooks.
    ///
    /// Hook failures are logged and ignored; close proceeds.
    pub async fn close(&self) -> Result<(), Error> {
        let app = self.root_scope();
        let adapter_result = self.adapter().close().await;
        if let Err(e) = &adapter_result {
            error!(error = %e, "adapter close failed");
        }

        let hooks = app.node.container.read().hooks().close().to_vec();
        for hook in hooks {
            if let Err(e) = hook(app.clone()).await {
                error!(error = %e, "close hook failed");
            }
        }
        adapter_result
    }

    /// Drive a request through the pipeline in-process.
    pub async fn handle(&self, request: HttpRequest) -> Result<HttpResponse, Error> {
        self.handle_with(request, Default::default()).await
    }

    pub async fn handle_with(
        &self,
        request: HttpRequest,
        overrides: crate::context::ContextOverrides,
    ) -> Result<HttpResponse, Error> {
        if !self.is_ready() {
            return Err(Error::Lifecycle(
                "ready() must complete before requests are handled".to_string(),
            ));
        }
        dispatch::dispatch(&self.root_scope(), request, overrides).await
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("name", &self.node.name)
            .field("prefix", &self.node.base_prefix)
            .field("is_root", &self.is_root())
            .finish()
    }
}

/// Configuration accepted by the single route-registration entry point.
#[derive(Debug)]
pub struct RouteConfig {
    pub methods: Vec<Method>,
    pub path: String,
    pub descriptors: Vec<RouteDescriptor>,
}

impl RouteConfig {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self::with_methods(vec![method], path)
    }

    pub fn with_methods(methods: Vec<Method>, path: impl Into<String>) -> Self {
        Self {
            methods,
            path: path.into(),
            descriptors: Vec::new(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    /// Attach a per-route descriptor, applied after scope-accumulated ones.
    pub fn describe(mut self, descriptor: RouteDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }
}
