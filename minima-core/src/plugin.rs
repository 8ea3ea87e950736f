// Plugin records and composition

use std::future::Future;
use std::sync::Arc;

use crate::error::Error;
use crate::hooks::BoxFuture;
use crate::locals::Locals;
use crate::scope::Scope;

/// Options passed alongside a plugin registration.
#[derive(Clone, Default)]
pub struct PluginOptions {
    /// Prefix appended to the parent's prefix for the plugin's scope.
    pub prefix: Option<String>,
    /// Overrides the plugin's own name for the scope and log lines.
    pub name: Option<String>,
    /// Typed user-defined options.
    pub state: Locals,
}

impl PluginOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_state<T: Send + Sync + 'static>(mut self, value: T) -> Self {
        self.state.insert(value);
        self
    }
}

impl std::fmt::Debug for PluginOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginOptions")
            .field("prefix", &self.prefix)
            .field("name", &self.name)
            .field("state", &self.state.len())
            .finish()
    }
}

type PluginBody = Arc<dyn Fn(Scope, PluginOptions) -> BoxFuture<Result<(), Error>> + Send + Sync>;

/// A deferred registration unit.
///
/// The body runs when the boot queue is drained, against a child scope with
/// a cloned container - or, when `skip_override` is set, against the
/// caller's own scope.
#[derive(Clone)]
pub struct Plugin {
    name: String,
    skip_override: bool,
    body: PluginBody,
}

impl Plugin {
    /// A plugin with an async body.
    pub fn new<F, Fut>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(Scope, PluginOptions) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), Error>> + Send + 'static,
    {
        Self {
            name: name.into(),
            skip_override: false,
            body: Arc::new(move |scope, opts| Box::pin(body(scope, opts))),
        }
    }

    /// A plugin whose body completes synchronously.
    pub fn new_sync<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(Scope, PluginOptions) -> Result<(), Error> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            skip_override: false,
            body: Arc::new(move |scope, opts| {
                let result = body(scope, opts);
                Box::pin(async move { result })
            }),
        }
    }

    /// Run this plugin in the caller's scope instead of a child scope.
    ///
    /// Routes and hooks it registers are owned by the caller. Used by
    /// cross-cutting plugins such as the body parser and shutdown wiring.
    pub fn skip_override(mut self) -> Self {
        self.skip_override = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_skip_override(&self) -> bool {
        self.skip_override
    }

    pub(crate) fn run(&self, scope: Scope, opts: PluginOptions) -> BoxFuture<Result<(), Error>> {
        (self.body)(scope, opts)
    }
}

impl std::fmt::Debug for Plugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plugin")
            .field("name", &self.name)
            .field("skip_override", &self.skip_override)
            .finish()
    }
}

/// Combine plugins into one that registers each part, in order, into the
/// scope it runs in.
///
/// The composite is `skip_override` so the parts land in the caller's scope;
/// each part keeps its own scope semantics.
pub fn compose(name: impl Into<String>, plugins: Vec<Plugin>) -> Plugin {
    Plugin::new_sync(name, move |scope, _opts| {
        for plugin in &plugins {
            scope.register(plugin.clone())?;
        }
        Ok(())
    })
    .skip_override()
}
