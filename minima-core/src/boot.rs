// Deferred plugin boot engine

use std::sync::atomic::Ordering;
use tracing::{debug, info};

use crate::error::Error;
use crate::hooks::BoxFuture;
use crate::plugin::{Plugin, PluginOptions};
use crate::scope::Scope;

/// A queued registration awaiting resolution.
pub(crate) struct BootEntry {
    pub plugin: Plugin,
    pub opts: PluginOptions,
}

/// Drain the boot tree, freeze the registration surface, and run `ready`
/// hooks. Re-invocation after completion is a no-op.
pub(crate) async fn run_ready(root: Scope) -> Result<(), Error> {
    if root.root.ready_done.load(Ordering::Acquire) {
        return Ok(());
    }

    info!("booting application");
    drain(root.clone()).await?;
    root.root.frozen.store(true, Ordering::Release);

    let hooks = root.node.container.read().hooks().ready().to_vec();
    for hook in hooks {
        hook(root.clone()).await?;
    }

    root.root.ready_done.store(true, Ordering::Release);
    info!("application ready");
    Ok(())
}

/// Resolve a scope's queued plugins in registration order.
///
/// Each plugin's own nested registrations drain before the next sibling
/// starts, yielding a depth-first pre-order traversal.
fn drain(scope: Scope) -> BoxFuture<Result<(), Error>> {
    Box::pin(async move {
        loop {
            let entry = scope.node.pending.lock().pop_front();
            let Some(entry) = entry else {
                break;
            };
            resolve(&scope, entry).await?;
        }
        Ok(())
    })
}

async fn resolve(parent: &Scope, entry: BootEntry) -> Result<(), Error> {
    let BootEntry { plugin, opts } = entry;
    let skip_override = plugin.is_skip_override();
    let target = if skip_override {
        parent.clone()
    } else {
        parent.descend(plugin.name(), &opts)
    };

    // A skip-override plugin shares its caller's queue. Registrations made
    // during its body must still resolve before already-queued siblings, so
    // the sibling tail is stashed until the nested entries have drained.
    let stashed = if skip_override {
        std::mem::take(&mut *target.node.pending.lock())
    } else {
        Default::default()
    };

    // `register` hooks observe the scope the plugin will run in, before the
    // plugin body. Innermost-first along the registering scope's chain.
    let mut register_hooks = Vec::new();
    for node in parent.chain() {
        register_hooks.extend(node.container.read().hooks().register().iter().cloned());
    }
    for hook in register_hooks {
        hook(target.clone()).await?;
    }

    debug!(
        plugin = plugin.name(),
        scope = %target.name(),
        skip_override,
        "resolving plugin"
    );
    let result = plugin.run(target.clone(), opts).await;
    let result = match result {
        Ok(()) => drain(target.clone()).await,
        Err(e) => Err(e),
    };

    if skip_override {
        let mut pending = target.node.pending.lock();
        // Nested entries have drained (or boot is failing); put the
        // siblings back for the outer loop.
        for entry in stashed {
            pending.push_back(entry);
        }
    }
    result
}
