// Request completion logging plugin

use std::time::Instant;
use tracing::{info, warn};

use crate::plugin::Plugin;

/// Start instant recorded per request.
#[derive(Debug, Clone, Copy)]
struct RequestStart(Instant);

/// Build the request-logger plugin.
///
/// Records the start instant on `request` and emits one structured
/// completion line on `sent` / `errorSent` with method, path, status, and
/// duration.
pub fn request_logger() -> Plugin {
    Plugin::new_sync("request-logger", |scope, _opts| {
        scope.on_request(|ctx| async move {
            ctx.insert_local(RequestStart(Instant::now()));
            Ok(None)
        })?;

        scope.on_sent(|ctx| async move {
            let duration_ms = ctx
                .local::<RequestStart>()
                .map(|start| start.0.elapsed().as_millis())
                .unwrap_or(0);
            info!(
                method = %ctx.method(),
                path = %ctx.path(),
                status = ctx.status().unwrap_or(200),
                duration_ms = duration_ms as u64,
                "request completed"
            );
            Ok(())
        })?;

        scope.on_error_sent(|ctx| async move {
            let duration_ms = ctx
                .local::<RequestStart>()
                .map(|start| start.0.elapsed().as_millis())
                .unwrap_or(0);
            warn!(
                method = %ctx.method(),
                path = %ctx.path(),
                status = ctx.status().unwrap_or(500),
                duration_ms = duration_ms as u64,
                "request failed"
            );
            Ok(())
        })
    })
    .skip_override()
}
