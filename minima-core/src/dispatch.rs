// The request dispatcher: hook pipeline, routing, response construction

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::context::{Context, ContextOverrides};
use crate::error::Error;
use crate::handler::Reply;
use crate::hooks::{HookStore, SendFlow};
use crate::http::{path_span, HttpRequest, HttpResponse};
use crate::scope::{Scope, ScopeNode};
use crate::serialize::{default_serializer, Payload};

/// Drive one request through the pipeline.
///
/// Returns `Err` only for [`Error::Aborted`]; every other failure is turned
/// into an error response here. The adapter drops the connection on `Err`.
pub(crate) async fn dispatch(
    root: &Scope,
    request: HttpRequest,
    overrides: ContextOverrides,
) -> Result<HttpResponse, Error> {
    let method = request.method;
    let path = {
        let (start, end) = path_span(request.uri());
        request.uri()[start..end].to_string()
    };
    trace!(method = %method, path = %path, "incoming request");

    let found = root.root.router.read().find(method, &path);
    let (owner, route, params) = match found {
        Some(matched) => (
            Scope {
                node: matched.route.owner.clone(),
                root: root.root.clone(),
            },
            Some(matched.route),
            matched.params,
        ),
        None => (root.clone(), None, HashMap::new()),
    };

    let ctx = Context::for_request(owner, request, route, params, overrides);
    let pipeline = run_pipeline(ctx.clone());
    ctx.run_scoped(pipeline).await
}

async fn run_pipeline(ctx: Context) -> Result<HttpResponse, Error> {
    let chain = ctx.app().chain();

    match attempt(&ctx, &chain).await {
        Ok(response) => {
            // Response state reflects the written status once `sent` runs.
            ctx.set_status(response.status);
            debug!(
                method = %ctx.method(),
                path = %ctx.path(),
                status = response.status,
                "request handled"
            );
            run_notify(&ctx, &chain, "sent", HookStore::sent).await;
            Ok(response)
        }
        Err(err) if err.is_aborted() => {
            // The client is gone: write nothing, notify nothing.
            debug!(method = %ctx.method(), path = %ctx.path(), "request aborted");
            Err(err)
        }
        Err(err) => {
            let response = render_error(err, &ctx, &chain).await;
            ctx.set_status(response.status);
            run_notify(&ctx, &chain, "errorSent", HookStore::error_sent).await;
            Ok(response)
        }
    }
}

/// Steps 4-7 of the pipeline: request hooks, routing, handler, response
/// construction. Any error unwinds to the error path.
async fn attempt(ctx: &Context, chain: &[Arc<ScopeNode>]) -> Result<HttpResponse, Error> {
    for hook in collect_hooks(chain, HookStore::request) {
        if let Some(response) = hook(ctx.clone()).await? {
            trace!("request hook short-circuited");
            return Ok(response);
        }
    }

    let Some(route) = ctx.route() else {
        return Err(Error::not_found(
            ctx.method().to_string(),
            ctx.path().to_string(),
        ));
    };

    match (route.handler)(ctx.clone()).await? {
        // A handler-built response is used verbatim, no header merge.
        Reply::Response(response) => Ok(response),
        Reply::Payload(payload) => build_response(payload, ctx, chain).await,
    }
}

/// transform* -> serialize -> send* -> response from the response state.
async fn build_response(
    mut payload: Payload,
    ctx: &Context,
    chain: &[Arc<ScopeNode>],
) -> Result<HttpResponse, Error> {
    for hook in collect_hooks(chain, HookStore::transform) {
        payload = hook(payload, ctx.clone()).await?;
    }

    let serializer = chain
        .iter()
        .find_map(|node| node.container.read().serializer())
        .unwrap_or_else(default_serializer);
    let mut body = serializer(payload, ctx)?;

    for hook in collect_hooks(chain, HookStore::send) {
        match hook(body, ctx.clone()).await? {
            SendFlow::Continue(next) => body = next,
            SendFlow::Respond(response) => return Ok(response),
        }
    }

    let state = ctx.response_state();
    let mut response = HttpResponse::new(state.status.unwrap_or(200));
    response.status_text = state.status_text;
    response.headers = state.headers;
    Ok(response.with_body(body))
}

/// The error path. Infallible: anything that goes wrong in here lands on
/// the default renderer.
async fn render_error(err: Error, ctx: &Context, chain: &[Arc<ScopeNode>]) -> HttpResponse {
    let hook = collect_hooks(chain, HookStore::error).into_iter().next();
    let Some(hook) = hook else {
        return err.to_response();
    };

    // Status precedence: the error's own status, else whatever the request
    // set on the response state, else 500.
    if let Some(status) = err.carried_status() {
        ctx.set_status(status);
    } else if ctx.status().is_none() {
        ctx.set_status(500);
    }

    let err = Arc::new(err);
    match hook(err.clone(), ctx.clone()).await {
        Ok(payload) => match build_response(payload, ctx, chain).await {
            Ok(response) => response,
            Err(pipeline_err) => {
                debug!(error = %pipeline_err, "error pipeline failed, using default renderer");
                err.to_response()
            }
        },
        Err(hook_err) => {
            debug!(error = %hook_err, "error hook failed, using default renderer");
            err.to_response()
        }
    }
}

/// Fire-and-forget hooks: failures are swallowed and logged at debug level.
async fn run_notify<F>(ctx: &Context, chain: &[Arc<ScopeNode>], event: &str, accessor: F)
where
    F: for<'a> Fn(&'a HookStore) -> &'a [crate::hooks::NotifyHook],
{
    for hook in collect_hooks(chain, &accessor) {
        if let Err(e) = hook(ctx.clone()).await {
            debug!(hook = event, error = %e, "post-response hook failed");
        }
    }
}

/// Aggregate hooks along the scope chain, innermost first; insertion order
/// within each scope.
fn collect_hooks<T, F>(chain: &[Arc<ScopeNode>], accessor: F) -> Vec<T>
where
    T: Clone,
    F: for<'a> Fn(&'a HookStore) -> &'a [T],
{
    let mut hooks = Vec::new();
    for node in chain {
        let container = node.container.read();
        hooks.extend(accessor(container.hooks()).iter().cloned());
    }
    hooks
}
