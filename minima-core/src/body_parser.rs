// Request body parsing plugin

use bytes::Bytes;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::error;

use crate::context::Context;
use crate::plugin::Plugin;
use crate::router::RouteDescriptor;

/// Route-metadata key telling the body parser to leave the request alone.
pub const SKIP_BODY_PARSING: &str = "minima.skip-body-parsing";

/// Descriptor for routes that parse their own bodies (e.g. streaming
/// uploads).
pub fn skip_body_parsing() -> RouteDescriptor {
    RouteDescriptor::meta(SKIP_BODY_PARSING, Value::Bool(true))
}

/// Body kinds the parser may attempt, matched against the content type in
/// the configured order; the first match wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    Json,
    Text,
    Form,
    /// Raw bytes: matches any remaining content type.
    Bytes,
}

impl BodyKind {
    fn matches(&self, content_type: &str) -> bool {
        match self {
            BodyKind::Json => {
                content_type.starts_with("application/json")
                    || content_type
                        .split(';')
                        .next()
                        .is_some_and(|mime| mime.trim().ends_with("+json"))
            }
            BodyKind::Text => content_type.starts_with("text/"),
            BodyKind::Form => content_type.starts_with("application/x-www-form-urlencoded"),
            BodyKind::Bytes => true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BodyParserOptions {
    pub kinds: Vec<BodyKind>,
}

impl Default for BodyParserOptions {
    fn default() -> Self {
        Self {
            kinds: vec![BodyKind::Json, BodyKind::Text, BodyKind::Form, BodyKind::Bytes],
        }
    }
}

/// The parse outcome stored in request locals.
///
/// `Unparsed` is the sentinel marking that parsing was attempted; it stays
/// in place when no kind matched or the parse failed.
#[derive(Debug, Clone)]
pub enum ParsedBody {
    Json(Value),
    Text(String),
    Form(HashMap<String, String>),
    Bytes(Bytes),
    Unparsed,
}

/// The parsed body for the current request, if the body parser ran.
pub fn parsed_body(ctx: &Context) -> Option<Arc<ParsedBody>> {
    ctx.local::<ParsedBody>()
}

/// Build the body-parser plugin.
///
/// Installs a `request` hook into the caller's scope (`skip_override`), so
/// the caller decides which routes see parsed bodies.
pub fn body_parser(opts: BodyParserOptions) -> Plugin {
    Plugin::new_sync("body-parser", move |scope, _plugin_opts| {
        let kinds = opts.kinds.clone();
        scope.on_request(move |ctx| {
            let kinds = kinds.clone();
            async move {
                parse_into_locals(&ctx, &kinds);
                Ok(None)
            }
        })
    })
    .skip_override()
}

fn parse_into_locals(ctx: &Context, kinds: &[BodyKind]) {
    if let Some(route) = ctx.route() {
        if route.meta(SKIP_BODY_PARSING).is_some() {
            return;
        }
    }

    // Sentinel first: accessors can tell "not attempted" from "failed".
    ctx.insert_local(ParsedBody::Unparsed);

    let Some(content_type) = ctx.header("content-type") else {
        return;
    };
    if ctx.request().body_ref().is_empty() {
        return;
    }
    let content_type = content_type.to_ascii_lowercase();

    let Some(kind) = kinds.iter().find(|k| k.matches(&content_type)) else {
        return;
    };

    match parse_as(ctx, *kind) {
        Ok(parsed) => ctx.insert_local(parsed),
        Err(e) => {
            // Parse failures never fail the request; the sentinel stays.
            error!(
                content_type = %content_type,
                error = %e,
                "failed to parse request body"
            );
        }
    }
}

fn parse_as(ctx: &Context, kind: BodyKind) -> Result<ParsedBody, crate::error::Error> {
    let request = ctx.request();
    match kind {
        BodyKind::Json => request.json::<Value>().map(ParsedBody::Json),
        BodyKind::Text => request.text().map(ParsedBody::Text),
        BodyKind::Form => request.form_map().map(ParsedBody::Form),
        BodyKind::Bytes => Ok(ParsedBody::Bytes(request.body().clone())),
    }
}
