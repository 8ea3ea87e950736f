// CORS plugin

use crate::http::{HttpResponse, Method};
use crate::plugin::Plugin;

/// CORS (Cross-Origin Resource Sharing) configuration.
#[derive(Debug, Clone)]
pub struct CorsOptions {
    pub allow_origin: String,
    pub allow_methods: String,
    pub allow_headers: String,
    pub allow_credentials: bool,
    pub max_age: u32,
}

impl CorsOptions {
    pub fn new() -> Self {
        Self {
            allow_origin: "*".to_string(),
            allow_methods: "GET, POST, PUT, DELETE, OPTIONS, PATCH".to_string(),
            allow_headers: "Content-Type, Authorization, Accept".to_string(),
            allow_credentials: false,
            max_age: 86400, // 24 hours
        }
    }

    pub fn allow_origin(mut self, origin: &str) -> Self {
        self.allow_origin = origin.to_string();
        self
    }

    pub fn allow_credentials(mut self, allow: bool) -> Self {
        self.allow_credentials = allow;
        self
    }
}

impl Default for CorsOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the CORS plugin.
///
/// Installs a `request` hook in the caller's scope: preflight `OPTIONS`
/// requests short-circuit with 204, everything else gets the allow-origin
/// headers written into the response state.
pub fn cors(opts: CorsOptions) -> Plugin {
    Plugin::new_sync("cors", move |scope, _plugin_opts| {
        let opts = opts.clone();
        scope.on_request(move |ctx| {
            let opts = opts.clone();
            async move {
                if ctx.method() == Method::Options {
                    let mut response = HttpResponse::no_content()
                        .with_header("access-control-allow-origin", opts.allow_origin.clone())
                        .with_header("access-control-allow-methods", opts.allow_methods.clone())
                        .with_header("access-control-allow-headers", opts.allow_headers.clone())
                        .with_header("access-control-max-age", opts.max_age.to_string());
                    if opts.allow_credentials {
                        response = response.with_header("access-control-allow-credentials", "true");
                    }
                    return Ok(Some(response));
                }

                ctx.set_header("access-control-allow-origin", opts.allow_origin.clone());
                if opts.allow_credentials {
                    ctx.set_header("access-control-allow-credentials", "true");
                }
                Ok(None)
            }
        })
    })
    .skip_override()
}
