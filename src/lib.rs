// Minima - a minimal, modular async HTTP framework for Rust
//
// Plugins compose into a scoped boot tree; requests flow through an ordered
// hook pipeline with an ambient per-request context.

// Re-export core functionality
pub use minima_core::*;

// Prelude for common imports
pub mod prelude {
    pub use crate::{
        body_parser, cors, graceful_shutdown, proxy, request_logger, App, BodyParserOptions,
        Context, CorsOptions, Error, HttpRequest, HttpResponse, Json, ListenOptions, LogConfig,
        Method, Payload, Plugin, PluginOptions, ProxyOptions, RouteConfig, RouteDescriptor, Scope,
        SendFlow, ShutdownOptions,
    };
}
