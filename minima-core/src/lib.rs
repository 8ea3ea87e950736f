// Core library for the Minima HTTP framework
// Plugin boot tree, hook pipeline, and the per-request dispatcher

pub mod adapter;
mod boot;
pub mod body_parser;
pub mod container;
pub mod context;
pub mod cors;
mod dispatch;
pub mod error;
pub mod graceful;
pub mod handler;
pub mod hooks;
pub mod http;
pub mod locals;
pub mod logging;
pub mod plugin;
pub mod proxy;
pub mod request_logger;
pub mod router;
pub mod scope;
pub mod serialize;

// Re-export commonly used types
pub use adapter::{Adapter, AddressInfo, HttpAdapter, ListenOptions};
pub use body_parser::{body_parser, parsed_body, skip_body_parsing, BodyKind, BodyParserOptions, ParsedBody};
pub use container::{CloneSlot, Container, ModuleRef};
pub use context::{Context, ContextOverrides, ResponseState, Scheme};
pub use cors::{cors, CorsOptions};
pub use error::Error;
pub use graceful::{graceful_shutdown, ShutdownOptions, ShutdownSignal};
pub use handler::{into_handler, HandlerFn, IntoReply, Json, Reply};
pub use hooks::{BoxFuture, HookStore, SendFlow};
pub use http::{HttpRequest, HttpResponse, Method};
pub use locals::Locals;
pub use logging::{LogConfig, LogFormat, LogLevel};
pub use plugin::{compose, Plugin, PluginOptions};
pub use proxy::{
    client_ip, proxy, ClientIp, ForwardStrategy, HostExtraction, HostSettings, IpExtraction,
    IpSettings, ProtoExtraction, ProtoSettings, ProxyOptions, TrustPolicy,
};
pub use request_logger::request_logger;
pub use router::{Route, RouteDescriptor, RouteMatch, Router, TrailingSlash};
pub use scope::{App, PrefixOptions, RouteConfig, Scope};
pub use serialize::{default_serializer, Payload, SerializerFn};
