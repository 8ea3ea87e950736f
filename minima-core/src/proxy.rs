// Proxy header extraction plugin: client IP, host, and protocol

use std::net::IpAddr;
use std::sync::Arc;

use crate::context::{Context, Scheme};
use crate::plugin::Plugin;

/// Which element of a comma-separated `X-Forwarded-For` chain to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardStrategy {
    /// The originating client (first element).
    First,
    /// The nearest hop (last element).
    Last,
    /// The element at `min(depth - 1, len - 1)`.
    Depth(usize),
}

#[derive(Debug, Clone)]
pub struct IpSettings {
    /// Headers consulted before `X-Forwarded-For`, in order.
    pub headers: Vec<String>,
    pub strategy: ForwardStrategy,
}

impl Default for IpSettings {
    fn default() -> Self {
        Self {
            headers: Vec::new(),
            strategy: ForwardStrategy::First,
        }
    }
}

#[derive(Clone)]
pub enum IpExtraction {
    Disabled,
    Settings(IpSettings),
    Custom(Arc<dyn Fn(&Context) -> Option<String> + Send + Sync>),
}

#[derive(Debug, Clone)]
pub struct HostSettings {
    pub headers: Vec<String>,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            headers: vec!["x-forwarded-host".to_string()],
        }
    }
}

#[derive(Clone)]
pub enum HostExtraction {
    Disabled,
    Settings(HostSettings),
    Custom(Arc<dyn Fn(&Context) -> Option<String> + Send + Sync>),
}

#[derive(Debug, Clone)]
pub struct ProtoSettings {
    pub headers: Vec<String>,
}

impl Default for ProtoSettings {
    fn default() -> Self {
        Self {
            headers: vec!["x-forwarded-proto".to_string()],
        }
    }
}

#[derive(Clone)]
pub enum ProtoExtraction {
    Disabled,
    Settings(ProtoSettings),
    Custom(Arc<dyn Fn(&Context) -> Option<Scheme> + Send + Sync>),
}

/// Gates whether proxy-provided values may be used at all.
///
/// Headers are always inspected; the policy only filters whether the result
/// is honored. An untrusted hop falls through to socket-derived defaults.
#[derive(Clone)]
pub enum TrustPolicy {
    /// Honor proxy headers from any peer.
    All,
    /// Honor proxy headers only from these hop addresses.
    Addresses(Vec<IpAddr>),
    Custom(Arc<dyn Fn(&Context) -> bool + Send + Sync>),
}

#[derive(Clone)]
pub struct ProxyOptions {
    pub ip: IpExtraction,
    pub host: HostExtraction,
    pub proto: ProtoExtraction,
    pub trust: TrustPolicy,
}

impl Default for ProxyOptions {
    fn default() -> Self {
        Self {
            ip: IpExtraction::Settings(IpSettings::default()),
            host: HostExtraction::Settings(HostSettings::default()),
            proto: ProtoExtraction::Settings(ProtoSettings::default()),
            trust: TrustPolicy::All,
        }
    }
}

/// The extracted client address, stored in request locals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIp(pub String);

/// The client IP recorded by the proxy plugin for this request.
pub fn client_ip(ctx: &Context) -> Option<String> {
    ctx.local::<ClientIp>().map(|ip| ip.0.clone())
}

/// Build the proxy-extraction plugin (`skip_override`, installs a `request`
/// hook in the caller's scope).
pub fn proxy(opts: ProxyOptions) -> Plugin {
    Plugin::new_sync("proxy", move |scope, _plugin_opts| {
        let opts = opts.clone();
        scope.on_request(move |ctx| {
            let opts = opts.clone();
            async move {
                extract(&ctx, &opts);
                Ok(None)
            }
        })
    })
    .skip_override()
}

fn extract(ctx: &Context, opts: &ProxyOptions) {
    let trusted = match &opts.trust {
        TrustPolicy::All => true,
        TrustPolicy::Addresses(addrs) => ctx
            .remote_addr()
            .map(|peer| addrs.contains(&peer.ip()))
            .unwrap_or(false),
        TrustPolicy::Custom(f) => f(ctx),
    };

    match &opts.ip {
        IpExtraction::Disabled => {}
        IpExtraction::Custom(f) => {
            if let Some(ip) = f(ctx) {
                ctx.insert_local(ClientIp(ip));
            }
        }
        IpExtraction::Settings(settings) => {
            // Inspection always happens; trust decides whether the header
            // result may be used.
            let from_headers = ip_from_headers(ctx, settings);
            let resolved = if trusted { from_headers } else { None }
                .or_else(|| ctx.remote_addr().map(|peer| peer.ip().to_string()));
            if let Some(ip) = resolved {
                ctx.insert_local(ClientIp(ip));
            }
        }
    }

    match &opts.host {
        HostExtraction::Disabled => {}
        HostExtraction::Custom(f) => {
            if let Some(host) = f(ctx) {
                ctx.set_host_hint(host);
            }
        }
        HostExtraction::Settings(settings) => {
            let from_headers = settings
                .headers
                .iter()
                .find_map(|name| ctx.header(name));
            let resolved = if trusted { from_headers } else { None }
                .or_else(|| ctx.header("host"));
            if let Some(host) = resolved {
                ctx.set_host_hint(host);
            }
        }
    }

    match &opts.proto {
        ProtoExtraction::Disabled => {}
        ProtoExtraction::Custom(f) => {
            if let Some(scheme) = f(ctx) {
                ctx.set_proto_hint(scheme);
            }
        }
        ProtoExtraction::Settings(settings) => {
            let from_headers = proto_from_headers(ctx, settings);
            let resolved = if trusted { from_headers } else { None }
                .unwrap_or_else(|| default_scheme(ctx));
            ctx.set_proto_hint(resolved);
        }
    }
}

fn ip_from_headers(ctx: &Context, settings: &IpSettings) -> Option<String> {
    for name in &settings.headers {
        if let Some(value) = ctx.header(name) {
            let value = value.trim();
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }

    if let Some(forwarded) = ctx.header("x-forwarded-for") {
        let hops: Vec<&str> = forwarded
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect();
        if !hops.is_empty() {
            let index = match settings.strategy {
                ForwardStrategy::First => 0,
                ForwardStrategy::Last => hops.len() - 1,
                ForwardStrategy::Depth(depth) => depth.saturating_sub(1).min(hops.len() - 1),
            };
            return Some(hops[index].to_string());
        }
    }

    ctx.header("x-real-ip")
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty())
}

fn proto_from_headers(ctx: &Context, settings: &ProtoSettings) -> Option<Scheme> {
    for name in &settings.headers {
        if let Some(value) = ctx.header(name) {
            match value.to_ascii_lowercase().as_str() {
                "on" | "https" => return Some(Scheme::Https),
                "http" => return Some(Scheme::Http),
                _ => {}
            }
        }
    }

    for name in ["x-forwarded-ssl", "x-arr-ssl"] {
        if let Some(value) = ctx.header(name) {
            if value.eq_ignore_ascii_case("on") || !value.is_empty() {
                return Some(Scheme::Https);
            }
        }
    }
    None
}

fn default_scheme(ctx: &Context) -> Scheme {
    if ctx.request().uri().starts_with("https://") {
        Scheme::Https
    } else {
        Scheme::Http
    }
}
