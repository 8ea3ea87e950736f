// Path trie routing with parameter extraction

use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::Error;
use crate::handler::HandlerFn;
use crate::http::Method;
use crate::scope::ScopeNode;

/// A registered route. Immutable once added to the router.
pub struct Route {
    pub methods: Vec<Method>,
    /// Full path after prefix composition.
    pub path: String,
    /// Uninterpreted metadata written by route descriptors.
    pub metadata: HashMap<&'static str, Value>,
    pub(crate) handler: HandlerFn,
    /// The scope that registered this route.
    pub(crate) owner: Arc<ScopeNode>,
}

impl Route {
    /// Look up a metadata value written by a descriptor.
    pub fn meta(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("methods", &self.methods)
            .field("path", &self.path)
            .field("metadata", &self.metadata)
            .finish()
    }
}

/// Metadata attached to a route at registration time.
///
/// Either a `(key, value)` pair stored verbatim on the route, or a mutator
/// run against the route record before it enters the router.
#[derive(Clone)]
pub enum RouteDescriptor {
    Meta(&'static str, Value),
    Mutate(Arc<dyn Fn(&mut Route) + Send + Sync>),
}

impl RouteDescriptor {
    pub fn meta(key: &'static str, value: Value) -> Self {
        RouteDescriptor::Meta(key, value)
    }

    pub fn mutate<F>(f: F) -> Self
    where
        F: Fn(&mut Route) + Send + Sync + 'static,
    {
        RouteDescriptor::Mutate(Arc::new(f))
    }

    pub(crate) fn apply(&self, route: &mut Route) {
        match self {
            RouteDescriptor::Meta(key, value) => {
                route.metadata.insert(key, value.clone());
            }
            RouteDescriptor::Mutate(f) => f(route),
        }
    }
}

impl std::fmt::Debug for RouteDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RouteDescriptor::Meta(key, value) => {
                f.debug_tuple("Meta").field(key).field(value).finish()
            }
            RouteDescriptor::Mutate(_) => f.write_str("Mutate(..)"),
        }
    }
}

/// Trailing-slash equivalence policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrailingSlash {
    /// `/foo` and `/foo/` match the same route.
    #[default]
    Lenient,
    /// Paths must match byte-for-byte per segment.
    Strict,
}

/// A successful route lookup.
#[derive(Debug)]
pub struct RouteMatch {
    pub route: Arc<Route>,
    pub params: HashMap<String, String>,
}

#[derive(Default)]
struct Node {
    statics: HashMap<String, Node>,
    param: Option<ParamEdge>,
    catch_all: Option<CatchAll>,
    routes: HashMap<Method, Arc<Route>>,
}

struct ParamEdge {
    name: String,
    node: Box<Node>,
}

struct CatchAll {
    name: String,
    routes: HashMap<Method, Arc<Route>>,
}

/// Path/method trie. Built during boot, read-only at dispatch time.
///
/// Patterns support literal segments, named `:param` segments (greedy within
/// one segment, never across `/`), and a `*rest` catch-all tail. Static
/// segments win over parameters, parameters over catch-alls, with
/// backtracking on dead ends.
pub struct Router {
    root: Node,
    trailing_slash: TrailingSlash,
    registered: HashSet<(Method, String)>,
}

impl Router {
    pub fn new() -> Self {
        Self::with_trailing_slash(TrailingSlash::default())
    }

    pub fn with_trailing_slash(policy: TrailingSlash) -> Self {
        Self {
            root: Node::default(),
            trailing_slash: policy,
            registered: HashSet::new(),
        }
    }

    pub fn trailing_slash(&self) -> TrailingSlash {
        self.trailing_slash
    }

    pub fn len(&self) -> usize {
        self.registered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registered.is_empty()
    }

    /// Add a route. Rejects duplicates per `(method, literalized path)`.
    pub fn add(&mut self, route: Route) -> Result<Arc<Route>, Error> {
        let pattern = self.normalize(&route.path);
        let literal = literalize(&pattern);
        for method in &route.methods {
            if self.registered.contains(&(*method, literal.clone())) {
                return Err(Error::DuplicateRoute {
                    method: method.to_string(),
                    path: route.path.clone(),
                });
            }
        }

        let route = Arc::new(route);
        let mut segments: Vec<&str> = split_segments(&pattern);
        if self.keeps_trailing_slash(&pattern) {
            segments.push("/");
        }
        let mut node = &mut self.root;
        let mut terminal_catch_all: Option<String> = None;

        for (i, seg) in segments.iter().enumerate() {
            if let Some(name) = seg.strip_prefix('*') {
                if i != segments.len() - 1 {
                    return Err(Error::Internal(format!(
                        "catch-all segment must be last in route pattern '{}'",
                        route.path
                    )));
                }
                terminal_catch_all = Some(name.to_string());
            } else if let Some(name) = seg.strip_prefix(':') {
                let edge = node.param.get_or_insert_with(|| ParamEdge {
                    name: name.to_string(),
                    node: Box::new(Node::default()),
                });
                if edge.name != name {
                    return Err(Error::Internal(format!(
                        "conflicting parameter name ':{}' vs ':{}' in route pattern '{}'",
                        edge.name, name, route.path
                    )));
                }
                node = &mut edge.node;
            } else {
                node = node.statics.entry(seg.to_string()).or_default();
            }
        }

        if let Some(name) = terminal_catch_all {
            let ca = node.catch_all.get_or_insert_with(|| CatchAll {
                name: name.clone(),
                routes: HashMap::new(),
            });
            if ca.name != name {
                return Err(Error::Internal(format!(
                    "conflicting catch-all name '*{}' vs '*{}' in route pattern '{}'",
                    ca.name, name, route.path
                )));
            }
            for method in &route.methods {
                ca.routes.insert(*method, route.clone());
            }
        } else {
            for method in &route.methods {
                node.routes.insert(*method, route.clone());
            }
        }

        for method in &route.methods {
            self.registered.insert((*method, literal.clone()));
        }
        Ok(route)
    }

    /// Find a route for a concrete method and path.
    pub fn find(&self, method: Method, path: &str) -> Option<RouteMatch> {
        let path = self.normalize(path);
        let mut segments: Vec<&str> = split_segments(&path);
        if self.keeps_trailing_slash(&path) {
            segments.push("/");
        }
        let mut params = Vec::new();
        let route = search(&self.root, &segments, 0, method, &mut params)?;
        Some(RouteMatch {
            route,
            params: params.into_iter().collect(),
        })
    }

    fn normalize(&self, path: &str) -> String {
        match self.trailing_slash {
            TrailingSlash::Lenient if path.len() > 1 => path.trim_end_matches('/').to_string(),
            _ => path.to_string(),
        }
    }

    // Under the strict policy a trailing slash is a distinct path segment.
    fn keeps_trailing_slash(&self, path: &str) -> bool {
        self.trailing_slash == TrailingSlash::Strict && path.len() > 1 && path.ends_with('/')
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

fn split_segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Collapse parameter and catch-all names so that patterns differing only in
/// capture names collide as duplicates.
fn literalize(path: &str) -> String {
    let parts: Vec<&str> = split_segments(path)
        .into_iter()
        .map(|seg| {
            if seg.starts_with(':') {
                ":"
            } else if seg.starts_with('*') {
                "*"
            } else {
                seg
            }
        })
        .collect();
    let mut literal = format!("/{}", parts.join("/"));
    if path.len() > 1 && path.ends_with('/') {
        // Only reachable under the strict policy; lenient normalization has
        // already stripped the slash.
        literal.push('/');
    }
    literal
}

fn search(
    node: &Node,
    segments: &[&str],
    index: usize,
    method: Method,
    params: &mut Vec<(String, String)>,
) -> Option<Arc<Route>> {
    if index == segments.len() {
        if let Some(route) = node.routes.get(&method) {
            return Some(route.clone());
        }
        // A catch-all also matches an empty tail.
        if let Some(ca) = &node.catch_all {
            if let Some(route) = ca.routes.get(&method) {
                params.push((ca.name.clone(), String::new()));
                return Some(route.clone());
            }
        }
        return None;
    }

    let segment = segments[index];

    if let Some(child) = node.statics.get(segment) {
        if let Some(route) = search(child, segments, index + 1, method, params) {
            return Some(route);
        }
    }

    if let Some(edge) = &node.param {
        params.push((edge.name.clone(), segment.to_string()));
        if let Some(route) = search(&edge.node, segments, index + 1, method, params) {
            return Some(route);
        }
        params.pop();
    }

    if let Some(ca) = &node.catch_all {
        if let Some(route) = ca.routes.get(&method) {
            params.push((ca.name.clone(), segments[index..].join("/")));
            return Some(route.clone());
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::Scope;

    fn route_for(app: &Scope, methods: Vec<Method>, path: &str) -> Route {
        Route {
            methods,
            path: path.to_string(),
            metadata: HashMap::new(),
            handler: crate::handler::into_handler(|_ctx| async { "" }),
            owner: app.node_arc(),
        }
    }

    fn router_with(paths: &[(Method, &str)]) -> Router {
        let app = Scope::new();
        let mut router = Router::new();
        for (method, path) in paths {
            router
                .add(route_for(&app, vec![*method], path))
                .expect("route should register");
        }
        router
    }

    #[test]
    fn test_static_match() {
        let router = router_with(&[(Method::Get, "/users")]);
        let found = router.find(Method::Get, "/users").unwrap();
        assert_eq!(found.route.path, "/users");
        assert!(found.params.is_empty());
        assert!(router.find(Method::Post, "/users").is_none());
        assert!(router.find(Method::Get, "/posts").is_none());
    }

    #[test]
    fn test_param_extraction() {
        let router = router_with(&[(Method::Get, "/users/:id/posts/:post_id")]);
        let found = router.find(Method::Get, "/users/7/posts/42").unwrap();
        assert_eq!(found.params.get("id"), Some(&"7".to_string()));
        assert_eq!(found.params.get("post_id"), Some(&"42".to_string()));
    }

    #[test]
    fn test_static_wins_over_param() {
        let router = router_with(&[
            (Method::Get, "/users/:id"),
            (Method::Get, "/users/me"),
        ]);
        let found = router.find(Method::Get, "/users/me").unwrap();
        assert_eq!(found.route.path, "/users/me");
        assert!(found.params.is_empty());

        let found = router.find(Method::Get, "/users/9").unwrap();
        assert_eq!(found.params.get("id"), Some(&"9".to_string()));
    }

    #[test]
    fn test_backtrack_to_param_on_method_mismatch() {
        let router = router_with(&[
            (Method::Get, "/a/b"),
            (Method::Post, "/a/:x"),
        ]);
        let found = router.find(Method::Post, "/a/b").unwrap();
        assert_eq!(found.params.get("x"), Some(&"b".to_string()));
    }

    #[test]
    fn test_catch_all() {
        let router = router_with(&[(Method::Get, "/files/*rest")]);
        let found = router.find(Method::Get, "/files/a/b/c.txt").unwrap();
        assert_eq!(found.params.get("rest"), Some(&"a/b/c.txt".to_string()));

        let found = router.find(Method::Get, "/files").unwrap();
        assert_eq!(found.params.get("rest"), Some(&"".to_string()));
    }

    #[test]
    fn test_param_wins_over_catch_all() {
        let router = router_with(&[
            (Method::Get, "/files/:name"),
            (Method::Get, "/files/*rest"),
        ]);
        let found = router.find(Method::Get, "/files/a").unwrap();
        assert_eq!(found.params.get("name"), Some(&"a".to_string()));

        let found = router.find(Method::Get, "/files/a/b").unwrap();
        assert_eq!(found.params.get("rest"), Some(&"a/b".to_string()));
    }

    #[test]
    fn test_duplicate_rejected() {
        let app = Scope::new();
        let mut router = Router::new();
        router
            .add(route_for(&app, vec![Method::Get], "/users/:id"))
            .unwrap();
        let err = router
            .add(route_for(&app, vec![Method::Get], "/users/:name"))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateRoute { .. }));
    }

    #[test]
    fn test_same_path_different_methods_allowed() {
        let router = router_with(&[
            (Method::Get, "/users"),
            (Method::Post, "/users"),
        ]);
        assert!(router.find(Method::Get, "/users").is_some());
        assert!(router.find(Method::Post, "/users").is_some());
    }

    #[test]
    fn test_trailing_slash_lenient_default() {
        let router = router_with(&[(Method::Get, "/users")]);
        assert!(router.find(Method::Get, "/users/").is_some());

        let router = router_with(&[(Method::Get, "/users/")]);
        assert!(router.find(Method::Get, "/users").is_some());
    }

    #[test]
    fn test_trailing_slash_strict() {
        let app = Scope::new();
        let mut router = Router::with_trailing_slash(TrailingSlash::Strict);
        router
            .add(route_for(&app, vec![Method::Get], "/users"))
            .unwrap();
        assert!(router.find(Method::Get, "/users").is_some());
        assert!(router.find(Method::Get, "/users/").is_none());
    }

    #[test]
    fn test_root_path() {
        let router = router_with(&[(Method::Get, "/")]);
        let found = router.find(Method::Get, "/").unwrap();
        assert_eq!(found.route.path, "/");
    }

    #[test]
    fn test_conflicting_param_names_rejected() {
        let app = Scope::new();
        let mut router = Router::new();
        router
            .add(route_for(&app, vec![Method::Get], "/u/:id/a"))
            .unwrap();
        let err = router
            .add(route_for(&app, vec![Method::Get], "/u/:name/b"))
            .unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }

    #[test]
    fn test_descriptor_meta_apply() {
        let app = Scope::new();
        let mut route = route_for(&app, vec![Method::Get], "/x");
        RouteDescriptor::meta("k", serde_json::json!(true)).apply(&mut route);
        assert_eq!(route.meta("k"), Some(&serde_json::json!(true)));
    }
}
