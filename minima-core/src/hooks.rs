// Hook callback types and the per-scope hook store

use bytes::Bytes;
use std::sync::Arc;

use crate::context::Context;
use crate::error::Error;
use crate::http::HttpResponse;
use crate::scope::Scope;
use crate::serialize::Payload;

/// Boxed future type used by hook and handler callbacks.
pub type BoxFuture<T> = futures_util::future::BoxFuture<'static, T>;

/// Outcome of a `send` hook: pass (possibly rewritten) bytes to the next
/// hook, or short-circuit with a complete response.
pub enum SendFlow {
    Continue(Bytes),
    Respond(HttpResponse),
}

/// `request` hook: returning `Some(response)` short-circuits routing.
pub type RequestHook =
    Arc<dyn Fn(Context) -> BoxFuture<Result<Option<HttpResponse>, Error>> + Send + Sync>;

/// `transform` hook: each callback's output feeds the next.
pub type TransformHook =
    Arc<dyn Fn(Payload, Context) -> BoxFuture<Result<Payload, Error>> + Send + Sync>;

/// `send` hook: runs over the serialized body.
pub type SendHook = Arc<dyn Fn(Bytes, Context) -> BoxFuture<Result<SendFlow, Error>> + Send + Sync>;

/// `sent` / `errorSent` hook: fire-and-forget notification.
pub type NotifyHook = Arc<dyn Fn(Context) -> BoxFuture<Result<(), Error>> + Send + Sync>;

/// `error` hook: produces the response data for a failed request.
pub type ErrorHook =
    Arc<dyn Fn(Arc<Error>, Context) -> BoxFuture<Result<Payload, Error>> + Send + Sync>;

/// `ready` / `close` / `listen` / `register` hook.
pub type LifecycleHook = Arc<dyn Fn(Scope) -> BoxFuture<Result<(), Error>> + Send + Sync>;

/// Ordered per-event hook sets for one scope.
///
/// Insertion order is preserved and is the execution order within a scope.
/// Stores are mutated during boot only; after `ready()` they are read-only.
#[derive(Default, Clone)]
pub struct HookStore {
    request: Vec<RequestHook>,
    transform: Vec<TransformHook>,
    send: Vec<SendHook>,
    sent: Vec<NotifyHook>,
    error: Vec<ErrorHook>,
    error_sent: Vec<NotifyHook>,
    ready: Vec<LifecycleHook>,
    close: Vec<LifecycleHook>,
    listen: Vec<LifecycleHook>,
    register: Vec<LifecycleHook>,
}

impl HookStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_request(&mut self, hook: RequestHook) {
        self.request.push(hook);
    }

    pub fn add_transform(&mut self, hook: TransformHook) {
        self.transform.push(hook);
    }

    pub fn add_send(&mut self, hook: SendHook) {
        self.send.push(hook);
    }

    pub fn add_sent(&mut self, hook: NotifyHook) {
        self.sent.push(hook);
    }

    pub fn add_error(&mut self, hook: ErrorHook) {
        self.error.push(hook);
    }

    pub fn add_error_sent(&mut self, hook: NotifyHook) {
        self.error_sent.push(hook);
    }

    pub fn add_ready(&mut self, hook: LifecycleHook) {
        self.ready.push(hook);
    }

    pub fn add_close(&mut self, hook: LifecycleHook) {
        self.close.push(hook);
    }

    pub fn add_listen(&mut self, hook: LifecycleHook) {
        self.listen.push(hook);
    }

    pub fn add_register(&mut self, hook: LifecycleHook) {
        self.register.push(hook);
    }

    pub fn request(&self) -> &[RequestHook] {
        &self.request
    }

    pub fn transform(&self) -> &[TransformHook] {
        &self.transform
    }

    pub fn send(&self) -> &[SendHook] {
        &self.send
    }

    pub fn sent(&self) -> &[NotifyHook] {
        &self.sent
    }

    pub fn error(&self) -> &[ErrorHook] {
        &self.error
    }

    pub fn error_sent(&self) -> &[NotifyHook] {
        &self.error_sent
    }

    pub fn ready(&self) -> &[LifecycleHook] {
        &self.ready
    }

    pub fn close(&self) -> &[LifecycleHook] {
        &self.close
    }

    pub fn listen(&self) -> &[LifecycleHook] {
        &self.listen
    }

    pub fn register(&self) -> &[LifecycleHook] {
        &self.register
    }

    pub fn len(&self) -> usize {
        self.request.len()
            + self.transform.len()
            + self.send.len()
            + self.sent.len()
            + self.error.len()
            + self.error_sent.len()
            + self.ready.len()
            + self.close.len()
            + self.listen.len()
            + self.register.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for HookStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookStore")
            .field("request", &self.request.len())
            .field("transform", &self.transform.len())
            .field("send", &self.send.len())
            .field("sent", &self.sent.len())
            .field("error", &self.error.len())
            .field("error_sent", &self.error_sent.len())
            .field("ready", &self.ready.len())
            .field("close", &self.close.len())
            .field("listen", &self.listen.len())
            .field("register", &self.register.len())
            .finish()
    }
}
