// Route handler types and return-value conversion

use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

use crate::context::Context;
use crate::error::Error;
use crate::hooks::BoxFuture;
use crate::http::HttpResponse;
use crate::serialize::Payload;

/// Boxed route handler stored on a `Route`.
pub type HandlerFn = Arc<dyn Fn(Context) -> BoxFuture<Result<Reply, Error>> + Send + Sync>;

/// What a handler hands back to the dispatcher.
///
/// A `Payload` flows through `transform` hooks, the serializer, and `send`
/// hooks; a `Response` is used verbatim with no header merge.
#[derive(Debug)]
pub enum Reply {
    Payload(Payload),
    Response(HttpResponse),
}

/// Marker wrapper: serialize the inner value as a JSON payload.
pub struct Json<T>(pub T);

/// Conversion from handler return values into a `Reply`.
pub trait IntoReply {
    fn into_reply(self) -> Result<Reply, Error>;
}

impl IntoReply for Reply {
    fn into_reply(self) -> Result<Reply, Error> {
        Ok(self)
    }
}

impl IntoReply for Payload {
    fn into_reply(self) -> Result<Reply, Error> {
        Ok(Reply::Payload(self))
    }
}

impl IntoReply for HttpResponse {
    fn into_reply(self) -> Result<Reply, Error> {
        Ok(Reply::Response(self))
    }
}

impl IntoReply for () {
    fn into_reply(self) -> Result<Reply, Error> {
        Ok(Reply::Payload(Payload::Empty))
    }
}

impl IntoReply for &'static str {
    fn into_reply(self) -> Result<Reply, Error> {
        Ok(Reply::Payload(Payload::Text(self.to_string())))
    }
}

impl IntoReply for String {
    fn into_reply(self) -> Result<Reply, Error> {
        Ok(Reply::Payload(Payload::Text(self)))
    }
}

impl IntoReply for Bytes {
    fn into_reply(self) -> Result<Reply, Error> {
        Ok(Reply::Payload(Payload::Binary(self)))
    }
}

impl IntoReply for Vec<u8> {
    fn into_reply(self) -> Result<Reply, Error> {
        Ok(Reply::Payload(Payload::Binary(Bytes::from(self))))
    }
}

impl IntoReply for Value {
    fn into_reply(self) -> Result<Reply, Error> {
        Ok(Reply::Payload(Payload::Json(self)))
    }
}

impl<T: Serialize> IntoReply for Json<T> {
    fn into_reply(self) -> Result<Reply, Error> {
        Ok(Reply::Payload(Payload::json(&self.0)?))
    }
}

impl<T, E> IntoReply for Result<T, E>
where
    T: IntoReply,
    E: Into<Error>,
{
    fn into_reply(self) -> Result<Reply, Error> {
        match self {
            Ok(value) => value.into_reply(),
            Err(e) => Err(e.into()),
        }
    }
}

/// Box a handler closure into the stored `HandlerFn` shape.
pub fn into_handler<F, Fut, R>(f: F) -> HandlerFn
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoReply + 'static,
{
    Arc::new(move |ctx| {
        let fut = f(ctx);
        Box::pin(async move { fut.await.into_reply() })
    })
}
