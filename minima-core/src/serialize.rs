// Response payloads and the serializer seam

use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use crate::context::Context;
use crate::error::Error;

/// Response data flowing through `transform` hooks on its way to the wire.
#[derive(Debug, Clone)]
pub enum Payload {
    Empty,
    Text(String),
    Binary(Bytes),
    Json(Value),
}

impl Payload {
    /// Build a JSON payload from any serializable value.
    pub fn json<T: Serialize>(value: &T) -> Result<Payload, Error> {
        serde_json::to_value(value)
            .map(Payload::Json)
            .map_err(|e| Error::Serialization(e.to_string()))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Payload::Empty)
    }
}

impl From<String> for Payload {
    fn from(s: String) -> Self {
        Payload::Text(s)
    }
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Payload::Text(s.to_string())
    }
}

impl From<Bytes> for Payload {
    fn from(b: Bytes) -> Self {
        Payload::Binary(b)
    }
}

impl From<Value> for Payload {
    fn from(v: Value) -> Self {
        Payload::Json(v)
    }
}

/// Serializer: payload to wire bytes.
///
/// The default passes text and binary through and JSON-encodes everything
/// else. Scopes may override it via `Scope::set_serializer`; the innermost
/// override along the scope chain wins.
pub type SerializerFn = Arc<dyn Fn(Payload, &Context) -> Result<Bytes, Error> + Send + Sync>;

pub fn default_serializer() -> SerializerFn {
    Arc::new(serialize_default)
}

fn serialize_default(payload: Payload, ctx: &Context) -> Result<Bytes, Error> {
    match payload {
        Payload::Empty => Ok(Bytes::new()),
        Payload::Text(text) => {
            ctx.set_default_header("content-type", "text/plain; charset=utf-8");
            Ok(Bytes::from(text))
        }
        Payload::Binary(bytes) => {
            ctx.set_default_header("content-type", "application/octet-stream");
            Ok(bytes)
        }
        Payload::Json(value) => {
            ctx.set_default_header("content-type", "application/json");
            let body =
                serde_json::to_vec(&value).map_err(|e| Error::Serialization(e.to_string()))?;
            Ok(Bytes::from(body))
        }
    }
}
