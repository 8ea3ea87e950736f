// Transport-independent HTTP request and response envelopes

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::Error;

/// HTTP method token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Patch => "PATCH",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
        }
    }

    pub fn parse(s: &str) -> Option<Method> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Some(Method::Get),
            "POST" => Some(Method::Post),
            "PUT" => Some(Method::Put),
            "DELETE" => Some(Method::Delete),
            "PATCH" => Some(Method::Patch),
            "HEAD" => Some(Method::Head),
            "OPTIONS" => Some(Method::Options),
            _ => None,
        }
    }

    /// Every method token, in helper-registration order.
    pub fn all() -> [Method; 7] {
        [
            Method::Get,
            Method::Post,
            Method::Put,
            Method::Delete,
            Method::Patch,
            Method::Head,
            Method::Options,
        ]
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HTTP request wrapper.
///
/// Header names are normalized to lowercase on insertion. The body is stored
/// as `Bytes` so adapters can hand it over without copying.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    uri: String,
    headers: HashMap<String, String>,
    body: Bytes,
}

impl HttpRequest {
    pub fn new(method: Method, uri: impl Into<String>) -> Self {
        Self {
            method,
            uri: uri.into(),
            headers: HashMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn get(uri: impl Into<String>) -> Self {
        Self::new(Method::Get, uri)
    }

    pub fn post(uri: impl Into<String>) -> Self {
        Self::new(Method::Post, uri)
    }

    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.insert_header(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Set a JSON body and the matching content type.
    pub fn with_json<T: Serialize>(mut self, value: &T) -> Result<Self, Error> {
        let body = serde_json::to_vec(value).map_err(|e| Error::Serialization(e.to_string()))?;
        self.body = Bytes::from(body);
        self.insert_header("content-type", "application/json");
        Ok(self)
    }

    pub fn insert_header(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
    }

    /// Header lookup, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(|s| s.as_str())
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// The request target as received (path plus optional query string).
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// The path component of the request target.
    pub fn path(&self) -> &str {
        let (start, end) = path_span(&self.uri);
        &self.uri[start..end]
    }

    pub fn query_string(&self) -> Option<&str> {
        self.uri.split_once('?').map(|(_, q)| q)
    }

    /// Parse the query string into a map. Later duplicates win.
    pub fn query_params(&self) -> HashMap<String, String> {
        self.query_string().map(parse_query_string).unwrap_or_default()
    }

    pub fn query(&self, name: &str) -> Option<String> {
        self.query_params().remove(name)
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn body_ref(&self) -> &[u8] {
        &self.body
    }

    /// Parse the request body as JSON.
    pub fn json<T: for<'de> Deserialize<'de>>(&self) -> Result<T, Error> {
        serde_json::from_slice(&self.body).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Parse URL-encoded form data into a map.
    pub fn form_map(&self) -> Result<HashMap<String, String>, Error> {
        serde_urlencoded::from_bytes(&self.body).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// The request body as UTF-8 text.
    pub fn text(&self) -> Result<String, Error> {
        String::from_utf8(self.body.to_vec())
            .map_err(|e| Error::Serialization(format!("body is not valid UTF-8: {}", e)))
    }
}

/// Byte offsets of the path component within a request target.
///
/// Handles both origin-form (`/a/b?q`) and absolute-form
/// (`http://host/a/b?q`) targets; the cached offsets let the dispatcher
/// reconstruct the full URL after proxy plugins rewrite the host or scheme.
pub(crate) fn path_span(uri: &str) -> (usize, usize) {
    let start = if let Some(rest) = uri
        .strip_prefix("http://")
        .or_else(|| uri.strip_prefix("https://"))
    {
        let scheme_len = uri.len() - rest.len();
        match rest.find('/') {
            Some(i) => scheme_len + i,
            None => uri.len(),
        }
    } else {
        0
    };
    let end = uri[start..]
        .find('?')
        .map(|i| start + i)
        .unwrap_or(uri.len());
    (start, end)
}

/// Parse a query string into a map of parameters.
pub fn parse_query_string(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter(|part| !part.is_empty())
        .filter_map(|part| {
            let mut split = part.splitn(2, '=');
            let key = split.next()?;
            let value = split.next().unwrap_or("");
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}

/// HTTP response wrapper.
///
/// Header names are normalized to lowercase. The body is `Bytes` for
/// zero-copy handoff to the adapter.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub status_text: Option<String>,
    pub headers: HashMap<String, String>,
    body: Bytes,
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            status_text: None,
            headers: HashMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn ok() -> Self {
        Self::new(200)
    }

    pub fn created() -> Self {
        Self::new(201)
    }

    pub fn no_content() -> Self {
        Self::new(204)
    }

    pub fn not_found() -> Self {
        Self::new(404)
    }

    pub fn internal_server_error() -> Self {
        Self::new(500)
    }

    pub fn with_status_text(mut self, text: impl Into<String>) -> Self {
        self.status_text = Some(text.into());
        self
    }

    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.insert_header(name, value);
        self
    }

    pub fn insert_header(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(|s| s.as_str())
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Set a JSON body and the matching content type.
    pub fn with_json<T: Serialize>(mut self, value: &T) -> Result<Self, Error> {
        let body = serde_json::to_vec(value).map_err(|e| Error::Serialization(e.to_string()))?;
        self.body = Bytes::from(body);
        self.insert_header("content-type", "application/json");
        Ok(self)
    }

    /// Set a plain-text body and the matching content type.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.body = Bytes::from(text.into());
        self.insert_header("content-type", "text/plain; charset=utf-8");
        self
    }

    pub fn body_ref(&self) -> &[u8] {
        &self.body
    }

    pub fn body_bytes(&self) -> Bytes {
        self.body.clone()
    }

    pub fn into_body_bytes(self) -> Bytes {
        self.body
    }

    /// Parse the response body as JSON.
    pub fn json<T: for<'de> Deserialize<'de>>(&self) -> Result<T, Error> {
        serde_json::from_slice(&self.body).map_err(|e| Error::Serialization(e.to_string()))
    }
}
