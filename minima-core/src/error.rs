// Error types for the Minima framework

use serde_json::{json, Value};
use thiserror::Error;
use tracing::error;

use crate::http::HttpResponse;

#[derive(Error, Debug)]
pub enum Error {
    /// An HTTP failure with an explicit status carried by the thrower.
    #[error("{message}")]
    Http { status: u16, message: String },

    #[error("Route {method} {path} not found")]
    RouteNotFound { method: String, path: String },

    /// Rendered as a 301/302 with a `Location` header and an empty body.
    #[error("redirect to {location}")]
    Redirect { location: String, permanent: bool },

    #[error("Validation failed: {message}")]
    Validation { message: String, issues: Vec<String> },

    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The client is gone; nothing further may be written.
    #[error("request aborted by the client")]
    Aborted,

    #[error("Duplicate route: {method} {path}")]
    DuplicateRoute { method: String, path: String },

    /// Registration or hook mutation attempted outside the allowed phase.
    #[error("Lifecycle error: {0}")]
    Lifecycle(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get the HTTP status code this error renders with.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Http { status, .. } => *status,
            Error::RouteNotFound { .. } => 404,
            Error::Redirect { permanent, .. } => {
                if *permanent {
                    301
                } else {
                    302
                }
            }
            Error::Validation { .. } => 422,
            Error::Forbidden(_) => 403,
            Error::Aborted => 499,
            _ => 500,
        }
    }

    /// The status the error itself carries, if any.
    ///
    /// Unknown-class errors (`Internal`, `Io`, ...) carry none; for those the
    /// error path falls back to the response state and finally to 500.
    pub fn carried_status(&self) -> Option<u16> {
        match self {
            Error::Http { .. }
            | Error::RouteNotFound { .. }
            | Error::Redirect { .. }
            | Error::Validation { .. }
            | Error::Forbidden(_) => Some(self.status_code()),
            _ => None,
        }
    }

    /// Human-readable message, as exposed to error hooks.
    pub fn message(&self) -> String {
        match self {
            Error::Http { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, Error::Aborted)
    }

    /// Check if this is a client error (4xx)
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }

    /// Check if this is a server error (5xx)
    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status_code())
    }

    // ============================================================================
    // Convenience Constructors
    // ============================================================================

    /// Create an HTTP error with an explicit status.
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::http(400, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::http(401, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn not_found(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self::RouteNotFound {
            method: method.into(),
            path: path.into(),
        }
    }

    /// Temporary (302) redirect.
    pub fn redirect(location: impl Into<String>) -> Self {
        Self::Redirect {
            location: location.into(),
            permanent: false,
        }
    }

    /// Permanent (301) redirect.
    pub fn redirect_permanent(location: impl Into<String>) -> Self {
        Self::Redirect {
            location: location.into(),
            permanent: true,
        }
    }

    pub fn validation(message: impl Into<String>, issues: Vec<String>) -> Self {
        Self::Validation {
            message: message.into(),
            issues,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// The JSON body this error renders with, per the default render contract.
    ///
    /// `Redirect` and `Aborted` have no body; unknown-class errors render the
    /// opaque 500 body (the original is logged by `to_response`).
    pub fn render_body(&self) -> Option<Value> {
        match self {
            Error::Http { message, .. } => Some(json!({ "message": message })),
            Error::RouteNotFound { method, path } => Some(json!({
                "message": format!("Route {} {} not found", method, path),
            })),
            Error::Validation { message, issues } => Some(json!({
                "message": message,
                "issues": issues,
            })),
            Error::Forbidden(message) => Some(json!({ "message": message })),
            Error::Redirect { .. } | Error::Aborted => None,
            _ => Some(json!({ "message": "Unable to process request" })),
        }
    }

    /// Default renderer: turn the error into a response.
    ///
    /// Used when no error hook is installed in the scope chain, or when an
    /// error hook itself fails.
    pub fn to_response(&self) -> HttpResponse {
        match self {
            Error::Redirect { location, .. } => HttpResponse::new(self.status_code())
                .with_header("location", location.clone()),
            Error::Aborted => HttpResponse::new(self.status_code()),
            known if known.carried_status().is_some() => {
                let body = self.render_body().unwrap_or(Value::Null);
                HttpResponse::new(self.status_code())
                    .with_json(&body)
                    .unwrap_or_else(|_| HttpResponse::new(500))
            }
            unknown => {
                error!(error = %unknown, "unhandled error while processing request");
                HttpResponse::new(500)
                    .with_json(&json!({ "message": "Unable to process request" }))
                    .unwrap_or_else(|_| HttpResponse::new(500))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_error_status() {
        let err = Error::http(418, "boom");
        assert_eq!(err.status_code(), 418);
        assert_eq!(err.carried_status(), Some(418));
        assert_eq!(err.message(), "boom");
        assert!(err.is_client_error());
    }

    #[test]
    fn test_route_not_found_render() {
        let err = Error::not_found("GET", "/missing");
        assert_eq!(err.status_code(), 404);
        let body = err.render_body().unwrap();
        assert_eq!(body["message"], "Route GET /missing not found");
    }

    #[test]
    fn test_redirect_statuses() {
        assert_eq!(Error::redirect("/next").status_code(), 302);
        assert_eq!(Error::redirect_permanent("/next").status_code(), 301);
    }

    #[test]
    fn test_redirect_response_has_location_and_empty_body() {
        let resp = Error::redirect_permanent("/elsewhere").to_response();
        assert_eq!(resp.status, 301);
        assert_eq!(resp.header("location"), Some("/elsewhere"));
        assert!(resp.body_ref().is_empty());
    }

    #[test]
    fn test_validation_render() {
        let err = Error::validation("bad payload", vec!["name required".into()]);
        assert_eq!(err.status_code(), 422);
        let body = err.render_body().unwrap();
        assert_eq!(body["issues"][0], "name required");
    }

    #[test]
    fn test_unknown_error_renders_opaque_500() {
        let err = Error::internal("db connection lost");
        assert_eq!(err.carried_status(), None);
        let body = err.render_body().unwrap();
        assert_eq!(body["message"], "Unable to process request");
        assert!(err.is_server_error());
    }

    #[test]
    fn test_forbidden() {
        let err = Error::forbidden("no access");
        assert_eq!(err.status_code(), 403);
        assert_eq!(err.render_body().unwrap()["message"], "no access");
    }

    #[test]
    fn test_aborted_is_never_rendered_with_body() {
        let err = Error::Aborted;
        assert!(err.is_aborted());
        assert!(err.render_body().is_none());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert_eq!(err.carried_status(), None);
    }
}
