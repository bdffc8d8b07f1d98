//! Error types for the webmcp server and client.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// webmcp errors.
///
/// Auth-layer failures (`Unauthorized`, `Forbidden`) propagate as faults and
/// are translated to transport status codes by the HTTP router. Tool
/// execution failures never use this type across the service boundary; they
/// are reported as an `"error"` key inside the tool result payload so the
/// router can always answer with a well-formed JSON body.
#[derive(Error, Debug)]
pub enum Error {
    /// Missing, invalid, expired, or inactive credential.
    #[error("{0}")]
    Unauthorized(String),

    /// Valid credential lacking permission for the targeted service.
    #[error("{0}")]
    Forbidden(String),

    /// Service name does not resolve to a registered running service.
    #[error("Service not found or not running: {0}")]
    ServiceNotFound(String),

    /// Configuration error (missing key material, unreadable file, ...).
    #[error("configuration error: {0}")]
    Config(String),

    /// Automation operation exceeded its session timeout.
    #[error("operation timed out after {0}s")]
    Timeout(u64),

    /// Client-side API failure.
    #[error("{0}")]
    Client(String),

    /// WebDriver error.
    #[error("webdriver error: {0}")]
    WebDriver(#[from] thirtyfour::error::WebDriverError),

    /// Outbound HTTP error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// JWT encoding/decoding error.
    #[error("jwt error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML config (de)serialization error.
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Get the HTTP status code for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::Forbidden(_) => StatusCode::FORBIDDEN,
            Error::ServiceNotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Shorthand for an [`Error::Unauthorized`].
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Error::Unauthorized(msg.into())
    }

    /// Shorthand for an [`Error::Forbidden`].
    pub fn forbidden(msg: impl Into<String>) -> Self {
        Error::Forbidden(msg.into())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (self.status(), body).into_response()
    }
}
