//! # Error Handling
//!
//! This module defines the error types used across the service:
//!
//! - **AppError**: errors returned by HTTP handlers, rendered as JSON responses
//! - **VoiceLinkError**: errors that end a voice link session and are reported
//!   to the caller through the status callback
//!
//! Vendor failures (`ImagingError`) convert into `AppError::Upstream` so deep
//! scan handlers can use `?` and still answer 502.

use crate::imaging::ImagingError;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;

/// Errors returned by the HTTP API.
///
/// Status codes: `BadRequest` and `ValidationError` map to 400, `NotFound`
/// to 404, `Upstream` to 502 and everything else to 500.
///
/// ```rust,ignore
/// return Err(AppError::BadRequest("Description must not be empty".to_string()));
/// ```
#[derive(Debug)]
pub enum AppError {
    /// Internal server errors
    Internal(String),

    /// Client sent invalid or malformed data
    BadRequest(String),

    /// Requested resource was not found
    NotFound(String),

    /// Configuration file or environment variable problems
    ConfigError(String),

    /// User input failed validation rules
    ValidationError(String),

    /// A vendor endpoint (image generation, live session) failed
    Upstream(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            AppError::Upstream(msg) => write!(f, "Upstream error: {}", msg),
        }
    }
}

impl AppError {
    /// Machine-readable error type used in JSON responses.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Internal(_) => "internal_error",
            AppError::BadRequest(_) => "bad_request",
            AppError::NotFound(_) => "not_found",
            AppError::ConfigError(_) => "config_error",
            AppError::ValidationError(_) => "validation_error",
            AppError::Upstream(_) => "upstream_error",
        }
    }

    fn message(&self) -> &str {
        match self {
            AppError::Internal(msg)
            | AppError::BadRequest(msg)
            | AppError::NotFound(msg)
            | AppError::ConfigError(msg)
            | AppError::ValidationError(msg)
            | AppError::Upstream(msg) => msg,
        }
    }
}

/// Converts our errors into JSON HTTP responses.
///
/// ## JSON Response Format:
/// ```json
/// {
///   "error": {
///     "type": "upstream_error",
///     "message": "No image data found in response",
///     "timestamp": "2025-01-01T12:00:00Z"
///   }
/// }
/// ```
impl ResponseError for AppError {
    fn status_code(&self) -> actix_web::http::StatusCode {
        use actix_web::http::StatusCode;

        match self {
            AppError::Internal(_) | AppError::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::BadRequest(_) | AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "error": {
                "type": self.kind(),
                "message": self.message(),
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }))
    }
}

/// When you use `?` with an anyhow::Error, it becomes an AppError::Internal.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// JSON parsing errors are almost always caused by the client, so they map to 400.
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(format!("JSON parsing error: {}", err))
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

impl From<ImagingError> for AppError {
    fn from(err: ImagingError) -> Self {
        AppError::Upstream(err.to_string())
    }
}

/// Shorthand for `Result<T, AppError>`.
pub type AppResult<T> = Result<T, AppError>;

/// Errors that terminate a voice link session.
///
/// None of these are fatal to the process. The session moves to `Errored`,
/// the error is reported once through the status callback, and the caller
/// decides whether to reconnect.
#[derive(Debug, Clone, PartialEq)]
pub enum VoiceLinkError {
    /// Microphone access was refused (or the request was abandoned)
    PermissionDenied(String),

    /// The remote live session could not be opened
    HandshakeFailure(String),

    /// The remote live session failed while it was open
    TransportError(String),

    /// An inbound audio payload could not be decoded
    DecodeError(String),

    /// The output device could not be opened
    DeviceUnavailable(String),
}

impl VoiceLinkError {
    /// Stable identifier sent to clients alongside the message.
    pub fn code(&self) -> &'static str {
        match self {
            VoiceLinkError::PermissionDenied(_) => "permission_denied",
            VoiceLinkError::HandshakeFailure(_) => "handshake_failure",
            VoiceLinkError::TransportError(_) => "transport_error",
            VoiceLinkError::DecodeError(_) => "decode_error",
            VoiceLinkError::DeviceUnavailable(_) => "device_unavailable",
        }
    }
}

impl fmt::Display for VoiceLinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VoiceLinkError::PermissionDenied(msg) => write!(f, "Microphone permission denied: {}", msg),
            VoiceLinkError::HandshakeFailure(msg) => write!(f, "Live session handshake failed: {}", msg),
            VoiceLinkError::TransportError(msg) => write!(f, "Live session transport error: {}", msg),
            VoiceLinkError::DecodeError(msg) => write!(f, "Audio decode error: {}", msg),
            VoiceLinkError::DeviceUnavailable(msg) => write!(f, "Audio device unavailable: {}", msg),
        }
    }
}

impl std::error::Error for VoiceLinkError {}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;

    #[test]
    fn test_status_codes() {
        assert_eq!(AppError::BadRequest("x".into()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::Upstream("x".into()).status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(AppError::ConfigError("x".into()).status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_voice_link_error_codes() {
        let err = VoiceLinkError::PermissionDenied("user dismissed prompt".to_string());
        assert_eq!(err.code(), "permission_denied");
        assert!(err.to_string().contains("user dismissed prompt"));
    }
}
