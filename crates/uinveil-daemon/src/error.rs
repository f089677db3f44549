//! Error types for the uinveil daemon.
//!
//! [`DaemonError`] renders as a JSON `{code, message}` body; wrap it in
//! [`PlainError`] for routes that answer in plain text.

use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use uinveil::CloakError;
use uinveil_common::ErrorBody;

/// Errors that can occur in the daemon.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// I/O error (file operations, socket binding).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML deserialization error.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Codec or policy failure.
    #[error(transparent)]
    Cloak(#[from] CloakError),

    /// Bearer token, license id or license key rejected.
    #[error("Unauthorized")]
    Unauthorized,

    /// Unknown license id on a signed URL.
    #[error("Invalid license")]
    InvalidLicense,

    /// Required request parameter absent.
    #[error("Missing parameter: {0}")]
    MissingParameter(String),

    /// Malformed request.
    #[error("{0}")]
    BadRequest(String),

    /// Upstream fetch failed before a response arrived.
    #[error("Upstream error: {0}")]
    Upstream(#[from] reqwest::Error),
}

/// Result type alias using `DaemonError`.
pub type Result<T> = std::result::Result<T, DaemonError>;

impl DaemonError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::MissingParameter(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::InvalidLicense => StatusCode::FORBIDDEN,
            Self::Cloak(e) if e.is_validation() => StatusCode::BAD_REQUEST,
            Self::Cloak(e) if e.is_forbidden() => StatusCode::FORBIDDEN,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show a client.
    ///
    /// Internal failures and forgeries are reduced to their status text.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::Cloak(CloakError::Validation(message)) => message.clone(),
            Self::Cloak(e) if e.is_forbidden() => "Forbidden".to_string(),
            Self::Unauthorized
            | Self::InvalidLicense
            | Self::MissingParameter(_)
            | Self::BadRequest(_) => self.to_string(),
            Self::Upstream(_) => "Bad Gateway".to_string(),
            _ => "Internal Server Error".to_string(),
        }
    }

    fn log(&self) {
        if self.status().is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
    }
}

impl IntoResponse for DaemonError {
    fn into_response(self) -> Response {
        self.log();
        let status = self.status();
        let body = ErrorBody {
            code: status.as_u16(),
            message: self.public_message(),
        };

        let mut response = (status, Json(body)).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

/// Renders a [`DaemonError`] as a plain-text body.
#[derive(Debug)]
pub struct PlainError(pub DaemonError);

impl From<DaemonError> for PlainError {
    fn from(err: DaemonError) -> Self {
        Self(err)
    }
}

impl IntoResponse for PlainError {
    fn into_response(self) -> Response {
        self.0.log();
        (self.0.status(), self.0.public_message()).into_response()
    }
}
