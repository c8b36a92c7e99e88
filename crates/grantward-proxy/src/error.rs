//! Error types for the grant proxy.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// Result type alias for this crate.
pub type Result<T> = std::result::Result<T, ProxyError>;

/// Fixed message shown to clients for every credential failure.
pub const INVALID_CREDENTIALS_MESSAGE: &str = "Invalid Credentials!";

/// Message used when the authorization server rejects a grant without saying why.
pub const DEFAULT_REJECTION_MESSAGE: &str = "Invalid Credentials";

/// Errors that can occur in the grant proxy.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// The authorization server rejected the grant (bad password, bad client,
    /// revoked or expired refresh token).
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    /// Cookie custody is active and the request carried no refresh token cookie.
    #[error("Missing refresh token cookie")]
    MissingRefreshTokenCookie,

    /// Explicit custody is active and the caller supplied no refresh token.
    #[error("Missing refresh token")]
    MissingRefreshToken,

    /// The authorization server answered with a success status but the body
    /// broke the token response contract.
    #[error("Malformed token response: {0}")]
    MalformedTokenResponse(String),

    /// Network/HTTP error talking to the authorization server.
    #[error("Network error: {0}")]
    Network(String),

    /// Persistence layer failure.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),

    /// The client's request body could not be read.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ProxyError {
    /// Build an `InvalidCredentials` error, substituting the default text for
    /// an empty upstream message.
    pub fn invalid_credentials(message: impl Into<String>) -> Self {
        let message = message.into();
        if message.is_empty() {
            ProxyError::InvalidCredentials(DEFAULT_REJECTION_MESSAGE.to_string())
        } else {
            ProxyError::InvalidCredentials(message)
        }
    }

    /// Whether this error means "the caller could not be authenticated".
    pub fn is_credential_failure(&self) -> bool {
        matches!(
            self,
            ProxyError::InvalidCredentials(_)
                | ProxyError::MissingRefreshTokenCookie
                | ProxyError::MissingRefreshToken
        )
    }
}

impl From<reqwest::Error> for ProxyError {
    fn from(e: reqwest::Error) -> Self {
        ProxyError::Network(e.to_string())
    }
}

impl From<rusqlite::Error> for ProxyError {
    fn from(e: rusqlite::Error) -> Self {
        ProxyError::Storage(e.to_string())
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        // Upstream detail stays in the logs; clients only see the generic text.
        let (status, message) = match &self {
            ProxyError::InvalidCredentials(_)
            | ProxyError::MissingRefreshTokenCookie
            | ProxyError::MissingRefreshToken => {
                (StatusCode::UNAUTHORIZED, INVALID_CREDENTIALS_MESSAGE)
            }
            ProxyError::MalformedTokenResponse(_) | ProxyError::Network(_) => {
                (StatusCode::BAD_GATEWAY, "Authorization server unavailable")
            }
            ProxyError::Storage(_) | ProxyError::Config(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
            ProxyError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "Invalid request"),
        };

        if matches!(self, ProxyError::InvalidRequest(_)) {
            tracing::debug!(error = %self, "Rejected request");
        } else if !self.is_credential_failure() {
            tracing::error!(error = %self, "Request failed");
        }

        let body = serde_json::json!({
            "message": message,
            "code": status.as_u16(),
        });

        (status, Json(body)).into_response()
    }
}
