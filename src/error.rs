use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Storage unavailable: {0}")]
    Storage(String),
    #[error("Not authenticated")]
    NotAuthenticated,
    #[error("Authentication failed")]
    AuthError,
    #[error("Invalid chat reference: {0}")]
    InvalidReference(String),
    /// Raised by a store when a concurrent first contact already created the
    /// conversation for the same pair. Resolved inside the conversation service.
    #[error("Conversation already exists for this participant pair")]
    DuplicateConversation,
    #[error("Not found")]
    NotFound,
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Internal server error")]
    Internal,
}

pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    /// Whether the failure came from the persistence backend. Such failures are
    /// safe for the sender to retry.
    #[must_use]
    pub const fn is_persistence_failure(&self) -> bool {
        matches!(self, Self::Database(_) | Self::Storage(_))
    }

    /// Short reason delivered on the live channel. Never leaks backend details.
    #[must_use]
    pub fn client_reason(&self) -> String {
        match self {
            Self::Database(_) | Self::Storage(_) => "Storage unavailable".to_string(),
            Self::NotAuthenticated => "Not authenticated".to_string(),
            Self::AuthError => "Authentication failed".to_string(),
            Self::InvalidReference(msg) => format!("Invalid chat reference: {msg}"),
            Self::BadRequest(msg) => msg.clone(),
            Self::NotFound => "Not found".to_string(),
            Self::DuplicateConversation | Self::Internal => "Internal server error".to_string(),
        }
    }
}

impl AppError {
    /// Reason for a rejected `send_message`. A persistence failure here means
    /// the message itself was not stored.
    #[must_use]
    pub fn send_failure_reason(&self) -> String {
        if self.is_persistence_failure() { "Failed to store message".to_string() } else { self.client_reason() }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Database(e) => {
                tracing::error!(error = %e, "Database error");
                (StatusCode::SERVICE_UNAVAILABLE, "Storage unavailable".to_string())
            }
            Self::Storage(e) => {
                tracing::error!(error = %e, "Storage error");
                (StatusCode::SERVICE_UNAVAILABLE, "Storage unavailable".to_string())
            }
            Self::NotAuthenticated | Self::AuthError => {
                tracing::debug!("Authentication failed");
                (StatusCode::UNAUTHORIZED, "Unauthorized".to_string())
            }
            Self::InvalidReference(msg) => {
                tracing::debug!(message = %msg, "Invalid chat reference");
                (StatusCode::BAD_REQUEST, format!("Invalid chat reference: {msg}"))
            }
            Self::NotFound => {
                tracing::debug!("Resource not found");
                (StatusCode::NOT_FOUND, "Not found".to_string())
            }
            Self::BadRequest(msg) => {
                tracing::debug!(message = %msg, "Bad request");
                (StatusCode::BAD_REQUEST, msg)
            }
            Self::DuplicateConversation | Self::Internal => {
                tracing::error!("Internal server error occurred");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}
