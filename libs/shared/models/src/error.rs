use serde::Serialize;
use thiserror::Error;

/// Error shared by every cell that talks to the portal backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Internal Server Error: {0}")]
    Internal(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("External service error: {0}")]
    ExternalService(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Wire shape of an error reported to a caller.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub retryable: bool,
}

impl AppError {
    /// Maps a non-success HTTP status and the server-provided message.
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            401 | 403 => AppError::Auth(message),
            404 => AppError::NotFound(message),
            409 => AppError::Conflict(message),
            400 | 422 => AppError::BadRequest(message),
            500..=599 => AppError::ExternalService(message),
            _ => AppError::Internal(message),
        }
    }

    /// The message carried by the error, without the category prefix.
    pub fn message(&self) -> &str {
        match self {
            AppError::Auth(msg)
            | AppError::NotFound(msg)
            | AppError::BadRequest(msg)
            | AppError::Internal(msg)
            | AppError::ValidationError(msg)
            | AppError::Conflict(msg)
            | AppError::ExternalService(msg)
            | AppError::Network(msg)
            | AppError::Serialization(msg) => msg,
        }
    }

    /// Server-provided message if there is one, else `fallback`.
    pub fn user_message(&self, fallback: &str) -> String {
        let msg = self.message().trim();
        if msg.is_empty() {
            fallback.to_string()
        } else {
            msg.to_string()
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, AppError::Conflict(_))
    }

    /// Whether repeating the same request could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::Network(_) | AppError::ExternalService(_) | AppError::Internal(_)
        )
    }

    pub fn to_body(&self) -> ErrorBody {
        tracing::error!("Error: {}", self);

        ErrorBody {
            error: self.message().to_string(),
            retryable: self.is_retryable(),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}
