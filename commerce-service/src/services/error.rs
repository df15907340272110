use service_core::error::AppError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

impl From<service_core::mongodb::error::Error> for RepositoryError {
    fn from(err: service_core::mongodb::error::Error) -> Self {
        RepositoryError::Backend(anyhow::Error::new(err))
    }
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token purpose mismatch")]
    TokenPurposeMismatch,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Email error: {0}")]
    EmailError(String),

    #[error("Event queue unavailable: {0}")]
    QueueUnavailable(String),
}

impl ServiceError {
    pub fn unauthorized(message: impl Into<String>) -> Self {
        ServiceError::Unauthorized(message.into())
    }

    pub fn invalid_data(message: impl Into<String>) -> Self {
        ServiceError::InvalidData(message.into())
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Repository(RepositoryError::Conflict(msg)) => AppError::Conflict(msg),
            ServiceError::Repository(RepositoryError::NotFound(msg)) => AppError::NotFound(msg),
            ServiceError::Repository(RepositoryError::Backend(e)) => AppError::DatabaseError(e),
            ServiceError::Internal(e) => AppError::InternalError(e),
            ServiceError::InvalidData(msg) => AppError::InvalidData(msg),
            ServiceError::Unauthorized(msg) => AppError::Unauthorized(msg),
            ServiceError::InvalidToken => AppError::Unauthorized("Invalid token".to_string()),
            ServiceError::TokenPurposeMismatch => {
                AppError::Unauthorized("Invalid token".to_string())
            }
            ServiceError::NotFound(msg) => AppError::NotFound(msg),
            ServiceError::EmailError(msg) => AppError::EmailError(msg),
            ServiceError::QueueUnavailable(msg) => {
                tracing::error!(error = %msg, "Event queue unavailable");
                AppError::ServiceUnavailable
            }
        }
    }
}
