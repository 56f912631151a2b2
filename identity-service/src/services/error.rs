use chrono::{DateTime, Utc};
use service_core::error::AppError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Cache error: {0}")]
    Cache(anyhow::Error),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account locked until {0}")]
    AccountLocked(DateTime<Utc>),

    #[error("Account inactive")]
    AccountInactive,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Invalid or expired token")]
    InvalidOrExpiredToken,

    #[error("Password was used recently")]
    PasswordReused,

    #[error("Validation error: {0}")]
    ValidationFailed(String),

    #[error("Authentication required")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Database(e) => AppError::DatabaseError(anyhow::Error::new(e)),
            ServiceError::Cache(e) => AppError::InternalError(e.context("cache backend")),
            ServiceError::Internal(e) => AppError::InternalError(e),
            ServiceError::InvalidCredentials => {
                AppError::AuthError(anyhow::anyhow!("Invalid credentials"))
            }
            ServiceError::AccountLocked(until) => {
                let retry_after = (until - Utc::now()).num_seconds().max(1) as u64;
                AppError::Locked(
                    format!("Account locked until {}", until.to_rfc3339()),
                    Some(retry_after),
                )
            }
            ServiceError::AccountInactive => {
                AppError::Forbidden(anyhow::anyhow!("Account inactive"))
            }
            ServiceError::InvalidToken => AppError::Unauthorized(anyhow::anyhow!("Invalid token")),
            ServiceError::InvalidOrExpiredToken => {
                AppError::BadRequest(anyhow::anyhow!("Invalid or expired token"))
            }
            ServiceError::PasswordReused => {
                AppError::BadRequest(anyhow::anyhow!("Password was used recently"))
            }
            ServiceError::ValidationFailed(msg) => AppError::Unprocessable(msg),
            ServiceError::Unauthorized => {
                AppError::Unauthorized(anyhow::anyhow!("Authentication required"))
            }
            ServiceError::Forbidden(msg) => AppError::Forbidden(anyhow::anyhow!(msg)),
            ServiceError::NotFound(msg) => AppError::NotFound(anyhow::anyhow!(msg)),
            ServiceError::Conflict(msg) => AppError::Conflict(anyhow::anyhow!(msg)),
        }
    }
}
