use thiserror::Error;
use types::ApiErrorKind;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("invalid value: {0}")]
    Invalid(String),
}

impl From<StoreError> for ApiErrorKind {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(detail) => ApiErrorKind::not_found(detail),
            StoreError::Conflict(detail) => ApiErrorKind::conflict(detail),
            StoreError::Invalid(detail) => ApiErrorKind::validation(detail),
            StoreError::Sqlx(err) => ApiErrorKind::dependency(err.to_string()),
        }
    }
}
