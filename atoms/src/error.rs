use axum::http::StatusCode;

use crate::files::FileStoreError;
use crate::store::StoreError;

/// Handler-level error. Each variant knows the status code it is reported with.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Files(#[from] FileStoreError),
}

impl Error {
    pub fn not_found(kind: &str, id: &str) -> Self {
        Self::NotFound(format!("{kind} '{id}'"))
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Files(FileStoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            Self::Store(_) | Self::Files(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
