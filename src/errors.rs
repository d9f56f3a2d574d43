use crate::claims::ClaimError;
use crate::points::LedgerError;
use crate::session::AuthError;
use axum::http::StatusCode;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("insufficient points: balance {balance}, cost {cost}")]
    InsufficientPoints { balance: i64, cost: i64 },

    #[error("reward {0} is not available yet")]
    RewardUnavailable(String),

    #[error("failed to persist store: {0}")]
    Io(String),

    #[error("data file is corrupt: {0}")]
    Corrupt(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            message: message.into(),
        }
    }

    pub fn internal(err: impl std::error::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: err.to_string(),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => Self {
                status: StatusCode::NOT_FOUND,
                message: err.to_string(),
            },
            StoreError::Conflict(_)
            | StoreError::InsufficientPoints { .. }
            | StoreError::RewardUnavailable(_) => Self::conflict(err.to_string()),
            StoreError::Unavailable(_) => Self {
                status: StatusCode::BAD_GATEWAY,
                message: err.to_string(),
            },
            StoreError::Io(_) | StoreError::Corrupt(_) => Self::internal(err),
        }
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        (self.status, self.message).into_response()
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Store(err) => err.into(),
            other => Self::bad_request(other.to_string()),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidEmail | AuthError::WeakPassword => Self::bad_request(err.to_string()),
            AuthError::EmailTaken => Self::conflict(err.to_string()),
            AuthError::InvalidCredentials | AuthError::InvalidToken => {
                Self::unauthorized(err.to_string())
            }
            AuthError::Hash(_) => Self::internal(err),
            AuthError::Store(err) => err.into(),
        }
    }
}

impl From<ClaimError> for AppError {
    fn from(err: ClaimError) -> Self {
        match err {
            ClaimError::MissingField(_) => Self::bad_request(err.to_string()),
            ClaimError::Store(err) => err.into(),
        }
    }
}
