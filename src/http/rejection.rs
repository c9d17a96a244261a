//! Request outcomes that stop processing.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::accounts::AccountError;

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: &'static str,
}

/// Why a request was refused.
///
/// Every variant is final for the request it was raised on.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Rejection {
    /// The client's bucket is empty
    #[error("Rate limit exceeded. Please try again later.")]
    RateLimited,

    /// No usable credential was presented
    #[error("{0}")]
    Unauthenticated(&'static str),

    /// Valid identity without the required privilege
    #[error("Admin privileges required")]
    Forbidden,

    /// The request body or parameters are invalid
    #[error("{0}")]
    BadRequest(String),

    /// The request conflicts with existing state
    #[error("{0}")]
    Conflict(String),

    /// The addressed resource does not exist
    #[error("Not found")]
    NotFound,

    /// Unexpected server-side failure
    #[error("Internal server error")]
    Internal,
}

impl Rejection {
    /// HTTP status for this rejection.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable code for the response body.
    pub fn code(&self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::Unauthenticated(_) => "unauthenticated",
            Self::Forbidden => "forbidden",
            Self::BadRequest(_) => "bad_request",
            Self::Conflict(_) => "conflict",
            Self::NotFound => "not_found",
            Self::Internal => "internal",
        }
    }
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.to_string(),
            code: self.code(),
        };
        (self.status(), Json(body)).into_response()
    }
}

impl From<AccountError> for Rejection {
    fn from(err: AccountError) -> Self {
        match err {
            AccountError::InvalidRegistration(reason) => Self::BadRequest(reason.to_string()),
            AccountError::UsernameTaken => Self::Conflict("Username already exists".to_string()),
            AccountError::InvalidCredentials => Self::Unauthenticated("Invalid credentials"),
            AccountError::Hashing(reason) => {
                error!(error = %reason, "Password hashing failed");
                Self::Internal
            }
        }
    }
}
