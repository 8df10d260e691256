use axum::{
    Json,
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use std::fmt;

use super::ApiResponse;
use crate::services::{AuthError, RegistrationError};

#[derive(Debug)]
pub enum ApiError {
    ValidationError(String),

    Unauthorized(String),

    Conflict(String),

    /// Account lockout; surfaced as a 429-equivalent with Retry-After.
    Locked { retry_after_seconds: u64 },

    /// Client over budget; surfaced as 429 with Retry-After.
    RateLimited { retry_after_seconds: u64 },

    InternalError(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            ApiError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            ApiError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            ApiError::Locked {
                retry_after_seconds,
            } => write!(f, "Account locked for {}s", retry_after_seconds),
            ApiError::RateLimited {
                retry_after_seconds,
            } => write!(f, "Rate limited for {}s", retry_after_seconds),
            ApiError::InternalError(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message, retry_after) = match self {
            ApiError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg, None),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg, None),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg, None),
            ApiError::Locked {
                retry_after_seconds,
            } => (
                StatusCode::TOO_MANY_REQUESTS,
                format!("Account temporarily locked. Try again in {retry_after_seconds} seconds"),
                Some(retry_after_seconds),
            ),
            ApiError::RateLimited {
                retry_after_seconds,
            } => (
                StatusCode::TOO_MANY_REQUESTS,
                format!("Too many attempts. Try again in {retry_after_seconds} seconds"),
                Some(retry_after_seconds),
            ),
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal error occurred".to_string(),
                    None,
                )
            }
        };

        let body = ApiResponse::<()>::error(error_message);
        let mut response = (status, Json(body)).into_response();

        if let Some(seconds) = retry_after {
            response
                .headers_mut()
                .insert("Retry-After", HeaderValue::from(seconds));
        }

        response
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::InternalError(err.to_string())
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => {
                ApiError::Unauthorized("Invalid username or password".to_string())
            }
            AuthError::Locked {
                retry_after_seconds,
            } => ApiError::Locked {
                retry_after_seconds,
            },
            AuthError::RateLimited {
                retry_after_seconds,
            } => ApiError::RateLimited {
                retry_after_seconds,
            },
            AuthError::Database(msg) | AuthError::Internal(msg) => ApiError::InternalError(msg),
        }
    }
}

impl From<RegistrationError> for ApiError {
    fn from(err: RegistrationError) -> Self {
        match err {
            RegistrationError::Validation(msg) => ApiError::ValidationError(msg),
            RegistrationError::UsernameTaken => {
                ApiError::Conflict("Username is already taken".to_string())
            }
            RegistrationError::RateLimited {
                retry_after_seconds,
            } => ApiError::RateLimited {
                retry_after_seconds,
            },
            RegistrationError::Database(msg) | RegistrationError::Internal(msg) => {
                ApiError::InternalError(msg)
            }
        }
    }
}

impl ApiError {
    pub fn validation(msg: impl Into<String>) -> Self {
        ApiError::ValidationError(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        ApiError::InternalError(msg.into())
    }
}
