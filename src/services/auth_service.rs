//! Domain service for credential authentication.
//!
//! Covers verification against both hashing schemes, the one-time lazy
//! migration of legacy credentials, failure lockout, and per-client rate
//! limiting.

use thiserror::Error;

use crate::services::session::SessionClaims;

/// Errors specific to authentication.
///
/// `InvalidCredentials` deliberately covers unknown identities, wrong
/// secrets, and inactive accounts: callers must not be able to tell them
/// apart (account enumeration). Lockout and rate limiting are distinct
/// because triggering either already requires knowledge the response does
/// not add to.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Account temporarily locked")]
    Locked { retry_after_seconds: u64 },

    #[error("Too many attempts")]
    RateLimited { retry_after_seconds: u64 },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sea_orm::DbErr> for AuthError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        Self::Database(err.to_string())
    }
}

/// Domain service trait for authentication.
#[async_trait::async_trait]
pub trait AuthService: Send + Sync {
    /// Runs the full authentication pipeline for one attempt and returns
    /// issued session claims on success.
    ///
    /// `client_key` identifies the caller for rate limiting (socket or
    /// forwarded address), independent of the identity being tried.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::RateLimited`] before any record is read,
    /// [`AuthError::Locked`] when the account is under lockout, and
    /// [`AuthError::InvalidCredentials`] for every other rejection.
    async fn authenticate(
        &self,
        client_key: &str,
        username: &str,
        secret: &str,
        remember: bool,
    ) -> Result<SessionClaims, AuthError>;
}
