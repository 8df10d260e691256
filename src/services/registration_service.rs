//! Domain service for account signup.
//!
//! Self-registration always produces a `Standard`, already-migrated
//! account; the privileged creation path exists only for administrative
//! callers (the CLI) and is not reachable from the HTTP surface.

use thiserror::Error;

use crate::models::{Account, Role};

/// Errors specific to registration. Validation failures are fully
/// detailed outward; persistence failures stay opaque.
#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("{0}")]
    Validation(String),

    #[error("Username is already taken")]
    UsernameTaken,

    #[error("Too many attempts")]
    RateLimited { retry_after_seconds: u64 },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sea_orm::DbErr> for RegistrationError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for RegistrationError {
    fn from(err: anyhow::Error) -> Self {
        Self::Database(err.to_string())
    }
}

/// Domain service trait for registration.
#[async_trait::async_trait]
pub trait RegistrationService: Send + Sync {
    /// Self-registration. The confirmation secret is compared and
    /// discarded, never stored in any form, and the created account is
    /// always `Standard` regardless of anything the caller supplied.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::Validation`] for policy failures and
    /// [`RegistrationError::UsernameTaken`] for identity collisions
    /// (case-insensitive).
    async fn register(
        &self,
        client_key: &str,
        username: &str,
        display_name: &str,
        secret: &str,
        confirm_secret: &str,
    ) -> Result<Account, RegistrationError>;

    /// Administrative creation path; the only way to mint a `Privileged`
    /// account. Not rate limited and not exposed over HTTP.
    async fn create_account(
        &self,
        username: &str,
        display_name: &str,
        secret: &str,
        role: Role,
    ) -> Result<Account, RegistrationError>;
}
