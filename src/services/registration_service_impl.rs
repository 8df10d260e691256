//! `SeaORM` implementation of the `RegistrationService` trait.

use std::sync::Arc;

use tokio::task;
use tracing::{debug, info};

use crate::config::Config;
use crate::db::Store;
use crate::hashing::SecureHasher;
use crate::models::{Account, Role};
use crate::services::rate_limit::{Decision, EndpointClass, RateLimiter};
use crate::services::registration_service::{RegistrationError, RegistrationService};

fn validate_username(username: &str) -> Result<(), RegistrationError> {
    if username.trim().is_empty() {
        return Err(RegistrationError::Validation(
            "Username is required".to_string(),
        ));
    }

    if username.len() > 255 {
        return Err(RegistrationError::Validation(
            "Username must be at most 255 characters".to_string(),
        ));
    }

    Ok(())
}

/// Complexity policy: minimum length plus one character from each of the
/// upper, lower, digit, and symbol classes. Failures list everything that
/// is missing.
fn validate_secret(min_length: usize, secret: &str) -> Result<(), RegistrationError> {
    let mut problems = Vec::new();

    if secret.len() < min_length {
        problems.push(format!("at least {min_length} characters"));
    }
    if !secret.chars().any(char::is_uppercase) {
        problems.push("an uppercase letter".to_string());
    }
    if !secret.chars().any(char::is_lowercase) {
        problems.push("a lowercase letter".to_string());
    }
    if !secret.chars().any(|c| c.is_ascii_digit()) {
        problems.push("a digit".to_string());
    }
    if !secret.chars().any(|c| !c.is_alphanumeric()) {
        problems.push("a symbol".to_string());
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(RegistrationError::Validation(format!(
            "Password must contain {}",
            problems.join(", ")
        )))
    }
}

pub struct SeaOrmRegistrationService {
    store: Store,
    limiter: Arc<RateLimiter>,
    hasher: Arc<SecureHasher>,
    min_password_length: usize,
}

impl SeaOrmRegistrationService {
    #[must_use]
    pub fn new(store: Store, limiter: Arc<RateLimiter>, config: &Config) -> Self {
        Self {
            store,
            limiter,
            hasher: Arc::new(SecureHasher::new(&config.security)),
            min_password_length: config.security.min_password_length,
        }
    }

    async fn hash_secret(&self, secret: &str) -> Result<String, RegistrationError> {
        let hasher = self.hasher.clone();
        let secret = secret.to_string();

        task::spawn_blocking(move || hasher.hash(&secret))
            .await
            .map_err(|e| RegistrationError::Internal(format!("Hashing task panicked: {e}")))?
            .map_err(|e| RegistrationError::Internal(e.to_string()))
    }

    async fn insert(
        &self,
        username: &str,
        display_name: &str,
        secure_hash: &str,
        role: Role,
    ) -> Result<Account, RegistrationError> {
        self.store
            .insert_account(username, display_name, secure_hash, role)
            .await
            .map_err(|e| {
                // Collisions that slip past the pre-check under concurrency
                // surface as a unique-index violation on insert.
                if e.to_string().contains("UNIQUE") {
                    RegistrationError::UsernameTaken
                } else {
                    RegistrationError::Database(e.to_string())
                }
            })
    }
}

#[async_trait::async_trait]
impl RegistrationService for SeaOrmRegistrationService {
    async fn register(
        &self,
        client_key: &str,
        username: &str,
        display_name: &str,
        secret: &str,
        confirm_secret: &str,
    ) -> Result<Account, RegistrationError> {
        if let Decision::Deny { retry_after } =
            self.limiter.check(client_key, EndpointClass::Registration)
        {
            debug!(client_key, "Registration attempt over budget");
            return Err(RegistrationError::RateLimited {
                retry_after_seconds: retry_after.as_secs().max(1),
            });
        }

        validate_username(username)?;

        // Compared and dropped here; the confirmation value is never
        // hashed, logged, or persisted.
        if secret != confirm_secret {
            return Err(RegistrationError::Validation(
                "Passwords do not match".to_string(),
            ));
        }

        validate_secret(self.min_password_length, secret)?;

        if self.store.username_taken(username).await? {
            return Err(RegistrationError::UsernameTaken);
        }

        let secure_hash = self.hash_secret(secret).await?;

        let display_name = if display_name.trim().is_empty() {
            username
        } else {
            display_name
        };

        let account = self
            .insert(username, display_name, &secure_hash, Role::Standard)
            .await?;

        info!(username = %account.username, "Account registered");
        Ok(account)
    }

    async fn create_account(
        &self,
        username: &str,
        display_name: &str,
        secret: &str,
        role: Role,
    ) -> Result<Account, RegistrationError> {
        validate_username(username)?;
        validate_secret(self.min_password_length, secret)?;

        if self.store.username_taken(username).await? {
            return Err(RegistrationError::UsernameTaken);
        }

        let secure_hash = self.hash_secret(secret).await?;
        let account = self
            .insert(username, display_name, &secure_hash, role)
            .await?;

        info!(username = %account.username, role = %account.role, "Account created administratively");
        Ok(account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complexity_policy_accepts_conforming_secret() {
        assert!(validate_secret(8, "Secret1!").is_ok());
    }

    #[test]
    fn complexity_policy_rejects_each_missing_class() {
        assert!(validate_secret(8, "secret99!").is_err()); // no upper
        assert!(validate_secret(8, "SECRET99!").is_err()); // no lower
        assert!(validate_secret(8, "Secretty!").is_err()); // no digit
        assert!(validate_secret(8, "Secret999").is_err()); // no symbol
        assert!(validate_secret(8, "Se1!").is_err()); // too short
    }

    #[test]
    fn complexity_failure_lists_everything_missing() {
        let err = validate_secret(8, "abc").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("8 characters"));
        assert!(message.contains("uppercase"));
        assert!(message.contains("digit"));
        assert!(message.contains("symbol"));
    }

    #[test]
    fn username_must_be_present_and_bounded() {
        assert!(validate_username("alice").is_ok());
        assert!(validate_username("").is_err());
        assert!(validate_username("   ").is_err());
        assert!(validate_username(&"a".repeat(256)).is_err());
    }
}
