//! `SeaORM` implementation of the `AuthService` trait.
//!
//! The pipeline runs the canonical step order: rate limit, fetch, active,
//! lockout, verify, then failure or success bookkeeping. Migration and
//! bookkeeping writes are best-effort; a correct secret always wins.

use std::sync::Arc;

use chrono::Utc;
use tokio::task;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::db::Store;
use crate::hashing::{CredentialVerifier, SecureHasher, VerifierChain};
use crate::services::auth_service::{AuthError, AuthService};
use crate::services::rate_limit::{Decision, EndpointClass, RateLimiter};
use crate::services::session::{SessionClaims, SessionIssuer};

pub struct SeaOrmAuthService {
    store: Store,
    limiter: Arc<RateLimiter>,
    chain: VerifierChain,
    secure: Arc<SecureHasher>,
    issuer: SessionIssuer,
    max_failed_attempts: u32,
    lockout_seconds: u64,
    auto_upgrade_hashes: bool,
}

impl SeaOrmAuthService {
    #[must_use]
    pub fn new(store: Store, limiter: Arc<RateLimiter>, config: &Config) -> Self {
        let secure = Arc::new(SecureHasher::new(&config.security));

        Self {
            store,
            limiter,
            chain: VerifierChain::new(secure.clone()),
            secure,
            issuer: SessionIssuer::new(&config.session),
            max_failed_attempts: config.security.max_failed_attempts,
            lockout_seconds: config.security.lockout_seconds,
            auto_upgrade_hashes: config.security.auto_upgrade_hashes,
        }
    }

    /// Remaining lockout, if any. An unparseable timestamp counts as
    /// unlocked so a corrupt row cannot freeze an account forever.
    fn lock_remaining_seconds(locked_until: Option<&str>) -> Option<u64> {
        let raw = locked_until?;
        let Ok(until) = chrono::DateTime::parse_from_rfc3339(raw) else {
            warn!("Unparseable locked_until value, treating account as unlocked");
            return None;
        };

        let remaining = until.signed_duration_since(Utc::now()).num_seconds();
        (remaining > 0).then(|| u64::try_from(remaining).unwrap_or(1))
    }

    /// One-time legacy-to-secure migration after a correct legacy secret.
    /// Losing the race against a concurrent login is expected; a failed
    /// write just means the next successful login retries.
    async fn migrate(&self, id: i32, username: &str, secret: &str) {
        let hasher = self.secure.clone();
        let secret = secret.to_string();

        let new_hash = match task::spawn_blocking(move || hasher.hash(&secret)).await {
            Ok(Ok(hash)) => hash,
            Ok(Err(e)) => {
                warn!(username, "Skipping credential migration: {e:#}");
                return;
            }
            Err(e) => {
                warn!(username, "Skipping credential migration, hashing task panicked: {e}");
                return;
            }
        };

        match self.store.try_migrate(id, &new_hash).await {
            Ok(true) => {
                info!(username, "Credential migrated to the secure scheme");
                metrics::counter!("auth_migrations_total").increment(1);
            }
            Ok(false) => {
                debug!(username, "Credential already migrated by a concurrent login");
            }
            Err(e) => {
                warn!(
                    username,
                    "Credential migration failed, will retry on a future login: {e:#}"
                );
            }
        }
    }

    /// Rewrites a secure hash whose stored parameters fall behind the
    /// configured ones. Same best-effort discipline as migration.
    async fn upgrade_hash(&self, id: i32, current_hash: &str, username: &str, secret: &str) {
        let hasher = self.secure.clone();
        let secret = secret.to_string();

        let new_hash = match task::spawn_blocking(move || hasher.hash(&secret)).await {
            Ok(Ok(hash)) => hash,
            Ok(Err(e)) => {
                warn!(username, "Skipping hash upgrade: {e:#}");
                return;
            }
            Err(e) => {
                warn!(username, "Skipping hash upgrade, hashing task panicked: {e}");
                return;
            }
        };

        match self
            .store
            .try_upgrade_secure_hash(id, current_hash, &new_hash)
            .await
        {
            Ok(true) => info!(username, "Stored hash upgraded to current parameters"),
            Ok(false) => debug!(username, "Hash already rewritten by a concurrent login"),
            Err(e) => warn!(username, "Hash upgrade failed: {e:#}"),
        }
    }
}

fn record_outcome(outcome: &'static str) {
    metrics::counter!("auth_login_total", "outcome" => outcome).increment(1);
}

#[async_trait::async_trait]
impl AuthService for SeaOrmAuthService {
    async fn authenticate(
        &self,
        client_key: &str,
        username: &str,
        secret: &str,
        remember: bool,
    ) -> Result<SessionClaims, AuthError> {
        // Budget check comes first; no record is read for a denied caller.
        if let Decision::Deny { retry_after } = self.limiter.check(client_key, EndpointClass::Login)
        {
            debug!(client_key, "Login attempt over budget");
            record_outcome("rate_limited");
            return Err(AuthError::RateLimited {
                retry_after_seconds: retry_after.as_secs().max(1),
            });
        }

        let record = self.store.find_credential(username).await.map_err(|e| {
            error!("Credential lookup failed: {e:#}");
            AuthError::Database(e.to_string())
        })?;

        let Some(record) = record else {
            debug!(username, "Login attempt for unknown identity");
            record_outcome("invalid");
            return Err(AuthError::InvalidCredentials);
        };
        let account = record.account;

        // Same outward rejection as a wrong secret; only the log differs.
        if !account.active {
            info!(username = %account.username, "Login attempt against inactive account");
            record_outcome("invalid");
            return Err(AuthError::InvalidCredentials);
        }

        // Under lockout the hash is not consulted at all.
        if let Some(retry_after_seconds) =
            Self::lock_remaining_seconds(account.locked_until.as_deref())
        {
            record_outcome("locked");
            return Err(AuthError::Locked {
                retry_after_seconds,
            });
        }

        let stored = if account.migrated {
            record.secure_hash.clone().unwrap_or_default()
        } else {
            record.legacy_hash.clone().unwrap_or_default()
        };

        let verifier: Arc<dyn CredentialVerifier> = self.chain.select(account.migrated);
        let stored_for_verify = stored.clone();
        let secret_owned = secret.to_string();

        let verified =
            task::spawn_blocking(move || verifier.verify(&stored_for_verify, &secret_owned))
                .await
                .map_err(|e| AuthError::Internal(format!("Verification task panicked: {e}")))?;

        if !verified {
            match self
                .store
                .record_failure(account.id, self.max_failed_attempts, self.lockout_seconds)
                .await
            {
                Ok(count) if count >= self.max_failed_attempts => {
                    warn!(
                        username = %account.username,
                        failed_attempts = count,
                        "Account locked after repeated failures"
                    );
                }
                Ok(_) => {}
                Err(e) => error!("Failed to record login failure: {e:#}"),
            }

            record_outcome("invalid");
            return Err(AuthError::InvalidCredentials);
        }

        // Secret is correct. Converge the stored credential opportunistically.
        if account.migrated {
            if self.auto_upgrade_hashes && self.secure.needs_rehash(&stored) {
                self.upgrade_hash(account.id, &stored, &account.username, secret)
                    .await;
            }
        } else {
            self.migrate(account.id, &account.username, secret).await;
        }

        if let Err(e) = self.store.record_success(account.id).await {
            error!("Failed to record successful login: {e:#}");
        }

        record_outcome("success");
        Ok(self
            .issuer
            .issue(&account.username, account.role, &account.display_name, remember))
    }
}
