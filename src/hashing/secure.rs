use anyhow::Result;
use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

use super::CredentialVerifier;
use crate::config::SecurityConfig;

/// Argon2id hashing with parameters taken from [`SecurityConfig`].
///
/// Output is a PHC string, so every stored value carries its own
/// algorithm version, cost parameters, and salt. Hashing and verification
/// are CPU-intensive; callers on the async runtime must wrap them in
/// `tokio::task::spawn_blocking`.
#[derive(Clone)]
pub struct SecureHasher {
    memory_cost_kib: u32,
    time_cost: u32,
    parallelism: u32,
}

impl SecureHasher {
    #[must_use]
    pub const fn new(config: &SecurityConfig) -> Self {
        Self {
            memory_cost_kib: config.argon2_memory_cost_kib,
            time_cost: config.argon2_time_cost,
            parallelism: config.argon2_parallelism,
        }
    }

    fn argon2(&self) -> Result<Argon2<'static>> {
        let params = Params::new(self.memory_cost_kib, self.time_cost, self.parallelism, None)
            .map_err(|e| anyhow::anyhow!("Invalid Argon2 params: {e}"))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }

    /// Hashes a secret with a freshly generated random salt.
    pub fn hash(&self, secret: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()?
            .hash_password(secret.as_bytes(), &salt)
            .map_err(|e| anyhow::anyhow!("Failed to hash secret: {e}"))?;
        Ok(hash.to_string())
    }

    /// True when the stored value was produced with weaker parameters than
    /// currently configured, or is not a parseable Argon2id PHC string at
    /// all. Lets a future parameter bump ride the same opportunistic
    /// rewrite path as the legacy migration.
    #[must_use]
    pub fn needs_rehash(&self, stored: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(stored) else {
            return true;
        };

        if Algorithm::try_from(parsed.algorithm).ok() != Some(Algorithm::Argon2id) {
            return true;
        }

        let version = parsed.version.and_then(|v| Version::try_from(v).ok());
        if version != Some(Version::V0x13) {
            return true;
        }

        let Ok(params) = Params::try_from(&parsed) else {
            return true;
        };

        params.m_cost() < self.memory_cost_kib
            || params.t_cost() < self.time_cost
            || params.p_cost() < self.parallelism
    }
}

impl CredentialVerifier for SecureHasher {
    /// Re-derives with the parameters and salt embedded in `stored` and
    /// compares in constant time. Malformed input is a mismatch, never an
    /// error.
    fn verify(&self, stored: &str, secret: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(stored) else {
            return false;
        };

        Argon2::default()
            .verify_password(secret.as_bytes(), &parsed)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher() -> SecureHasher {
        // Low-cost params keep the test suite fast.
        SecureHasher {
            memory_cost_kib: 64,
            time_cost: 1,
            parallelism: 1,
        }
    }

    #[test]
    fn two_hashes_of_the_same_secret_differ_but_both_verify() {
        let hasher = hasher();
        let a = hasher.hash("Secret1!").unwrap();
        let b = hasher.hash("Secret1!").unwrap();

        assert_ne!(a, b);
        assert!(hasher.verify(&a, "Secret1!"));
        assert!(hasher.verify(&b, "Secret1!"));
        assert!(!hasher.verify(&a, "Secret2!"));
    }

    #[test]
    fn malformed_stored_value_is_a_mismatch() {
        let hasher = hasher();
        assert!(!hasher.verify("", "Secret1!"));
        assert!(!hasher.verify("$argon2id$garbage", "Secret1!"));
        assert!(!hasher.verify("5e884898da2804715", "Secret1!"));
    }

    #[test]
    fn fresh_hash_does_not_need_rehash() {
        let hasher = hasher();
        let stored = hasher.hash("Secret1!").unwrap();
        assert!(!hasher.needs_rehash(&stored));
    }

    #[test]
    fn weaker_params_need_rehash() {
        let old = hasher();
        let stored = old.hash("Secret1!").unwrap();

        let stronger = SecureHasher {
            memory_cost_kib: 128,
            time_cost: 2,
            parallelism: 1,
        };
        assert!(stronger.needs_rehash(&stored));
        // Verification still succeeds against the old parameters.
        assert!(stronger.verify(&stored, "Secret1!"));
    }

    #[test]
    fn unparseable_value_needs_rehash() {
        let hasher = hasher();
        assert!(hasher.needs_rehash("not-a-phc-string"));
        assert!(hasher.needs_rehash(""));
    }
}
