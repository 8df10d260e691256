use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use super::CredentialVerifier;

/// The original unsalted SHA-256 scheme.
///
/// Kept byte-for-byte compatible with hashes written by pre-rewrite
/// installs so existing accounts keep working until they migrate. Never
/// used to produce new credentials.
pub struct LegacyHasher;

impl LegacyHasher {
    /// Deterministic lowercase-hex SHA-256 of the secret.
    #[must_use]
    pub fn hash(&self, secret: &str) -> String {
        hex::encode(Sha256::digest(secret.as_bytes()))
    }
}

impl CredentialVerifier for LegacyHasher {
    fn verify(&self, stored: &str, secret: &str) -> bool {
        let computed = self.hash(secret);
        computed.as_bytes().ct_eq(stored.as_bytes()).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic_and_unsalted() {
        let hasher = LegacyHasher;
        assert_eq!(hasher.hash("OldPass1!"), hasher.hash("OldPass1!"));
        assert_eq!(hasher.hash("OldPass1!").len(), 64);
    }

    #[test]
    fn known_digest_stays_stable() {
        // Existing rows depend on this exact output.
        assert_eq!(
            LegacyHasher.hash("password"),
            "5e884898da28047151d0e56f8dc6292773603d0d6aabbdd62a11ef721d1542d8"
        );
    }

    #[test]
    fn verify_recomputes_and_compares() {
        let hasher = LegacyHasher;
        let stored = hasher.hash("OldPass1!");
        assert!(hasher.verify(&stored, "OldPass1!"));
        assert!(!hasher.verify(&stored, "OldPass2!"));
        assert!(!hasher.verify("not-a-digest", "OldPass1!"));
        assert!(!hasher.verify("", "OldPass1!"));
    }
}
