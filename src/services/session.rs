use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::SessionConfig;
use crate::models::Role;

/// Expiry policy attached to issued claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "seconds")]
pub enum SessionExpiry {
    /// Sliding window, reset on each request.
    Idle(u64),
    /// Fixed lifetime counted from issuance.
    Absolute(u64),
}

/// The claim set issued on successful authentication.
///
/// This is the single source of truth for "who is logged in and as what":
/// every role or identity read downstream derives from these claims.
/// Hash material never appears here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub username: String,
    pub role: Role,
    pub display_name: String,
    pub issued_at: String,
    pub expiry: SessionExpiry,
}

/// Turns a successful authentication outcome into claims.
#[derive(Clone)]
pub struct SessionIssuer {
    idle: Duration,
    remember: Duration,
}

impl SessionIssuer {
    #[must_use]
    pub const fn new(config: &SessionConfig) -> Self {
        Self {
            idle: Duration::from_secs(config.idle_minutes * 60),
            remember: Duration::from_secs(config.remember_days * 24 * 60 * 60),
        }
    }

    #[must_use]
    pub fn issue(
        &self,
        username: &str,
        role: Role,
        display_name: &str,
        remember: bool,
    ) -> SessionClaims {
        let expiry = if remember {
            SessionExpiry::Absolute(self.remember.as_secs())
        } else {
            SessionExpiry::Idle(self.idle.as_secs())
        };

        SessionClaims {
            username: username.to_string(),
            role,
            display_name: display_name.to_string(),
            issued_at: chrono::Utc::now().to_rfc3339(),
            expiry,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issuer() -> SessionIssuer {
        SessionIssuer::new(&SessionConfig::default())
    }

    #[test]
    fn plain_sessions_get_a_sliding_hour() {
        let claims = issuer().issue("alice", Role::Standard, "Alice", false);
        assert_eq!(claims.expiry, SessionExpiry::Idle(3600));
    }

    #[test]
    fn remembered_sessions_get_thirty_days() {
        let claims = issuer().issue("alice", Role::Standard, "Alice", true);
        assert_eq!(claims.expiry, SessionExpiry::Absolute(30 * 24 * 3600));
    }

    #[test]
    fn claims_carry_identity_role_and_display_name_only() {
        let claims = issuer().issue("alice", Role::Privileged, "Alice", false);
        let json = serde_json::to_value(&claims).unwrap();

        assert_eq!(json["username"], "alice");
        assert_eq!(json["role"], "privileged");
        assert_eq!(json["display_name"], "Alice");
        assert!(json.get("secure_hash").is_none());
        assert!(json.get("legacy_hash").is_none());
    }
}
