use serde::{Deserialize, Serialize};

use crate::entities::accounts;

/// Authorization role carried in session claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Standard,
    Privileged,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Privileged => "privileged",
        }
    }

    /// Unknown stored values collapse to the least-privileged role.
    #[must_use]
    pub fn from_db(value: &str) -> Self {
        match value {
            "privileged" => Self::Privileged,
            _ => Self::Standard,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Account data handed out of the repository layer (no hash material).
#[derive(Debug, Clone)]
pub struct Account {
    pub id: i32,
    pub username: String,
    pub display_name: String,
    pub role: Role,
    pub active: bool,
    pub migrated: bool,
    pub failed_attempts: i32,
    pub locked_until: Option<String>,
    pub last_login_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<accounts::Model> for Account {
    fn from(model: accounts::Model) -> Self {
        Self {
            id: model.id,
            username: model.username,
            display_name: model.display_name,
            role: Role::from_db(&model.role),
            active: model.active,
            migrated: model.migrated,
            failed_attempts: model.failed_attempts,
            locked_until: model.locked_until,
            last_login_at: model.last_login_at,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Role;

    #[test]
    fn unknown_role_values_fall_back_to_standard() {
        assert_eq!(Role::from_db("privileged"), Role::Privileged);
        assert_eq!(Role::from_db("standard"), Role::Standard);
        assert_eq!(Role::from_db("root"), Role::Standard);
        assert_eq!(Role::from_db(""), Role::Standard);
    }

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&Role::Privileged).unwrap(),
            "\"privileged\""
        );
    }
}
