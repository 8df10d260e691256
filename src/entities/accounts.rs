use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "accounts")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// Login identity. Uniqueness is case-insensitive (enforced by a
    /// COLLATE NOCASE index in the initial migration).
    #[sea_orm(unique)]
    pub username: String,

    pub display_name: String,

    /// Unsalted SHA-256 digest carried over from pre-rewrite installs.
    /// Only consulted while `migrated` is false.
    pub legacy_hash: Option<String>,

    /// Argon2id PHC string. Authoritative once `migrated` is true.
    pub secure_hash: Option<String>,

    pub migrated: bool,

    /// "standard" or "privileged"
    pub role: String,

    pub active: bool,

    pub failed_attempts: i32,

    /// RFC3339; authentication is refused while this is in the future.
    pub locked_until: Option<String>,

    pub last_login_at: Option<String>,

    pub created_at: String,

    pub updated_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
