use anyhow::{Context, Result};
use sea_orm::sea_query::{Expr, ExprTrait, Func};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    Set,
};

use crate::entities::accounts;
use crate::models::{Account, Role};

/// A credential record as the authentication engine sees it: the account
/// plus its stored hash material. Hash fields never leave the service
/// layer.
#[derive(Debug, Clone)]
pub struct CredentialRecord {
    pub account: Account,
    pub legacy_hash: Option<String>,
    pub secure_hash: Option<String>,
}

impl From<accounts::Model> for CredentialRecord {
    fn from(model: accounts::Model) -> Self {
        let legacy_hash = model.legacy_hash.clone();
        let secure_hash = model.secure_hash.clone();
        Self {
            account: Account::from(model),
            legacy_hash,
            secure_hash,
        }
    }
}

pub struct CredentialRepository {
    conn: DatabaseConnection,
}

impl CredentialRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Case-insensitive lookup by login identity.
    pub async fn find_by_username(&self, username: &str) -> Result<Option<CredentialRecord>> {
        let model = accounts::Entity::find()
            .filter(
                Expr::expr(Func::lower(Expr::col(accounts::Column::Username)))
                    .eq(username.to_lowercase()),
            )
            .one(&self.conn)
            .await
            .context("Failed to query account by username")?;

        Ok(model.map(CredentialRecord::from))
    }

    pub async fn username_taken(&self, username: &str) -> Result<bool> {
        let count = accounts::Entity::find()
            .filter(
                Expr::expr(Func::lower(Expr::col(accounts::Column::Username)))
                    .eq(username.to_lowercase()),
            )
            .count(&self.conn)
            .await
            .context("Failed to check username availability")?;

        Ok(count > 0)
    }

    pub async fn count(&self) -> Result<u64> {
        accounts::Entity::find()
            .count(&self.conn)
            .await
            .context("Failed to count accounts")
    }

    /// Inserts a new account. New accounts are always created on the
    /// secure scheme; `migrated` starts true and no legacy hash exists.
    pub async fn insert(
        &self,
        username: &str,
        display_name: &str,
        secure_hash: &str,
        role: Role,
    ) -> Result<Account> {
        let now = chrono::Utc::now().to_rfc3339();

        let model = accounts::ActiveModel {
            username: Set(username.to_string()),
            display_name: Set(display_name.to_string()),
            legacy_hash: Set(None),
            secure_hash: Set(Some(secure_hash.to_string())),
            migrated: Set(true),
            role: Set(role.as_str().to_string()),
            active: Set(true),
            failed_attempts: Set(0),
            locked_until: Set(None),
            last_login_at: Set(None),
            created_at: Set(now.clone()),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&self.conn)
        .await
        .context("Failed to insert account")?;

        Ok(Account::from(model))
    }

    /// One-time legacy-to-secure migration, conditional on the record not
    /// having been migrated by a concurrent login. Returns whether this
    /// caller performed the write; losing the race is not an error.
    pub async fn try_migrate(&self, id: i32, secure_hash: &str) -> Result<bool> {
        let now = chrono::Utc::now().to_rfc3339();

        let result = accounts::Entity::update_many()
            .col_expr(
                accounts::Column::SecureHash,
                Expr::value(Some(secure_hash.to_string())),
            )
            .col_expr(accounts::Column::Migrated, Expr::value(true))
            .col_expr(accounts::Column::UpdatedAt, Expr::value(now))
            .filter(accounts::Column::Id.eq(id))
            .filter(accounts::Column::Migrated.eq(false))
            .exec(&self.conn)
            .await
            .context("Failed to migrate credential")?;

        Ok(result.rows_affected > 0)
    }

    /// Compare-and-swap rewrite of the secure hash, used when the stored
    /// parameters fall behind the configured ones. The filter on the old
    /// value makes concurrent upgrades collapse to a single write.
    pub async fn try_upgrade_secure_hash(
        &self,
        id: i32,
        current_hash: &str,
        new_hash: &str,
    ) -> Result<bool> {
        let now = chrono::Utc::now().to_rfc3339();

        let result = accounts::Entity::update_many()
            .col_expr(
                accounts::Column::SecureHash,
                Expr::value(Some(new_hash.to_string())),
            )
            .col_expr(accounts::Column::UpdatedAt, Expr::value(now))
            .filter(accounts::Column::Id.eq(id))
            .filter(accounts::Column::SecureHash.eq(current_hash))
            .exec(&self.conn)
            .await
            .context("Failed to upgrade secure hash")?;

        Ok(result.rows_affected > 0)
    }

    /// Atomically increments the failure counter and applies the lockout
    /// once the threshold is reached. Returns the counter value after the
    /// increment. Interleaved concurrent failures may each set a lockout
    /// timestamp; the timestamps differ by milliseconds and the latest
    /// write wins.
    pub async fn record_failure(
        &self,
        id: i32,
        threshold: u32,
        lockout_seconds: u64,
    ) -> Result<u32> {
        let now = chrono::Utc::now();

        accounts::Entity::update_many()
            .col_expr(
                accounts::Column::FailedAttempts,
                Expr::col(accounts::Column::FailedAttempts).add(1),
            )
            .col_expr(accounts::Column::UpdatedAt, Expr::value(now.to_rfc3339()))
            .filter(accounts::Column::Id.eq(id))
            .exec(&self.conn)
            .await
            .context("Failed to increment failure counter")?;

        let model = accounts::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to re-read account after failure")?;

        let Some(model) = model else {
            return Ok(0);
        };

        let failed = u32::try_from(model.failed_attempts).unwrap_or(0);

        if failed >= threshold {
            let locked_until =
                (now + chrono::Duration::seconds(i64::try_from(lockout_seconds).unwrap_or(0)))
                    .to_rfc3339();

            accounts::Entity::update_many()
                .col_expr(
                    accounts::Column::LockedUntil,
                    Expr::value(Some(locked_until)),
                )
                .filter(accounts::Column::Id.eq(id))
                .filter(accounts::Column::FailedAttempts.gte(i32::try_from(threshold).unwrap_or(i32::MAX)))
                .exec(&self.conn)
                .await
                .context("Failed to set lockout")?;
        }

        Ok(failed)
    }

    /// Resets the failure counter, clears any lockout, and stamps the
    /// login time.
    pub async fn record_success(&self, id: i32) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();

        accounts::Entity::update_many()
            .col_expr(accounts::Column::FailedAttempts, Expr::value(0))
            .col_expr(
                accounts::Column::LockedUntil,
                Expr::value(Option::<String>::None),
            )
            .col_expr(
                accounts::Column::LastLoginAt,
                Expr::value(Some(now.clone())),
            )
            .col_expr(accounts::Column::UpdatedAt, Expr::value(now))
            .filter(accounts::Column::Id.eq(id))
            .exec(&self.conn)
            .await
            .context("Failed to record successful login")?;

        Ok(())
    }
}
