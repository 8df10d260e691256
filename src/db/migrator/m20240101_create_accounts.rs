use crate::entities::prelude::*;
use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::Schema;

#[derive(DeriveMigrationName)]
pub struct Migration;

/// First-run administrator. Created through the secure path only, so the
/// seeded account never exercises the legacy scheme.
const DEFAULT_ADMIN_USERNAME: &str = "admin";
const DEFAULT_ADMIN_PASSWORD: &str = "ChangeMe123!";

/// Hash the default admin password using Argon2id
fn hash_default_password() -> String {
    use argon2::{
        Argon2,
        password_hash::{PasswordHasher, SaltString, rand_core::OsRng},
    };

    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(DEFAULT_ADMIN_PASSWORD.as_bytes(), &salt)
        .expect("Failed to hash default admin password")
        .to_string()
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let backend = manager.get_database_backend();
        let schema = Schema::new(backend);

        manager
            .create_table(
                schema
                    .create_table_from_entity(Accounts)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        // Login identities are unique regardless of case.
        manager
            .get_connection()
            .execute_unprepared(
                "CREATE UNIQUE INDEX IF NOT EXISTS idx_accounts_username_nocase \
                 ON accounts (username COLLATE NOCASE)",
            )
            .await?;

        // Seed the first-run administrator
        let now = chrono::Utc::now().to_rfc3339();
        let secure_hash = hash_default_password();

        let insert = sea_orm_migration::sea_query::Query::insert()
            .into_table(Accounts)
            .columns([
                crate::entities::accounts::Column::Username,
                crate::entities::accounts::Column::DisplayName,
                crate::entities::accounts::Column::LegacyHash,
                crate::entities::accounts::Column::SecureHash,
                crate::entities::accounts::Column::Migrated,
                crate::entities::accounts::Column::Role,
                crate::entities::accounts::Column::Active,
                crate::entities::accounts::Column::FailedAttempts,
                crate::entities::accounts::Column::CreatedAt,
                crate::entities::accounts::Column::UpdatedAt,
            ])
            .values_panic([
                DEFAULT_ADMIN_USERNAME.into(),
                "Administrator".into(),
                Option::<String>::None.into(),
                secure_hash.into(),
                true.into(),
                "privileged".into(),
                true.into(),
                0.into(),
                now.clone().into(),
                now.into(),
            ])
            .to_owned();

        manager.exec_stmt(insert).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Accounts).to_owned())
            .await?;

        Ok(())
    }
}
