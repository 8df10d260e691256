use anyhow::Result;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::models::{Account, Role};

pub mod migrator;
pub mod repositories;

pub use repositories::credential::CredentialRecord;

#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,
}

impl Store {
    pub async fn new(db_url: &str) -> Result<Self> {
        Self::with_pool_options(db_url, 5, 1).await
    }

    pub async fn with_pool_options(
        db_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        if !db_url.contains(":memory:") {
            let path_str = db_url.trim_start_matches("sqlite:");
            if let Some(parent) = Path::new(path_str).parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            if !Path::new(path_str).exists() {
                std::fs::File::create(path_str)?;
            }
        }

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(600))
            .sqlx_logging(false);

        let conn = Database::connect(opt).await?;

        migrator::Migrator::up(&conn, None).await?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(Self { conn })
    }

    pub async fn ping(&self) -> Result<()> {
        let backend = self.conn.get_database_backend();
        self.conn
            .query_one(Statement::from_string(backend, "SELECT 1".to_string()))
            .await?;
        Ok(())
    }

    fn credential_repo(&self) -> repositories::credential::CredentialRepository {
        repositories::credential::CredentialRepository::new(self.conn.clone())
    }

    pub async fn find_credential(&self, username: &str) -> Result<Option<CredentialRecord>> {
        self.credential_repo().find_by_username(username).await
    }

    pub async fn username_taken(&self, username: &str) -> Result<bool> {
        self.credential_repo().username_taken(username).await
    }

    pub async fn account_count(&self) -> Result<u64> {
        self.credential_repo().count().await
    }

    pub async fn insert_account(
        &self,
        username: &str,
        display_name: &str,
        secure_hash: &str,
        role: Role,
    ) -> Result<Account> {
        self.credential_repo()
            .insert(username, display_name, secure_hash, role)
            .await
    }

    pub async fn try_migrate(&self, id: i32, secure_hash: &str) -> Result<bool> {
        self.credential_repo().try_migrate(id, secure_hash).await
    }

    pub async fn try_upgrade_secure_hash(
        &self,
        id: i32,
        current_hash: &str,
        new_hash: &str,
    ) -> Result<bool> {
        self.credential_repo()
            .try_upgrade_secure_hash(id, current_hash, new_hash)
            .await
    }

    pub async fn record_failure(
        &self,
        id: i32,
        threshold: u32,
        lockout_seconds: u64,
    ) -> Result<u32> {
        self.credential_repo()
            .record_failure(id, threshold, lockout_seconds)
            .await
    }

    pub async fn record_success(&self, id: i32) -> Result<()> {
        self.credential_repo().record_success(id).await
    }
}
