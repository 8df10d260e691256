use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::Config;
use crate::db::Store;
use crate::services::{
    AuthService, RateLimiter, RegistrationService, SeaOrmAuthService, SeaOrmRegistrationService,
};

#[derive(Clone)]
pub struct SharedState {
    pub config: Arc<RwLock<Config>>,

    pub store: Store,

    /// One limiter per process, shared by every budget check.
    pub rate_limiter: Arc<RateLimiter>,

    pub auth_service: Arc<dyn AuthService>,

    pub registration_service: Arc<dyn RegistrationService>,
}

impl SharedState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let store = Store::with_pool_options(
            &config.general.database_path,
            config.general.max_db_connections,
            config.general.min_db_connections,
        )
        .await?;

        let rate_limiter = Arc::new(RateLimiter::new(&config.rate_limit));

        let auth_service = Arc::new(SeaOrmAuthService::new(
            store.clone(),
            rate_limiter.clone(),
            &config,
        )) as Arc<dyn AuthService>;

        let registration_service = Arc::new(SeaOrmRegistrationService::new(
            store.clone(),
            rate_limiter.clone(),
            &config,
        )) as Arc<dyn RegistrationService>;

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            store,
            rate_limiter,
            auth_service,
            registration_service,
        })
    }

    pub async fn config(&self) -> Config {
        self.config.read().await.clone()
    }
}
