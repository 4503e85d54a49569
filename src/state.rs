use crate::auth::{
    memory::{MemoryRevokedTokens, MemoryUserStore},
    PgRevokedTokens, PgUserStore, RevokedTokens, UserStore,
};
use crate::config::AppConfig;
use anyhow::Context;
use sqlx::{migrate::Migrator, PgPool};
use std::sync::Arc;

/// Schema the stores rely on; applied before the server accepts requests.
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: Arc<dyn UserStore>,
    pub revoked: Arc<dyn RevokedTokens>,
}

impl AppState {
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let db = sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await
            .context("connecting to postgres")?;

        MIGRATOR
            .run(&db)
            .await
            .context("running migrations")?;
        tracing::info!("migrations applied");

        Ok(Self::with_pool(db, Arc::new(config)))
    }

    pub fn with_pool(db: PgPool, config: Arc<AppConfig>) -> Self {
        Self::from_parts(
            config,
            Arc::new(PgUserStore::new(db.clone())),
            Arc::new(PgRevokedTokens::new(db)),
        )
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        users: Arc<dyn UserStore>,
        revoked: Arc<dyn RevokedTokens>,
    ) -> Self {
        Self {
            config,
            users,
            revoked,
        }
    }

    /// State backed by process-local stores; nothing touches a database.
    pub fn in_memory(config: AppConfig) -> Self {
        Self::from_parts(
            Arc::new(config),
            Arc::new(MemoryUserStore::new()),
            Arc::new(MemoryRevokedTokens::new()),
        )
    }
}
