use std::time::Duration;

use anyhow::Result;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info};

use shared_config::AppConfig;

/// The persistence gateway: a bounded PostgreSQL connection pool.
///
/// All cross-request coordination is delegated to the store's transaction
/// isolation; the pool itself carries no mutable state beyond connections.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn connect(config: &AppConfig) -> Result<Self> {
        debug!("Connecting to PostgreSQL");

        let pool = PgPoolOptions::new()
            .max_connections(25)
            .acquire_timeout(Duration::from_secs(3))
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(2 * 60 * 60))
            .connect(&config.database_url)
            .await?;

        info!("Database pool established");
        Ok(Self { pool })
    }

    /// Wrap an existing pool, used by tests that provision their own database.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
