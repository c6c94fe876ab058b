use std::time::Duration;

use carewatch_core::config::PostgresConfig;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{info, warn};

use crate::error::StorageError;

/// Connect to PostgreSQL and apply migrations.
/// Returns `None` when `PG_USERNAME` is not configured.
pub async fn init_pg_pool(config: &PostgresConfig) -> Result<Option<PgPool>, StorageError> {
    if !config.is_configured() {
        warn!("PG_USERNAME not set, PostgreSQL disabled");
        return Ok(None);
    }

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(10))
        .connect(&config.connection_string())
        .await?;
    info!(host = %config.host, database = %config.database, "PostgreSQL connected");

    sqlx::migrate!("../../migrations").run(&pool).await?;
    info!("database migrations applied");

    Ok(Some(pool))
}
