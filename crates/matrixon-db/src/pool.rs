//! Database connection pool management
//!
//! File databases run in WAL mode so that readers never block the single
//! writer. In-memory databases exist per connection, so their pool is pinned
//! to one connection that is never recycled.

use std::{str::FromStr, time::Duration, time::Instant};

use matrixon_common::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::{debug, info, instrument};

use crate::DatabaseConfig;

/// URL of a private in-memory database
pub const MEMORY_URL: &str = "sqlite::memory:";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Create the SQLx connection pool for `config`
#[instrument(level = "debug")]
pub async fn create_pool(config: &DatabaseConfig) -> Result<SqlitePool> {
    debug!("🔧 Creating database connection pool");
    let start = Instant::now();

    let mut options = SqliteConnectOptions::from_str(&config.url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(BUSY_TIMEOUT);

    let max_connections = if config.is_in_memory() {
        1
    } else {
        config.max_connections.max(1)
    };

    let pool_options = if config.is_in_memory() {
        SqlitePoolOptions::new()
            .max_connections(max_connections)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        options = options.journal_mode(SqliteJournalMode::Wal);
        SqlitePoolOptions::new().max_connections(max_connections)
    };

    let pool = pool_options
        .acquire_timeout(Duration::from_secs(config.connection_timeout))
        .connect_with(options)
        .await?;

    metrics::histogram!("matrixon_relations_db_pool_create_seconds")
        .record(start.elapsed().as_secs_f64());
    info!(
        "✅ Created database connection pool with {} max connections in {:?}",
        max_connections,
        start.elapsed()
    );

    Ok(pool)
}

/// Check if the database connection pool is healthy
#[instrument(level = "debug", skip(pool))]
pub async fn check_pool_health(pool: &SqlitePool) -> Result<bool> {
    debug!("🔧 Checking database connection pool health");

    let value: i64 = sqlx::query_scalar("SELECT 1").fetch_one(pool).await?;
    let is_healthy = value == 1;

    debug!("✅ Database connection pool health check: {}", is_healthy);
    Ok(is_healthy)
}
