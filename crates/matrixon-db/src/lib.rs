//! Matrixon Database Library
//!
//! Author: arkSong <arksong2018@gmail.com>
//! Version: 0.11.0-alpha
//!
//! Storage for the relations service: the `events` table with its
//! (topological, stream) ordering, the `event_relations` edge index that
//! points child events at their parents, and the small amount of room state
//! needed to authorize relation queries.
//!
//! Every public operation runs inside exactly one sqlx transaction, so a
//! reader never observes an event without its relation edge or vice versa.

use std::time::Instant;

use matrixon_common::{MatrixonError, Result};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;
use tracing::{debug, info, instrument};

pub mod events;
pub mod migrations;
pub mod models;
pub mod pool;
pub mod relations;

pub use events::{relation_from_content, DeclaredRelation, RELATES_TO};
pub use models::{
    AggregationGroup, EventDescriptor, JsonObject, PaginationChunk, PersistedEvent, RelatedEvent,
    RelationEdge,
};

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// sqlx SQLite URL, e.g. `sqlite://matrixon.db` or `sqlite::memory:`
    pub url: String,

    /// Maximum number of connections
    pub max_connections: u32,

    /// Connection acquire timeout in seconds
    pub connection_timeout: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://matrixon.db".to_string(),
            max_connections: 16,
            connection_timeout: 30,
        }
    }
}

impl DatabaseConfig {
    /// Configuration for a private in-memory database
    pub fn in_memory() -> Self {
        Self {
            url: pool::MEMORY_URL.to_string(),
            max_connections: 1,
            connection_timeout: 30,
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.url.contains(":memory:") || self.url.contains("mode=memory")
    }
}

/// Handle to the relations database
#[derive(Debug, Clone)]
pub struct Database {
    config: DatabaseConfig,
    pool: SqlitePool,
}

impl Database {
    /// Connect to the configured database. Does not run migrations.
    #[instrument(level = "debug")]
    pub async fn connect(config: DatabaseConfig) -> Result<Self> {
        let start = Instant::now();
        debug!("🔧 Connecting to database");

        let pool = pool::create_pool(&config).await?;

        info!("✅ Database connected in {:?}", start.elapsed());
        Ok(Self { config, pool })
    }

    /// Connect to the configured database and bring the schema up to date
    #[instrument(level = "debug")]
    pub async fn load_or_create(config: DatabaseConfig) -> Result<Self> {
        let db = Self::connect(config).await?;
        db.migrate().await?;
        Ok(db)
    }

    /// Fresh, migrated in-memory database
    pub async fn open_in_memory() -> Result<Self> {
        Self::load_or_create(DatabaseConfig::in_memory()).await
    }

    /// Get the database configuration
    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Get the database connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Run database migrations
    #[instrument(level = "debug", skip(self))]
    pub async fn migrate(&self) -> Result<()> {
        migrations::run_migrations(&self.pool).await
    }

    /// Check database health
    #[instrument(level = "debug", skip(self))]
    pub async fn health_check(&self) -> Result<bool> {
        pool::check_pool_health(&self.pool).await
    }

    /// Close all connections
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

pub(crate) fn bad_row(err: sqlx::Error) -> MatrixonError {
    debug!("Row decoding failed: {}", err);
    MatrixonError::bad_database("Unexpected column type in relations database.")
}
