//! Database migrations
//!
//! Each migration is a list of statements applied in one transaction and
//! recorded in `_migrations`, so re-running is a no-op.

use std::time::Instant;

use matrixon_common::Result;
use sqlx::sqlite::SqlitePool;
use tracing::{debug, info, instrument};

/// A schema version and the statements that create it
pub struct Migration {
    pub version: &'static str,
    pub statements: &'static [&'static str],
}

/// All migrations, oldest first
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: "20240321000000_events",
        statements: &[
            r#"
            CREATE TABLE IF NOT EXISTS events (
                stream_ordering INTEGER PRIMARY KEY,
                topological_ordering INTEGER NOT NULL,
                event_id TEXT NOT NULL UNIQUE,
                room_id TEXT NOT NULL,
                type TEXT NOT NULL,
                sender TEXT NOT NULL,
                state_key TEXT,
                content TEXT NOT NULL,
                origin_server_ts INTEGER NOT NULL
            )
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS events_order_room
                ON events (room_id, topological_ordering, stream_ordering)
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS event_txn_ids (
                user_id TEXT NOT NULL,
                txn_id TEXT NOT NULL,
                event_id TEXT NOT NULL,
                PRIMARY KEY (user_id, txn_id)
            )
            "#,
        ],
    },
    Migration {
        version: "20240321000001_event_relations",
        statements: &[
            r#"
            CREATE TABLE IF NOT EXISTS event_relations (
                event_id TEXT NOT NULL PRIMARY KEY,
                relates_to_id TEXT NOT NULL,
                relation_type TEXT NOT NULL,
                aggregation_key TEXT
            )
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS event_relations_relates
                ON event_relations (relates_to_id, relation_type, aggregation_key)
            "#,
        ],
    },
    Migration {
        version: "20240321000002_room_state",
        statements: &[
            r#"
            CREATE TABLE IF NOT EXISTS room_memberships (
                room_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                membership TEXT NOT NULL,
                PRIMARY KEY (room_id, user_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS room_history_visibility (
                room_id TEXT NOT NULL PRIMARY KEY,
                history_visibility TEXT NOT NULL
            )
            "#,
        ],
    },
];

/// Run database migrations
#[instrument(level = "debug", skip(pool))]
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    debug!("🔧 Starting database migrations");
    let start = Instant::now();

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS _migrations (
            version TEXT PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    let mut applied = 0;
    for migration in MIGRATIONS {
        let mut txn = pool.begin().await?;

        let exists: Option<String> =
            sqlx::query_scalar("SELECT version FROM _migrations WHERE version = ?")
                .bind(migration.version)
                .fetch_optional(&mut *txn)
                .await?;
        if exists.is_some() {
            continue;
        }

        for statement in migration.statements {
            sqlx::query(*statement).execute(&mut *txn).await?;
        }

        sqlx::query("INSERT INTO _migrations (version, applied_at) VALUES (?, ?)")
            .bind(migration.version)
            .bind(chrono::Utc::now().timestamp_millis())
            .execute(&mut *txn)
            .await?;

        txn.commit().await?;
        debug!("Applied migration {}", migration.version);
        applied += 1;
    }

    info!(
        "✅ Database migrations completed in {:?} ({} applied)",
        start.elapsed(),
        applied
    );
    Ok(())
}
