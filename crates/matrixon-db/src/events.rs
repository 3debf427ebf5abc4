//! Event persistence
//!
//! Writes new events together with everything derived from them: the relation
//! edge declared in `m.relates_to`, the transaction id mapping used for
//! idempotent retries, and the membership / history visibility state the
//! relation queries are authorized against. All of it happens in a single
//! write transaction.

use std::time::Instant;

use matrixon_common::{EventType, MatrixonError, RelationType, Result};
use ruma::{EventId, OwnedEventId, RoomId, TransactionId, UserId};
use serde_json::Value;
use sqlx::{
    pool::PoolConnection, sqlite::SqliteRow, Row, Sqlite, SqliteConnection, SqlitePool,
};
use tracing::{debug, info, instrument, warn};

use crate::{bad_row, Database, EventDescriptor, JsonObject, PersistedEvent};

/// Content key carrying the relation of an event to its parent
pub const RELATES_TO: &str = "m.relates_to";

/// A relation declared in event content, before it has been recorded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredRelation {
    pub parent_event_id: OwnedEventId,
    pub relation_type: RelationType,
    pub aggregation_key: Option<String>,
}

/// Extract the relation declared in `content`, if any.
///
/// Two shapes are understood: the keyed form written by `send_relation`,
/// `{"m.annotation": {"event_id": "$parent", "key": "👍"}}` with exactly one
/// entry, and the flat form `{"rel_type": "m.annotation", "event_id":
/// "$parent", "key": "👍"}`. Anything else yields `None` and the event is
/// stored without an edge.
pub fn relation_from_content(content: &JsonObject) -> Option<DeclaredRelation> {
    let relates_to = content.get(RELATES_TO)?.as_object()?;

    let (relation_type, target) = match relates_to.get("rel_type") {
        Some(rel_type) => (rel_type.as_str()?, relates_to),
        None => {
            if relates_to.len() != 1 {
                return None;
            }
            let (rel_type, target) = relates_to.iter().next()?;
            (rel_type.as_str(), target.as_object()?)
        }
    };

    let parent_event_id = EventId::parse(target.get("event_id")?.as_str()?).ok()?;
    let aggregation_key = match target.get("key") {
        None | Some(Value::Null) => None,
        Some(key) => Some(key.as_str()?.to_owned()),
    };

    Some(DeclaredRelation {
        parent_event_id,
        relation_type: RelationType::from(relation_type),
        aggregation_key,
    })
}

fn event_from_row(row: &SqliteRow) -> Result<PersistedEvent> {
    let event_id: String = row.try_get("event_id").map_err(bad_row)?;
    let room_id: String = row.try_get("room_id").map_err(bad_row)?;
    let sender: String = row.try_get("sender").map_err(bad_row)?;
    let content: String = row.try_get("content").map_err(bad_row)?;

    Ok(PersistedEvent {
        event_id: EventId::parse(event_id)
            .map_err(|_| MatrixonError::bad_database("Invalid event id in events."))?,
        room_id: RoomId::parse(room_id)
            .map_err(|_| MatrixonError::bad_database("Invalid room id in events."))?,
        sender: UserId::parse(sender)
            .map_err(|_| MatrixonError::bad_database("Invalid sender in events."))?,
        event_type: EventType::from(row.try_get::<String, _>("type").map_err(bad_row)?),
        state_key: row.try_get("state_key").map_err(bad_row)?,
        content: serde_json::from_str(&content)
            .map_err(|_| MatrixonError::bad_database("Invalid content in events."))?,
        origin_server_ts: row.try_get("origin_server_ts").map_err(bad_row)?,
        topological_ordering: row.try_get("topological_ordering").map_err(bad_row)?,
        stream_ordering: row.try_get("stream_ordering").map_err(bad_row)?,
    })
}

const EVENT_COLUMNS: &str = "stream_ordering, topological_ordering, event_id, room_id, type, \
                             sender, state_key, content, origin_server_ts";

async fn fetch_event(conn: &mut SqliteConnection, event_id: &str) -> Result<Option<PersistedEvent>> {
    let sql = format!("SELECT {EVENT_COLUMNS} FROM events WHERE event_id = ?");
    let row = sqlx::query(&sql)
        .bind(event_id)
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(event_from_row).transpose()
}

async fn txn_event_id(
    conn: &mut SqliteConnection,
    user_id: &UserId,
    txn_id: &TransactionId,
) -> Result<Option<String>> {
    Ok(
        sqlx::query_scalar("SELECT event_id FROM event_txn_ids WHERE user_id = ? AND txn_id = ?")
            .bind(user_id.as_str())
            .bind(txn_id.as_str())
            .fetch_optional(&mut *conn)
            .await?,
    )
}

/// Write transaction holding the database write lock from its first statement.
///
/// Reads inside it see the latest committed state and cannot be invalidated
/// by other writers. Dropped before `commit` or `rollback` finish, its
/// connection is detached from the pool and closed, which rolls it back.
struct ImmediateTransaction {
    conn: Option<PoolConnection<Sqlite>>,
}

impl ImmediateTransaction {
    async fn begin(pool: &SqlitePool) -> Result<Self> {
        let mut conn = pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;
        Ok(Self { conn: Some(conn) })
    }

    fn conn(&mut self) -> Result<&mut SqliteConnection> {
        self.conn
            .as_deref_mut()
            .ok_or_else(|| MatrixonError::bad_database("Write transaction already finished."))
    }

    async fn commit(mut self) -> Result<()> {
        sqlx::query("COMMIT").execute(self.conn()?).await?;
        self.conn.take();
        Ok(())
    }

    async fn rollback(mut self) -> Result<()> {
        sqlx::query("ROLLBACK").execute(self.conn()?).await?;
        self.conn.take();
        Ok(())
    }
}

impl Drop for ImmediateTransaction {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            warn!("⚠️ Abandoned write transaction, closing its connection");
            drop(conn.detach());
        }
    }
}

enum Written {
    /// The sender already used the transaction id for this event
    Existing(PersistedEvent),
    New(PersistedEvent),
}

async fn write_event(
    conn: &mut SqliteConnection,
    event_id: &EventId,
    event: &EventDescriptor,
    txn_id: Option<&TransactionId>,
) -> Result<Written> {
    if let Some(txn_id) = txn_id {
        if let Some(existing) = txn_event_id(&mut *conn, &event.sender, txn_id).await? {
            let existing = fetch_event(&mut *conn, &existing).await?.ok_or_else(|| {
                MatrixonError::bad_database("Transaction id points at a missing event.")
            })?;
            return Ok(Written::Existing(existing));
        }
    }

    let content = serde_json::to_string(&event.content)?;
    let origin_server_ts = chrono::Utc::now().timestamp_millis();

    sqlx::query(
        "INSERT INTO events \
             (topological_ordering, event_id, room_id, type, sender, state_key, content, origin_server_ts) \
         VALUES ( \
             (SELECT COALESCE(MAX(topological_ordering), 0) + 1 FROM events WHERE room_id = ?), \
             ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(event.room_id.as_str())
    .bind(event_id.as_str())
    .bind(event.room_id.as_str())
    .bind(event.event_type.as_str())
    .bind(event.sender.as_str())
    .bind(event.state_key.as_deref())
    .bind(content.as_str())
    .bind(origin_server_ts)
    .execute(&mut *conn)
    .await?;

    if let Some(txn_id) = txn_id {
        sqlx::query("INSERT INTO event_txn_ids (user_id, txn_id, event_id) VALUES (?, ?, ?)")
            .bind(event.sender.as_str())
            .bind(txn_id.as_str())
            .bind(event_id.as_str())
            .execute(&mut *conn)
            .await?;
    }

    if let Some(relation) = relation_from_content(&event.content) {
        sqlx::query(
            "INSERT INTO event_relations (event_id, relates_to_id, relation_type, aggregation_key) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(event_id.as_str())
        .bind(relation.parent_event_id.as_str())
        .bind(relation.relation_type.as_str())
        .bind(relation.aggregation_key.as_deref())
        .execute(&mut *conn)
        .await?;
        debug!(
            "Recorded {} relation {} -> {}",
            relation.relation_type, event_id, relation.parent_event_id
        );
    } else if event.content.contains_key(RELATES_TO) {
        warn!("⚠️ Ignoring malformed {} on {}", RELATES_TO, event_id);
    }

    if let Some(state_key) = event.state_key.as_deref() {
        update_room_state(&mut *conn, event, state_key).await?;
    }

    let persisted = fetch_event(&mut *conn, event_id.as_str())
        .await?
        .ok_or_else(|| MatrixonError::bad_database("Event vanished while persisting."))?;
    Ok(Written::New(persisted))
}

impl Database {
    /// Persist `event` under `event_id`.
    ///
    /// When `txn_id` is given and the sender already used it, nothing is
    /// written and the earlier event is returned instead. The write lock is
    /// taken before the transaction id is checked, so concurrent retries of
    /// one transaction id persist a single event.
    #[instrument(level = "debug", skip(self, event), fields(room_id = %event.room_id, event_type = %event.event_type))]
    pub async fn persist_event(
        &self,
        event_id: OwnedEventId,
        event: EventDescriptor,
        txn_id: Option<&TransactionId>,
    ) -> Result<PersistedEvent> {
        let start = Instant::now();
        debug!("🔧 Persisting event {}", event_id);

        let mut txn = ImmediateTransaction::begin(self.pool()).await?;
        let written = write_event(txn.conn()?, &event_id, &event, txn_id).await;

        match written {
            Ok(Written::Existing(existing)) => {
                txn.rollback().await?;
                debug!("Transaction id already sent as {}", existing.event_id);
                Ok(existing)
            }
            Ok(Written::New(persisted)) => {
                txn.commit().await?;
                metrics::counter!("matrixon_relations_events_persisted_total").increment(1);
                info!(
                    "✅ Persisted event {} at stream position {} in {:?}",
                    persisted.event_id,
                    persisted.stream_ordering,
                    start.elapsed()
                );
                Ok(persisted)
            }
            Err(e) => {
                if let Err(rollback) = txn.rollback().await {
                    warn!("⚠️ Failed to roll back event {}: {}", event_id, rollback);
                }
                Err(e)
            }
        }
    }

    /// Look up a persisted event
    #[instrument(level = "debug", skip(self))]
    pub async fn get_event(&self, event_id: &EventId) -> Result<Option<PersistedEvent>> {
        let mut conn = self.pool().acquire().await?;
        fetch_event(&mut *conn, event_id.as_str()).await
    }

    /// The event previously sent by `user_id` with `txn_id`
    #[instrument(level = "debug", skip(self))]
    pub async fn event_id_for_txn(
        &self,
        user_id: &UserId,
        txn_id: &TransactionId,
    ) -> Result<Option<OwnedEventId>> {
        let mut conn = self.pool().acquire().await?;
        txn_event_id(&mut *conn, user_id, txn_id)
            .await?
            .map(|event_id| {
                EventId::parse(event_id)
                    .map_err(|_| MatrixonError::bad_database("Invalid event id in event_txn_ids."))
            })
            .transpose()
    }

    /// Current membership of `user_id` in `room_id` (`join`, `leave`, ...)
    #[instrument(level = "debug", skip(self))]
    pub async fn membership(&self, room_id: &RoomId, user_id: &UserId) -> Result<Option<String>> {
        Ok(sqlx::query_scalar(
            "SELECT membership FROM room_memberships WHERE room_id = ? AND user_id = ?",
        )
        .bind(room_id.as_str())
        .bind(user_id.as_str())
        .fetch_optional(self.pool())
        .await?)
    }

    /// Current `m.room.history_visibility` setting of `room_id`
    #[instrument(level = "debug", skip(self))]
    pub async fn history_visibility(&self, room_id: &RoomId) -> Result<Option<String>> {
        Ok(sqlx::query_scalar(
            "SELECT history_visibility FROM room_history_visibility WHERE room_id = ?",
        )
        .bind(room_id.as_str())
        .fetch_optional(self.pool())
        .await?)
    }
}

async fn update_room_state(
    conn: &mut SqliteConnection,
    event: &EventDescriptor,
    state_key: &str,
) -> Result<()> {
    match event.event_type.as_str() {
        EventType::ROOM_MEMBER => {
            let Some(membership) = event.content.get("membership").and_then(Value::as_str) else {
                warn!("⚠️ Member event for {} without membership", state_key);
                return Ok(());
            };
            sqlx::query(
                "INSERT INTO room_memberships (room_id, user_id, membership) VALUES (?, ?, ?) \
                 ON CONFLICT (room_id, user_id) DO UPDATE SET membership = excluded.membership",
            )
            .bind(event.room_id.as_str())
            .bind(state_key)
            .bind(membership)
            .execute(&mut *conn)
            .await?;
        }
        EventType::ROOM_HISTORY_VISIBILITY if state_key.is_empty() => {
            let Some(visibility) = event
                .content
                .get("history_visibility")
                .and_then(Value::as_str)
            else {
                return Ok(());
            };
            sqlx::query(
                "INSERT INTO room_history_visibility (room_id, history_visibility) VALUES (?, ?) \
                 ON CONFLICT (room_id) DO UPDATE SET history_visibility = excluded.history_visibility",
            )
            .bind(event.room_id.as_str())
            .bind(visibility)
            .execute(&mut *conn)
            .await?;
        }
        _ => {}
    }
    Ok(())
}
