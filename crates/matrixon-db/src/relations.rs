//! Relation edge store
//!
//! Read side of the `event_relations` index. Both queries join the edge rows
//! against `events` for the child's type and ordering, ask for one row more
//! than the caller wants, and let [`PaginationChunk::from_overfetched`] decide
//! whether the page was truncated.

use std::time::Instant;

use matrixon_common::{Direction, EventType, MatrixonError, RelationType, Result};
use ruma::{EventId, OwnedEventId};
use sqlx::{QueryBuilder, Row, Sqlite};
use tracing::{debug, instrument};

use crate::{bad_row, AggregationGroup, Database, PaginationChunk, RelatedEvent, RelationEdge};

fn order_keyword(direction: Direction) -> &'static str {
    match direction {
        Direction::Forward => "ASC",
        Direction::Backward => "DESC",
    }
}

impl Database {
    /// Child events relating to `event_id`, newest first unless `direction`
    /// is forward.
    ///
    /// `relation_type` and `event_type` are optional equality filters.
    /// `limit` must be positive; callers are responsible for defaults and
    /// upper bounds.
    // TODO: accept from/to tokens once next_batch/prev_batch carry stream positions
    #[instrument(level = "debug", skip(self))]
    pub async fn get_relations_for_event(
        &self,
        event_id: &EventId,
        relation_type: Option<&RelationType>,
        event_type: Option<&EventType>,
        limit: u32,
        direction: Direction,
    ) -> Result<PaginationChunk<RelatedEvent>> {
        let start = Instant::now();
        debug!("🔧 Getting relations for {}", event_id);

        let mut query = QueryBuilder::<Sqlite>::new(
            "SELECT event_id FROM event_relations INNER JOIN events USING (event_id) \
             WHERE relates_to_id = ",
        );
        query.push_bind(event_id.as_str().to_owned());

        if let Some(relation_type) = relation_type {
            query
                .push(" AND relation_type = ")
                .push_bind(relation_type.as_str().to_owned());
        }

        if let Some(event_type) = event_type {
            query
                .push(" AND type = ")
                .push_bind(event_type.as_str().to_owned());
        }

        let order = order_keyword(direction);
        query.push(format!(
            " ORDER BY topological_ordering {order}, stream_ordering {order} LIMIT "
        ));
        query.push_bind(i64::from(limit) + 1);

        let mut txn = self.pool().begin().await?;
        let rows = query.build().fetch_all(&mut *txn).await?;
        txn.commit().await?;

        let events = rows
            .iter()
            .map(|row| {
                let event_id: String = row.try_get("event_id").map_err(bad_row)?;
                let event_id = EventId::parse(event_id)
                    .map_err(|_| MatrixonError::bad_database("Invalid event id in event_relations."))?;
                Ok(RelatedEvent { event_id })
            })
            .collect::<Result<Vec<_>>>()?;

        let page = PaginationChunk::from_overfetched(events, limit as usize);

        metrics::counter!("matrixon_relations_queries_total", "query" => "relations").increment(1);
        metrics::histogram!("matrixon_relations_query_seconds", "query" => "relations")
            .record(start.elapsed().as_secs_f64());
        debug!(
            "✅ Found {} relations for {} (limited: {}) in {:?}",
            page.len(),
            event_id,
            page.limited,
            start.elapsed()
        );

        Ok(page)
    }

    /// Annotation groups for `event_id`, most popular first.
    ///
    /// Only `m.annotation` edges are ever grouped. Groups with equal counts
    /// come back in no particular order.
    #[instrument(level = "debug", skip(self))]
    pub async fn get_aggregation_groups_for_event(
        &self,
        event_id: &EventId,
        event_type: Option<&EventType>,
        limit: u32,
    ) -> Result<PaginationChunk<AggregationGroup>> {
        let start = Instant::now();
        debug!("🔧 Getting aggregation groups for {}", event_id);

        let mut query = QueryBuilder::<Sqlite>::new(
            "SELECT type, aggregation_key, COUNT(*) AS count \
             FROM event_relations INNER JOIN events USING (event_id) \
             WHERE relates_to_id = ",
        );
        query.push_bind(event_id.as_str().to_owned());
        query
            .push(" AND relation_type = ")
            .push_bind(RelationType::ANNOTATION);

        if let Some(event_type) = event_type {
            query
                .push(" AND type = ")
                .push_bind(event_type.as_str().to_owned());
        }

        query.push(
            " GROUP BY relation_type, type, aggregation_key \
             ORDER BY COUNT(*) DESC LIMIT ",
        );
        query.push_bind(i64::from(limit) + 1);

        let mut txn = self.pool().begin().await?;
        let rows = query.build().fetch_all(&mut *txn).await?;
        txn.commit().await?;

        let groups = rows
            .iter()
            .map(|row| {
                let event_type: String = row.try_get("type").map_err(bad_row)?;
                let key: Option<String> = row.try_get("aggregation_key").map_err(bad_row)?;
                let count: i64 = row.try_get("count").map_err(bad_row)?;
                let count = u64::try_from(count)
                    .map_err(|_| MatrixonError::bad_database("Negative aggregation count."))?;
                Ok(AggregationGroup {
                    event_type: EventType::from(event_type),
                    key,
                    count,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let page = PaginationChunk::from_overfetched(groups, limit as usize);

        metrics::counter!("matrixon_relations_queries_total", "query" => "aggregations").increment(1);
        metrics::histogram!("matrixon_relations_query_seconds", "query" => "aggregations")
            .record(start.elapsed().as_secs_f64());
        debug!(
            "✅ Found {} aggregation groups for {} (limited: {}) in {:?}",
            page.len(),
            event_id,
            page.limited,
            start.elapsed()
        );

        Ok(page)
    }

    /// The edge recorded for `child_event_id`, if it declared a relation
    #[instrument(level = "debug", skip(self))]
    pub async fn get_relation(&self, child_event_id: &EventId) -> Result<Option<RelationEdge>> {
        let row = sqlx::query(
            "SELECT event_id, relates_to_id, relation_type, aggregation_key \
             FROM event_relations WHERE event_id = ?",
        )
        .bind(child_event_id.as_str())
        .fetch_optional(self.pool())
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let parse = |column: &str| -> Result<OwnedEventId> {
            let raw: String = row.try_get(column).map_err(bad_row)?;
            EventId::parse(raw)
                .map_err(|_| MatrixonError::bad_database("Invalid event id in event_relations."))
        };

        Ok(Some(RelationEdge {
            child_event_id: parse("event_id")?,
            parent_event_id: parse("relates_to_id")?,
            relation_type: RelationType::from(
                row.try_get::<String, _>("relation_type").map_err(bad_row)?,
            ),
            aggregation_key: row.try_get("aggregation_key").map_err(bad_row)?,
        }))
    }
}
