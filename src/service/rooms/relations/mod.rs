//! Event relations
//!
//! Sending events that point at a parent event, and the two read views over
//! the relation edges: the list of children and the annotation groups.

mod data;

use std::{sync::Arc, time::Instant};

pub use data::Data;
use matrixon_common::{Direction, ErrorKind, EventType, MatrixonError, RelationType, Result};
use matrixon_db::{
    AggregationGroup, EventDescriptor, JsonObject, PaginationChunk, RelatedEvent, RELATES_TO,
};
use ruma::{EventId, OwnedEventId, OwnedTransactionId, RoomId};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::service::{auth::Requester, rooms::timeline::EventCreator};

pub struct Service {
    pub db: Arc<dyn Data>,
    pub event_creator: Arc<dyn EventCreator>,
}

/// Replace whatever `m.relates_to` the client sent with the relation taken
/// from the request path.
fn inject_relation(
    content: &mut JsonObject,
    parent_event_id: &EventId,
    relation_type: &RelationType,
    aggregation_key: Option<String>,
) {
    let mut target = JsonObject::new();
    target.insert("event_id".to_owned(), Value::from(parent_event_id.as_str()));
    if let Some(key) = aggregation_key {
        target.insert("key".to_owned(), Value::from(key));
    }

    let mut relates_to = JsonObject::new();
    relates_to.insert(relation_type.as_str().to_owned(), Value::Object(target));
    content.insert(RELATES_TO.to_owned(), Value::Object(relates_to));
}

impl Service {
    /// Send a `event_type` event into `room_id` relating to `parent_event_id`
    #[allow(clippy::too_many_arguments)]
    #[instrument(skip(self, requester, content), fields(user_id = %requester.user_id))]
    pub async fn send_relation(
        &self,
        requester: &Requester,
        room_id: &RoomId,
        parent_event_id: &EventId,
        relation_type: RelationType,
        event_type: EventType,
        mut content: JsonObject,
        aggregation_key: Option<String>,
        txn_id: Option<OwnedTransactionId>,
    ) -> Result<OwnedEventId> {
        let start = Instant::now();
        debug!(
            "🔧 Sending {} relation from a {} event to {}",
            relation_type, event_type, parent_event_id
        );

        if event_type.is_membership() {
            warn!("⚠️ Refusing to send a member event with a relation");
            return Err(MatrixonError::bad_request(
                ErrorKind::Unknown,
                "Cannot send member events with relations",
            ));
        }

        inject_relation(&mut content, parent_event_id, &relation_type, aggregation_key);

        let event = EventDescriptor {
            event_type,
            content,
            room_id: room_id.to_owned(),
            sender: requester.user_id.clone(),
            state_key: None,
        };

        let persisted = self
            .event_creator
            .create_and_send_event(requester, event, txn_id)
            .await?;

        info!(
            "✅ Sent {} relation {} -> {} in {:?}",
            relation_type,
            persisted.event_id,
            parent_event_id,
            start.elapsed()
        );
        Ok(persisted.event_id)
    }

    /// Children of `parent_event_id`, optionally filtered by relation and
    /// event type
    #[instrument(skip(self))]
    pub async fn paginate_relations(
        &self,
        parent_event_id: &EventId,
        relation_type: Option<&RelationType>,
        event_type: Option<&EventType>,
        limit: u32,
        direction: Direction,
    ) -> Result<PaginationChunk<RelatedEvent>> {
        self.db
            .relations_for_event(parent_event_id, relation_type, event_type, limit, direction)
            .await
    }

    /// Annotation groups of `parent_event_id`, most used first.
    ///
    /// Only annotations can be aggregated: an explicit `relation_type` other
    /// than `m.annotation` is a client error.
    #[instrument(skip(self))]
    pub async fn paginate_aggregation_groups(
        &self,
        parent_event_id: &EventId,
        relation_type: Option<&RelationType>,
        event_type: Option<&EventType>,
        limit: u32,
    ) -> Result<PaginationChunk<AggregationGroup>> {
        if let Some(relation_type) = relation_type.filter(|r| !r.is_annotation()) {
            warn!("⚠️ Rejected aggregation over {} relations", relation_type);
            return Err(MatrixonError::bad_request(
                ErrorKind::Unknown,
                "Aggregation queries are only supported for m.annotation relations",
            ));
        }

        self.db
            .aggregation_groups_for_event(parent_event_id, event_type, limit)
            .await
    }
}
