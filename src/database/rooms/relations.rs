use async_trait::async_trait;
use matrixon_common::{Direction, EventType, RelationType, Result};
use matrixon_db::{AggregationGroup, Database, PaginationChunk, RelatedEvent};
use ruma::EventId;

use crate::service;

#[async_trait]
impl service::rooms::relations::Data for Database {
    async fn relations_for_event(
        &self,
        event_id: &EventId,
        relation_type: Option<&RelationType>,
        event_type: Option<&EventType>,
        limit: u32,
        direction: Direction,
    ) -> Result<PaginationChunk<RelatedEvent>> {
        self.get_relations_for_event(event_id, relation_type, event_type, limit, direction)
            .await
    }

    async fn aggregation_groups_for_event(
        &self,
        event_id: &EventId,
        event_type: Option<&EventType>,
        limit: u32,
    ) -> Result<PaginationChunk<AggregationGroup>> {
        self.get_aggregation_groups_for_event(event_id, event_type, limit)
            .await
    }
}
