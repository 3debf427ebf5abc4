use async_trait::async_trait;
use matrixon_common::{Direction, EventType, RelationType, Result};
use matrixon_db::{AggregationGroup, PaginationChunk, RelatedEvent};
use ruma::EventId;

#[async_trait]
pub trait Data: Send + Sync {
    async fn relations_for_event(
        &self,
        event_id: &EventId,
        relation_type: Option<&RelationType>,
        event_type: Option<&EventType>,
        limit: u32,
        direction: Direction,
    ) -> Result<PaginationChunk<RelatedEvent>>;

    /// Groups `m.annotation` children of `event_id` by (type, key)
    async fn aggregation_groups_for_event(
        &self,
        event_id: &EventId,
        event_type: Option<&EventType>,
        limit: u32,
    ) -> Result<PaginationChunk<AggregationGroup>>;
}
