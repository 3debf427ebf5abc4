//! Data models for the relations service

use matrixon_common::{EventType, RelationType};
use ruma::{OwnedEventId, OwnedRoomId, OwnedUserId};
use serde::{Deserialize, Serialize};

/// A JSON object as sent by clients
pub type JsonObject = serde_json::Map<String, serde_json::Value>;

/// One page of results.
///
/// `next_batch` and `prev_batch` are reserved for token based pagination and
/// are currently always `None`; they still serialize (as `null`) so clients
/// see the full response shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationChunk<T> {
    pub chunk: Vec<T>,
    pub limited: bool,
    pub next_batch: Option<String>,
    pub prev_batch: Option<String>,
}

impl<T> PaginationChunk<T> {
    pub fn new(chunk: Vec<T>, limited: bool) -> Self {
        Self {
            chunk,
            limited,
            next_batch: None,
            prev_batch: None,
        }
    }

    /// Build a page from rows fetched with `LIMIT limit + 1`: the extra row,
    /// if present, only tells us that the page was truncated.
    pub fn from_overfetched(mut rows: Vec<T>, limit: usize) -> Self {
        let limited = rows.len() > limit;
        rows.truncate(limit);
        Self::new(rows, limited)
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), false)
    }

    pub fn len(&self) -> usize {
        self.chunk.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunk.is_empty()
    }
}

/// A child event returned by a relations query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedEvent {
    pub event_id: OwnedEventId,
}

/// One annotation group: how many `event_type` children carry `key`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AggregationGroup {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub key: Option<String>,
    pub count: u64,
}

/// A row of the relation edge index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationEdge {
    pub child_event_id: OwnedEventId,
    pub parent_event_id: OwnedEventId,
    pub relation_type: RelationType,
    pub aggregation_key: Option<String>,
}

/// An event as handed to the persistence layer, before it has an id
#[derive(Debug, Clone, PartialEq)]
pub struct EventDescriptor {
    pub event_type: EventType,
    pub content: JsonObject,
    pub room_id: OwnedRoomId,
    pub sender: OwnedUserId,
    pub state_key: Option<String>,
}

/// An event after it has been written to the `events` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedEvent {
    pub event_id: OwnedEventId,
    pub room_id: OwnedRoomId,
    pub sender: OwnedUserId,
    #[serde(rename = "type")]
    pub event_type: EventType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_key: Option<String>,
    pub content: JsonObject,
    pub origin_server_ts: i64,
    #[serde(skip)]
    pub topological_ordering: i64,
    #[serde(skip)]
    pub stream_ordering: i64,
}
