use std::{sync::Arc, time::Instant};

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    Json,
};
use matrixon_common::{Direction, ErrorKind, EventType, MatrixonError, RelationType, Result};
use matrixon_db::{AggregationGroup, JsonObject, PaginationChunk, RelatedEvent};
use ruma::{EventId, OwnedEventId, OwnedTransactionId, RoomId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::{api::Authenticated, config::RelationsConfig, service::Services};

#[derive(Debug, Deserialize)]
pub struct SendRelationPath {
    pub room_id: String,
    pub parent_id: String,
    pub relation_type: String,
    pub event_type: String,
    #[serde(default)]
    pub txn_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SendRelationQuery {
    pub key: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SendRelationResponse {
    pub event_id: OwnedEventId,
}

#[derive(Debug, Deserialize)]
pub struct RelationsPath {
    pub room_id: String,
    pub parent_id: String,
    #[serde(default)]
    pub relation_type: Option<String>,
    #[serde(default)]
    pub event_type: Option<String>,
}

/// Raw pagination parameters, validated by hand so that bad values map to
/// `M_INVALID_PARAM`
#[derive(Debug, Default, Deserialize)]
pub struct PaginationQuery {
    pub limit: Option<String>,
    pub dir: Option<String>,
}

fn parse_json_object(body: &[u8]) -> Result<JsonObject> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|_| MatrixonError::bad_request(ErrorKind::NotJson, "Content not JSON."))?;
    match value {
        Value::Object(object) => Ok(object),
        _ => Err(MatrixonError::bad_request(
            ErrorKind::BadJson,
            "Content must be a JSON object.",
        )),
    }
}

fn parse_limit(raw: Option<&str>, relations: &RelationsConfig) -> Result<u32> {
    let requested = raw
        .map(|raw| {
            raw.parse::<i64>().map_err(|_| {
                MatrixonError::bad_request(
                    ErrorKind::InvalidParam,
                    format!("limit must be an integer, got {raw:?}"),
                )
            })
        })
        .transpose()?
        .map(|limit| u32::try_from(limit.max(0)).unwrap_or(u32::MAX));
    Ok(relations.clamp_limit(requested))
}

fn parse_direction(raw: Option<&str>) -> Result<Direction> {
    Ok(raw.map(str::parse::<Direction>).transpose()?.unwrap_or_default())
}

/// # `POST /_matrix/client/unstable/rooms/{roomId}/send_relation/{parentId}/{relationType}/{eventType}`
/// # `PUT /_matrix/client/unstable/rooms/{roomId}/send_relation/{parentId}/{relationType}/{eventType}/{txnId}`
///
/// Sends an `eventType` event into the room that relates to `parentId`.
///
/// - The `key` query parameter becomes the aggregation key of the relation
/// - Any `m.relates_to` in the body is replaced
/// - A retried `txnId` returns the event id of the first send
pub async fn send_relation_route(
    Authenticated(requester): Authenticated,
    State(services): State<Arc<Services>>,
    Path(path): Path<SendRelationPath>,
    Query(query): Query<SendRelationQuery>,
    body: Bytes,
) -> Result<Json<SendRelationResponse>> {
    let start = Instant::now();
    debug!("🔧 send_relation from {}", requester.user_id);

    let room_id = RoomId::parse(&path.room_id)?;
    let parent_event_id = EventId::parse(&path.parent_id)?;
    let txn_id = path.txn_id.map(OwnedTransactionId::from);
    let content = parse_json_object(&body)?;

    let event_id = services
        .rooms
        .relations
        .send_relation(
            &requester,
            &room_id,
            &parent_event_id,
            RelationType::from(path.relation_type),
            EventType::from(path.event_type),
            content,
            query.key,
            txn_id,
        )
        .await?;

    info!("✅ send_relation answered in {:?}", start.elapsed());
    Ok(Json(SendRelationResponse { event_id }))
}

/// # `GET /_matrix/client/unstable/rooms/{roomId}/relations/{parentId}[/{relationType}[/{eventType}]]`
///
/// Lists the events relating to `parentId`, newest first unless `dir=f`.
///
/// - `limit` defaults to the configured page size and is capped at the
///   configured maximum
/// - `next_batch` and `prev_batch` are always null
pub async fn get_relations_route(
    Authenticated(requester): Authenticated,
    State(services): State<Arc<Services>>,
    Path(path): Path<RelationsPath>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<PaginationChunk<RelatedEvent>>> {
    let room_id = RoomId::parse(&path.room_id)?;
    let parent_event_id = EventId::parse(&path.parent_id)?;
    let limit = parse_limit(query.limit.as_deref(), &services.config.relations)?;
    let direction = parse_direction(query.dir.as_deref())?;

    services
        .auth
        .require_membership_or_world_readable(&room_id, &requester.user_id)
        .await?;

    let relation_type = path.relation_type.map(RelationType::from);
    let event_type = path.event_type.map(EventType::from);

    let page = services
        .rooms
        .relations
        .paginate_relations(
            &parent_event_id,
            relation_type.as_ref(),
            event_type.as_ref(),
            limit,
            direction,
        )
        .await?;

    Ok(Json(page))
}

/// # `GET /_matrix/client/unstable/rooms/{roomId}/aggregations/{parentId}[/{relationType}[/{eventType}]]`
///
/// Groups the annotations of `parentId` by event type and key, most used
/// first. Any `relationType` other than `m.annotation` is rejected.
pub async fn get_aggregations_route(
    Authenticated(requester): Authenticated,
    State(services): State<Arc<Services>>,
    Path(path): Path<RelationsPath>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<PaginationChunk<AggregationGroup>>> {
    let room_id = RoomId::parse(&path.room_id)?;
    let parent_event_id = EventId::parse(&path.parent_id)?;
    let limit = parse_limit(query.limit.as_deref(), &services.config.relations)?;

    services
        .auth
        .require_membership_or_world_readable(&room_id, &requester.user_id)
        .await?;

    let relation_type = path.relation_type.map(RelationType::from);
    let event_type = path.event_type.map(EventType::from);

    let page = services
        .rooms
        .relations
        .paginate_aggregation_groups(
            &parent_event_id,
            relation_type.as_ref(),
            event_type.as_ref(),
            limit,
        )
        .await?;

    Ok(Json(page))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_must_be_a_json_object() {
        assert_eq!(parse_json_object(br#"{"a": 1}"#).unwrap().len(), 1);
        assert_eq!(
            parse_json_object(b"not json").unwrap_err().kind(),
            ErrorKind::NotJson
        );
        assert_eq!(parse_json_object(b"").unwrap_err().kind(), ErrorKind::NotJson);
        assert_eq!(parse_json_object(b"[1, 2]").unwrap_err().kind(), ErrorKind::BadJson);
        assert_eq!(parse_json_object(b"\"x\"").unwrap_err().kind(), ErrorKind::BadJson);
    }

    #[test]
    fn test_limit_parsing() {
        let relations = RelationsConfig::default();
        assert_eq!(parse_limit(None, &relations).unwrap(), 5);
        assert_eq!(parse_limit(Some("1"), &relations).unwrap(), 1);
        assert_eq!(parse_limit(Some("0"), &relations).unwrap(), 1);
        assert_eq!(parse_limit(Some("-3"), &relations).unwrap(), 1);
        assert_eq!(parse_limit(Some("500"), &relations).unwrap(), 100);
        assert_eq!(parse_limit(Some("99999999999"), &relations).unwrap(), 100);
        assert_eq!(
            parse_limit(Some("ten"), &relations).unwrap_err().kind(),
            ErrorKind::InvalidParam
        );
    }

    #[test]
    fn test_direction_parsing() {
        assert_eq!(parse_direction(None).unwrap(), Direction::Backward);
        assert_eq!(parse_direction(Some("f")).unwrap(), Direction::Forward);
        assert_eq!(parse_direction(Some("b")).unwrap(), Direction::Backward);
        assert_eq!(
            parse_direction(Some("sideways")).unwrap_err().kind(),
            ErrorKind::InvalidParam
        );
    }
}
