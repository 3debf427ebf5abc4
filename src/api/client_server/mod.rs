mod relations;

use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};

pub use relations::*;

use crate::service::Services;

pub const UNSTABLE_PREFIX: &str = "/_matrix/client/unstable";

pub fn routes() -> Router<Arc<Services>> {
    Router::new()
        .route(
            "/rooms/:room_id/send_relation/:parent_id/:relation_type/:event_type",
            post(send_relation_route),
        )
        .route(
            "/rooms/:room_id/send_relation/:parent_id/:relation_type/:event_type/:txn_id",
            put(send_relation_route),
        )
        .route("/rooms/:room_id/relations/:parent_id", get(get_relations_route))
        .route(
            "/rooms/:room_id/relations/:parent_id/:relation_type",
            get(get_relations_route),
        )
        .route(
            "/rooms/:room_id/relations/:parent_id/:relation_type/:event_type",
            get(get_relations_route),
        )
        .route(
            "/rooms/:room_id/aggregations/:parent_id",
            get(get_aggregations_route),
        )
        .route(
            "/rooms/:room_id/aggregations/:parent_id/:relation_type",
            get(get_aggregations_route),
        )
        .route(
            "/rooms/:room_id/aggregations/:parent_id/:relation_type/:event_type",
            get(get_aggregations_route),
        )
}
