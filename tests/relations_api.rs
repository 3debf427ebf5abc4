//! Integration tests for the relations client API
//!
//! Every test builds its own router over a fresh in-memory database, joins
//! `@alice` to `!room:example.com` and drives requests through
//! `tower::ServiceExt::oneshot`.

use std::{net::Ipv4Addr, sync::Arc};

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use matrixon_common::EventType;
use matrixon_db::{Database, DatabaseConfig, EventDescriptor};
use matrixon_relations::{
    api,
    config::{AccessTokenConfig, MetricsConfig, RelationsConfig},
    service::{auth::Requester, rooms::timeline::EventCreator},
    Config, Services,
};
use ruma::{room_id, server_name, user_id, OwnedUserId};
use serde_json::{json, Value};
use tower::ServiceExt;

const ALICE_TOKEN: &str = "alice_token";
const BOB_TOKEN: &str = "bob_token";
const ROOM: &str = "!room:example.com";
const PARENT: &str = "$parent:example.com";

fn test_config() -> Config {
    Config {
        server_name: server_name!("example.com").to_owned(),
        address: Ipv4Addr::LOCALHOST.into(),
        port: 0,
        log: "warn".to_owned(),
        max_request_size: 1024 * 1024,
        database: DatabaseConfig::in_memory(),
        relations: RelationsConfig::default(),
        access_tokens: vec![
            AccessTokenConfig {
                user_id: user_id!("@alice:example.com").to_owned(),
                token: ALICE_TOKEN.to_owned(),
            },
            AccessTokenConfig {
                user_id: user_id!("@bob:example.com").to_owned(),
                token: BOB_TOKEN.to_owned(),
            },
        ],
        metrics: MetricsConfig::default(),
    }
}

struct TestServer {
    app: Router,
    services: Arc<Services>,
}

impl TestServer {
    async fn new() -> Self {
        let db = Arc::new(Database::open_in_memory().await.unwrap());
        let services = Services::build(db, test_config());
        let app = api::router(services.clone());
        let server = Self { app, services };
        server.join(user_id!("@alice:example.com").to_owned()).await;
        server
    }

    async fn send_state(&self, sender: OwnedUserId, event_type: &str, state_key: &str, content: Value) {
        self.services
            .rooms
            .timeline
            .create_and_send_event(
                &Requester::new(sender.clone()),
                EventDescriptor {
                    event_type: EventType::from(event_type),
                    content: content.as_object().cloned().unwrap(),
                    room_id: room_id!("!room:example.com").to_owned(),
                    sender,
                    state_key: Some(state_key.to_owned()),
                },
                None,
            )
            .await
            .unwrap();
    }

    async fn join(&self, user_id: OwnedUserId) {
        let state_key = user_id.to_string();
        self.send_state(user_id, EventType::ROOM_MEMBER, &state_key, json!({"membership": "join"}))
            .await;
    }

    async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let body = match body {
            Some(body) => Body::from(body.to_owned()),
            None => Body::empty(),
        };

        let response = self
            .app
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    async fn send_relation(&self, relation_type: &str, event_type: &str, key: Option<&str>) -> String {
        let mut uri = format!(
            "/_matrix/client/unstable/rooms/{ROOM}/send_relation/{PARENT}/{relation_type}/{event_type}"
        );
        if let Some(key) = key {
            uri.push_str(&format!("?key={key}"));
        }
        let (status, body) = self
            .request(Method::POST, &uri, Some(ALICE_TOKEN), Some("{}"))
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["event_id"].as_str().unwrap().to_owned()
    }

    async fn get(&self, path: &str, token: &str) -> (StatusCode, Value) {
        let uri = format!("/_matrix/client/unstable/rooms/{ROOM}/{path}");
        self.request(Method::GET, &uri, Some(token), None).await
    }
}

#[tokio::test]
async fn test_send_relation_returns_event_id() {
    let server = TestServer::new().await;

    let event_id = server
        .send_relation("m.annotation", "m.reaction", Some("a"))
        .await;

    assert!(event_id.starts_with('$'));
    assert!(event_id.ends_with(":example.com"));
}

#[tokio::test]
async fn test_pagination_limit_returns_latest_relation() {
    let server = TestServer::new().await;
    server.send_relation("m.annotation", "m.reaction", Some("a")).await;
    let second = server.send_relation("m.annotation", "m.reaction", Some("b")).await;

    let (status, body) = server
        .get(&format!("relations/{PARENT}?limit=1"), ALICE_TOKEN)
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "chunk": [{"event_id": second}],
            "limited": true,
            "next_batch": null,
            "prev_batch": null
        })
    );
}

#[tokio::test]
async fn test_relations_direction_and_filters() {
    let server = TestServer::new().await;
    let first = server.send_relation("m.annotation", "m.reaction", Some("a")).await;
    let second = server.send_relation("m.reference", "m.room.message", None).await;

    let (_, body) = server
        .get(&format!("relations/{PARENT}?dir=f"), ALICE_TOKEN)
        .await;
    assert_eq!(body["chunk"], json!([{"event_id": first}, {"event_id": second}]));
    assert_eq!(body["limited"], json!(false));

    let (_, body) = server
        .get(&format!("relations/{PARENT}/m.reference"), ALICE_TOKEN)
        .await;
    assert_eq!(body["chunk"], json!([{"event_id": second}]));

    let (_, body) = server
        .get(&format!("relations/{PARENT}/m.annotation/m.room.message"), ALICE_TOKEN)
        .await;
    assert_eq!(body["chunk"], json!([]));
}

#[tokio::test]
async fn test_aggregation_groups_by_key() {
    let server = TestServer::new().await;
    server.send_relation("m.annotation", "m.reaction", Some("a")).await;
    server.send_relation("m.annotation", "m.reaction", Some("a")).await;
    server.send_relation("m.annotation", "m.reaction", Some("b")).await;

    let (status, body) = server
        .get(&format!("aggregations/{PARENT}"), ALICE_TOKEN)
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "chunk": [
                {"type": "m.reaction", "key": "a", "count": 2},
                {"type": "m.reaction", "key": "b", "count": 1}
            ],
            "limited": false,
            "next_batch": null,
            "prev_batch": null
        })
    );
}

#[tokio::test]
async fn test_aggregation_rejects_non_annotation_types() {
    let server = TestServer::new().await;
    server.send_relation("m.annotation", "m.reaction", Some("a")).await;

    for path in [
        format!("aggregations/{PARENT}/m.replaces"),
        format!("aggregations/{PARENT}/m.replaces/m.room.message?limit=3"),
        format!("aggregations/{PARENT}/m.reference"),
    ] {
        let (status, body) = server.get(&path, ALICE_TOKEN).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{path}");
        assert_eq!(body["errcode"], json!("M_UNKNOWN"));
    }

    let (status, _) = server
        .get(&format!("aggregations/{PARENT}/m.annotation/m.reaction"), ALICE_TOKEN)
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_member_events_cannot_be_sent_as_relations() {
    let server = TestServer::new().await;
    let uri = format!(
        "/_matrix/client/unstable/rooms/{ROOM}/send_relation/{PARENT}/m.annotation/m.room.member"
    );

    let (status, body) = server
        .request(Method::POST, &uri, Some(ALICE_TOKEN), Some(r#"{"membership": "join"}"#))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errcode"], json!("M_UNKNOWN"));

    let (_, body) = server.get(&format!("relations/{PARENT}"), ALICE_TOKEN).await;
    assert_eq!(body["chunk"], json!([]));
}

#[tokio::test]
async fn test_put_with_same_txn_id_is_idempotent() {
    let server = TestServer::new().await;
    let uri = format!(
        "/_matrix/client/unstable/rooms/{ROOM}/send_relation/{PARENT}/m.annotation/m.reaction/txn1?key=a"
    );

    let (status, first) = server
        .request(Method::PUT, &uri, Some(ALICE_TOKEN), Some("{}"))
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, second) = server
        .request(Method::PUT, &uri, Some(ALICE_TOKEN), Some("{}"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["event_id"], second["event_id"]);

    let (_, body) = server.get(&format!("aggregations/{PARENT}"), ALICE_TOKEN).await;
    assert_eq!(body["chunk"], json!([{"type": "m.reaction", "key": "a", "count": 1}]));
}

#[tokio::test]
async fn test_txn_id_route_only_accepts_put() {
    let server = TestServer::new().await;
    let uri = format!(
        "/_matrix/client/unstable/rooms/{ROOM}/send_relation/{PARENT}/m.annotation/m.reaction/txn1?key=a"
    );

    let (status, _) = server
        .request(Method::POST, &uri, Some(ALICE_TOKEN), Some("{}"))
        .await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

    let (_, body) = server.get(&format!("aggregations/{PARENT}"), ALICE_TOKEN).await;
    assert_eq!(body["chunk"], json!([]));
}

#[tokio::test]
async fn test_authentication_errors() {
    let server = TestServer::new().await;
    let uri = format!("/_matrix/client/unstable/rooms/{ROOM}/relations/{PARENT}");

    let (status, body) = server.request(Method::GET, &uri, None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["errcode"], json!("M_MISSING_TOKEN"));

    let (status, body) = server.request(Method::GET, &uri, Some("wrong"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["errcode"], json!("M_UNKNOWN_TOKEN"));

    let (status, _) = server
        .request(
            Method::GET,
            &format!("{uri}?access_token={ALICE_TOKEN}"),
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_non_members_need_world_readable_rooms() {
    let server = TestServer::new().await;
    server.send_relation("m.annotation", "m.reaction", Some("a")).await;

    for path in [format!("relations/{PARENT}"), format!("aggregations/{PARENT}")] {
        let (status, body) = server.get(&path, BOB_TOKEN).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["errcode"], json!("M_FORBIDDEN"));
    }

    server
        .send_state(
            user_id!("@alice:example.com").to_owned(),
            EventType::ROOM_HISTORY_VISIBILITY,
            "",
            json!({"history_visibility": "world_readable"}),
        )
        .await;

    let (status, body) = server.get(&format!("aggregations/{PARENT}"), BOB_TOKEN).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["chunk"][0]["count"], json!(1));
}

#[tokio::test]
async fn test_non_members_cannot_send_relations() {
    let server = TestServer::new().await;
    let uri = format!(
        "/_matrix/client/unstable/rooms/{ROOM}/send_relation/{PARENT}/m.annotation/m.reaction?key=a"
    );

    let (status, body) = server
        .request(Method::POST, &uri, Some(BOB_TOKEN), Some("{}"))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["errcode"], json!("M_FORBIDDEN"));
}

#[tokio::test]
async fn test_request_validation() {
    let server = TestServer::new().await;
    let send_uri = format!(
        "/_matrix/client/unstable/rooms/{ROOM}/send_relation/{PARENT}/m.annotation/m.reaction"
    );

    let (status, body) = server
        .request(Method::POST, &send_uri, Some(ALICE_TOKEN), Some("not json"))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errcode"], json!("M_NOT_JSON"));

    let (status, body) = server
        .request(Method::POST, &send_uri, Some(ALICE_TOKEN), Some("[1, 2]"))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errcode"], json!("M_BAD_JSON"));

    let (status, body) = server
        .get(&format!("relations/{PARENT}?limit=lots"), ALICE_TOKEN)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errcode"], json!("M_INVALID_PARAM"));

    let (status, body) = server
        .get(&format!("relations/{PARENT}?dir=up"), ALICE_TOKEN)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errcode"], json!("M_INVALID_PARAM"));

    let (status, body) = server
        .request(
            Method::GET,
            "/_matrix/client/unstable/rooms/not_a_room/relations/$parent:example.com",
            Some(ALICE_TOKEN),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errcode"], json!("M_INVALID_PARAM"));
}

#[tokio::test]
async fn test_relations_for_parent_without_children() {
    let server = TestServer::new().await;

    let (status, body) = server.get(&format!("relations/{PARENT}"), ALICE_TOKEN).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"chunk": [], "limited": false, "next_batch": null, "prev_batch": null})
    );
}
