//! HTTP surface

pub mod client_server;

use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequestParts, Query},
    http::{header::AUTHORIZATION, request::Parts},
    Router,
};
use matrixon_common::MatrixonError;
use serde::Deserialize;

use crate::service::{auth::Requester, Services};

/// The user a request was authenticated as.
///
/// The access token is read from `Authorization: Bearer` first and from the
/// `access_token` query parameter otherwise.
pub struct Authenticated(pub Requester);

#[derive(Deserialize)]
struct AccessTokenQuery {
    access_token: Option<String>,
}

fn access_token(parts: &Parts) -> Option<String> {
    let bearer = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_owned());
    if bearer.is_some() {
        return bearer;
    }

    Query::<AccessTokenQuery>::try_from_uri(&parts.uri)
        .ok()
        .and_then(|Query(query)| query.access_token)
}

#[async_trait]
impl FromRequestParts<Arc<Services>> for Authenticated {
    type Rejection = MatrixonError;

    async fn from_request_parts(
        parts: &mut Parts,
        services: &Arc<Services>,
    ) -> Result<Self, Self::Rejection> {
        let token = access_token(parts);
        services
            .auth
            .authenticate(token.as_deref())
            .await
            .map(Self)
    }
}

/// All routes served by this process
pub fn router(services: Arc<Services>) -> Router {
    Router::new()
        .nest(client_server::UNSTABLE_PREFIX, client_server::routes())
        .with_state(services)
}
