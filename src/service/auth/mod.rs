//! Request authentication and room access checks

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use matrixon_common::{MatrixonError, Result};
use ruma::{OwnedUserId, RoomId, UserId};
use tracing::{debug, instrument, warn};

use crate::config::AccessTokenConfig;

/// The authenticated user a request acts for
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Requester {
    pub user_id: OwnedUserId,
}

impl Requester {
    pub fn new(user_id: OwnedUserId) -> Self {
        Self { user_id }
    }
}

/// Resolves access tokens to users
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, access_token: Option<&str>) -> Result<Requester>;
}

/// Decides whether a user may read relations in a room
#[async_trait]
pub trait RoomAccess: Send + Sync {
    /// Succeeds when `user_id` is joined to `room_id` or the room is world
    /// readable; fails with `M_FORBIDDEN` otherwise.
    async fn require_membership_or_world_readable(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
    ) -> Result<()>;
}

/// Authenticator backed by the `access_tokens` config list
pub struct TokenAuthenticator {
    tokens: HashMap<String, OwnedUserId>,
}

impl TokenAuthenticator {
    pub fn new(access_tokens: &[AccessTokenConfig]) -> Self {
        let tokens = access_tokens
            .iter()
            .map(|entry| (entry.token.clone(), entry.user_id.clone()))
            .collect();
        Self { tokens }
    }
}

#[async_trait]
impl Authenticator for TokenAuthenticator {
    async fn authenticate(&self, access_token: Option<&str>) -> Result<Requester> {
        let token = access_token.ok_or(MatrixonError::MissingToken)?;
        match self.tokens.get(token) {
            Some(user_id) => Ok(Requester::new(user_id.clone())),
            None => {
                warn!("⚠️ Rejected unknown access token");
                Err(MatrixonError::UnknownToken)
            }
        }
    }
}

pub struct Service {
    pub authenticator: Arc<dyn Authenticator>,
    pub room_access: Arc<dyn RoomAccess>,
}

impl Service {
    pub async fn authenticate(&self, access_token: Option<&str>) -> Result<Requester> {
        let requester = self.authenticator.authenticate(access_token).await?;
        debug!("Authenticated {}", requester.user_id);
        Ok(requester)
    }

    #[instrument(skip(self))]
    pub async fn require_membership_or_world_readable(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
    ) -> Result<()> {
        self.room_access
            .require_membership_or_world_readable(room_id, user_id)
            .await
    }
}
