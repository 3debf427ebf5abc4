use async_trait::async_trait;
use matrixon_common::{MatrixonError, Result};
use matrixon_db::Database;
use ruma::{RoomId, UserId};
use tracing::debug;

use crate::service::auth::RoomAccess;

#[async_trait]
impl RoomAccess for Database {
    async fn require_membership_or_world_readable(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
    ) -> Result<()> {
        if self.membership(room_id, user_id).await?.as_deref() == Some("join") {
            return Ok(());
        }

        if self.history_visibility(room_id).await?.as_deref() == Some("world_readable") {
            debug!("{} reads world readable {}", user_id, room_id);
            return Ok(());
        }

        Err(MatrixonError::Forbidden(format!(
            "User {user_id} is not in room {room_id}"
        )))
    }
}
