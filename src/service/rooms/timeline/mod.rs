//! Local event creation
//!
//! Assigns event ids, applies the minimal local auth rule and hands events to
//! storage. Transaction ids make retried sends idempotent per sender.

use std::{sync::Arc, time::Instant};

use async_trait::async_trait;
use matrixon_common::{MatrixonError, Result};
use matrixon_db::{EventDescriptor, PersistedEvent};
use ruma::{EventId, OwnedEventId, OwnedServerName, OwnedTransactionId, RoomId, TransactionId, UserId};
use tracing::{debug, info, instrument, warn};

use crate::{service::auth::Requester, utils};

const EVENT_ID_LENGTH: usize = 18;

#[async_trait]
pub trait Data: Send + Sync {
    async fn persist_event(
        &self,
        event_id: OwnedEventId,
        event: EventDescriptor,
        txn_id: Option<&TransactionId>,
    ) -> Result<PersistedEvent>;

    async fn event_for_txn(
        &self,
        user_id: &UserId,
        txn_id: &TransactionId,
    ) -> Result<Option<PersistedEvent>>;

    async fn membership(&self, room_id: &RoomId, user_id: &UserId) -> Result<Option<String>>;
}

/// Creates and persists events on behalf of a user
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventCreator: Send + Sync {
    async fn create_and_send_event(
        &self,
        requester: &Requester,
        event: EventDescriptor,
        txn_id: Option<OwnedTransactionId>,
    ) -> Result<PersistedEvent>;
}

pub struct Service {
    pub db: Arc<dyn Data>,
    pub server_name: OwnedServerName,
}

impl Service {
    fn generate_event_id(&self) -> Result<OwnedEventId> {
        let event_id = format!(
            "${}:{}",
            utils::random_string(EVENT_ID_LENGTH),
            self.server_name
        );
        Ok(EventId::parse(event_id)?)
    }

    /// Users may always join; everything else needs a joined sender.
    async fn check_local_auth(&self, event: &EventDescriptor) -> Result<()> {
        let own_join = event.event_type.is_membership()
            && event.state_key.as_deref() == Some(event.sender.as_str())
            && event.content.get("membership").and_then(|m| m.as_str()) == Some("join");
        if own_join {
            return Ok(());
        }

        let membership = self.db.membership(&event.room_id, &event.sender).await?;
        if membership.as_deref() == Some("join") {
            Ok(())
        } else {
            warn!(
                "⚠️ {} tried to send {} into {} without being joined",
                event.sender, event.event_type, event.room_id
            );
            Err(MatrixonError::Forbidden(
                "You are not joined to this room.".to_owned(),
            ))
        }
    }
}

#[async_trait]
impl EventCreator for Service {
    #[instrument(skip(self, event), fields(room_id = %event.room_id, event_type = %event.event_type))]
    async fn create_and_send_event(
        &self,
        requester: &Requester,
        mut event: EventDescriptor,
        txn_id: Option<OwnedTransactionId>,
    ) -> Result<PersistedEvent> {
        let start = Instant::now();
        debug!("🔧 Creating {} event for {}", event.event_type, requester.user_id);

        event.sender = requester.user_id.clone();

        if let Some(txn_id) = txn_id.as_deref() {
            if let Some(existing) = self.db.event_for_txn(&requester.user_id, txn_id).await? {
                debug!("Transaction {} already sent as {}", txn_id, existing.event_id);
                return Ok(existing);
            }
        }

        self.check_local_auth(&event).await?;

        let event_id = self.generate_event_id()?;
        let persisted = self
            .db
            .persist_event(event_id, event, txn_id.as_deref())
            .await?;

        info!(
            "✅ Sent {} event {} in {:?}",
            persisted.event_type,
            persisted.event_id,
            start.elapsed()
        );
        Ok(persisted)
    }
}
