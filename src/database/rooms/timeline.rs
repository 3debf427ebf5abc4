use async_trait::async_trait;
use matrixon_common::Result;
use matrixon_db::{Database, EventDescriptor, PersistedEvent};
use ruma::{OwnedEventId, RoomId, TransactionId, UserId};

use crate::service;

#[async_trait]
impl service::rooms::timeline::Data for Database {
    async fn persist_event(
        &self,
        event_id: OwnedEventId,
        event: EventDescriptor,
        txn_id: Option<&TransactionId>,
    ) -> Result<PersistedEvent> {
        Database::persist_event(self, event_id, event, txn_id).await
    }

    async fn event_for_txn(
        &self,
        user_id: &UserId,
        txn_id: &TransactionId,
    ) -> Result<Option<PersistedEvent>> {
        match self.event_id_for_txn(user_id, txn_id).await? {
            Some(event_id) => self.get_event(&event_id).await,
            None => Ok(None),
        }
    }

    async fn membership(&self, room_id: &RoomId, user_id: &UserId) -> Result<Option<String>> {
        Database::membership(self, room_id, user_id).await
    }
}
