//! Message repository

use crate::entities::message;
use crate::error::Result;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use uuid::Uuid;
use wacast_core::entities::{MessageDirection, MessageRecord, MessageStatus, NewMessage};

pub struct MessageRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> MessageRepository<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn insert(&self, new_message: NewMessage) -> Result<MessageRecord> {
        let model = message::ActiveModel {
            id: Set(Uuid::new_v4()),
            organization_id: Set(new_message.organization_id),
            conversation_id: Set(new_message.conversation_id),
            contact_id: Set(new_message.contact_id),
            provider_message_id: Set(new_message.provider_message_id),
            direction: Set(new_message.direction.as_str().to_string()),
            kind: Set(new_message.kind.as_str().to_string()),
            payload: Set(new_message.payload),
            status: Set(new_message.status.as_str().to_string()),
            replied_to: Set(new_message.replied_to),
            campaign_id: Set(new_message.campaign_id),
            phone_number_used: Set(new_message.phone_number_used),
            created_at: Set(new_message.created_at),
            updated_at: Set(chrono::Utc::now()),
        };

        let inserted = model.insert(self.db).await?;
        MessageRecord::try_from(inserted)
    }

    pub async fn find_by_provider_id(
        &self,
        provider_message_id: &str,
    ) -> Result<Option<MessageRecord>> {
        let model = message::Entity::find()
            .filter(message::Column::ProviderMessageId.eq(provider_message_id))
            .one(self.db)
            .await?;

        model.map(MessageRecord::try_from).transpose()
    }

    /// Advance the status of the message with this provider id.
    ///
    /// Unknown ids return None. Backward transitions are ignored and the
    /// stored record is returned unchanged, so late or duplicated callbacks
    /// cannot regress a message.
    pub async fn update_status_by_provider_id(
        &self,
        provider_message_id: &str,
        status: MessageStatus,
    ) -> Result<Option<MessageRecord>> {
        let Some(model) = message::Entity::find()
            .filter(message::Column::ProviderMessageId.eq(provider_message_id))
            .one(self.db)
            .await?
        else {
            return Ok(None);
        };

        let current = model.status_enum();
        if !current.map_or(false, |c| c.can_advance_to(status)) {
            return Ok(Some(MessageRecord::try_from(model)?));
        }

        let mut active: message::ActiveModel = model.into();
        active.status = Set(status.as_str().to_string());
        active.updated_at = Set(chrono::Utc::now());
        let updated = active.update(self.db).await?;

        Ok(Some(MessageRecord::try_from(updated)?))
    }

    /// Flip all inbound Sent messages of a conversation to Read; returns the
    /// number of affected rows
    pub async fn mark_conversation_inbound_as_read(&self, conversation_id: Uuid) -> Result<u64> {
        let result = message::Entity::update_many()
            .col_expr(
                message::Column::Status,
                sea_orm::sea_query::Expr::value(MessageStatus::Read.as_str()),
            )
            .col_expr(
                message::Column::UpdatedAt,
                sea_orm::sea_query::Expr::value(chrono::Utc::now()),
            )
            .filter(message::Column::ConversationId.eq(conversation_id))
            .filter(message::Column::Direction.eq(MessageDirection::Inbound.as_str()))
            .filter(message::Column::Status.eq(MessageStatus::Sent.as_str()))
            .exec(self.db)
            .await?;

        Ok(result.rows_affected)
    }

    /// The contact's newest outbound message; conversation attribution
    /// checks it for a campaign reference
    pub async fn latest_outbound_for_contact(
        &self,
        organization_id: Uuid,
        contact_id: Uuid,
    ) -> Result<Option<MessageRecord>> {
        let model = message::Entity::find()
            .filter(message::Column::OrganizationId.eq(organization_id))
            .filter(message::Column::ContactId.eq(contact_id))
            .filter(message::Column::Direction.eq(MessageDirection::Outbound.as_str()))
            .order_by_desc(message::Column::CreatedAt)
            .one(self.db)
            .await?;

        model.map(MessageRecord::try_from).transpose()
    }
}
