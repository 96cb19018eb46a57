//! Message entity

use crate::error::DatabaseError;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use wacast_core::entities::{MessageDirection, MessageKind, MessageRecord, MessageStatus};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "messages")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub organization_id: Uuid,
    pub conversation_id: Option<Uuid>,
    pub contact_id: Uuid,
    /// Provider-assigned id; the only key status callbacks carry
    pub provider_message_id: Option<String>,
    pub direction: String,
    pub kind: String,
    pub payload: Json,
    pub status: String,
    pub replied_to: Option<String>,
    pub campaign_id: Option<Uuid>,
    pub phone_number_used: String,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::conversation::Entity",
        from = "Column::ConversationId",
        to = "super::conversation::Column::Id"
    )]
    Conversation,
    #[sea_orm(
        belongs_to = "super::contact::Entity",
        from = "Column::ContactId",
        to = "super::contact::Column::Id"
    )]
    Contact,
    #[sea_orm(
        belongs_to = "super::campaign::Entity",
        from = "Column::CampaignId",
        to = "super::campaign::Column::Id"
    )]
    Campaign,
}

impl Related<super::conversation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Conversation.def()
    }
}

impl Related<super::contact::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Contact.def()
    }
}

impl Related<super::campaign::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Campaign.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn status_enum(&self) -> Option<MessageStatus> {
        MessageStatus::parse(&self.status)
    }
}

impl TryFrom<Model> for MessageRecord {
    type Error = DatabaseError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        let direction = MessageDirection::parse(&model.direction).ok_or_else(|| {
            DatabaseError::InvalidValue(format!("message direction {}", model.direction))
        })?;
        let kind = MessageKind::parse(&model.kind)
            .ok_or_else(|| DatabaseError::InvalidValue(format!("message kind {}", model.kind)))?;
        let status = MessageStatus::parse(&model.status).ok_or_else(|| {
            DatabaseError::InvalidValue(format!("message status {}", model.status))
        })?;

        Ok(MessageRecord {
            id: model.id,
            organization_id: model.organization_id,
            conversation_id: model.conversation_id,
            contact_id: model.contact_id,
            provider_message_id: model.provider_message_id,
            direction,
            kind,
            payload: model.payload,
            status,
            replied_to: model.replied_to,
            campaign_id: model.campaign_id,
            phone_number_used: model.phone_number_used,
            created_at: model.created_at,
        })
    }
}
