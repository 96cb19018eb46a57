//! Conversation entity

use crate::error::DatabaseError;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use wacast_core::entities::{ConversationRecord, ConversationStatus, InitiatedBy};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "conversations")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub organization_id: Uuid,
    pub contact_id: Uuid,
    pub phone_number_used: String,
    pub initiated_by: String,
    pub initiated_by_campaign_id: Option<Uuid>,
    /// At most one Active conversation per (organization, contact)
    pub status: String,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::contact::Entity",
        from = "Column::ContactId",
        to = "super::contact::Column::Id"
    )]
    Contact,
    #[sea_orm(
        belongs_to = "super::organization::Entity",
        from = "Column::OrganizationId",
        to = "super::organization::Column::Id"
    )]
    Organization,
    #[sea_orm(has_many = "super::message::Entity")]
    Messages,
}

impl Related<super::contact::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Contact.def()
    }
}

impl Related<super::message::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Messages.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn status_enum(&self) -> Option<ConversationStatus> {
        ConversationStatus::parse(&self.status)
    }
}

impl TryFrom<Model> for ConversationRecord {
    type Error = DatabaseError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        let status = ConversationStatus::parse(&model.status).ok_or_else(|| {
            DatabaseError::InvalidValue(format!("conversation status {}", model.status))
        })?;
        let initiated_by = InitiatedBy::parse(&model.initiated_by).ok_or_else(|| {
            DatabaseError::InvalidValue(format!("initiated_by {}", model.initiated_by))
        })?;

        Ok(ConversationRecord {
            id: model.id,
            organization_id: model.organization_id,
            contact_id: model.contact_id,
            phone_number_used: model.phone_number_used,
            initiated_by,
            initiated_by_campaign_id: model.initiated_by_campaign_id,
            status,
            created_at: model.created_at,
        })
    }
}
