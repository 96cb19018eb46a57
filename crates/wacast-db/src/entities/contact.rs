//! Contact entity

use crate::error::DatabaseError;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use wacast_core::entities::{ContactRecord, ContactStatus};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "contacts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub organization_id: Uuid,
    /// E.164, digits only; unique together with the organization
    pub phone: String,
    pub name: String,
    pub attributes: Json,
    pub status: String,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::organization::Entity",
        from = "Column::OrganizationId",
        to = "super::organization::Column::Id"
    )]
    Organization,
    #[sea_orm(has_many = "super::contact_list_membership::Entity")]
    Memberships,
    #[sea_orm(has_many = "super::conversation::Entity")]
    Conversations,
    #[sea_orm(has_many = "super::message::Entity")]
    Messages,
}

impl Related<super::organization::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Organization.def()
    }
}

impl Related<super::contact_list_membership::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Memberships.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<Model> for ContactRecord {
    type Error = DatabaseError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        let status = ContactStatus::parse(&model.status).ok_or_else(|| {
            DatabaseError::InvalidValue(format!("contact status {}", model.status))
        })?;
        Ok(ContactRecord {
            id: model.id,
            organization_id: model.organization_id,
            phone: model.phone,
            name: model.name,
            attributes: model.attributes,
            status,
        })
    }
}
