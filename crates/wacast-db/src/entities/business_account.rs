//! Business account entity
//!
//! A tenant's credentials with the upstream provider. `account_id` is the
//! provider-assigned id webhook payloads are keyed by.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use wacast_core::entities::BusinessAccountRecord;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "business_accounts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub account_id: String,
    pub access_token: String,
    pub webhook_secret: String,
    pub organization_id: Uuid,
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
}

impl Related<super::organization::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Organization.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for BusinessAccountRecord {
    fn from(model: Model) -> Self {
        BusinessAccountRecord {
            id: model.id,
            account_id: model.account_id,
            access_token: model.access_token,
            webhook_secret: model.webhook_secret,
            organization_id: model.organization_id,
        }
    }
}
