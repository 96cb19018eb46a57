//! Campaign entity

use crate::error::DatabaseError;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use wacast_core::entities::{CampaignRecord, CampaignStatus, ParameterBinding};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "campaigns")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub organization_id: Uuid,
    pub business_account_id: Uuid,
    pub phone_number_to_use: String,
    /// Provider template id this campaign sends
    pub template_id: String,
    pub parameter_binding: Option<Json>,
    pub status: String,
    pub sent_count: i64,
    pub error_count: i64,
    pub last_contact_id: Option<Uuid>,
    pub scheduled_at: Option<DateTimeUtc>,
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
    #[sea_orm(
        belongs_to = "super::business_account::Entity",
        from = "Column::BusinessAccountId",
        to = "super::business_account::Column::Id"
    )]
    BusinessAccount,
    #[sea_orm(has_many = "super::campaign_list::Entity")]
    Lists,
}

impl Related<super::organization::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Organization.def()
    }
}

impl Related<super::business_account::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::BusinessAccount.def()
    }
}

impl Related<super::campaign_list::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Lists.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn status_enum(&self) -> Option<CampaignStatus> {
        CampaignStatus::parse(&self.status)
    }
}

impl TryFrom<Model> for CampaignRecord {
    type Error = DatabaseError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        let status = CampaignStatus::parse(&model.status).ok_or_else(|| {
            DatabaseError::InvalidValue(format!("campaign status {}", model.status))
        })?;

        let parameter_binding = model
            .parameter_binding
            .map(serde_json::from_value::<ParameterBinding>)
            .transpose()?;

        Ok(CampaignRecord {
            id: model.id,
            organization_id: model.organization_id,
            business_account_id: model.business_account_id,
            phone_number_to_use: model.phone_number_to_use,
            template_id: model.template_id,
            parameter_binding,
            status,
            sent_count: model.sent_count,
            error_count: model.error_count,
            last_contact_id: model.last_contact_id,
            scheduled_at: model.scheduled_at,
            created_at: model.created_at,
        })
    }
}
