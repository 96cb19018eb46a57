//! Campaign repository

use crate::entities::{campaign, campaign_list, contact, contact_list_membership};
use crate::error::{DatabaseError, Result};
use sea_orm::sea_query::{Expr, Query};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, JoinType, QueryFilter,
    QueryOrder, QuerySelect, RelationTrait, Set,
};
use uuid::Uuid;
use wacast_core::entities::{CampaignRecord, CampaignStatus, ContactRecord};

pub struct CampaignRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> CampaignRepository<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<CampaignRecord>> {
        let model = campaign::Entity::find_by_id(id).one(self.db).await?;
        model.map(CampaignRecord::try_from).transpose()
    }

    pub async fn list_with_status(&self, status: CampaignStatus) -> Result<Vec<CampaignRecord>> {
        let models = campaign::Entity::find()
            .filter(campaign::Column::Status.eq(status.as_str()))
            .order_by_asc(campaign::Column::CreatedAt)
            .all(self.db)
            .await?;

        models.into_iter().map(CampaignRecord::try_from).collect()
    }

    /// Persist a lifecycle transition after validating it against the state
    /// machine; repeating the current state is a no-op.
    pub async fn update_status(&self, id: Uuid, status: CampaignStatus) -> Result<()> {
        let model = campaign::Entity::find_by_id(id)
            .one(self.db)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("campaign {id}")))?;

        let current = model
            .status_enum()
            .ok_or_else(|| DatabaseError::InvalidValue(format!("campaign status {}", model.status)))?;

        if current == status {
            return Ok(());
        }
        if !current.can_transition_to(status) {
            return Err(DatabaseError::ConstraintViolation(format!(
                "campaign {id} cannot move {} -> {}",
                current.as_str(),
                status.as_str()
            )));
        }

        let mut active: campaign::ActiveModel = model.into();
        active.status = Set(status.as_str().to_string());
        active.updated_at = Set(chrono::Utc::now());
        active.update(self.db).await?;
        Ok(())
    }

    /// Add to the persistent counters without read-modify-write
    pub async fn increment_counters(&self, id: Uuid, sent: i64, errored: i64) -> Result<()> {
        campaign::Entity::update_many()
            .col_expr(
                campaign::Column::SentCount,
                Expr::col(campaign::Column::SentCount).add(sent),
            )
            .col_expr(
                campaign::Column::ErrorCount,
                Expr::col(campaign::Column::ErrorCount).add(errored),
            )
            .col_expr(
                campaign::Column::UpdatedAt,
                Expr::value(chrono::Utc::now()),
            )
            .filter(campaign::Column::Id.eq(id))
            .exec(self.db)
            .await?;
        Ok(())
    }

    /// Persist the resume cursor. Concurrent sends complete out of order, so
    /// the cursor only ever advances; a lagging writer is a no-op.
    pub async fn set_last_contact(&self, id: Uuid, contact_id: Uuid) -> Result<()> {
        campaign::Entity::update_many()
            .col_expr(
                campaign::Column::LastContactId,
                Expr::value(contact_id),
            )
            .col_expr(
                campaign::Column::UpdatedAt,
                Expr::value(chrono::Utc::now()),
            )
            .filter(campaign::Column::Id.eq(id))
            .filter(
                campaign::Column::LastContactId
                    .is_null()
                    .or(campaign::Column::LastContactId.lt(contact_id)),
            )
            .exec(self.db)
            .await?;
        Ok(())
    }

    /// The next audience slice: contacts that belong to any of the
    /// campaign's lists, deduplicated, ordered by contact id ascending,
    /// strictly after the cursor.
    pub async fn next_contact_batch(
        &self,
        campaign_id: Uuid,
        after_contact_id: Option<Uuid>,
        batch_size: u64,
    ) -> Result<Vec<ContactRecord>> {
        let campaign_list_ids = Query::select()
            .column(campaign_list::Column::ContactListId)
            .from(campaign_list::Entity)
            .and_where(Expr::col(campaign_list::Column::CampaignId).eq(campaign_id))
            .to_owned();

        let mut query = contact::Entity::find()
            .join_rev(
                JoinType::InnerJoin,
                contact_list_membership::Relation::Contact.def(),
            )
            .filter(
                contact_list_membership::Column::ContactListId.in_subquery(campaign_list_ids),
            )
            .distinct()
            .order_by_asc(contact::Column::Id)
            .limit(batch_size);

        if let Some(after) = after_contact_id {
            query = query.filter(contact::Column::Id.gt(after));
        }

        let models = query.all(self.db).await?;
        models.into_iter().map(ContactRecord::try_from).collect()
    }
}
