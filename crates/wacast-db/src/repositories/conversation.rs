//! Conversation repository

use crate::entities::conversation;
use crate::error::{is_unique_violation, DatabaseError, Result};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use uuid::Uuid;
use wacast_core::entities::{ConversationRecord, ConversationStatus, InitiatedBy};

pub struct ConversationRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> ConversationRepository<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    /// The unique Active conversation of a contact, if any
    pub async fn find_active(
        &self,
        organization_id: Uuid,
        contact_id: Uuid,
    ) -> Result<Option<ConversationRecord>> {
        let model = conversation::Entity::find()
            .filter(conversation::Column::OrganizationId.eq(organization_id))
            .filter(conversation::Column::ContactId.eq(contact_id))
            .filter(conversation::Column::Status.eq(ConversationStatus::Active.as_str()))
            .one(self.db)
            .await?;

        model.map(ConversationRecord::try_from).transpose()
    }

    /// Create an Active conversation. A concurrent creator hitting the
    /// partial unique index wins the race; we then return its row.
    pub async fn create_active(
        &self,
        organization_id: Uuid,
        contact_id: Uuid,
        phone_number_used: &str,
        initiated_by: InitiatedBy,
        initiated_by_campaign_id: Option<Uuid>,
    ) -> Result<(ConversationRecord, bool)> {
        let now = chrono::Utc::now();
        let model = conversation::ActiveModel {
            id: Set(Uuid::new_v4()),
            organization_id: Set(organization_id),
            contact_id: Set(contact_id),
            phone_number_used: Set(phone_number_used.to_string()),
            initiated_by: Set(initiated_by.as_str().to_string()),
            initiated_by_campaign_id: Set(initiated_by_campaign_id),
            status: Set(ConversationStatus::Active.as_str().to_string()),
            created_at: Set(now),
            updated_at: Set(now),
        };

        match model.insert(self.db).await {
            Ok(inserted) => Ok((ConversationRecord::try_from(inserted)?, true)),
            Err(err) if is_unique_violation(&err) => {
                let existing = self
                    .find_active(organization_id, contact_id)
                    .await?
                    .ok_or_else(|| {
                        DatabaseError::NotFound(format!(
                            "active conversation for contact {contact_id}"
                        ))
                    })?;
                Ok((existing, false))
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<ConversationRecord>> {
        let model = conversation::Entity::find_by_id(id).one(self.db).await?;
        model.map(ConversationRecord::try_from).transpose()
    }
}
