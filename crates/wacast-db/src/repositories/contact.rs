//! Contact repository

use crate::entities::contact;
use crate::error::{DatabaseError, Result};
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use uuid::Uuid;
use wacast_core::entities::{ContactRecord, ContactStatus};

pub struct ContactRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> ContactRepository<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    /// Create or return the contact for (organization, phone).
    ///
    /// Concurrent callers race through an insert-on-conflict-do-nothing; the
    /// unique index makes the existing row win and everyone re-reads it.
    /// The name is only written when the stored one is empty.
    pub async fn upsert(
        &self,
        organization_id: Uuid,
        phone: &str,
        name: Option<&str>,
    ) -> Result<ContactRecord> {
        let now = chrono::Utc::now();
        let model = contact::ActiveModel {
            id: Set(Uuid::new_v4()),
            organization_id: Set(organization_id),
            phone: Set(phone.to_string()),
            name: Set(name.unwrap_or_default().to_string()),
            attributes: Set(serde_json::json!({})),
            status: Set(ContactStatus::Active.as_str().to_string()),
            created_at: Set(now),
            updated_at: Set(now),
        };

        contact::Entity::insert(model)
            .on_conflict(
                OnConflict::columns([contact::Column::OrganizationId, contact::Column::Phone])
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(self.db)
            .await?;

        let existing = self
            .find_by_phone(organization_id, phone)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("contact {phone}")))?;

        if existing.name.is_empty() {
            if let Some(name) = name.filter(|n| !n.is_empty()) {
                let mut active: contact::ActiveModel = contact::Entity::find_by_id(existing.id)
                    .one(self.db)
                    .await?
                    .ok_or_else(|| DatabaseError::NotFound(format!("contact {phone}")))?
                    .into();
                active.name = Set(name.to_string());
                active.updated_at = Set(chrono::Utc::now());
                let updated = active.update(self.db).await?;
                return ContactRecord::try_from(updated);
            }
        }

        Ok(existing)
    }

    pub async fn find_by_phone(
        &self,
        organization_id: Uuid,
        phone: &str,
    ) -> Result<Option<ContactRecord>> {
        let model = contact::Entity::find()
            .filter(contact::Column::OrganizationId.eq(organization_id))
            .filter(contact::Column::Phone.eq(phone))
            .one(self.db)
            .await?;

        model.map(ContactRecord::try_from).transpose()
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<ContactRecord>> {
        let model = contact::Entity::find_by_id(id).one(self.db).await?;
        model.map(ContactRecord::try_from).transpose()
    }
}
