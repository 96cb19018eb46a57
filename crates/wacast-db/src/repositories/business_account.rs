//! Business account repository

use crate::entities::business_account;
use crate::error::Result;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use uuid::Uuid;
use wacast_core::entities::BusinessAccountRecord;

pub struct BusinessAccountRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> BusinessAccountRepository<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    /// Look a tenant up by the provider-assigned account id
    pub async fn find_by_account_id(
        &self,
        account_id: &str,
    ) -> Result<Option<BusinessAccountRecord>> {
        let model = business_account::Entity::find()
            .filter(business_account::Column::AccountId.eq(account_id))
            .one(self.db)
            .await?;

        Ok(model.map(BusinessAccountRecord::from))
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<BusinessAccountRecord>> {
        let model = business_account::Entity::find_by_id(id).one(self.db).await?;
        Ok(model.map(BusinessAccountRecord::from))
    }
}
