//! Postgres implementation of the core store trait
//!
//! Stitches the repositories into the narrow interface the campaign engine
//! and the webhook pipeline consume.

use crate::repositories::{
    BusinessAccountRepository, CampaignRepository, ContactRepository, ConversationRepository,
    MessageRepository,
};
use async_trait::async_trait;
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use uuid::Uuid;
use wacast_core::entities::{
    BusinessAccountRecord, CampaignRecord, CampaignStatus, ContactRecord, ConversationRecord,
    InitiatedBy, MessageRecord, MessageStatus, NewMessage,
};
use wacast_core::errors::CoreResult;
use wacast_core::store::MessageStore;

/// The database-backed [`MessageStore`]
#[derive(Clone)]
pub struct PgMessageStore {
    db: Arc<DatabaseConnection>,
}

impl PgMessageStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl MessageStore for PgMessageStore {
    async fn resolve_business_account(
        &self,
        account_id: &str,
    ) -> CoreResult<Option<BusinessAccountRecord>> {
        Ok(BusinessAccountRepository::new(&self.db)
            .find_by_account_id(account_id)
            .await?)
    }

    async fn fetch_business_account(&self, id: Uuid) -> CoreResult<Option<BusinessAccountRecord>> {
        Ok(BusinessAccountRepository::new(&self.db)
            .find_by_id(id)
            .await?)
    }

    async fn upsert_contact<'a>(
        &'a self,
        organization_id: Uuid,
        phone: &'a str,
        name: Option<&'a str>,
    ) -> CoreResult<ContactRecord> {
        Ok(ContactRepository::new(&self.db)
            .upsert(organization_id, phone, name)
            .await?)
    }

    async fn open_or_create_conversation(
        &self,
        organization_id: Uuid,
        contact_id: Uuid,
        phone_number_used: &str,
        initiated_by: InitiatedBy,
        initiated_by_campaign_id: Option<Uuid>,
    ) -> CoreResult<(ConversationRecord, bool)> {
        let conversations = ConversationRepository::new(&self.db);

        if let Some(active) = conversations
            .find_active(organization_id, contact_id)
            .await?
        {
            return Ok((active, false));
        }

        // A conversation opened by an inbound message inherits attribution
        // from the contact's most recent outbound message when that message
        // belonged to a campaign.
        let (initiated_by, initiated_by_campaign_id) =
            if initiated_by == InitiatedBy::Contact && initiated_by_campaign_id.is_none() {
                let last_outbound = MessageRepository::new(&self.db)
                    .latest_outbound_for_contact(organization_id, contact_id)
                    .await?;
                match last_outbound.and_then(|message| message.campaign_id) {
                    Some(campaign_id) => (InitiatedBy::Campaign, Some(campaign_id)),
                    None => (InitiatedBy::Contact, None),
                }
            } else {
                (initiated_by, initiated_by_campaign_id)
            };

        Ok(conversations
            .create_active(
                organization_id,
                contact_id,
                phone_number_used,
                initiated_by,
                initiated_by_campaign_id,
            )
            .await?)
    }

    async fn insert_message(&self, message: NewMessage) -> CoreResult<MessageRecord> {
        Ok(MessageRepository::new(&self.db).insert(message).await?)
    }

    async fn update_message_status_by_provider_id(
        &self,
        provider_message_id: &str,
        status: MessageStatus,
    ) -> CoreResult<Option<MessageRecord>> {
        Ok(MessageRepository::new(&self.db)
            .update_status_by_provider_id(provider_message_id, status)
            .await?)
    }

    async fn mark_conversation_inbound_as_read(&self, conversation_id: Uuid) -> CoreResult<u64> {
        Ok(MessageRepository::new(&self.db)
            .mark_conversation_inbound_as_read(conversation_id)
            .await?)
    }

    async fn next_campaign_contact_batch(
        &self,
        campaign_id: Uuid,
        after_contact_id: Option<Uuid>,
        batch_size: u64,
    ) -> CoreResult<Vec<ContactRecord>> {
        Ok(CampaignRepository::new(&self.db)
            .next_contact_batch(campaign_id, after_contact_id, batch_size)
            .await?)
    }

    async fn record_campaign_last_contact(
        &self,
        campaign_id: Uuid,
        contact_id: Uuid,
    ) -> CoreResult<()> {
        Ok(CampaignRepository::new(&self.db)
            .set_last_contact(campaign_id, contact_id)
            .await?)
    }

    async fn fetch_campaign(&self, campaign_id: Uuid) -> CoreResult<Option<CampaignRecord>> {
        Ok(CampaignRepository::new(&self.db)
            .find_by_id(campaign_id)
            .await?)
    }

    async fn list_campaigns_with_status(
        &self,
        status: CampaignStatus,
    ) -> CoreResult<Vec<CampaignRecord>> {
        Ok(CampaignRepository::new(&self.db)
            .list_with_status(status)
            .await?)
    }

    async fn update_campaign_status(
        &self,
        campaign_id: Uuid,
        status: CampaignStatus,
    ) -> CoreResult<()> {
        Ok(CampaignRepository::new(&self.db)
            .update_status(campaign_id, status)
            .await?)
    }

    async fn increment_campaign_counters(
        &self,
        campaign_id: Uuid,
        sent: i64,
        errored: i64,
    ) -> CoreResult<()> {
        Ok(CampaignRepository::new(&self.db)
            .increment_counters(campaign_id, sent, errored)
            .await?)
    }
}
