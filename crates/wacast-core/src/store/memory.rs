//! In-memory store implementation
//!
//! Backs the engine and pipeline tests; not durable. Ordering and conflict
//! behavior intentionally match the database implementation: contacts are
//! unique per (organization, phone), campaign audiences iterate by contact
//! id ascending, and message status never moves backward.

use crate::entities::{
    BusinessAccountRecord, CampaignRecord, CampaignStatus, ContactRecord, ContactStatus,
    ConversationRecord, ConversationStatus, InitiatedBy, MessageDirection, MessageRecord,
    MessageStatus, NewMessage,
};
use crate::errors::{CoreError, CoreResult};
use crate::store::MessageStore;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    business_accounts: HashMap<String, BusinessAccountRecord>,
    contacts: HashMap<Uuid, ContactRecord>,
    conversations: HashMap<Uuid, ConversationRecord>,
    messages: Vec<MessageRecord>,
    campaigns: HashMap<Uuid, CampaignRecord>,
    /// campaign id → audience ordered by contact id, deduplicated
    audiences: HashMap<Uuid, BTreeMap<Uuid, ContactRecord>>,
}

/// Mutex-guarded in-memory [`MessageStore`]
#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_business_account(&self, record: BusinessAccountRecord) {
        let mut inner = self.inner.lock().await;
        inner
            .business_accounts
            .insert(record.account_id.clone(), record);
    }

    pub async fn remove_business_account(&self, account_id: &str) {
        self.inner.lock().await.business_accounts.remove(account_id);
    }

    pub async fn add_campaign(&self, campaign: CampaignRecord) {
        self.inner.lock().await.campaigns.insert(campaign.id, campaign);
    }

    /// Seed the deduplicated, id-ordered audience of a campaign
    pub async fn seed_audience(&self, campaign_id: Uuid, contacts: Vec<ContactRecord>) {
        let mut inner = self.inner.lock().await;
        let audience = inner.audiences.entry(campaign_id).or_default();
        for contact in &contacts {
            audience.insert(contact.id, contact.clone());
        }
        for contact in contacts {
            inner.contacts.insert(contact.id, contact);
        }
    }

    pub async fn messages(&self) -> Vec<MessageRecord> {
        self.inner.lock().await.messages.clone()
    }

    pub async fn conversations(&self) -> Vec<ConversationRecord> {
        self.inner.lock().await.conversations.values().cloned().collect()
    }

    pub async fn campaign(&self, campaign_id: Uuid) -> Option<CampaignRecord> {
        self.inner.lock().await.campaigns.get(&campaign_id).cloned()
    }
}

#[async_trait]
impl MessageStore for InMemoryStore {
    async fn resolve_business_account(
        &self,
        account_id: &str,
    ) -> CoreResult<Option<BusinessAccountRecord>> {
        Ok(self.inner.lock().await.business_accounts.get(account_id).cloned())
    }

    async fn fetch_business_account(
        &self,
        id: Uuid,
    ) -> CoreResult<Option<BusinessAccountRecord>> {
        Ok(self
            .inner
            .lock()
            .await
            .business_accounts
            .values()
            .find(|account| account.id == id)
            .cloned())
    }

    async fn upsert_contact<'a>(
        &'a self,
        organization_id: Uuid,
        phone: &'a str,
        name: Option<&'a str>,
    ) -> CoreResult<ContactRecord> {
        let mut inner = self.inner.lock().await;

        if let Some(existing) = inner
            .contacts
            .values_mut()
            .find(|c| c.organization_id == organization_id && c.phone == phone)
        {
            if existing.name.is_empty() {
                if let Some(name) = name {
                    existing.name = name.to_string();
                }
            }
            return Ok(existing.clone());
        }

        let contact = ContactRecord {
            id: Uuid::new_v4(),
            organization_id,
            phone: phone.to_string(),
            name: name.unwrap_or_default().to_string(),
            attributes: serde_json::json!({}),
            status: ContactStatus::Active,
        };
        inner.contacts.insert(contact.id, contact.clone());
        Ok(contact)
    }

    async fn open_or_create_conversation(
        &self,
        organization_id: Uuid,
        contact_id: Uuid,
        phone_number_used: &str,
        initiated_by: InitiatedBy,
        initiated_by_campaign_id: Option<Uuid>,
    ) -> CoreResult<(ConversationRecord, bool)> {
        let mut inner = self.inner.lock().await;

        if let Some(active) = inner
            .conversations
            .values()
            .find(|c| {
                c.organization_id == organization_id
                    && c.contact_id == contact_id
                    && c.status == ConversationStatus::Active
            })
            .cloned()
        {
            return Ok((active, false));
        }

        // Inbound-opened conversations inherit attribution from the
        // contact's most recent outbound message, if it was a campaign send.
        let (initiated_by, initiated_by_campaign_id) =
            if initiated_by == InitiatedBy::Contact && initiated_by_campaign_id.is_none() {
                let last_outbound_campaign = inner
                    .messages
                    .iter()
                    .rev()
                    .find(|m| {
                        m.contact_id == contact_id
                            && m.organization_id == organization_id
                            && m.direction == MessageDirection::Outbound
                    })
                    .and_then(|m| m.campaign_id);
                match last_outbound_campaign {
                    Some(campaign_id) => (InitiatedBy::Campaign, Some(campaign_id)),
                    None => (InitiatedBy::Contact, None),
                }
            } else {
                (initiated_by, initiated_by_campaign_id)
            };

        let conversation = ConversationRecord {
            id: Uuid::new_v4(),
            organization_id,
            contact_id,
            phone_number_used: phone_number_used.to_string(),
            initiated_by,
            initiated_by_campaign_id,
            status: ConversationStatus::Active,
            created_at: chrono::Utc::now(),
        };
        inner
            .conversations
            .insert(conversation.id, conversation.clone());
        Ok((conversation, true))
    }

    async fn insert_message(&self, message: NewMessage) -> CoreResult<MessageRecord> {
        let record = MessageRecord {
            id: Uuid::new_v4(),
            organization_id: message.organization_id,
            conversation_id: message.conversation_id,
            contact_id: message.contact_id,
            provider_message_id: message.provider_message_id,
            direction: message.direction,
            kind: message.kind,
            payload: message.payload,
            status: message.status,
            replied_to: message.replied_to,
            campaign_id: message.campaign_id,
            phone_number_used: message.phone_number_used,
            created_at: message.created_at,
        };
        self.inner.lock().await.messages.push(record.clone());
        Ok(record)
    }

    async fn update_message_status_by_provider_id(
        &self,
        provider_message_id: &str,
        status: MessageStatus,
    ) -> CoreResult<Option<MessageRecord>> {
        let mut inner = self.inner.lock().await;
        let Some(message) = inner
            .messages
            .iter_mut()
            .find(|m| m.provider_message_id.as_deref() == Some(provider_message_id))
        else {
            return Ok(None);
        };

        if message.status.can_advance_to(status) {
            message.status = status;
        }
        Ok(Some(message.clone()))
    }

    async fn mark_conversation_inbound_as_read(&self, conversation_id: Uuid) -> CoreResult<u64> {
        let mut inner = self.inner.lock().await;
        let mut updated = 0;
        for message in inner.messages.iter_mut() {
            if message.conversation_id == Some(conversation_id)
                && message.direction == MessageDirection::Inbound
                && message.status == MessageStatus::Sent
            {
                message.status = MessageStatus::Read;
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn next_campaign_contact_batch(
        &self,
        campaign_id: Uuid,
        after_contact_id: Option<Uuid>,
        batch_size: u64,
    ) -> CoreResult<Vec<ContactRecord>> {
        let inner = self.inner.lock().await;
        let Some(audience) = inner.audiences.get(&campaign_id) else {
            return Ok(Vec::new());
        };

        let lower = match after_contact_id {
            Some(id) => Bound::Excluded(id),
            None => Bound::Unbounded,
        };

        Ok(audience
            .range((lower, Bound::Unbounded))
            .take(batch_size as usize)
            .map(|(_, contact)| contact.clone())
            .collect())
    }

    async fn record_campaign_last_contact(
        &self,
        campaign_id: Uuid,
        contact_id: Uuid,
    ) -> CoreResult<()> {
        let mut inner = self.inner.lock().await;
        let campaign = inner
            .campaigns
            .get_mut(&campaign_id)
            .ok_or_else(|| CoreError::not_found("campaign", campaign_id.to_string()))?;
        // Concurrent sends complete out of order; the cursor only advances.
        if campaign.last_contact_id.map_or(true, |last| last < contact_id) {
            campaign.last_contact_id = Some(contact_id);
        }
        Ok(())
    }

    async fn fetch_campaign(&self, campaign_id: Uuid) -> CoreResult<Option<CampaignRecord>> {
        Ok(self.inner.lock().await.campaigns.get(&campaign_id).cloned())
    }

    async fn list_campaigns_with_status(
        &self,
        status: CampaignStatus,
    ) -> CoreResult<Vec<CampaignRecord>> {
        Ok(self
            .inner
            .lock()
            .await
            .campaigns
            .values()
            .filter(|c| c.status == status)
            .cloned()
            .collect())
    }

    async fn update_campaign_status(
        &self,
        campaign_id: Uuid,
        status: CampaignStatus,
    ) -> CoreResult<()> {
        let mut inner = self.inner.lock().await;
        let campaign = inner
            .campaigns
            .get_mut(&campaign_id)
            .ok_or_else(|| CoreError::not_found("campaign", campaign_id.to_string()))?;

        if !campaign.status.can_transition_to(status) {
            return Err(CoreError::invariant(format!(
                "campaign {} cannot move {} -> {}",
                campaign_id,
                campaign.status.as_str(),
                status.as_str()
            )));
        }

        campaign.status = status;
        Ok(())
    }

    async fn increment_campaign_counters(
        &self,
        campaign_id: Uuid,
        sent: i64,
        errored: i64,
    ) -> CoreResult<()> {
        let mut inner = self.inner.lock().await;
        let campaign = inner
            .campaigns
            .get_mut(&campaign_id)
            .ok_or_else(|| CoreError::not_found("campaign", campaign_id.to_string()))?;
        campaign.sent_count += sent;
        campaign.error_count += errored;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn org() -> Uuid {
        Uuid::new_v4()
    }

    #[tokio::test]
    async fn upsert_contact_is_idempotent_on_phone() {
        let store = InMemoryStore::new();
        let organization_id = org();

        let first = store
            .upsert_contact(organization_id, "15551234567", Some("Alice"))
            .await
            .unwrap();
        let second = store
            .upsert_contact(organization_id, "15551234567", Some("Someone Else"))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        // First writer wins on name.
        assert_eq!(second.name, "Alice");
    }

    #[tokio::test]
    async fn upsert_contact_fills_empty_name() {
        let store = InMemoryStore::new();
        let organization_id = org();

        let first = store
            .upsert_contact(organization_id, "15551234567", None)
            .await
            .unwrap();
        assert_eq!(first.name, "");

        let second = store
            .upsert_contact(organization_id, "15551234567", Some("Alice"))
            .await
            .unwrap();
        assert_eq!(second.name, "Alice");
    }

    #[tokio::test]
    async fn at_most_one_active_conversation_per_contact() {
        let store = InMemoryStore::new();
        let organization_id = org();
        let contact = store
            .upsert_contact(organization_id, "15551234567", Some("Alice"))
            .await
            .unwrap();

        let (first, created_first) = store
            .open_or_create_conversation(organization_id, contact.id, "P1", InitiatedBy::Contact, None)
            .await
            .unwrap();
        let (second, created_second) = store
            .open_or_create_conversation(organization_id, contact.id, "P1", InitiatedBy::Contact, None)
            .await
            .unwrap();

        assert!(created_first);
        assert!(!created_second);
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn inbound_conversation_attributes_to_last_campaign() {
        let store = InMemoryStore::new();
        let organization_id = org();
        let campaign_id = Uuid::new_v4();
        let contact = store
            .upsert_contact(organization_id, "15551234567", Some("Alice"))
            .await
            .unwrap();

        store
            .insert_message(NewMessage {
                organization_id,
                conversation_id: None,
                contact_id: contact.id,
                provider_message_id: Some("pm-campaign".to_string()),
                direction: MessageDirection::Outbound,
                kind: crate::entities::MessageKind::Template,
                payload: serde_json::json!({}),
                status: MessageStatus::Sent,
                replied_to: None,
                campaign_id: Some(campaign_id),
                phone_number_used: "P1".to_string(),
                created_at: chrono::Utc::now(),
            })
            .await
            .unwrap();

        let (conversation, created) = store
            .open_or_create_conversation(organization_id, contact.id, "P1", InitiatedBy::Contact, None)
            .await
            .unwrap();

        assert!(created);
        assert_eq!(conversation.initiated_by, InitiatedBy::Campaign);
        assert_eq!(conversation.initiated_by_campaign_id, Some(campaign_id));
    }

    #[tokio::test]
    async fn status_updates_never_move_backward() {
        let store = InMemoryStore::new();
        let organization_id = org();
        let contact = store
            .upsert_contact(organization_id, "15551234567", None)
            .await
            .unwrap();

        store
            .insert_message(NewMessage {
                organization_id,
                conversation_id: None,
                contact_id: contact.id,
                provider_message_id: Some("pm1".to_string()),
                direction: MessageDirection::Outbound,
                kind: crate::entities::MessageKind::Template,
                payload: serde_json::json!({}),
                status: MessageStatus::Sent,
                replied_to: None,
                campaign_id: None,
                phone_number_used: "P1".to_string(),
                created_at: chrono::Utc::now(),
            })
            .await
            .unwrap();

        store
            .update_message_status_by_provider_id("pm1", MessageStatus::Read)
            .await
            .unwrap();
        let after_backward = store
            .update_message_status_by_provider_id("pm1", MessageStatus::Delivered)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(after_backward.status, MessageStatus::Read);
    }

    #[tokio::test]
    async fn unknown_provider_id_is_a_noop() {
        let store = InMemoryStore::new();
        let result = store
            .update_message_status_by_provider_id("pm-missing", MessageStatus::Delivered)
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn mark_inbound_as_read_targets_only_sent_inbound() {
        let store = InMemoryStore::new();
        let organization_id = org();
        let contact = store
            .upsert_contact(organization_id, "15551234567", None)
            .await
            .unwrap();
        let (conversation, _) = store
            .open_or_create_conversation(organization_id, contact.id, "P1", InitiatedBy::Contact, None)
            .await
            .unwrap();

        for (direction, status) in [
            (MessageDirection::Inbound, MessageStatus::Sent),
            (MessageDirection::Inbound, MessageStatus::Read),
            (MessageDirection::Outbound, MessageStatus::Sent),
        ] {
            store
                .insert_message(NewMessage {
                    organization_id,
                    conversation_id: Some(conversation.id),
                    contact_id: contact.id,
                    provider_message_id: None,
                    direction,
                    kind: crate::entities::MessageKind::Text,
                    payload: serde_json::json!({}),
                    status,
                    replied_to: None,
                    campaign_id: None,
                    phone_number_used: "P1".to_string(),
                    created_at: chrono::Utc::now(),
                })
                .await
                .unwrap();
        }

        let updated = store
            .mark_conversation_inbound_as_read(conversation.id)
            .await
            .unwrap();
        assert_eq!(updated, 1);

        let messages = store.messages().await;
        let outbound = messages
            .iter()
            .find(|m| m.direction == MessageDirection::Outbound)
            .unwrap();
        assert_eq!(outbound.status, MessageStatus::Sent);
    }

    #[tokio::test]
    async fn batches_page_by_contact_id() {
        let store = InMemoryStore::new();
        let organization_id = org();
        let campaign_id = Uuid::new_v4();

        let contacts: Vec<ContactRecord> = (1u128..=5)
            .map(|i| ContactRecord {
                id: Uuid::from_u128(i),
                organization_id,
                phone: format!("1555000{i:04}"),
                name: String::new(),
                attributes: serde_json::json!({}),
                status: ContactStatus::Active,
            })
            .collect();
        store.seed_audience(campaign_id, contacts).await;

        let first = store
            .next_campaign_contact_batch(campaign_id, None, 2)
            .await
            .unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].id, Uuid::from_u128(1));

        let rest = store
            .next_campaign_contact_batch(campaign_id, Some(first[1].id), 10)
            .await
            .unwrap();
        assert_eq!(rest.len(), 3);
        assert_eq!(rest[0].id, Uuid::from_u128(3));
    }

    #[tokio::test]
    async fn terminal_campaigns_reject_transitions() {
        let store = InMemoryStore::new();
        let campaign_id = Uuid::new_v4();
        store
            .add_campaign(CampaignRecord {
                id: campaign_id,
                organization_id: org(),
                business_account_id: Uuid::new_v4(),
                phone_number_to_use: "P1".to_string(),
                template_id: "t1".to_string(),
                parameter_binding: None,
                status: CampaignStatus::Finished,
                sent_count: 0,
                error_count: 0,
                last_contact_id: None,
                scheduled_at: None,
                created_at: chrono::Utc::now(),
            })
            .await;

        let result = store
            .update_campaign_status(campaign_id, CampaignStatus::Running)
            .await;
        assert!(matches!(result, Err(CoreError::Invariant(_))));

        // Idempotent repeat of the terminal state is fine.
        store
            .update_campaign_status(campaign_id, CampaignStatus::Finished)
            .await
            .unwrap();
    }
}
