//! Persistence seam for the live subsystems
//!
//! The campaign engine and the webhook pipeline talk to storage exclusively
//! through [`MessageStore`]. The database crate provides the Postgres
//! implementation; [`memory::InMemoryStore`] backs tests and single-node
//! experiments.

pub mod memory;

use crate::entities::{
    BusinessAccountRecord, CampaignRecord, CampaignStatus, ContactRecord, ConversationRecord,
    InitiatedBy, MessageRecord, MessageStatus, NewMessage,
};
use crate::errors::CoreResult;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Narrow persistence interface; every operation is atomic.
///
/// `upsert_contact` and `open_or_create_conversation` must be safe under
/// concurrent callers for the same (organization, phone): on conflict the
/// existing row wins and the caller observes its id.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Resolve a provider account id to the tenant credentials, or None
    async fn resolve_business_account(
        &self,
        account_id: &str,
    ) -> CoreResult<Option<BusinessAccountRecord>>;

    /// Fetch a business account by its internal id
    async fn fetch_business_account(
        &self,
        id: Uuid,
    ) -> CoreResult<Option<BusinessAccountRecord>>;

    /// Idempotent on (organization, phone); first writer wins on `name`
    /// when the stored name is empty
    async fn upsert_contact<'a>(
        &'a self,
        organization_id: Uuid,
        phone: &'a str,
        name: Option<&'a str>,
    ) -> CoreResult<ContactRecord>;

    /// Pick the unique Active conversation or create one. Returns the
    /// conversation and whether it was created by this call.
    ///
    /// When an inbound message opens a conversation, the contact's most
    /// recent outbound message decides attribution: a campaign id there
    /// makes the new conversation campaign-initiated.
    async fn open_or_create_conversation(
        &self,
        organization_id: Uuid,
        contact_id: Uuid,
        phone_number_used: &str,
        initiated_by: InitiatedBy,
        initiated_by_campaign_id: Option<Uuid>,
    ) -> CoreResult<(ConversationRecord, bool)>;

    /// Persist a message and return it with its assigned id
    async fn insert_message(&self, message: NewMessage) -> CoreResult<MessageRecord>;

    /// Status update keyed by the provider message id; None when unknown
    /// (webhook callbacks for messages we never stored are dropped).
    /// Backward transitions are ignored, returning the stored record.
    async fn update_message_status_by_provider_id(
        &self,
        provider_message_id: &str,
        status: MessageStatus,
    ) -> CoreResult<Option<MessageRecord>>;

    /// Flip all inbound Sent messages of a conversation to Read
    async fn mark_conversation_inbound_as_read(&self, conversation_id: Uuid) -> CoreResult<u64>;

    /// Next slice of the campaign audience: contacts from the campaign's
    /// lists with `id > after_contact_id`, ordered by contact id ascending,
    /// deduplicated across lists
    async fn next_campaign_contact_batch(
        &self,
        campaign_id: Uuid,
        after_contact_id: Option<Uuid>,
        batch_size: u64,
    ) -> CoreResult<Vec<ContactRecord>>;

    /// Persist the resume cursor
    async fn record_campaign_last_contact(
        &self,
        campaign_id: Uuid,
        contact_id: Uuid,
    ) -> CoreResult<()>;

    async fn fetch_campaign(&self, campaign_id: Uuid) -> CoreResult<Option<CampaignRecord>>;

    async fn list_campaigns_with_status(
        &self,
        status: CampaignStatus,
    ) -> CoreResult<Vec<CampaignRecord>>;

    /// Persist a status transition; illegal transitions are rejected with an
    /// invariant error so a raced terminal state cannot be overwritten
    async fn update_campaign_status(
        &self,
        campaign_id: Uuid,
        status: CampaignStatus,
    ) -> CoreResult<()>;

    /// Add to the persistent sent/errored counters
    async fn increment_campaign_counters(
        &self,
        campaign_id: Uuid,
        sent: i64,
        errored: i64,
    ) -> CoreResult<()>;
}

/// Default lifetime of a cached business-account resolution
pub const BUSINESS_ACCOUNT_CACHE_TTL: Duration = Duration::from_secs(12 * 60 * 60);

/// Read-mostly TTL cache in front of `resolve_business_account`.
///
/// Webhook ingestion resolves the same handful of accounts on every request;
/// entries live for twelve hours unless invalidated on credential rotation.
pub struct BusinessAccountCache {
    store: Arc<dyn MessageStore>,
    ttl: Duration,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

struct CacheEntry {
    record: BusinessAccountRecord,
    cached_at: Instant,
}

impl BusinessAccountCache {
    pub fn new(store: Arc<dyn MessageStore>) -> Self {
        Self::with_ttl(store, BUSINESS_ACCOUNT_CACHE_TTL)
    }

    pub fn with_ttl(store: Arc<dyn MessageStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Resolve through the cache; misses and expired entries hit the store
    pub async fn resolve(&self, account_id: &str) -> CoreResult<Option<BusinessAccountRecord>> {
        {
            let entries = self.entries.read().await;
            if let Some(entry) = entries.get(account_id) {
                if entry.cached_at.elapsed() < self.ttl {
                    return Ok(Some(entry.record.clone()));
                }
            }
        }

        let resolved = self.store.resolve_business_account(account_id).await?;

        if let Some(record) = &resolved {
            let mut entries = self.entries.write().await;
            entries.insert(
                account_id.to_string(),
                CacheEntry {
                    record: record.clone(),
                    cached_at: Instant::now(),
                },
            );
        }

        Ok(resolved)
    }

    /// Drop a cached entry after credential rotation
    pub async fn invalidate(&self, account_id: &str) {
        self.entries.write().await.remove(account_id);
    }
}

#[cfg(test)]
mod tests {
    use super::memory::InMemoryStore;
    use super::*;

    fn account(account_id: &str) -> BusinessAccountRecord {
        BusinessAccountRecord {
            id: Uuid::new_v4(),
            account_id: account_id.to_string(),
            access_token: "token".to_string(),
            webhook_secret: "secret".to_string(),
            organization_id: Uuid::new_v4(),
        }
    }

    #[tokio::test]
    async fn cache_serves_from_memory_within_ttl() {
        let store = Arc::new(InMemoryStore::new());
        store.add_business_account(account("BA1")).await;

        let cache = BusinessAccountCache::new(store.clone());
        assert!(cache.resolve("BA1").await.unwrap().is_some());

        // Even if the row disappears, the cached entry keeps answering.
        store.remove_business_account("BA1").await;
        assert!(cache.resolve("BA1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn cache_misses_are_not_negative_cached() {
        let store = Arc::new(InMemoryStore::new());
        let cache = BusinessAccountCache::new(store.clone());

        assert!(cache.resolve("BA2").await.unwrap().is_none());

        store.add_business_account(account("BA2")).await;
        assert!(cache.resolve("BA2").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn cache_deduplicates_store_reads() {
        let record = account("BA-mock");
        let mut mock = MockMessageStore::new();
        mock.expect_resolve_business_account()
            .times(1)
            .returning(move |_| Ok(Some(record.clone())));

        let cache = BusinessAccountCache::new(Arc::new(mock));
        for _ in 0..5 {
            assert!(cache.resolve("BA-mock").await.unwrap().is_some());
        }
    }

    #[tokio::test]
    async fn invalidate_forces_a_fresh_read() {
        let store = Arc::new(InMemoryStore::new());
        store.add_business_account(account("BA3")).await;

        let cache = BusinessAccountCache::new(store.clone());
        assert!(cache.resolve("BA3").await.unwrap().is_some());

        store.remove_business_account("BA3").await;
        cache.invalidate("BA3").await;
        assert!(cache.resolve("BA3").await.unwrap().is_none());
    }
}
