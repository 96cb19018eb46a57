//! Per-business-account dispatch workers
//!
//! One worker exists per business account referenced by any running
//! campaign. The worker owns the account's rate limiter and a bounded pool
//! of send tasks; campaign supervisors feed it `(campaign, contact)` tuples
//! through an mpsc queue. Workers are created lazily and never retired
//! within a process lifetime.

use crate::campaign::CampaignManagerConfig;
use crate::entities::{
    BusinessAccountRecord, CampaignRecord, CampaignStatus, ContactRecord, MessageDirection,
    MessageKind, MessageStatus, NewMessage, ParameterBinding,
};
use crate::errors::{CoreError, CoreResult};
use crate::events::{
    ApiServerEvent, CampaignProgressData, EventBus, API_SERVER_EVENTS_CHANNEL,
};
use crate::limiter::RateLimiter;
use crate::provider::ProviderClient;
use crate::renderer::render_template;
use crate::store::MessageStore;
use crate::utils::WaitGroup;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio::time::Instant;
use tracing::{debug, error, warn};
use uuid::Uuid;
use wacast_whatsapp::types::TemplateDefinition;

/// Dependencies shared by the manager, supervisors and workers
pub(crate) struct EngineShared {
    pub store: Arc<dyn MessageStore>,
    pub provider: Arc<dyn ProviderClient>,
    pub bus: Arc<dyn EventBus>,
    pub config: CampaignManagerConfig,
}

/// Mutable state of one campaign while its supervisor runs
pub(crate) struct RunningCampaign {
    pub record: CampaignRecord,
    pub account: BusinessAccountRecord,
    pub template: TemplateDefinition,
    pub binding: ParameterBinding,
    pub sent: AtomicI64,
    pub errored: AtomicI64,
    stopping: AtomicBool,
    pub in_flight: WaitGroup,
    sends_since_progress: AtomicU64,
    last_progress: Mutex<Instant>,
}

impl RunningCampaign {
    pub fn new(
        record: CampaignRecord,
        account: BusinessAccountRecord,
        template: TemplateDefinition,
        binding: ParameterBinding,
    ) -> Self {
        let sent = record.sent_count;
        let errored = record.error_count;
        Self {
            record,
            account,
            template,
            binding,
            sent: AtomicI64::new(sent),
            errored: AtomicI64::new(errored),
            stopping: AtomicBool::new(false),
            in_flight: WaitGroup::new(),
            sends_since_progress: AtomicU64::new(0),
            last_progress: Mutex::new(Instant::now()),
        }
    }

    pub fn id(&self) -> Uuid {
        self.record.id
    }

    pub fn stop(&self) {
        self.stopping.store(true, Ordering::SeqCst);
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    pub fn progress(&self, status: CampaignStatus) -> CampaignProgressData {
        CampaignProgressData {
            campaign_id: self.record.id,
            messages_sent: self.sent.load(Ordering::SeqCst),
            messages_errored: self.errored.load(Ordering::SeqCst),
            status,
        }
    }
}

/// One queued dispatch tuple
pub(crate) struct CampaignMessage {
    pub campaign: Arc<RunningCampaign>,
    pub contact: ContactRecord,
}

/// Handle to a spawned per-account worker
pub(crate) struct BusinessWorker {
    account_id: String,
    queue: mpsc::Sender<CampaignMessage>,
}

impl BusinessWorker {
    pub fn spawn(account_id: String, shared: Arc<EngineShared>) -> Arc<Self> {
        let (queue, rx) = mpsc::channel(shared.config.worker_queue_depth);

        tokio::spawn(run_worker(account_id.clone(), rx, shared));

        Arc::new(Self { account_id, queue })
    }

    pub async fn enqueue(&self, message: CampaignMessage) -> CoreResult<()> {
        self.queue.send(message).await.map_err(|_| {
            CoreError::internal(format!(
                "dispatch queue for account {} is closed",
                self.account_id
            ))
        })
    }
}

async fn run_worker(
    account_id: String,
    mut rx: mpsc::Receiver<CampaignMessage>,
    shared: Arc<EngineShared>,
) {
    let limiter = RateLimiter::smoothed(shared.config.messages_per_second);
    let pool = Arc::new(Semaphore::new(shared.config.dispatch_pool_size));

    debug!(account_id, "business worker started");

    while let Some(message) = rx.recv().await {
        // Stopped campaigns drain without sending; in-flight accounting
        // still balances so the supervisor's wait completes.
        if message.campaign.is_stopping() {
            message.campaign.in_flight.done();
            continue;
        }

        limiter.acquire().await;

        let Ok(permit) = pool.clone().acquire_owned().await else {
            message.campaign.in_flight.done();
            break;
        };

        let shared = shared.clone();
        tokio::spawn(async move {
            send_campaign_message(&shared, message).await;
            drop(permit);
        });
    }

    debug!(account_id, "business worker queue closed");
}

/// The per-tuple send path: render, call the provider, persist the outcome,
/// advance the resume cursor, balance the wait group.
async fn send_campaign_message(shared: &EngineShared, message: CampaignMessage) {
    let campaign = &message.campaign;
    let contact = &message.contact;

    match dispatch_one(shared, campaign, contact).await {
        Ok(()) => {
            campaign.sent.fetch_add(1, Ordering::SeqCst);
            if let Err(e) = shared
                .store
                .increment_campaign_counters(campaign.id(), 1, 0)
                .await
            {
                error!(campaign_id = %campaign.id(), "counter update failed: {e}");
            }
        }
        Err(e) => {
            warn!(
                campaign_id = %campaign.id(),
                contact_id = %contact.id,
                "campaign send failed: {e}"
            );
            campaign.errored.fetch_add(1, Ordering::SeqCst);
            if let Err(e) = shared
                .store
                .increment_campaign_counters(campaign.id(), 0, 1)
                .await
            {
                error!(campaign_id = %campaign.id(), "counter update failed: {e}");
            }
        }
    }

    if let Err(e) = shared
        .store
        .record_campaign_last_contact(campaign.id(), contact.id)
        .await
    {
        error!(campaign_id = %campaign.id(), "resume cursor update failed: {e}");
    }

    emit_progress_if_due(shared, campaign).await;

    campaign.in_flight.done();
}

async fn dispatch_one(
    shared: &EngineShared,
    campaign: &RunningCampaign,
    contact: &ContactRecord,
) -> CoreResult<()> {
    let rendered = render_template(&campaign.template, &campaign.binding, contact)
        .map_err(|e| CoreError::validation(e.to_string()))?;

    let payload = serde_json::to_value(&rendered)?;

    let send_result = shared
        .provider
        .send_template(
            &campaign.account,
            &campaign.record.phone_number_to_use,
            &contact.phone,
            rendered,
        )
        .await;

    let (status, provider_message_id, outcome) = match send_result {
        Ok(provider_message_id) => (MessageStatus::Sent, Some(provider_message_id), Ok(())),
        // The failed send is still written for auditability.
        Err(e) => (MessageStatus::Failed, None, Err(e)),
    };

    let record = NewMessage {
        organization_id: campaign.record.organization_id,
        conversation_id: None,
        contact_id: contact.id,
        provider_message_id,
        direction: MessageDirection::Outbound,
        kind: MessageKind::Template,
        payload,
        status,
        replied_to: None,
        campaign_id: Some(campaign.id()),
        phone_number_used: campaign.record.phone_number_to_use.clone(),
        created_at: chrono::Utc::now(),
    };

    if let Err(e) = shared.store.insert_message(record).await {
        error!(campaign_id = %campaign.id(), "message record insert failed: {e}");
    }

    outcome
}

/// Publish a `CampaignProgress` event when the bounded cadence allows:
/// every K sends or every T elapsed, whichever comes first.
async fn emit_progress_if_due(shared: &EngineShared, campaign: &RunningCampaign) {
    let sends = campaign.sends_since_progress.fetch_add(1, Ordering::SeqCst) + 1;

    let due_by_count = sends >= shared.config.progress_every_sends;
    let due_by_time = {
        let last = campaign.last_progress.lock().await;
        last.elapsed() >= shared.config.progress_interval
    };

    if !due_by_count && !due_by_time {
        return;
    }

    campaign.sends_since_progress.store(0, Ordering::SeqCst);
    *campaign.last_progress.lock().await = Instant::now();

    publish_progress(shared, campaign, CampaignStatus::Running).await;
}

pub(crate) async fn publish_progress(
    shared: &EngineShared,
    campaign: &RunningCampaign,
    status: CampaignStatus,
) {
    let event = ApiServerEvent::campaign_progress(
        campaign.progress(status),
        campaign.record.organization_id,
    );
    shared
        .bus
        .publish(API_SERVER_EVENTS_CHANNEL, event.to_bytes())
        .await;
}
