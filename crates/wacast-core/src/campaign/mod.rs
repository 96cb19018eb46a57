//! Campaign dispatch engine
//!
//! Drives campaigns through their lifecycle: a periodic scan promotes due
//! Scheduled campaigns and spawns one supervisor task per Running campaign;
//! supervisors pull contact batches and feed per-account workers; a control
//! subscription reacts to stop commands. All loops honor the process
//! shutdown signal and drain in-flight sends before announcing a terminal
//! state.

pub mod commands;
mod worker;

pub use commands::CampaignCommand;

use crate::entities::{BusinessAccountRecord, CampaignRecord, CampaignStatus};
use crate::errors::{CoreError, CoreResult};
use crate::events::{
    ApiServerEvent, EventBus, LockManager, NotificationData, API_SERVER_EVENTS_CHANNEL,
    CAMPAIGN_MANAGER_CHANNEL,
};
use crate::provider::ProviderClient;
use crate::store::MessageStore;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use wacast_whatsapp::CloudApiClient;
use worker::{BusinessWorker, CampaignMessage, EngineShared, RunningCampaign};

/// Tunables of the dispatch engine
#[derive(Debug, Clone)]
pub struct CampaignManagerConfig {
    /// Contacts pulled per store round-trip
    pub batch_size: u64,
    /// Per-account outbound rate budget
    pub messages_per_second: f64,
    /// Concurrent sends per account worker
    pub dispatch_pool_size: usize,
    /// Queued tuples per account worker
    pub worker_queue_depth: usize,
    /// Progress event cadence: every K sends ...
    pub progress_every_sends: u64,
    /// ... or every T elapsed, whichever comes first
    pub progress_interval: Duration,
    /// How often the engine scans for newly Running/due campaigns
    pub scan_interval: Duration,
}

impl Default for CampaignManagerConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            messages_per_second: 10.0,
            dispatch_pool_size: 10,
            worker_queue_depth: 1024,
            progress_every_sends: 20,
            progress_interval: Duration::from_secs(3),
            scan_interval: Duration::from_secs(5),
        }
    }
}

/// The engine. One instance per process; multiple processes may run
/// concurrently, each with its own rate budget.
pub struct CampaignManager {
    shared: Arc<EngineShared>,
    workers: RwLock<HashMap<String, Arc<BusinessWorker>>>,
    running: Mutex<HashMap<Uuid, Arc<RunningCampaign>>>,
    supervisors: Mutex<JoinSet<()>>,
    lock_manager: Option<LockManager>,
}

impl CampaignManager {
    pub fn new(
        store: Arc<dyn MessageStore>,
        provider: Arc<dyn ProviderClient>,
        bus: Arc<dyn EventBus>,
        config: CampaignManagerConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            shared: Arc::new(EngineShared {
                store,
                provider,
                bus,
                config,
            }),
            workers: RwLock::new(HashMap::new()),
            running: Mutex::new(HashMap::new()),
            supervisors: Mutex::new(JoinSet::new()),
            lock_manager: None,
        })
    }

    /// Engine with a distributed lock for stop handling across processes
    pub fn with_lock_manager(
        store: Arc<dyn MessageStore>,
        provider: Arc<dyn ProviderClient>,
        bus: Arc<dyn EventBus>,
        config: CampaignManagerConfig,
        lock_manager: LockManager,
    ) -> Arc<Self> {
        Arc::new(Self {
            shared: Arc::new(EngineShared {
                store,
                provider,
                bus,
                config,
            }),
            workers: RwLock::new(HashMap::new()),
            running: Mutex::new(HashMap::new()),
            supervisors: Mutex::new(JoinSet::new()),
            lock_manager: Some(lock_manager),
        })
    }

    /// Run until the shutdown signal flips. Campaigns already Running in the
    /// store are resumed from their cursor on the first scan.
    pub async fn run(self: Arc<Self>, shutdown: watch::Receiver<bool>) {
        info!("campaign manager starting");

        let control = {
            let manager = self.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { manager.control_loop(shutdown).await })
        };

        let mut shutdown_main = shutdown.clone();
        loop {
            self.scan_campaigns(&shutdown).await;

            tokio::select! {
                _ = tokio::time::sleep(self.shared.config.scan_interval) => {}
                _ = shutdown_main.changed() => break,
            }
        }

        // Supervisors observe the same signal; wait for every one of them to
        // drain its in-flight sends and persist its cursor.
        let mut supervisors = self.supervisors.lock().await;
        while supervisors.join_next().await.is_some() {}
        control.abort();

        info!("campaign manager stopped");
    }

    /// One scan round: promote due Scheduled campaigns, supervise Running
    /// campaigns this process does not yet track.
    async fn scan_campaigns(self: &Arc<Self>, shutdown: &watch::Receiver<bool>) {
        match self
            .shared
            .store
            .list_campaigns_with_status(CampaignStatus::Scheduled)
            .await
        {
            Ok(scheduled) => {
                let now = chrono::Utc::now();
                for campaign in scheduled {
                    let due = campaign.scheduled_at.map_or(true, |at| at <= now);
                    if !due {
                        continue;
                    }
                    if let Err(e) = self
                        .shared
                        .store
                        .update_campaign_status(campaign.id, CampaignStatus::Running)
                        .await
                    {
                        error!(campaign_id = %campaign.id, "scheduled promotion failed: {e}");
                    }
                }
            }
            Err(e) => error!("scheduled campaign scan failed: {e}"),
        }

        match self
            .shared
            .store
            .list_campaigns_with_status(CampaignStatus::Running)
            .await
        {
            Ok(running) => {
                for campaign in running {
                    let already_tracked = self.running.lock().await.contains_key(&campaign.id);
                    if !already_tracked {
                        self.spawn_supervisor(campaign.id, shutdown.clone()).await;
                    }
                }
            }
            Err(e) => error!("running campaign scan failed: {e}"),
        }
    }

    async fn spawn_supervisor(self: &Arc<Self>, campaign_id: Uuid, shutdown: watch::Receiver<bool>) {
        let manager = self.clone();
        self.supervisors.lock().await.spawn(async move {
            if let Err(e) = manager.supervise(campaign_id, shutdown).await {
                error!(%campaign_id, "campaign supervisor failed: {e}");
            }
            manager.running.lock().await.remove(&campaign_id);
        });
    }

    /// Drive one campaign from its cursor to a terminal or suspended state
    async fn supervise(
        self: &Arc<Self>,
        campaign_id: Uuid,
        shutdown: watch::Receiver<bool>,
    ) -> CoreResult<()> {
        let Some(campaign) = self.shared.store.fetch_campaign(campaign_id).await? else {
            return Err(CoreError::not_found("campaign", campaign_id.to_string()));
        };
        if campaign.status != CampaignStatus::Running {
            return Ok(());
        }

        let Some(account) = self
            .shared
            .store
            .fetch_business_account(campaign.business_account_id)
            .await?
        else {
            self.fail_campaign(
                &campaign,
                CampaignStatus::Paused,
                "business account could not be resolved",
            )
            .await;
            return Ok(());
        };

        let template = match self
            .shared
            .provider
            .fetch_template(&account, &campaign.template_id)
            .await
        {
            Ok(template) => template,
            Err(e) => {
                self.fail_campaign(
                    &campaign,
                    CampaignStatus::Paused,
                    &format!("template fetch failed: {e}"),
                )
                .await;
                return Ok(());
            }
        };

        let binding = campaign.parameter_binding.clone().unwrap_or_default();
        if template.requires_parameters() && binding.is_empty() {
            self.fail_campaign(
                &campaign,
                CampaignStatus::Cancelled,
                "template declares placeholders but the campaign binds no parameters",
            )
            .await;
            return Ok(());
        }

        let running = Arc::new(RunningCampaign::new(
            campaign.clone(),
            account.clone(),
            template,
            binding,
        ));
        {
            let mut tracked = self.running.lock().await;
            if tracked.contains_key(&campaign_id) {
                // A concurrent scan raced us; the earlier supervisor owns it.
                return Ok(());
            }
            tracked.insert(campaign_id, running.clone());
        }

        info!(
            %campaign_id,
            resume_from = ?campaign.last_contact_id,
            "campaign dispatch starting"
        );

        let worker = self.worker_for(&account).await;
        let mut cursor = campaign.last_contact_id;

        'feed: loop {
            if running.is_stopping() || *shutdown.borrow() {
                break;
            }

            let batch = self
                .shared
                .store
                .next_campaign_contact_batch(campaign_id, cursor, self.shared.config.batch_size)
                .await?;
            if batch.is_empty() {
                break;
            }

            for contact in batch {
                if running.is_stopping() || *shutdown.borrow() {
                    break 'feed;
                }
                cursor = Some(contact.id);

                // Invalid phones are skipped and counted, not dispatched.
                if CloudApiClient::normalize_phone_number(&contact.phone).is_err() {
                    warn!(
                        %campaign_id,
                        contact_id = %contact.id,
                        "skipping contact with invalid phone"
                    );
                    running
                        .errored
                        .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    let _ = self
                        .shared
                        .store
                        .increment_campaign_counters(campaign_id, 0, 1)
                        .await;
                    let _ = self
                        .shared
                        .store
                        .record_campaign_last_contact(campaign_id, contact.id)
                        .await;
                    continue;
                }

                running.in_flight.add(1);
                let message = CampaignMessage {
                    campaign: running.clone(),
                    contact,
                };
                if worker.enqueue(message).await.is_err() {
                    running.in_flight.done();
                    break 'feed;
                }
            }
        }

        // Drain in-flight sends before announcing any state.
        running.in_flight.wait().await;

        let shutting_down = *shutdown.borrow();
        let final_status = if running.is_stopping() {
            Some(CampaignStatus::Paused)
        } else if shutting_down {
            // Leave the campaign Running; a restart resumes from the cursor.
            None
        } else {
            Some(CampaignStatus::Finished)
        };

        if let Some(status) = final_status {
            // An operator cancel may have landed while we drained; never
            // overwrite a state the store has already moved past.
            let current = self
                .shared
                .store
                .fetch_campaign(campaign_id)
                .await?
                .map(|c| c.status);

            match current {
                Some(CampaignStatus::Running) => {
                    self.shared
                        .store
                        .update_campaign_status(campaign_id, status)
                        .await?;
                    worker::publish_progress(&self.shared, &running, status).await;
                    info!(%campaign_id, status = status.as_str(), "campaign dispatch ended");
                }
                Some(other) => {
                    worker::publish_progress(&self.shared, &running, other).await;
                    debug!(
                        %campaign_id,
                        status = other.as_str(),
                        "campaign state changed externally during drain"
                    );
                }
                None => {}
            }
        }

        Ok(())
    }

    /// Fatal condition for one campaign: park it, tell the operators
    async fn fail_campaign(&self, campaign: &CampaignRecord, status: CampaignStatus, reason: &str) {
        warn!(campaign_id = %campaign.id, status = status.as_str(), "{reason}");

        if let Err(e) = self
            .shared
            .store
            .update_campaign_status(campaign.id, status)
            .await
        {
            error!(campaign_id = %campaign.id, "status transition failed: {e}");
        }

        let notification = ApiServerEvent::notification(
            NotificationData {
                title: "Campaign stopped".to_string(),
                message: format!("Campaign {}: {}", campaign.id, reason),
            },
            Some(campaign.organization_id),
        );
        self.shared
            .bus
            .publish(API_SERVER_EVENTS_CHANNEL, notification.to_bytes())
            .await;
    }

    /// Lazily create the per-account worker
    async fn worker_for(&self, account: &BusinessAccountRecord) -> Arc<BusinessWorker> {
        {
            let workers = self.workers.read().await;
            if let Some(worker) = workers.get(&account.account_id) {
                return worker.clone();
            }
        }

        let mut workers = self.workers.write().await;
        workers
            .entry(account.account_id.clone())
            .or_insert_with(|| {
                BusinessWorker::spawn(account.account_id.clone(), self.shared.clone())
            })
            .clone()
    }

    /// React to a stop command: cancel the campaign's enqueue loop. The
    /// supervisor parks the campaign once in-flight sends drain.
    pub async fn stop_campaign(&self, campaign_id: Uuid) {
        if let Some(locks) = &self.lock_manager {
            match locks
                .try_acquire(
                    &format!("campaign-stop:{campaign_id}"),
                    Duration::from_secs(30),
                )
                .await
            {
                Ok(Some(guard)) => {
                    self.mark_stopping(campaign_id).await;
                    if let Err(e) = guard.release().await {
                        warn!("stop lock release failed: {e}");
                    }
                }
                Ok(None) => {
                    debug!(%campaign_id, "another process holds the stop lock");
                }
                Err(e) => {
                    warn!("stop lock unavailable, handling locally: {e}");
                    self.mark_stopping(campaign_id).await;
                }
            }
        } else {
            self.mark_stopping(campaign_id).await;
        }
    }

    async fn mark_stopping(&self, campaign_id: Uuid) {
        match self.running.lock().await.get(&campaign_id) {
            Some(running) => {
                running.stop();
                info!(%campaign_id, "stop requested, draining in-flight sends");
            }
            None => debug!(%campaign_id, "stop command for a campaign not running here"),
        }
    }

    /// Consume control commands from the bus until shutdown
    async fn control_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut stream = match self.shared.bus.subscribe(CAMPAIGN_MANAGER_CHANNEL).await {
            Ok(stream) => stream,
            Err(e) => {
                error!("control channel subscription failed: {e}");
                return;
            }
        };

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                payload = stream.next() => {
                    let Some(payload) = payload else { break };
                    match CampaignCommand::from_bytes(&payload) {
                        Ok(CampaignCommand::StopCampaign { campaign_id }) => {
                            self.stop_campaign(campaign_id).await;
                        }
                        Err(e) => warn!("undecodable control command: {e}"),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{
        ContactRecord, ContactStatus, DynamicField, MessageStatus, ParameterBinding,
        ParameterInput,
    };
    use crate::events::{EventKind, InMemoryEventBus};
    use crate::store::memory::InMemoryStore;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicU64;
    use wacast_whatsapp::types::{TemplateDefinition, TemplateMessage, TemplateParameter};

    /// Scripted provider: returns a fixed template, records every send
    struct FakeProvider {
        template: TemplateDefinition,
        sends: std::sync::Mutex<Vec<(String, TemplateMessage)>>,
        failing_numbers: HashSet<String>,
        counter: AtomicU64,
    }

    impl FakeProvider {
        fn new(template: TemplateDefinition) -> Self {
            Self {
                template,
                sends: std::sync::Mutex::new(Vec::new()),
                failing_numbers: HashSet::new(),
                counter: AtomicU64::new(0),
            }
        }

        fn sends(&self) -> Vec<(String, TemplateMessage)> {
            self.sends.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ProviderClient for FakeProvider {
        async fn fetch_template(
            &self,
            _account: &BusinessAccountRecord,
            _template_id: &str,
        ) -> CoreResult<TemplateDefinition> {
            Ok(self.template.clone())
        }

        async fn send_template(
            &self,
            _account: &BusinessAccountRecord,
            _phone_number_id: &str,
            to: &str,
            message: TemplateMessage,
        ) -> CoreResult<String> {
            if self.failing_numbers.contains(to) {
                return Err(CoreError::external("cloud api", "provider rejected send"));
            }
            self.sends.lock().unwrap().push((to.to_string(), message));
            let n = self.counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(format!("wamid.fake-{n}"))
        }
    }

    fn hello_template() -> TemplateDefinition {
        serde_json::from_value(serde_json::json!({
            "id": "tmpl-hello",
            "name": "hello",
            "language": "en_US",
            "components": [
                {"type": "BODY", "text": "Hello {{1}}", "example": {"body_text": [["Alice"]]}}
            ]
        }))
        .unwrap()
    }

    fn contact(index: u128, organization_id: Uuid, phone: &str, name: &str) -> ContactRecord {
        ContactRecord {
            id: Uuid::from_u128(index),
            organization_id,
            phone: phone.to_string(),
            name: name.to_string(),
            attributes: serde_json::json!({}),
            status: ContactStatus::Active,
        }
    }

    struct Fixture {
        store: Arc<InMemoryStore>,
        bus: Arc<InMemoryEventBus>,
        provider: Arc<FakeProvider>,
        campaign_id: Uuid,
        organization_id: Uuid,
    }

    async fn fixture(
        provider: FakeProvider,
        binding: Option<ParameterBinding>,
        status: CampaignStatus,
    ) -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let bus = Arc::new(InMemoryEventBus::new());
        let organization_id = Uuid::new_v4();
        let campaign_id = Uuid::new_v4();

        let account = BusinessAccountRecord {
            id: Uuid::new_v4(),
            account_id: "BA1".to_string(),
            access_token: "token".to_string(),
            webhook_secret: "secret".to_string(),
            organization_id,
        };
        store.add_business_account(account.clone()).await;

        store
            .add_campaign(CampaignRecord {
                id: campaign_id,
                organization_id,
                business_account_id: account.id,
                phone_number_to_use: "P1".to_string(),
                template_id: "tmpl-hello".to_string(),
                parameter_binding: binding,
                status,
                sent_count: 0,
                error_count: 0,
                last_contact_id: None,
                scheduled_at: None,
                created_at: chrono::Utc::now(),
            })
            .await;

        Fixture {
            store,
            bus,
            provider: Arc::new(provider),
            campaign_id,
            organization_id,
        }
    }

    fn test_config(rate: f64) -> CampaignManagerConfig {
        CampaignManagerConfig {
            messages_per_second: rate,
            scan_interval: Duration::from_millis(50),
            progress_every_sends: 1,
            progress_interval: Duration::from_millis(100),
            ..Default::default()
        }
    }

    async fn run_until<F>(fixture: &Fixture, config: CampaignManagerConfig, condition: F)
    where
        F: Fn(&CampaignRecord) -> bool,
    {
        let manager = CampaignManager::new(
            fixture.store.clone(),
            fixture.provider.clone(),
            fixture.bus.clone(),
            config,
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(manager.run(shutdown_rx));

        let deadline = tokio::time::Instant::now() + Duration::from_secs(120);
        loop {
            if let Some(campaign) = fixture.store.campaign(fixture.campaign_id).await {
                if condition(&campaign) {
                    break;
                }
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "campaign never reached the expected state"
            );
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let _ = shutdown_tx.send(true);
        let _ = handle.await;
    }

    #[tokio::test(start_paused = true)]
    async fn e2e_dispatch_renders_counts_and_paces() {
        let fixture = fixture(
            FakeProvider::new(hello_template()),
            Some(ParameterBinding {
                body: vec![ParameterInput::dynamic("1", DynamicField::FirstName)],
                ..Default::default()
            }),
            CampaignStatus::Running,
        )
        .await;

        fixture
            .store
            .seed_audience(
                fixture.campaign_id,
                vec![
                    contact(1, fixture.organization_id, "15550000911", "Alice Johnson"),
                    contact(2, fixture.organization_id, "15550000912", "Bob"),
                    contact(3, fixture.organization_id, "15550000913", ""),
                ],
            )
            .await;

        let start = tokio::time::Instant::now();
        run_until(&fixture, test_config(2.0), |campaign| {
            campaign.status == CampaignStatus::Finished
        })
        .await;

        // Three sends at two per second span at least a second.
        assert!(start.elapsed() >= Duration::from_secs(1));

        let campaign = fixture.store.campaign(fixture.campaign_id).await.unwrap();
        assert_eq!(campaign.sent_count, 3);
        assert_eq!(campaign.error_count, 0);

        let sends = fixture.provider.sends();
        assert_eq!(sends.len(), 3);
        let bodies: Vec<String> = sends
            .iter()
            .flat_map(|(_, message)| &message.components)
            .flat_map(|component| &component.parameters)
            .filter_map(|parameter| match parameter {
                TemplateParameter::Text { text } => Some(text.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(bodies, vec!["Alice", "Bob", ""]);

        // Outbound records carry the campaign ref and provider id.
        let messages = fixture.store.messages().await;
        assert_eq!(messages.len(), 3);
        for message in &messages {
            assert_eq!(message.campaign_id, Some(fixture.campaign_id));
            assert_eq!(message.status, MessageStatus::Sent);
            assert!(message.provider_message_id.is_some());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn missing_parameters_cancels_before_any_send() {
        let fixture = fixture(
            FakeProvider::new(hello_template()),
            None,
            CampaignStatus::Running,
        )
        .await;
        fixture
            .store
            .seed_audience(
                fixture.campaign_id,
                vec![contact(1, fixture.organization_id, "15550000911", "Alice")],
            )
            .await;

        let mut events = fixture
            .bus
            .subscribe(API_SERVER_EVENTS_CHANNEL)
            .await
            .unwrap();

        run_until(&fixture, test_config(100.0), |campaign| {
            campaign.status == CampaignStatus::Cancelled
        })
        .await;

        assert!(fixture.provider.sends().is_empty());
        assert!(fixture.store.messages().await.is_empty());

        let payload = tokio::time::timeout(Duration::from_secs(5), events.next())
            .await
            .expect("expected an operator notification")
            .unwrap();
        let event = ApiServerEvent::from_bytes(&payload).unwrap();
        assert_eq!(event.event, EventKind::NewNotification);
        assert_eq!(event.organization_id, Some(fixture.organization_id));
    }

    #[tokio::test(start_paused = true)]
    async fn resume_continues_after_the_cursor() {
        let fixture = fixture(
            FakeProvider::new(hello_template()),
            Some(ParameterBinding {
                body: vec![ParameterInput::dynamic("1", DynamicField::FirstName)],
                ..Default::default()
            }),
            CampaignStatus::Running,
        )
        .await;

        let total = 100u128;
        let contacts: Vec<ContactRecord> = (1..=total)
            .map(|i| {
                contact(
                    i,
                    fixture.organization_id,
                    &format!("1555{i:07}"),
                    "Contact",
                )
            })
            .collect();
        fixture
            .store
            .seed_audience(fixture.campaign_id, contacts)
            .await;

        // Simulate a restart mid-campaign: the cursor sits at contact 50.
        fixture
            .store
            .record_campaign_last_contact(fixture.campaign_id, Uuid::from_u128(50))
            .await
            .unwrap();

        run_until(&fixture, test_config(1000.0), |campaign| {
            campaign.status == CampaignStatus::Finished
        })
        .await;

        let messages = fixture.store.messages().await;
        assert_eq!(messages.len(), 50);

        let dispatched: HashSet<Uuid> = messages.iter().map(|m| m.contact_id).collect();
        assert!(dispatched.contains(&Uuid::from_u128(51)));
        for i in 1..=50u128 {
            assert!(
                !dispatched.contains(&Uuid::from_u128(i)),
                "contact {i} at or before the cursor was dispatched again"
            );
        }

        let campaign = fixture.store.campaign(fixture.campaign_id).await.unwrap();
        assert_eq!(campaign.sent_count + campaign.error_count, 50);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_phones_are_skipped_and_counted() {
        let fixture = fixture(
            FakeProvider::new(hello_template()),
            Some(ParameterBinding {
                body: vec![ParameterInput::dynamic("1", DynamicField::FirstName)],
                ..Default::default()
            }),
            CampaignStatus::Running,
        )
        .await;

        fixture
            .store
            .seed_audience(
                fixture.campaign_id,
                vec![
                    contact(1, fixture.organization_id, "15550000911", "Alice"),
                    contact(2, fixture.organization_id, "911", "Short Phone"),
                    contact(3, fixture.organization_id, "15550000913", "Carol"),
                ],
            )
            .await;

        run_until(&fixture, test_config(1000.0), |campaign| {
            campaign.status == CampaignStatus::Finished
        })
        .await;

        let campaign = fixture.store.campaign(fixture.campaign_id).await.unwrap();
        assert_eq!(campaign.sent_count, 2);
        assert_eq!(campaign.error_count, 1);
        assert_eq!(fixture.provider.sends().len(), 2);
        // sent + errored covers the whole audience exactly at Finished.
        assert_eq!(campaign.sent_count + campaign.error_count, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn provider_failures_are_recorded_and_counted() {
        let mut provider = FakeProvider::new(hello_template());
        provider.failing_numbers.insert("15550000912".to_string());

        let fixture = fixture(
            provider,
            Some(ParameterBinding {
                body: vec![ParameterInput::dynamic("1", DynamicField::FirstName)],
                ..Default::default()
            }),
            CampaignStatus::Running,
        )
        .await;

        fixture
            .store
            .seed_audience(
                fixture.campaign_id,
                vec![
                    contact(1, fixture.organization_id, "15550000911", "Alice"),
                    contact(2, fixture.organization_id, "15550000912", "Bob"),
                ],
            )
            .await;

        run_until(&fixture, test_config(1000.0), |campaign| {
            campaign.status == CampaignStatus::Finished
        })
        .await;

        let campaign = fixture.store.campaign(fixture.campaign_id).await.unwrap();
        assert_eq!(campaign.sent_count, 1);
        assert_eq!(campaign.error_count, 1);

        // The failed send is still written for audit.
        let messages = fixture.store.messages().await;
        assert_eq!(messages.len(), 2);
        assert!(messages
            .iter()
            .any(|m| m.status == MessageStatus::Failed && m.provider_message_id.is_none()));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_command_pauses_after_drain() {
        let fixture = fixture(
            FakeProvider::new(hello_template()),
            Some(ParameterBinding {
                body: vec![ParameterInput::dynamic("1", DynamicField::FirstName)],
                ..Default::default()
            }),
            CampaignStatus::Running,
        )
        .await;

        let total = 50u128;
        let contacts: Vec<ContactRecord> = (1..=total)
            .map(|i| {
                contact(
                    i,
                    fixture.organization_id,
                    &format!("1555{i:07}"),
                    "Contact",
                )
            })
            .collect();
        fixture
            .store
            .seed_audience(fixture.campaign_id, contacts)
            .await;

        let manager = CampaignManager::new(
            fixture.store.clone(),
            fixture.provider.clone(),
            fixture.bus.clone(),
            test_config(2.0),
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(manager.clone().run(shutdown_rx));

        // Let a few sends happen, then stop through the control channel.
        let deadline = tokio::time::Instant::now() + Duration::from_secs(60);
        loop {
            let campaign = fixture.store.campaign(fixture.campaign_id).await.unwrap();
            if campaign.sent_count >= 3 {
                break;
            }
            assert!(tokio::time::Instant::now() < deadline);
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        fixture
            .bus
            .publish(
                CAMPAIGN_MANAGER_CHANNEL,
                CampaignCommand::stop(fixture.campaign_id).to_bytes(),
            )
            .await;

        let deadline = tokio::time::Instant::now() + Duration::from_secs(60);
        loop {
            let campaign = fixture.store.campaign(fixture.campaign_id).await.unwrap();
            if campaign.status == CampaignStatus::Paused {
                break;
            }
            assert!(tokio::time::Instant::now() < deadline, "stop never landed");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let campaign = fixture.store.campaign(fixture.campaign_id).await.unwrap();
        assert!(campaign.sent_count < total as i64);
        // Every dispatched message is accounted; nothing is lost mid-flight.
        assert_eq!(
            fixture.store.messages().await.len() as i64,
            campaign.sent_count + campaign.error_count
        );

        let _ = shutdown_tx.send(true);
        let _ = handle.await;
    }

    #[tokio::test(start_paused = true)]
    async fn scheduled_campaigns_start_when_due() {
        let fixture = fixture(
            FakeProvider::new(hello_template()),
            Some(ParameterBinding {
                body: vec![ParameterInput::dynamic("1", DynamicField::FirstName)],
                ..Default::default()
            }),
            CampaignStatus::Scheduled,
        )
        .await;

        fixture
            .store
            .seed_audience(
                fixture.campaign_id,
                vec![contact(1, fixture.organization_id, "15550000911", "Alice")],
            )
            .await;

        run_until(&fixture, test_config(1000.0), |campaign| {
            campaign.status == CampaignStatus::Finished
        })
        .await;

        assert_eq!(fixture.provider.sends().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn progress_events_surface_on_the_bus() {
        let fixture = fixture(
            FakeProvider::new(hello_template()),
            Some(ParameterBinding {
                body: vec![ParameterInput::dynamic("1", DynamicField::FirstName)],
                ..Default::default()
            }),
            CampaignStatus::Running,
        )
        .await;
        fixture
            .store
            .seed_audience(
                fixture.campaign_id,
                vec![
                    contact(1, fixture.organization_id, "15550000911", "Alice"),
                    contact(2, fixture.organization_id, "15550000912", "Bob"),
                ],
            )
            .await;

        let mut events = fixture
            .bus
            .subscribe(API_SERVER_EVENTS_CHANNEL)
            .await
            .unwrap();

        run_until(&fixture, test_config(1000.0), |campaign| {
            campaign.status == CampaignStatus::Finished
        })
        .await;

        let mut saw_progress = false;
        while let Ok(Some(payload)) =
            tokio::time::timeout(Duration::from_millis(200), events.next()).await
        {
            let event = ApiServerEvent::from_bytes(&payload).unwrap();
            if event.event == EventKind::CampaignProgress {
                saw_progress = true;
                assert_eq!(event.organization_id, Some(fixture.organization_id));
                let data: crate::events::CampaignProgressData =
                    serde_json::from_value(event.data).unwrap();
                assert_eq!(data.campaign_id, fixture.campaign_id);
            }
        }
        assert!(saw_progress, "no CampaignProgress event was published");
    }
}
