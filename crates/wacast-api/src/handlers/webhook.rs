//! Webhook ingestion pipeline
//!
//! The provider delivers two kinds of requests: a verification GET when the
//! tenant registers the webhook, and signed POSTs for every event. POSTs are
//! answered 200 after handler dispatch; a failing handler is logged and
//! swallowed so the provider does not build a retry storm.

use crate::state::AppState;
use actix_web::{web, HttpRequest, HttpResponse};
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use wacast_core::crypto::WebhookVerifyToken;
use wacast_core::entities::{
    BusinessAccountRecord, InitiatedBy, MessageDirection, MessageKind, MessageStatus, NewMessage,
};
use wacast_core::errors::CoreResult;
use wacast_core::events::{ApiServerEvent, EventBus, API_SERVER_EVENTS_CHANNEL};
use wacast_core::store::MessageStore;
use wacast_whatsapp::{
    AccountEventKind, CloudApiClient, InboundMessageKind, MessageEventContext, StatusKind,
    WebhookEvent, WebhookProcessor,
};

/// Query of the provider's verification GET
#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: String,
    #[serde(rename = "hub.challenge")]
    pub challenge: String,
}

/// `GET /webhook`: decrypt the verify token, confirm it names a known
/// business account of the expected organization, echo the challenge.
pub async fn verify_webhook(
    state: web::Data<AppState>,
    query: web::Query<VerifyQuery>,
) -> HttpResponse {
    if let Some(mode) = &query.mode {
        if mode != "subscribe" {
            return HttpResponse::BadRequest().json("invalid webhook mode");
        }
    }

    let token: WebhookVerifyToken = match state.encryption.decrypt(&query.verify_token) {
        Ok(token) => token,
        Err(e) => {
            warn!("webhook verification token rejected: {e}");
            return HttpResponse::BadRequest().json("invalid verification token");
        }
    };

    let account = match state.account_cache.resolve(&token.business_account_id).await {
        Ok(Some(account)) => account,
        Ok(None) => {
            warn!(
                account_id = %token.business_account_id,
                "webhook verification for unknown business account"
            );
            return HttpResponse::NotFound().json("business account not found");
        }
        Err(e) => {
            error!("business account lookup failed: {e}");
            return HttpResponse::InternalServerError().json("internal server error");
        }
    };

    if account.organization_id != token.organization_id {
        warn!(
            account_id = %token.business_account_id,
            "webhook verification organization mismatch"
        );
        return HttpResponse::BadRequest().json("invalid verification token");
    }

    info!(account_id = %account.account_id, "webhook verified");
    HttpResponse::Ok()
        .content_type("text/plain")
        .body(query.challenge.clone())
}

/// `POST /webhook`: authenticate the tenant from `entry[0].id`, verify the
/// signature over the buffered body, demultiplex and dispatch every event,
/// then answer 200.
pub async fn receive_webhook(
    state: web::Data<AppState>,
    request: HttpRequest,
    body: web::Bytes,
) -> HttpResponse {
    let payload: wacast_whatsapp::WebhookPayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!("undecodable webhook payload: {e}");
            return HttpResponse::BadRequest().json("invalid json");
        }
    };

    let Some(account_id) = payload.business_account_id().map(str::to_string) else {
        warn!("webhook payload without entry id");
        return HttpResponse::BadRequest().json("missing business account id");
    };

    let account = match state.account_cache.resolve(&account_id).await {
        Ok(Some(account)) => account,
        Ok(None) => {
            warn!(%account_id, "webhook for unknown business account");
            return HttpResponse::NotFound().json("business account not found");
        }
        Err(e) => {
            error!("business account lookup failed: {e}");
            return HttpResponse::InternalServerError().json("internal server error");
        }
    };

    let processor = WebhookProcessor::new(account.webhook_secret.clone());

    if let Some(signature) = request
        .headers()
        .get("X-Hub-Signature-256")
        .and_then(|value| value.to_str().ok())
    {
        if let Err(e) = processor.verify_signature(&body, signature) {
            warn!(%account_id, "webhook signature rejected: {e}");
            return HttpResponse::Unauthorized().json("signature verification failed");
        }
    }

    let ingest = Ingest {
        store: state.store.clone(),
        bus: state.bus.clone(),
    };

    for event in processor.events(&payload) {
        // Handler failures must not leak to the provider; it would retry
        // the whole envelope.
        if let Err(e) = dispatch_event(&ingest, &account, event).await {
            if e.is_droppable() {
                debug!("webhook event dropped: {e}");
            } else {
                error!("webhook event handler failed: {e}");
            }
        }
    }

    HttpResponse::Ok().json("success")
}

/// Dependencies of the event handlers, free of framework types so the same
/// functions run against synthesized events in tests
pub struct Ingest {
    pub store: Arc<dyn MessageStore>,
    pub bus: Arc<dyn EventBus>,
}

/// The handler table: one arm per event family
pub async fn dispatch_event(
    ingest: &Ingest,
    account: &BusinessAccountRecord,
    event: WebhookEvent,
) -> CoreResult<()> {
    match event {
        WebhookEvent::Message {
            context,
            kind,
            payload,
        } => handle_inbound_message(ingest, account, context, kind, payload).await,
        WebhookEvent::Status {
            provider_message_id,
            kind,
            ..
        } => handle_status_update(ingest, &provider_message_id, kind).await,
        WebhookEvent::Account {
            kind, payload, ..
        } => handle_account_event(account, kind, payload),
        WebhookEvent::Unknown { field, .. } => {
            debug!(account_id = %account.account_id, field, "unhandled webhook field");
            Ok(())
        }
    }
}

fn message_kind(kind: InboundMessageKind) -> MessageKind {
    match kind {
        InboundMessageKind::Text => MessageKind::Text,
        InboundMessageKind::Image => MessageKind::Image,
        InboundMessageKind::Video => MessageKind::Video,
        InboundMessageKind::Audio => MessageKind::Audio,
        InboundMessageKind::Document => MessageKind::Document,
        InboundMessageKind::Sticker => MessageKind::Sticker,
        InboundMessageKind::Reaction => MessageKind::Reaction,
        InboundMessageKind::Location => MessageKind::Location,
        InboundMessageKind::Contacts => MessageKind::Contacts,
        InboundMessageKind::Template => MessageKind::Template,
        // Button and list replies are stored as text-bearing messages; the
        // payload keeps the interaction details.
        InboundMessageKind::QuickReply
        | InboundMessageKind::ListInteraction
        | InboundMessageKind::ReplyButton
        | InboundMessageKind::Unsupported => MessageKind::Text,
    }
}

fn parse_provider_timestamp(timestamp: &str) -> DateTime<Utc> {
    timestamp
        .parse::<i64>()
        .ok()
        .and_then(|seconds| Utc.timestamp_opt(seconds, 0).single())
        .unwrap_or_else(Utc::now)
}

/// The unified inbound flow shared by every message-bearing kind
pub async fn handle_inbound_message(
    ingest: &Ingest,
    account: &BusinessAccountRecord,
    context: MessageEventContext,
    kind: InboundMessageKind,
    payload: serde_json::Value,
) -> CoreResult<()> {
    let sent_at = parse_provider_timestamp(&context.timestamp);

    let phone = CloudApiClient::normalize_phone_number(&context.sender_phone)
        .unwrap_or_else(|_| context.sender_phone.clone());

    let contact = ingest
        .store
        .upsert_contact(
            account.organization_id,
            &phone,
            context.sender_name.as_deref(),
        )
        .await?;

    let (conversation, created) = ingest
        .store
        .open_or_create_conversation(
            account.organization_id,
            contact.id,
            &context.phone_number.id,
            InitiatedBy::Contact,
            None,
        )
        .await?;

    if created {
        let event = ApiServerEvent::new_conversation(&conversation);
        ingest
            .bus
            .publish(API_SERVER_EVENTS_CHANNEL, event.to_bytes())
            .await;
    }

    let message = ingest
        .store
        .insert_message(NewMessage {
            organization_id: account.organization_id,
            conversation_id: Some(conversation.id),
            contact_id: contact.id,
            provider_message_id: Some(context.provider_message_id.clone()),
            direction: MessageDirection::Inbound,
            kind: message_kind(kind),
            payload,
            status: MessageStatus::Sent,
            replied_to: context.replied_to.clone(),
            campaign_id: None,
            phone_number_used: context.phone_number.id.clone(),
            created_at: sent_at,
        })
        .await?;

    let event = ApiServerEvent::new_message(&conversation, &message);
    ingest
        .bus
        .publish(API_SERVER_EVENTS_CHANNEL, event.to_bytes())
        .await;

    Ok(())
}

/// The unified status flow: unknown provider ids are silently dropped
pub async fn handle_status_update(
    ingest: &Ingest,
    provider_message_id: &str,
    kind: StatusKind,
) -> CoreResult<()> {
    let status = match kind {
        // The provider echoes "sent" for messages we recorded at send time.
        StatusKind::Sent => return Ok(()),
        StatusKind::Delivered => MessageStatus::Delivered,
        StatusKind::Read => MessageStatus::Read,
        StatusKind::Failed => MessageStatus::Failed,
        StatusKind::Undelivered => MessageStatus::UnDelivered,
    };

    let Some(message) = ingest
        .store
        .update_message_status_by_provider_id(provider_message_id, status)
        .await?
    else {
        debug!(provider_message_id, "status callback for unknown message");
        return Ok(());
    };

    let event = match status {
        MessageStatus::Read => ApiServerEvent::message_read(message.id, message.organization_id),
        MessageStatus::Delivered => {
            ApiServerEvent::message_delivered(message.id, message.organization_id)
        }
        _ => ApiServerEvent::message_failed(message.id, message.organization_id),
    };

    ingest
        .bus
        .publish(API_SERVER_EVENTS_CHANNEL, event.to_bytes())
        .await;

    Ok(())
}

/// Account-level notifications are logged; operator alerting rides the
/// notification side-channel, not this pipeline.
fn handle_account_event(
    account: &BusinessAccountRecord,
    kind: AccountEventKind,
    payload: serde_json::Value,
) -> CoreResult<()> {
    info!(
        account_id = %account.account_id,
        kind = kind.as_str(),
        %payload,
        "account-level webhook event"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use uuid::Uuid;
    use wacast_core::entities::{ConversationStatus, InitiatedBy};
    use wacast_core::events::{EventKind, InMemoryEventBus};
    use wacast_core::store::memory::InMemoryStore;

    fn account(organization_id: Uuid) -> BusinessAccountRecord {
        BusinessAccountRecord {
            id: Uuid::new_v4(),
            account_id: "BA1".to_string(),
            access_token: "token".to_string(),
            webhook_secret: "secret".to_string(),
            organization_id,
        }
    }

    fn ingest() -> (Ingest, Arc<InMemoryStore>, Arc<InMemoryEventBus>) {
        let store = Arc::new(InMemoryStore::new());
        let bus = Arc::new(InMemoryEventBus::new());
        (
            Ingest {
                store: store.clone(),
                bus: bus.clone(),
            },
            store,
            bus,
        )
    }

    fn text_event(from: &str, name: &str, body: &str) -> WebhookEvent {
        let payload = serde_json::json!({
            "object": "whatsapp_business_account",
            "entry": [{
                "id": "BA1",
                "changes": [{
                    "field": "messages",
                    "value": {
                        "metadata": {"display_phone_number": "15550001111", "phone_number_id": "P1"},
                        "contacts": [{"wa_id": from, "profile": {"name": name}}],
                        "messages": [{
                            "id": "wamid.inbound-1",
                            "from": from,
                            "timestamp": "1714000000",
                            "type": "text",
                            "text": {"body": body}
                        }]
                    }
                }]
            }]
        });
        let payload: wacast_whatsapp::WebhookPayload = serde_json::from_value(payload).unwrap();
        WebhookProcessor::new("secret")
            .events(&payload)
            .into_iter()
            .next()
            .unwrap()
    }

    #[tokio::test]
    async fn inbound_text_creates_contact_conversation_message_and_events() {
        let organization_id = Uuid::new_v4();
        let account = account(organization_id);
        let (ingest, store, bus) = ingest();

        let mut events = bus.subscribe(API_SERVER_EVENTS_CHANNEL).await.unwrap();

        dispatch_event(&ingest, &account, text_event("15550000911", "Alice Johnson", "hi"))
            .await
            .unwrap();

        // Contact upserted with the sender profile name.
        let contact = store
            .upsert_contact(organization_id, "15550000911", None)
            .await
            .unwrap();
        assert_eq!(contact.name, "Alice Johnson");

        // One Active conversation initiated by the contact.
        let conversations = store.conversations().await;
        assert_eq!(conversations.len(), 1);
        assert_eq!(conversations[0].status, ConversationStatus::Active);
        assert_eq!(conversations[0].initiated_by, InitiatedBy::Contact);
        assert_eq!(conversations[0].phone_number_used, "P1");

        // One inbound text message.
        let messages = store.messages().await;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].direction, MessageDirection::Inbound);
        assert_eq!(messages[0].kind, MessageKind::Text);
        assert_eq!(messages[0].status, MessageStatus::Sent);
        assert_eq!(
            messages[0].provider_message_id.as_deref(),
            Some("wamid.inbound-1")
        );
        assert_eq!(messages[0].payload["body"], "hi");

        // NewConversation then NewMessage, in that order.
        let first = ApiServerEvent::from_bytes(&events.next().await.unwrap()).unwrap();
        assert_eq!(first.event, EventKind::NewConversation);
        assert_eq!(first.organization_id, Some(organization_id));
        let second = ApiServerEvent::from_bytes(&events.next().await.unwrap()).unwrap();
        assert_eq!(second.event, EventKind::NewMessage);
    }

    #[tokio::test]
    async fn second_inbound_message_reuses_the_conversation() {
        let organization_id = Uuid::new_v4();
        let account = account(organization_id);
        let (ingest, store, bus) = ingest();

        let mut events = bus.subscribe(API_SERVER_EVENTS_CHANNEL).await.unwrap();

        dispatch_event(&ingest, &account, text_event("15550000911", "Alice", "first"))
            .await
            .unwrap();
        dispatch_event(&ingest, &account, text_event("15550000911", "Alice", "second"))
            .await
            .unwrap();

        assert_eq!(store.conversations().await.len(), 1);
        assert_eq!(store.messages().await.len(), 2);

        // Exactly one NewConversation among the published events.
        let mut kinds = Vec::new();
        while let Ok(Some(payload)) =
            tokio::time::timeout(std::time::Duration::from_millis(100), events.next()).await
        {
            kinds.push(ApiServerEvent::from_bytes(&payload).unwrap().event);
        }
        assert_eq!(
            kinds
                .iter()
                .filter(|kind| **kind == EventKind::NewConversation)
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn reply_context_is_stored_on_the_message() {
        let organization_id = Uuid::new_v4();
        let account = account(organization_id);
        let (ingest, store, _bus) = ingest();

        let mut event = text_event("15550000911", "Alice", "replying");
        if let WebhookEvent::Message { context, .. } = &mut event {
            context.replied_to = Some("wamid.parent".to_string());
        }

        dispatch_event(&ingest, &account, event).await.unwrap();

        let messages = store.messages().await;
        assert_eq!(messages[0].replied_to.as_deref(), Some("wamid.parent"));
    }

    #[tokio::test]
    async fn status_lifecycle_updates_store_and_publishes_in_order() {
        let organization_id = Uuid::new_v4();
        let account = account(organization_id);
        let (ingest, store, bus) = ingest();

        let contact = store
            .upsert_contact(organization_id, "15550000911", None)
            .await
            .unwrap();
        store
            .insert_message(NewMessage {
                organization_id,
                conversation_id: None,
                contact_id: contact.id,
                provider_message_id: Some("pm1".to_string()),
                direction: MessageDirection::Outbound,
                kind: MessageKind::Template,
                payload: serde_json::json!({}),
                status: MessageStatus::Sent,
                replied_to: None,
                campaign_id: None,
                phone_number_used: "P1".to_string(),
                created_at: chrono::Utc::now(),
            })
            .await
            .unwrap();

        let mut events = bus.subscribe(API_SERVER_EVENTS_CHANNEL).await.unwrap();

        for kind in [StatusKind::Delivered, StatusKind::Read] {
            dispatch_event(
                &ingest,
                &account,
                WebhookEvent::Status {
                    business_account_id: "BA1".to_string(),
                    provider_message_id: "pm1".to_string(),
                    kind,
                    recipient: "15550000911".to_string(),
                },
            )
            .await
            .unwrap();
        }

        let stored = store
            .update_message_status_by_provider_id("pm1", MessageStatus::Read)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, MessageStatus::Read);

        let first = ApiServerEvent::from_bytes(&events.next().await.unwrap()).unwrap();
        assert_eq!(first.event, EventKind::MessageDelivered);
        let second = ApiServerEvent::from_bytes(&events.next().await.unwrap()).unwrap();
        assert_eq!(second.event, EventKind::MessageRead);
    }

    #[tokio::test]
    async fn unknown_provider_id_is_dropped_without_events() {
        let organization_id = Uuid::new_v4();
        let account = account(organization_id);
        let (ingest, _store, bus) = ingest();

        let mut events = bus.subscribe(API_SERVER_EVENTS_CHANNEL).await.unwrap();

        dispatch_event(
            &ingest,
            &account,
            WebhookEvent::Status {
                business_account_id: "BA1".to_string(),
                provider_message_id: "pm-unknown".to_string(),
                kind: StatusKind::Delivered,
                recipient: "15550000911".to_string(),
            },
        )
        .await
        .unwrap();

        let next = tokio::time::timeout(std::time::Duration::from_millis(100), events.next()).await;
        assert!(next.is_err(), "no event should be published");
    }

    #[tokio::test]
    async fn account_and_unknown_events_never_fail() {
        let organization_id = Uuid::new_v4();
        let account = account(organization_id);
        let (ingest, _store, _bus) = ingest();

        dispatch_event(
            &ingest,
            &account,
            WebhookEvent::Account {
                business_account_id: "BA1".to_string(),
                kind: AccountEventKind::TemplateStatus,
                payload: serde_json::json!({"event": "APPROVED"}),
            },
        )
        .await
        .unwrap();

        dispatch_event(
            &ingest,
            &account,
            WebhookEvent::Unknown {
                business_account_id: "BA1".to_string(),
                field: "mystery".to_string(),
                payload: serde_json::json!({}),
            },
        )
        .await
        .unwrap();
    }
}
