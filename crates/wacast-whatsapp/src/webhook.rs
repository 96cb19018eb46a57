use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// Complete webhook payload as posted by the provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub object: String,
    #[serde(default)]
    pub entry: Vec<WebhookEntry>,
}

impl WebhookPayload {
    /// The business account id the payload is addressed to (`entry[0].id`)
    pub fn business_account_id(&self) -> Option<&str> {
        self.entry.first().map(|entry| entry.id.as_str())
    }
}

/// One entry, scoped to a single business account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEntry {
    pub id: String,
    #[serde(default)]
    pub changes: Vec<WebhookChange>,
}

/// One change notification inside an entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookChange {
    pub field: String,
    pub value: ChangeValue,
}

/// Value of a change; which optional blocks are present depends on `field`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeValue {
    #[serde(default)]
    pub messaging_product: Option<String>,
    #[serde(default)]
    pub metadata: Option<ChangeMetadata>,
    #[serde(default)]
    pub contacts: Option<Vec<WebhookContact>>,
    #[serde(default)]
    pub messages: Option<Vec<InboundMessage>>,
    #[serde(default)]
    pub statuses: Option<Vec<StatusUpdate>>,
    #[serde(default)]
    pub errors: Option<Vec<WebhookError>>,
    /// Everything else (account-level notifications carry free-form fields)
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Metadata identifying the tenant phone number the event belongs to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeMetadata {
    pub display_phone_number: String,
    pub phone_number_id: String,
}

/// Sender profile attached to message-bearing changes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookContact {
    pub wa_id: String,
    #[serde(default)]
    pub profile: Option<ContactProfile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactProfile {
    pub name: String,
}

/// Reply-to reference the provider attaches to inbound replies
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundContext {
    #[serde(default)]
    pub from: Option<String>,
    pub id: String,
}

/// Media attachment on an inbound message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMedia {
    pub id: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub sha256: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundText {
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundLocation {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundReaction {
    pub message_id: String,
    #[serde(default)]
    pub emoji: Option<String>,
}

/// Quick-reply button press
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundButton {
    pub payload: String,
    pub text: String,
}

/// Interactive reply (list selection or reply button)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundInteractive {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub button_reply: Option<InteractiveReply>,
    #[serde(default)]
    pub list_reply: Option<InteractiveReply>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractiveReply {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// System notification (number change, identity change)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundSystem {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub new_wa_id: Option<String>,
}

/// Inbound message from a webhook change
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub id: String,
    pub from: String,
    pub timestamp: String,
    #[serde(rename = "type")]
    pub message_type: String,
    #[serde(default)]
    pub context: Option<InboundContext>,
    #[serde(default)]
    pub text: Option<InboundText>,
    #[serde(default)]
    pub image: Option<InboundMedia>,
    #[serde(default)]
    pub video: Option<InboundMedia>,
    #[serde(default)]
    pub audio: Option<InboundMedia>,
    #[serde(default)]
    pub document: Option<InboundMedia>,
    #[serde(default)]
    pub sticker: Option<InboundMedia>,
    #[serde(default)]
    pub location: Option<InboundLocation>,
    #[serde(default)]
    pub reaction: Option<InboundReaction>,
    #[serde(default)]
    pub contacts: Option<serde_json::Value>,
    #[serde(default)]
    pub button: Option<InboundButton>,
    #[serde(default)]
    pub interactive: Option<InboundInteractive>,
    #[serde(default)]
    pub system: Option<InboundSystem>,
    #[serde(default)]
    pub errors: Option<Vec<WebhookError>>,
}

/// Message status callback
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub id: String,
    pub status: String,
    pub timestamp: String,
    pub recipient_id: String,
    #[serde(default)]
    pub errors: Option<Vec<WebhookError>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookError {
    pub code: i64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

// ---------------------------------------------------------------------------
// Typed events
// ---------------------------------------------------------------------------

/// The tenant phone number an event arrived on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusinessPhoneNumber {
    pub id: String,
    pub display_number: String,
}

/// Kind of a message-bearing event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundMessageKind {
    Text,
    Image,
    Video,
    Audio,
    Document,
    Sticker,
    Reaction,
    Location,
    Contacts,
    Template,
    QuickReply,
    ListInteraction,
    ReplyButton,
    Unsupported,
}

impl InboundMessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Document => "document",
            Self::Sticker => "sticker",
            Self::Reaction => "reaction",
            Self::Location => "location",
            Self::Contacts => "contacts",
            Self::Template => "template",
            Self::QuickReply => "quick_reply",
            Self::ListInteraction => "list_interaction",
            Self::ReplyButton => "reply_button",
            Self::Unsupported => "unsupported",
        }
    }
}

/// Kind of a status callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Sent,
    Delivered,
    Read,
    Failed,
    Undelivered,
}

/// Account-level notification kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountEventKind {
    AccountAlert,
    AccountReview,
    AccountUpdate,
    Security,
    BusinessCapability,
    PhoneNumberQuality,
    PhoneNumberName,
    TemplateStatus,
    TemplateQuality,
    CustomerIdentity,
    CustomerNumberChanged,
}

impl AccountEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AccountAlert => "account_alert",
            Self::AccountReview => "account_review",
            Self::AccountUpdate => "account_update",
            Self::Security => "security",
            Self::BusinessCapability => "business_capability",
            Self::PhoneNumberQuality => "phone_number_quality",
            Self::PhoneNumberName => "phone_number_name",
            Self::TemplateStatus => "template_status",
            Self::TemplateQuality => "template_quality",
            Self::CustomerIdentity => "customer_identity",
            Self::CustomerNumberChanged => "customer_number_changed",
        }
    }
}

/// Common context for every message-bearing event
#[derive(Debug, Clone)]
pub struct MessageEventContext {
    pub business_account_id: String,
    pub phone_number: BusinessPhoneNumber,
    pub provider_message_id: String,
    pub sender_phone: String,
    pub sender_name: Option<String>,
    /// Unix timestamp string as delivered by the provider
    pub timestamp: String,
    /// Provider message id of the message this one replies to
    pub replied_to: Option<String>,
}

/// A webhook payload demultiplexed into one typed event
#[derive(Debug, Clone)]
pub enum WebhookEvent {
    Message {
        context: MessageEventContext,
        kind: InboundMessageKind,
        /// Type-specific projection of the message body
        payload: serde_json::Value,
    },
    Status {
        business_account_id: String,
        provider_message_id: String,
        kind: StatusKind,
        recipient: String,
    },
    Account {
        business_account_id: String,
        kind: AccountEventKind,
        payload: serde_json::Value,
    },
    Unknown {
        business_account_id: String,
        field: String,
        payload: serde_json::Value,
    },
}

// ---------------------------------------------------------------------------
// Processor
// ---------------------------------------------------------------------------

/// Verifies signatures and demultiplexes webhook payloads for one account
pub struct WebhookProcessor {
    webhook_secret: String,
}

impl WebhookProcessor {
    pub fn new(webhook_secret: impl Into<String>) -> Self {
        Self {
            webhook_secret: webhook_secret.into(),
        }
    }

    /// Verify the `X-Hub-Signature-256` header against the raw request body
    pub fn verify_signature(&self, body: &[u8], signature: &str) -> Result<(), SignatureError> {
        let signature = signature.strip_prefix("sha256=").unwrap_or(signature);

        let expected = hex::decode(signature).map_err(|_| SignatureError::MalformedSignature)?;

        let mut mac = HmacSha256::new_from_slice(self.webhook_secret.as_bytes())
            .map_err(|_| SignatureError::InvalidSecret)?;
        mac.update(body);

        mac.verify_slice(&expected)
            .map_err(|_| SignatureError::Mismatch)
    }

    /// Verify (when a signature is present) and parse the payload
    pub fn process(
        &self,
        body: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookPayload, WebhookProcessingError> {
        if let Some(signature) = signature {
            self.verify_signature(body, signature)
                .map_err(WebhookProcessingError::Signature)?;
        }

        serde_json::from_slice(body).map_err(WebhookProcessingError::InvalidJson)
    }

    /// Flatten a payload into typed events in arrival order
    pub fn events(&self, payload: &WebhookPayload) -> Vec<WebhookEvent> {
        let mut events = Vec::new();

        for entry in &payload.entry {
            for change in &entry.changes {
                demux_change(&entry.id, change, &mut events);
            }
        }

        events
    }
}

fn demux_change(business_account_id: &str, change: &WebhookChange, events: &mut Vec<WebhookEvent>) {
    match change.field.as_str() {
        "messages" => demux_messages_field(business_account_id, &change.value, events),
        "account_alerts" => push_account(events, business_account_id, AccountEventKind::AccountAlert, &change.value),
        "account_review_update" => push_account(events, business_account_id, AccountEventKind::AccountReview, &change.value),
        "account_update" => push_account(events, business_account_id, AccountEventKind::AccountUpdate, &change.value),
        "security" => push_account(events, business_account_id, AccountEventKind::Security, &change.value),
        "business_capability_update" => push_account(events, business_account_id, AccountEventKind::BusinessCapability, &change.value),
        "phone_number_quality_update" => push_account(events, business_account_id, AccountEventKind::PhoneNumberQuality, &change.value),
        "phone_number_name_update" => push_account(events, business_account_id, AccountEventKind::PhoneNumberName, &change.value),
        "message_template_status_update" => push_account(events, business_account_id, AccountEventKind::TemplateStatus, &change.value),
        "message_template_quality_update" => push_account(events, business_account_id, AccountEventKind::TemplateQuality, &change.value),
        other => events.push(WebhookEvent::Unknown {
            business_account_id: business_account_id.to_string(),
            field: other.to_string(),
            payload: serde_json::to_value(&change.value).unwrap_or_default(),
        }),
    }
}

fn push_account(
    events: &mut Vec<WebhookEvent>,
    business_account_id: &str,
    kind: AccountEventKind,
    value: &ChangeValue,
) {
    events.push(WebhookEvent::Account {
        business_account_id: business_account_id.to_string(),
        kind,
        payload: serde_json::to_value(value).unwrap_or_default(),
    });
}

fn demux_messages_field(
    business_account_id: &str,
    value: &ChangeValue,
    events: &mut Vec<WebhookEvent>,
) {
    let phone_number = value
        .metadata
        .as_ref()
        .map(|metadata| BusinessPhoneNumber {
            id: metadata.phone_number_id.clone(),
            display_number: metadata.display_phone_number.clone(),
        })
        .unwrap_or_else(|| BusinessPhoneNumber {
            id: String::new(),
            display_number: String::new(),
        });

    if let Some(messages) = &value.messages {
        for message in messages {
            let sender_name = value.contacts.as_ref().and_then(|contacts| {
                contacts
                    .iter()
                    .find(|contact| contact.wa_id == message.from)
                    .and_then(|contact| contact.profile.as_ref().map(|p| p.name.clone()))
            });

            let context = MessageEventContext {
                business_account_id: business_account_id.to_string(),
                phone_number: phone_number.clone(),
                provider_message_id: message.id.clone(),
                sender_phone: message.from.clone(),
                sender_name,
                timestamp: message.timestamp.clone(),
                replied_to: message.context.as_ref().map(|c| c.id.clone()),
            };

            let (kind, payload) = project_message(message);

            // Identity/number changes arrive as system messages on the
            // messages field, but they are account-level notifications.
            if message.message_type == "system" {
                events.push(WebhookEvent::Account {
                    business_account_id: business_account_id.to_string(),
                    kind: system_event_kind(message),
                    payload,
                });
                continue;
            }

            events.push(WebhookEvent::Message {
                context,
                kind,
                payload,
            });
        }
    }

    if let Some(statuses) = &value.statuses {
        for status in statuses {
            let kind = match status.status.as_str() {
                "sent" => StatusKind::Sent,
                "delivered" => StatusKind::Delivered,
                "read" => StatusKind::Read,
                "failed" => StatusKind::Failed,
                "undelivered" => StatusKind::Undelivered,
                other => {
                    events.push(WebhookEvent::Unknown {
                        business_account_id: business_account_id.to_string(),
                        field: format!("status:{other}"),
                        payload: serde_json::to_value(status).unwrap_or_default(),
                    });
                    continue;
                }
            };

            events.push(WebhookEvent::Status {
                business_account_id: business_account_id.to_string(),
                provider_message_id: status.id.clone(),
                kind,
                recipient: status.recipient_id.clone(),
            });
        }
    }
}

fn system_event_kind(message: &InboundMessage) -> AccountEventKind {
    match message.system.as_ref().map(|s| s.kind.as_str()) {
        Some("user_changed_number") => AccountEventKind::CustomerNumberChanged,
        _ => AccountEventKind::CustomerIdentity,
    }
}

fn project_message(message: &InboundMessage) -> (InboundMessageKind, serde_json::Value) {
    fn value_of<T: Serialize>(content: &Option<T>) -> serde_json::Value {
        content
            .as_ref()
            .and_then(|c| serde_json::to_value(c).ok())
            .unwrap_or(serde_json::Value::Null)
    }

    match message.message_type.as_str() {
        "text" => (InboundMessageKind::Text, value_of(&message.text)),
        "image" => (InboundMessageKind::Image, value_of(&message.image)),
        "video" => (InboundMessageKind::Video, value_of(&message.video)),
        "audio" => (InboundMessageKind::Audio, value_of(&message.audio)),
        "document" => (InboundMessageKind::Document, value_of(&message.document)),
        "sticker" => (InboundMessageKind::Sticker, value_of(&message.sticker)),
        "reaction" => (InboundMessageKind::Reaction, value_of(&message.reaction)),
        "location" => (InboundMessageKind::Location, value_of(&message.location)),
        "contacts" => (InboundMessageKind::Contacts, value_of(&message.contacts)),
        "template" => (
            InboundMessageKind::Template,
            serde_json::to_value(message).unwrap_or(serde_json::Value::Null),
        ),
        "button" => (InboundMessageKind::QuickReply, value_of(&message.button)),
        "interactive" => match message.interactive.as_ref().map(|i| i.kind.as_str()) {
            Some("list_reply") => (
                InboundMessageKind::ListInteraction,
                value_of(&message.interactive),
            ),
            _ => (
                InboundMessageKind::ReplyButton,
                value_of(&message.interactive),
            ),
        },
        "system" => (InboundMessageKind::Unsupported, value_of(&message.system)),
        _ => (
            InboundMessageKind::Unsupported,
            serde_json::to_value(message).unwrap_or(serde_json::Value::Null),
        ),
    }
}

/// Signature verification errors
#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("malformed signature header")]
    MalformedSignature,
    #[error("invalid webhook secret")]
    InvalidSecret,
    #[error("signature mismatch")]
    Mismatch,
}

/// Webhook processing errors
#[derive(Debug, thiserror::Error)]
pub enum WebhookProcessingError {
    #[error("signature verification failed: {0}")]
    Signature(SignatureError),
    #[error("invalid webhook json: {0}")]
    InvalidJson(serde_json::Error),
}
