//! Domain records and enums shared across subsystems
//!
//! These are plain data types, deliberately independent of the ORM models in
//! the database crate. The store trait speaks these; the database crate maps
//! its rows into them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Credentials the platform uses to act on behalf of a tenant at the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessAccountRecord {
    pub id: Uuid,
    /// Provider-assigned account id; webhook payloads are keyed by this
    pub account_id: String,
    pub access_token: String,
    pub webhook_secret: String,
    pub organization_id: Uuid,
}

/// Contact lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContactStatus {
    Active,
    Blocked,
}

impl ContactStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "Active",
            Self::Blocked => "Blocked",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Active" => Some(Self::Active),
            "Blocked" => Some(Self::Blocked),
            _ => None,
        }
    }
}

/// A tenant's contact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactRecord {
    pub id: Uuid,
    pub organization_id: Uuid,
    /// E.164, digits only
    pub phone: String,
    pub name: String,
    pub attributes: serde_json::Value,
    pub status: ContactStatus,
}

/// Who opened a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InitiatedBy {
    Contact,
    Campaign,
}

impl InitiatedBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Contact => "Contact",
            Self::Campaign => "Campaign",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Contact" => Some(Self::Contact),
            "Campaign" => Some(Self::Campaign),
            _ => None,
        }
    }
}

/// Conversation lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConversationStatus {
    Active,
    Closed,
    Deleted,
}

impl ConversationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "Active",
            Self::Closed => "Closed",
            Self::Deleted => "Deleted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Active" => Some(Self::Active),
            "Closed" => Some(Self::Closed),
            "Deleted" => Some(Self::Deleted),
            _ => None,
        }
    }
}

/// The thread between a tenant phone number and a contact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub contact_id: Uuid,
    pub phone_number_used: String,
    pub initiated_by: InitiatedBy,
    pub initiated_by_campaign_id: Option<Uuid>,
    pub status: ConversationStatus,
    pub created_at: DateTime<Utc>,
}

/// Message direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageDirection {
    Inbound,
    Outbound,
}

impl MessageDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inbound => "Inbound",
            Self::Outbound => "Outbound",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Inbound" => Some(Self::Inbound),
            "Outbound" => Some(Self::Outbound),
            _ => None,
        }
    }
}

/// Payload kind of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    Text,
    Image,
    Video,
    Audio,
    Document,
    Sticker,
    Reaction,
    Location,
    Template,
    Contacts,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "Text",
            Self::Image => "Image",
            Self::Video => "Video",
            Self::Audio => "Audio",
            Self::Document => "Document",
            Self::Sticker => "Sticker",
            Self::Reaction => "Reaction",
            Self::Location => "Location",
            Self::Template => "Template",
            Self::Contacts => "Contacts",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Text" => Some(Self::Text),
            "Image" => Some(Self::Image),
            "Video" => Some(Self::Video),
            "Audio" => Some(Self::Audio),
            "Document" => Some(Self::Document),
            "Sticker" => Some(Self::Sticker),
            "Reaction" => Some(Self::Reaction),
            "Location" => Some(Self::Location),
            "Template" => Some(Self::Template),
            "Contacts" => Some(Self::Contacts),
            _ => None,
        }
    }
}

/// Delivery status of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageStatus {
    Sent,
    Delivered,
    Read,
    Failed,
    UnDelivered,
    Unread,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "Sent",
            Self::Delivered => "Delivered",
            Self::Read => "Read",
            Self::Failed => "Failed",
            Self::UnDelivered => "UnDelivered",
            Self::Unread => "Unread",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Sent" => Some(Self::Sent),
            "Delivered" => Some(Self::Delivered),
            "Read" => Some(Self::Read),
            "Failed" => Some(Self::Failed),
            "UnDelivered" => Some(Self::UnDelivered),
            "Unread" => Some(Self::Unread),
            _ => None,
        }
    }

    /// Whether a status callback may move a message from `self` to `next`.
    ///
    /// Status only ever travels forward: Sent → Delivered → Read, or
    /// Sent → Failed | UnDelivered. The store never moves backward.
    pub fn can_advance_to(&self, next: MessageStatus) -> bool {
        use MessageStatus::*;
        match (self, next) {
            (Sent, Delivered) | (Sent, Read) | (Sent, Failed) | (Sent, UnDelivered) => true,
            (Delivered, Read) => true,
            (Unread, _) => matches!(next, Delivered | Read | Failed | UnDelivered),
            _ => false,
        }
    }
}

/// A persisted message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub conversation_id: Option<Uuid>,
    pub contact_id: Uuid,
    pub provider_message_id: Option<String>,
    pub direction: MessageDirection,
    pub kind: MessageKind,
    pub payload: serde_json::Value,
    pub status: MessageStatus,
    /// Provider message id of the message this one replies to
    pub replied_to: Option<String>,
    pub campaign_id: Option<Uuid>,
    pub phone_number_used: String,
    pub created_at: DateTime<Utc>,
}

/// A message about to be persisted
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub organization_id: Uuid,
    pub conversation_id: Option<Uuid>,
    pub contact_id: Uuid,
    pub provider_message_id: Option<String>,
    pub direction: MessageDirection,
    pub kind: MessageKind,
    pub payload: serde_json::Value,
    pub status: MessageStatus,
    pub replied_to: Option<String>,
    pub campaign_id: Option<Uuid>,
    pub phone_number_used: String,
    pub created_at: DateTime<Utc>,
}

/// Campaign lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CampaignStatus {
    Draft,
    Scheduled,
    Running,
    Paused,
    Finished,
    Cancelled,
}

impl CampaignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "Draft",
            Self::Scheduled => "Scheduled",
            Self::Running => "Running",
            Self::Paused => "Paused",
            Self::Finished => "Finished",
            Self::Cancelled => "Cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Draft" => Some(Self::Draft),
            "Scheduled" => Some(Self::Scheduled),
            "Running" => Some(Self::Running),
            "Paused" => Some(Self::Paused),
            "Finished" => Some(Self::Finished),
            "Cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Finished and Cancelled accept no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Cancelled)
    }

    /// Campaign fields (other than status) may only change in these states
    pub fn is_editable(&self) -> bool {
        matches!(self, Self::Draft | Self::Paused | Self::Scheduled)
    }

    /// Whether `self → next` is a legal transition. Self-transitions are
    /// allowed so repeated commands stay idempotent.
    pub fn can_transition_to(&self, next: CampaignStatus) -> bool {
        use CampaignStatus::*;
        if *self == next {
            return true;
        }
        match self {
            Draft => matches!(next, Scheduled | Running | Cancelled),
            Scheduled => matches!(next, Draft | Running | Cancelled),
            Running => matches!(next, Paused | Finished | Cancelled),
            Paused => matches!(next, Running | Cancelled),
            Finished | Cancelled => false,
        }
    }
}

/// How one template parameter slot is filled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    Static,
    Dynamic,
}

/// Contact field a dynamic parameter resolves from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DynamicField {
    FirstName,
    LastName,
    PhoneNumber,
}

/// One parameter slot binding stored on a campaign
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterInput {
    pub name_or_index: String,
    pub parameter_type: ParameterType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub static_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dynamic_field: Option<DynamicField>,
}

impl ParameterInput {
    /// Static binding with a fixed value
    pub fn fixed(name_or_index: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name_or_index: name_or_index.into(),
            parameter_type: ParameterType::Static,
            static_value: Some(value.into()),
            dynamic_field: None,
        }
    }

    /// Dynamic binding resolved from a contact field
    pub fn dynamic(name_or_index: impl Into<String>, field: DynamicField) -> Self {
        Self {
            name_or_index: name_or_index.into(),
            parameter_type: ParameterType::Dynamic,
            static_value: None,
            dynamic_field: Some(field),
        }
    }
}

/// Parameter bindings for every component of a template
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParameterBinding {
    pub header: Vec<ParameterInput>,
    pub body: Vec<ParameterInput>,
    pub buttons: Vec<ParameterInput>,
}

impl ParameterBinding {
    pub fn is_empty(&self) -> bool {
        self.header.is_empty() && self.body.is_empty() && self.buttons.is_empty()
    }
}

/// A planned bulk send of a single template to a contact list set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignRecord {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub business_account_id: Uuid,
    pub phone_number_to_use: String,
    /// Provider template id the campaign sends
    pub template_id: String,
    pub parameter_binding: Option<ParameterBinding>,
    pub status: CampaignStatus,
    pub sent_count: i64,
    pub error_count: i64,
    /// Resume cursor: the last contact a dispatch was attempted for
    pub last_contact_id: Option<Uuid>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn campaign_status_terminal_states_accept_nothing() {
        for next in [
            CampaignStatus::Draft,
            CampaignStatus::Running,
            CampaignStatus::Paused,
            CampaignStatus::Cancelled,
        ] {
            assert!(!CampaignStatus::Finished.can_transition_to(next));
        }
        assert!(!CampaignStatus::Cancelled.can_transition_to(CampaignStatus::Running));
    }

    #[test]
    fn campaign_status_transitions_are_idempotent() {
        assert!(CampaignStatus::Running.can_transition_to(CampaignStatus::Running));
        assert!(CampaignStatus::Finished.can_transition_to(CampaignStatus::Finished));
    }

    #[test]
    fn campaign_lifecycle_paths() {
        assert!(CampaignStatus::Draft.can_transition_to(CampaignStatus::Running));
        assert!(CampaignStatus::Scheduled.can_transition_to(CampaignStatus::Running));
        assert!(CampaignStatus::Running.can_transition_to(CampaignStatus::Paused));
        assert!(CampaignStatus::Paused.can_transition_to(CampaignStatus::Running));
        assert!(CampaignStatus::Running.can_transition_to(CampaignStatus::Finished));
        assert!(!CampaignStatus::Paused.can_transition_to(CampaignStatus::Finished));
    }

    #[test]
    fn editability_follows_status() {
        assert!(CampaignStatus::Draft.is_editable());
        assert!(CampaignStatus::Paused.is_editable());
        assert!(CampaignStatus::Scheduled.is_editable());
        assert!(!CampaignStatus::Running.is_editable());
        assert!(!CampaignStatus::Finished.is_editable());
    }

    #[test]
    fn message_status_never_moves_backward() {
        use MessageStatus::*;
        assert!(Sent.can_advance_to(Delivered));
        assert!(Sent.can_advance_to(Read));
        assert!(Delivered.can_advance_to(Read));
        assert!(Sent.can_advance_to(Failed));
        assert!(Sent.can_advance_to(UnDelivered));

        assert!(!Read.can_advance_to(Delivered));
        assert!(!Read.can_advance_to(Sent));
        assert!(!Delivered.can_advance_to(Sent));
        assert!(!Failed.can_advance_to(Delivered));
    }

    #[test]
    fn parameter_binding_json_uses_original_wire_names() {
        let binding = ParameterBinding {
            body: vec![ParameterInput::dynamic("1", DynamicField::FirstName)],
            ..Default::default()
        };
        let json = serde_json::to_value(&binding).unwrap();
        assert_eq!(json["body"][0]["nameOrIndex"], "1");
        assert_eq!(json["body"][0]["parameterType"], "dynamic");
        assert_eq!(json["body"][0]["dynamicField"], "firstName");
    }

    #[test]
    fn parameter_binding_empty_detection() {
        assert!(ParameterBinding::default().is_empty());
        let binding = ParameterBinding {
            buttons: vec![ParameterInput::fixed("0", "CODE")],
            ..Default::default()
        };
        assert!(!binding.is_empty());
    }
}
