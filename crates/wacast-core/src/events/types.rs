//! Event envelope and vocabulary

use crate::entities::{CampaignStatus, ConversationRecord, MessageRecord};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Every event kind the platform publishes on the api-server channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    NewMessage,
    NewConversation,
    CampaignProgress,
    MessageRead,
    MessageDelivered,
    MessageFailed,
    ChatAssignment,
    ChatUnAssignment,
    ConversationClosed,
    ReloadRequired,
    NewNotification,
    Error,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NewMessage => "NewMessage",
            Self::NewConversation => "NewConversation",
            Self::CampaignProgress => "CampaignProgress",
            Self::MessageRead => "MessageRead",
            Self::MessageDelivered => "MessageDelivered",
            Self::MessageFailed => "MessageFailed",
            Self::ChatAssignment => "ChatAssignment",
            Self::ChatUnAssignment => "ChatUnAssignment",
            Self::ConversationClosed => "ConversationClosed",
            Self::ReloadRequired => "ReloadRequired",
            Self::NewNotification => "NewNotification",
            Self::Error => "Error",
        }
    }
}

/// Tagged event as it travels on the bus.
///
/// `organization_id`/`user_id` form the audience: both absent means
/// broadcast, either present restricts delivery to matching sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiServerEvent {
    pub event: EventKind,
    pub data: serde_json::Value,
    #[serde(rename = "userId", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
    #[serde(rename = "organizationId", skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<Uuid>,
}

/// Progress snapshot the engine publishes while a campaign runs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignProgressData {
    pub campaign_id: Uuid,
    pub messages_sent: i64,
    pub messages_errored: i64,
    pub status: CampaignStatus,
}

/// Operator notification payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationData {
    pub title: String,
    pub message: String,
}

impl ApiServerEvent {
    /// Whether a session identified by (organization, user) should see this
    /// event. An absent audience field matches every session.
    pub fn matches_session(&self, organization_id: Uuid, user_id: Uuid) -> bool {
        if let Some(event_org) = self.organization_id {
            if event_org != organization_id {
                return false;
            }
        }
        if let Some(event_user) = self.user_id {
            if event_user != user_id {
                return false;
            }
        }
        true
    }

    /// Serialize for the bus; the envelope is plain JSON on the wire
    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    pub fn new_message(conversation: &ConversationRecord, message: &MessageRecord) -> Self {
        Self {
            event: EventKind::NewMessage,
            data: serde_json::json!({
                "conversation": conversation,
                "message": message,
            }),
            user_id: None,
            organization_id: Some(conversation.organization_id),
        }
    }

    pub fn new_conversation(conversation: &ConversationRecord) -> Self {
        Self {
            event: EventKind::NewConversation,
            data: serde_json::json!({ "conversation": conversation }),
            user_id: None,
            organization_id: Some(conversation.organization_id),
        }
    }

    pub fn campaign_progress(progress: CampaignProgressData, organization_id: Uuid) -> Self {
        Self {
            event: EventKind::CampaignProgress,
            data: serde_json::to_value(&progress).unwrap_or_default(),
            user_id: None,
            organization_id: Some(organization_id),
        }
    }

    fn message_status(kind: EventKind, message_id: Uuid, organization_id: Uuid) -> Self {
        Self {
            event: kind,
            data: serde_json::json!({ "messageId": message_id }),
            user_id: None,
            organization_id: Some(organization_id),
        }
    }

    pub fn message_read(message_id: Uuid, organization_id: Uuid) -> Self {
        Self::message_status(EventKind::MessageRead, message_id, organization_id)
    }

    pub fn message_delivered(message_id: Uuid, organization_id: Uuid) -> Self {
        Self::message_status(EventKind::MessageDelivered, message_id, organization_id)
    }

    pub fn message_failed(message_id: Uuid, organization_id: Uuid) -> Self {
        Self::message_status(EventKind::MessageFailed, message_id, organization_id)
    }

    pub fn conversation_closed(conversation_id: Uuid, organization_id: Uuid) -> Self {
        Self {
            event: EventKind::ConversationClosed,
            data: serde_json::json!({ "conversationId": conversation_id }),
            user_id: None,
            organization_id: Some(organization_id),
        }
    }

    pub fn chat_assignment(conversation_id: Uuid, user_id: Uuid, organization_id: Uuid) -> Self {
        Self {
            event: EventKind::ChatAssignment,
            data: serde_json::json!({ "conversationId": conversation_id }),
            user_id: Some(user_id),
            organization_id: Some(organization_id),
        }
    }

    pub fn chat_unassignment(conversation_id: Uuid, user_id: Uuid, organization_id: Uuid) -> Self {
        Self {
            event: EventKind::ChatUnAssignment,
            data: serde_json::json!({ "conversationId": conversation_id }),
            user_id: Some(user_id),
            organization_id: Some(organization_id),
        }
    }

    pub fn reload_required(organization_id: Uuid) -> Self {
        Self {
            event: EventKind::ReloadRequired,
            data: serde_json::json!({ "isReloadRequired": true }),
            user_id: None,
            organization_id: Some(organization_id),
        }
    }

    pub fn notification(notification: NotificationData, organization_id: Option<Uuid>) -> Self {
        Self {
            event: EventKind::NewNotification,
            data: serde_json::to_value(&notification).unwrap_or_default(),
            user_id: None,
            organization_id,
        }
    }

    pub fn error(message: impl Into<String>, organization_id: Option<Uuid>) -> Self {
        Self {
            event: EventKind::Error,
            data: serde_json::json!({ "error": message.into() }),
            user_id: None,
            organization_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(organization_id: Option<Uuid>, user_id: Option<Uuid>) -> ApiServerEvent {
        ApiServerEvent {
            event: EventKind::ReloadRequired,
            data: serde_json::json!({}),
            user_id,
            organization_id,
        }
    }

    #[test]
    fn audience_filter_matches_spec_matrix() {
        let org_a = Uuid::new_v4();
        let org_b = Uuid::new_v4();
        let user_1 = Uuid::new_v4();
        let user_2 = Uuid::new_v4();

        // Session: user_1 in org_a.
        assert!(event(Some(org_a), None).matches_session(org_a, user_1));
        assert!(!event(Some(org_b), None).matches_session(org_a, user_1));
        assert!(event(None, Some(user_1)).matches_session(org_a, user_1));
        // userId mismatch filters even when the org matches.
        assert!(!event(Some(org_a), Some(user_2)).matches_session(org_a, user_1));
        // Broadcast reaches everyone.
        assert!(event(None, None).matches_session(org_a, user_1));
    }

    #[test]
    fn envelope_wire_shape() {
        let organization_id = Uuid::new_v4();
        let event = ApiServerEvent::campaign_progress(
            CampaignProgressData {
                campaign_id: Uuid::new_v4(),
                messages_sent: 10,
                messages_errored: 1,
                status: CampaignStatus::Running,
            },
            organization_id,
        );

        let json: serde_json::Value = serde_json::from_slice(&event.to_bytes()).unwrap();
        assert_eq!(json["event"], "CampaignProgress");
        assert_eq!(json["data"]["messagesSent"], 10);
        assert_eq!(json["organizationId"], organization_id.to_string());
        assert!(json.get("userId").is_none());
    }

    #[test]
    fn envelope_roundtrip() {
        let original = ApiServerEvent::message_read(Uuid::new_v4(), Uuid::new_v4());
        let parsed = ApiServerEvent::from_bytes(&original.to_bytes()).unwrap();
        assert_eq!(parsed.event, EventKind::MessageRead);
        assert_eq!(parsed.organization_id, original.organization_id);
    }
}
