use serde::{Deserialize, Serialize};

/// Language selector for a template send
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateLanguage {
    pub code: String,
}

/// Media referenced by link in a template parameter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaLink {
    pub link: String,
}

/// Location payload for a LOCATION header parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationParameter {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

/// One parameter inside a template component
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TemplateParameter {
    Text { text: String },
    Image { image: MediaLink },
    Video { video: MediaLink },
    Document { document: MediaLink },
    Location { location: LocationParameter },
    Payload { payload: String },
}

/// One component of an outbound template message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateComponent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,
    pub parameters: Vec<TemplateParameter>,
}

impl TemplateComponent {
    /// Header component with the given parameters
    pub fn header(parameters: Vec<TemplateParameter>) -> Self {
        Self {
            kind: "header".to_string(),
            sub_type: None,
            index: None,
            parameters,
        }
    }

    /// Body component with the given parameters
    pub fn body(parameters: Vec<TemplateParameter>) -> Self {
        Self {
            kind: "body".to_string(),
            sub_type: None,
            index: None,
            parameters,
        }
    }

    /// Button component at the given declaration index
    pub fn button(sub_type: &str, index: usize, parameters: Vec<TemplateParameter>) -> Self {
        Self {
            kind: "button".to_string(),
            sub_type: Some(sub_type.to_string()),
            index: Some(index.to_string()),
            parameters,
        }
    }
}

/// Outbound template message content
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateMessage {
    pub name: String,
    pub language: TemplateLanguage,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub components: Vec<TemplateComponent>,
}

/// Text message content
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextContent {
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview_url: Option<bool>,
}

/// Media content referenced by uploaded id or public link
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediaContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

/// Message body variants accepted by the `/messages` endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MessageContent {
    Text { text: TextContent },
    Image { image: MediaContent },
    Video { video: MediaContent },
    Audio { audio: MediaContent },
    Document { document: MediaContent },
    Template { template: TemplateMessage },
}

/// Reply-to reference on an outbound message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageContext {
    pub message_id: String,
}

/// Full request body for the `/messages` endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub messaging_product: String,
    pub recipient_type: String,
    pub to: String,
    #[serde(flatten)]
    pub content: MessageContent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<MessageContext>,
}

impl OutboundMessage {
    fn with_content(to: impl Into<String>, content: MessageContent) -> Self {
        Self {
            messaging_product: "whatsapp".to_string(),
            recipient_type: "individual".to_string(),
            to: to.into(),
            content,
            context: None,
        }
    }

    /// Plain text message
    pub fn text(to: impl Into<String>, body: impl Into<String>) -> Self {
        Self::with_content(
            to,
            MessageContent::Text {
                text: TextContent {
                    body: body.into(),
                    preview_url: None,
                },
            },
        )
    }

    /// Template message
    pub fn template(to: impl Into<String>, template: TemplateMessage) -> Self {
        Self::with_content(to, MessageContent::Template { template })
    }

    /// Make this message a reply to a previous provider message id
    pub fn in_reply_to(mut self, message_id: impl Into<String>) -> Self {
        self.context = Some(MessageContext {
            message_id: message_id.into(),
        });
        self
    }
}

/// Contact echo in a send response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseContact {
    pub input: String,
    pub wa_id: String,
}

/// Provider-assigned id for an accepted message.
///
/// This id is the only key later status callbacks carry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentMessage {
    pub id: String,
}

/// Response body of a successful `/messages` call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageResponse {
    pub messaging_product: String,
    #[serde(default)]
    pub contacts: Vec<ResponseContact>,
    #[serde(default)]
    pub messages: Vec<SentMessage>,
}

impl SendMessageResponse {
    /// Provider message id of the first accepted message, if any
    pub fn provider_message_id(&self) -> Option<&str> {
        self.messages.first().map(|m| m.id.as_str())
    }
}

// ---------------------------------------------------------------------------
// Fetched template definitions
// ---------------------------------------------------------------------------

/// Component kind of a fetched template definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TemplateComponentKind {
    Header,
    Body,
    Footer,
    Buttons,
    #[serde(other)]
    Unknown,
}

/// Declared header format of a template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HeaderFormat {
    Text,
    Image,
    Video,
    Document,
    Location,
    #[serde(other)]
    Unknown,
}

/// Button kind declared on a template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ButtonKind {
    Url,
    QuickReply,
    PhoneNumber,
    CopyCode,
    #[serde(other)]
    Unknown,
}

/// Example placeholder block attached to a template component.
///
/// A non-empty example block means the component declares placeholders and a
/// send must supply parameters for them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComponentExample {
    #[serde(default)]
    pub body_text: Vec<Vec<String>>,
    #[serde(default)]
    pub header_text: Vec<String>,
    #[serde(default)]
    pub header_handle: Vec<String>,
}

impl ComponentExample {
    pub fn is_empty(&self) -> bool {
        self.body_text.is_empty() && self.header_text.is_empty() && self.header_handle.is_empty()
    }
}

/// Button declared on a fetched template
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ButtonDefinition {
    #[serde(rename = "type")]
    pub kind: ButtonKind,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub example: Vec<String>,
}

/// One component of a fetched template definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateComponentDefinition {
    #[serde(rename = "type")]
    pub kind: TemplateComponentKind,
    #[serde(default)]
    pub format: Option<HeaderFormat>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub example: Option<ComponentExample>,
    #[serde(default)]
    pub buttons: Vec<ButtonDefinition>,
}

/// Template definition as returned by the Graph API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateDefinition {
    pub id: String,
    pub name: String,
    pub language: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub components: Vec<TemplateComponentDefinition>,
}

impl TemplateDefinition {
    /// Whether any component declares example placeholders, i.e. a send
    /// without parameters would be rejected by the provider.
    pub fn requires_parameters(&self) -> bool {
        self.components.iter().any(|component| {
            component
                .example
                .as_ref()
                .map(|example| !example.is_empty())
                .unwrap_or(false)
                || component.buttons.iter().any(|button| !button.example.is_empty())
        })
    }
}
