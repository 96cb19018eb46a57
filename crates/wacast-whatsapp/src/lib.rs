//! # wacast-whatsapp
//!
//! Async client for the WhatsApp Business Platform Cloud API and the typed
//! webhook envelope it delivers.
//!
//! This crate covers:
//! - Sending template and session messages on behalf of any tenant phone
//!   number (the phone number id is a per-call argument, not client state)
//! - Fetching approved template definitions, including their example
//!   placeholder blocks
//! - Uploading, inspecting and downloading media
//! - Verifying webhook signatures and demultiplexing webhook payloads into
//!   typed events
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use wacast_whatsapp::{CloudApiClient, CloudApiConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = CloudApiClient::new(CloudApiConfig {
//!         access_token: "tenant_access_token".to_string(),
//!         ..Default::default()
//!     })?;
//!
//!     client.send_text("106540135772629", "15551234567", "Hello!").await?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod types;
pub mod webhook;

pub use client::{CloudApiClient, CloudApiConfig, CloudApiError, MediaInfoResponse, MediaUploadResponse};
pub use types::{
    ButtonDefinition, ButtonKind, ComponentExample, HeaderFormat, LocationParameter, MediaLink,
    MessageContent, OutboundMessage, SendMessageResponse, TemplateComponent,
    TemplateComponentDefinition, TemplateComponentKind, TemplateDefinition, TemplateLanguage,
    TemplateMessage, TemplateParameter,
};
pub use webhook::{
    AccountEventKind, BusinessPhoneNumber, InboundMessage, InboundMessageKind,
    MessageEventContext, SignatureError, StatusKind, WebhookEvent, WebhookPayload,
    WebhookProcessor, WebhookProcessingError,
};

/// Result type alias for Cloud API operations
pub type Result<T> = std::result::Result<T, CloudApiError>;
