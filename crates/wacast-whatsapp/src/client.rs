use crate::types::{
    OutboundMessage, SendMessageResponse, TemplateDefinition, TemplateMessage,
};
use reqwest::{multipart, Client as HttpClient, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use url::Url;

/// Cloud API configuration for one tenant business account.
///
/// The phone number id is deliberately not part of the configuration: a
/// business account owns several numbers and each campaign picks its own, so
/// the number is an argument on every call that needs one.
#[derive(Debug, Clone)]
pub struct CloudApiConfig {
    /// Access token of the business account
    pub access_token: String,
    /// Base URL for the Graph API (default: https://graph.facebook.com/v19.0)
    pub base_url: String,
}

impl Default for CloudApiConfig {
    fn default() -> Self {
        Self {
            access_token: String::new(),
            base_url: "https://graph.facebook.com/v19.0".to_string(),
        }
    }
}

impl CloudApiConfig {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            ..Default::default()
        }
    }
}

/// WhatsApp Cloud API client
#[derive(Debug, Clone)]
pub struct CloudApiClient {
    config: CloudApiConfig,
    http_client: HttpClient,
}

/// Media upload response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaUploadResponse {
    pub id: String,
}

/// Media info response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaInfoResponse {
    pub url: String,
    pub mime_type: String,
    pub sha256: String,
    pub file_size: u64,
    pub id: String,
    pub messaging_product: String,
}

impl CloudApiClient {
    /// Create a new client for one business account
    pub fn new(config: CloudApiConfig) -> Result<Self, CloudApiError> {
        let http_client = HttpClient::builder()
            .user_agent(concat!("wacast/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| CloudApiError::HttpClient(e.to_string()))?;

        Ok(Self {
            config,
            http_client,
        })
    }

    /// Send a generic message from the given phone number
    pub async fn send_message(
        &self,
        phone_number_id: &str,
        message: &OutboundMessage,
    ) -> Result<SendMessageResponse, CloudApiError> {
        let url = format!("{}/{}/messages", self.config.base_url, phone_number_id);

        debug!(to = %message.to, "sending message");

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.config.access_token)
            .json(message)
            .send()
            .await
            .map_err(|e| CloudApiError::HttpClient(e.to_string()))?;

        self.handle_response(response).await
    }

    /// Send a plain text message
    pub async fn send_text(
        &self,
        phone_number_id: &str,
        to: &str,
        body: &str,
    ) -> Result<SendMessageResponse, CloudApiError> {
        self.send_message(phone_number_id, &OutboundMessage::text(to, body))
            .await
    }

    /// Send a rendered template message
    pub async fn send_template(
        &self,
        phone_number_id: &str,
        to: &str,
        template: TemplateMessage,
    ) -> Result<SendMessageResponse, CloudApiError> {
        self.send_message(phone_number_id, &OutboundMessage::template(to, template))
            .await
    }

    /// Fetch an approved template definition by its template id
    pub async fn fetch_template(
        &self,
        template_id: &str,
    ) -> Result<TemplateDefinition, CloudApiError> {
        let url = format!("{}/{}", self.config.base_url, template_id);

        debug!(template_id, "fetching template definition");

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(&self.config.access_token)
            .send()
            .await
            .map_err(|e| CloudApiError::HttpClient(e.to_string()))?;

        self.handle_response(response).await
    }

    /// Upload media bytes for use in outbound messages
    pub async fn upload_media(
        &self,
        phone_number_id: &str,
        data: Vec<u8>,
        filename: &str,
        mime_type: &str,
    ) -> Result<MediaUploadResponse, CloudApiError> {
        let file_part = multipart::Part::bytes(data)
            .file_name(filename.to_string())
            .mime_str(mime_type)
            .map_err(|e| CloudApiError::InvalidMedia(e.to_string()))?;

        let form = multipart::Form::new()
            .part("file", file_part)
            .text("type", mime_type.to_string())
            .text("messaging_product", "whatsapp");

        let url = format!("{}/{}/media", self.config.base_url, phone_number_id);

        debug!(filename, "uploading media");

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.config.access_token)
            .multipart(form)
            .send()
            .await
            .map_err(|e| CloudApiError::HttpClient(e.to_string()))?;

        self.handle_response(response).await
    }

    /// Resolve a media id to its download URL and metadata
    pub async fn media_info(&self, media_id: &str) -> Result<MediaInfoResponse, CloudApiError> {
        let url = format!("{}/{}", self.config.base_url, media_id);

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(&self.config.access_token)
            .send()
            .await
            .map_err(|e| CloudApiError::HttpClient(e.to_string()))?;

        self.handle_response(response).await
    }

    /// Download media bytes from a URL returned by `media_info`
    pub async fn download_media(&self, media_url: &str) -> Result<Vec<u8>, CloudApiError> {
        let response = self
            .http_client
            .get(media_url)
            .bearer_auth(&self.config.access_token)
            .send()
            .await
            .map_err(|e| CloudApiError::HttpClient(e.to_string()))?;

        if !response.status().is_success() {
            error!(status = %response.status(), "media download failed");
            return Err(CloudApiError::Api(format!(
                "media download failed: {}",
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| CloudApiError::HttpClient(e.to_string()))?;

        Ok(bytes.to_vec())
    }

    /// Mark an inbound message as read at the provider
    pub async fn mark_message_read(
        &self,
        phone_number_id: &str,
        provider_message_id: &str,
    ) -> Result<(), CloudApiError> {
        let url = format!("{}/{}/messages", self.config.base_url, phone_number_id);

        let body = serde_json::json!({
            "messaging_product": "whatsapp",
            "status": "read",
            "message_id": provider_message_id,
        });

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.config.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| CloudApiError::HttpClient(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            let error_text = response.text().await.unwrap_or_default();
            error!(provider_message_id, "mark-as-read failed: {}", error_text);
            Err(CloudApiError::Api(error_text))
        }
    }

    async fn handle_response<T>(&self, response: Response) -> Result<T, CloudApiError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let status = response.status();
        let response_text = response
            .text()
            .await
            .map_err(|e| CloudApiError::HttpClient(e.to_string()))?;

        debug!(%status, "cloud api response");

        if status.is_success() {
            serde_json::from_str(&response_text).map_err(|e| CloudApiError::Parse(e.to_string()))
        } else {
            match serde_json::from_str::<GraphErrorResponse>(&response_text) {
                Ok(graph_error) => {
                    error!(code = graph_error.error.code, "cloud api error: {}", graph_error.error.message);
                    Err(CloudApiError::Api(graph_error.error.message))
                }
                Err(_) => Err(CloudApiError::Http {
                    status: status.as_u16(),
                    message: response_text,
                }),
            }
        }
    }

    /// Normalize a phone number to E.164 digits.
    ///
    /// Accepts separators and a leading `+`; rejects lengths outside 10..=15.
    pub fn normalize_phone_number(phone: &str) -> Result<String, CloudApiError> {
        let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();

        if digits.len() < 10 || digits.len() > 15 {
            return Err(CloudApiError::InvalidPhoneNumber(phone.to_string()));
        }

        Ok(digits)
    }

    /// Validate a media link is an absolute http(s) URL
    pub fn validate_media_url(url: &str) -> Result<String, CloudApiError> {
        match Url::parse(url) {
            Ok(parsed) if parsed.scheme() == "http" || parsed.scheme() == "https" => {
                Ok(url.to_string())
            }
            _ => Err(CloudApiError::InvalidUrl(url.to_string())),
        }
    }
}

/// Error body the Graph API returns on failures
#[derive(Debug, Clone, Deserialize)]
struct GraphErrorResponse {
    error: GraphError,
}

#[derive(Debug, Clone, Deserialize)]
struct GraphError {
    #[serde(default)]
    code: i64,
    message: String,
}

/// Cloud API errors
#[derive(Debug, thiserror::Error)]
pub enum CloudApiError {
    #[error("http client error: {0}")]
    HttpClient(String),
    #[error("http error {status}: {message}")]
    Http { status: u16, message: String },
    #[error("cloud api error: {0}")]
    Api(String),
    #[error("response parse error: {0}")]
    Parse(String),
    #[error("invalid media: {0}")]
    InvalidMedia(String),
    #[error("invalid phone number: {0}")]
    InvalidPhoneNumber(String),
    #[error("invalid url: {0}")]
    InvalidUrl(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_phone_number_strips_separators() {
        assert_eq!(
            CloudApiClient::normalize_phone_number("+1 555-123-4567").unwrap(),
            "15551234567"
        );
        assert_eq!(
            CloudApiClient::normalize_phone_number("919876543210").unwrap(),
            "919876543210"
        );
    }

    #[test]
    fn normalize_phone_number_rejects_bad_lengths() {
        assert!(CloudApiClient::normalize_phone_number("123").is_err());
        assert!(CloudApiClient::normalize_phone_number("1234567890123456789").is_err());
        assert!(CloudApiClient::normalize_phone_number("").is_err());
    }

    #[test]
    fn validate_media_url_requires_http() {
        assert!(CloudApiClient::validate_media_url("https://cdn.example.com/a.jpg").is_ok());
        assert!(CloudApiClient::validate_media_url("ftp://example.com/a.jpg").is_err());
        assert!(CloudApiClient::validate_media_url("not-a-url").is_err());
    }
}
