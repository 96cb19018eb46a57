//! Upstream provider seam
//!
//! The engine depends on this trait rather than the HTTP client so dispatch
//! logic can be exercised against a scripted provider in tests.

use crate::entities::BusinessAccountRecord;
use crate::errors::{CoreError, CoreResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use wacast_whatsapp::types::{TemplateDefinition, TemplateMessage};
use wacast_whatsapp::{CloudApiClient, CloudApiConfig};

/// The two provider calls campaign dispatch needs
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Fetch a template definition with the account's credentials
    async fn fetch_template(
        &self,
        account: &BusinessAccountRecord,
        template_id: &str,
    ) -> CoreResult<TemplateDefinition>;

    /// Send a rendered template; returns the provider message id
    async fn send_template(
        &self,
        account: &BusinessAccountRecord,
        phone_number_id: &str,
        to: &str,
        message: TemplateMessage,
    ) -> CoreResult<String>;
}

/// Graph API implementation; one HTTP client per business account, built
/// lazily and kept for the process lifetime
pub struct GraphProvider {
    base_url: Option<String>,
    clients: RwLock<HashMap<String, Arc<CloudApiClient>>>,
}

impl GraphProvider {
    pub fn new() -> Self {
        Self {
            base_url: None,
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Point at a non-default Graph endpoint (tests, proxies)
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: Some(base_url.into()),
            clients: RwLock::new(HashMap::new()),
        }
    }

    async fn client_for(&self, account: &BusinessAccountRecord) -> CoreResult<Arc<CloudApiClient>> {
        {
            let clients = self.clients.read().await;
            if let Some(client) = clients.get(&account.account_id) {
                return Ok(client.clone());
            }
        }

        let mut config = CloudApiConfig::new(account.access_token.clone());
        if let Some(base_url) = &self.base_url {
            config.base_url = base_url.clone();
        }
        let client = Arc::new(CloudApiClient::new(config)?);

        let mut clients = self.clients.write().await;
        Ok(clients
            .entry(account.account_id.clone())
            .or_insert(client)
            .clone())
    }

    /// Drop the cached client after a credential rotation
    pub async fn invalidate(&self, account_id: &str) {
        self.clients.write().await.remove(account_id);
    }
}

impl Default for GraphProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderClient for GraphProvider {
    async fn fetch_template(
        &self,
        account: &BusinessAccountRecord,
        template_id: &str,
    ) -> CoreResult<TemplateDefinition> {
        let client = self.client_for(account).await?;
        client
            .fetch_template(template_id)
            .await
            .map_err(CoreError::from)
    }

    async fn send_template(
        &self,
        account: &BusinessAccountRecord,
        phone_number_id: &str,
        to: &str,
        message: TemplateMessage,
    ) -> CoreResult<String> {
        let client = self.client_for(account).await?;
        let response = client
            .send_template(phone_number_id, to, message)
            .await
            .map_err(CoreError::from)?;

        response
            .provider_message_id()
            .map(str::to_string)
            .ok_or_else(|| CoreError::external("cloud api", "send response carried no message id"))
    }
}
