//! Control-plane commands addressed to the campaign engine
//!
//! Commands travel as JSON on the `campaign-manager` bus channel. Any
//! process may publish them (typically the REST layer on an operator's
//! pause/cancel click); every engine process subscribes.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "commandType", rename_all = "snake_case")]
pub enum CampaignCommand {
    StopCampaign {
        #[serde(rename = "campaignId")]
        campaign_id: Uuid,
    },
}

impl CampaignCommand {
    pub fn stop(campaign_id: Uuid) -> Self {
        Self::StopCampaign { campaign_id }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
