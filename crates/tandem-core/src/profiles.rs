//! Seam to the external profile service, used to annotate conversation
//! lists with the other participant's display fields.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::warn;

use tandem_types::models::{ProfileSummary, Role};

#[async_trait]
pub trait ProfileDirectory: Send + Sync {
    /// Display summary for a user, `None` if the profile service does not know them.
    async fn summary(&self, user_id: &str) -> Result<Option<ProfileSummary>>;
}

/// Look up a summary, degrading to a placeholder on any failure.
pub(crate) async fn resolve(profiles: &dyn ProfileDirectory, user_id: &str) -> ProfileSummary {
    match profiles.summary(user_id).await {
        Ok(Some(summary)) => summary,
        Ok(None) => ProfileSummary::placeholder(user_id),
        Err(e) => {
            warn!("Profile lookup failed for {}: {}", user_id, e);
            ProfileSummary::placeholder(user_id)
        }
    }
}

pub(crate) async fn role_of(profiles: &dyn ProfileDirectory, user_id: &str) -> Option<Role> {
    match profiles.summary(user_id).await {
        Ok(summary) => summary.and_then(|s| s.role),
        Err(e) => {
            warn!("Profile lookup failed for {}: {}", user_id, e);
            None
        }
    }
}

/// Fixed in-memory profiles. Used when no profile service is configured.
#[derive(Default)]
pub struct StaticProfiles {
    profiles: RwLock<HashMap<String, ProfileSummary>>,
}

impl StaticProfiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, summary: ProfileSummary) {
        if let Ok(mut profiles) = self.profiles.write() {
            profiles.insert(summary.user_id.clone(), summary);
        }
    }
}

#[async_trait]
impl ProfileDirectory for StaticProfiles {
    async fn summary(&self, user_id: &str) -> Result<Option<ProfileSummary>> {
        let profiles = self
            .profiles
            .read()
            .map_err(|e| anyhow::anyhow!("profile lock poisoned: {}", e))?;
        Ok(profiles.get(user_id).cloned())
    }
}

/// Profile service reached over HTTP: `GET {base_url}/profiles/{user_id}`.
pub struct HttpProfileDirectory {
    client: reqwest::Client,
    base_url: String,
}

impl HttpProfileDirectory {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ProfileDirectory for HttpProfileDirectory {
    async fn summary(&self, user_id: &str) -> Result<Option<ProfileSummary>> {
        let url = format!("{}/profiles/{}", self.base_url, user_id);
        let resp = self.client.get(&url).send().await?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let summary = resp.error_for_status()?.json::<ProfileSummary>().await?;
        Ok(Some(summary))
    }
}
