use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde_json::{json, Map, Value};
use tracing::debug;

use super::GenerationService;
use crate::{Error, JobSnapshot, Result};

pub const DEFAULT_API_BASE: &str = "https://api.replicate.com/v1";

#[derive(Debug, Clone)]
pub struct ReplicateConfig {
    pub api_base: String,
    pub api_token: String,
    /// Ceiling for a single HTTP exchange with the upstream.
    pub request_timeout: Duration,
}

impl Default for ReplicateConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            api_token: String::new(),
            request_timeout: Duration::from_secs(180),
        }
    }
}

/// [`GenerationService`] backed by the Replicate predictions API.
#[derive(Debug, Clone)]
pub struct ReplicateClient {
    api_base: String,
    api_token: String,
    http: Client,
}

impl ReplicateClient {
    pub fn new(config: ReplicateConfig) -> Result<Self> {
        let api_token = config.api_token.trim().to_string();
        if api_token.is_empty() {
            return Err(Error::Auth("no API token configured".to_string()));
        }
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| Error::upstream(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            api_base: config.api_base.trim().trim_end_matches('/').to_string(),
            api_token,
            http,
        })
    }

    fn create_endpoint(&self, external_model_id: &str) -> String {
        format!("{}/models/{}/predictions", self.api_base, external_model_id)
    }

    /// The id lands in the URL path, so only plain id characters are accepted.
    fn prediction_endpoint(&self, id: &str) -> Result<String> {
        let plain = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !plain {
            return Err(Error::Validation("Invalid prediction ID".to_string()));
        }
        Ok(format!("{}/predictions/{}", self.api_base, id))
    }

    /// Turn an upstream response into a snapshot, classifying failures.
    async fn decode(response: Response) -> Result<JobSnapshot> {
        let status = response.status();
        let body = response.text().await?;

        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return Err(Error::Auth(format!("upstream answered {status}: {body}")));
        }
        if !status.is_success() {
            return Err(Error::upstream(format!("HTTP {status}: {body}")));
        }

        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl GenerationService for ReplicateClient {
    async fn create(
        &self,
        external_model_id: &str,
        input: Map<String, Value>,
    ) -> Result<JobSnapshot> {
        let endpoint = self.create_endpoint(external_model_id);
        debug!(%endpoint, "creating prediction");

        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(&self.api_token)
            .json(&json!({ "input": input }))
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn get(&self, id: &str) -> Result<JobSnapshot> {
        let endpoint = self.prediction_endpoint(id)?;
        let response = self
            .http
            .get(&endpoint)
            .bearer_auth(&self.api_token)
            .send()
            .await?;
        Self::decode(response).await
    }
}
