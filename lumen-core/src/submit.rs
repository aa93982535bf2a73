use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::{
    status, Error, GenerationService, Job, JobSnapshot, JobStatus, ModelConfig, ModelRegistry,
    Result, StatusOutcome,
};

/// Exclusive upper bound for generated seeds.
pub const SEED_CEILING: u32 = 2_147_483_647;

/// Inbound submission. Both fields are optional on the wire so that a missing
/// field is reported as a validation failure rather than a decode error.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct GenerationRequest {
    pub prompt: Option<String>,
    pub model: Option<String>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt: Some(prompt.into()),
            model: Some(model.into()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SubmitterConfig {
    /// Ceiling for synchronous mode, submission included.
    pub wait_timeout: Duration,
    /// Delay between upstream reads while waiting synchronously.
    pub wait_poll_interval: Duration,
}

impl Default for SubmitterConfig {
    fn default() -> Self {
        Self {
            wait_timeout: Duration::from_secs(150),
            wait_poll_interval: Duration::from_secs(1),
        }
    }
}

/// Fresh seed in `[0, SEED_CEILING)`.
pub fn random_seed() -> u32 {
    rand::thread_rng().gen_range(0..SEED_CEILING)
}

/// Registry defaults with `prompt` and `seed` filled in.
pub fn effective_parameters(config: &ModelConfig, prompt: &str, seed: u32) -> Map<String, Value> {
    let mut params = config.default_parameters.clone();
    params.insert("prompt".to_string(), Value::from(prompt));
    params.insert("seed".to_string(), Value::from(seed));
    params
}

/// Validates requests and creates upstream jobs.
#[derive(Clone)]
pub struct JobSubmitter {
    registry: Arc<ModelRegistry>,
    service: Arc<dyn GenerationService>,
    config: SubmitterConfig,
}

impl JobSubmitter {
    pub fn new(
        registry: Arc<ModelRegistry>,
        service: Arc<dyn GenerationService>,
        config: SubmitterConfig,
    ) -> Self {
        Self {
            registry,
            service,
            config,
        }
    }

    fn validate<'a>(&'a self, request: &'a GenerationRequest) -> Result<(&'a str, &'a ModelConfig)> {
        let prompt = request
            .prompt
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| Error::Validation("Prompt is required".to_string()))?;
        let model = request
            .model
            .as_deref()
            .and_then(|name| self.registry.lookup(name))
            .ok_or_else(|| Error::Validation("Invalid model selected".to_string()))?;
        Ok((prompt, model))
    }

    async fn create(&self, request: &GenerationRequest) -> Result<JobSnapshot> {
        let (prompt, model) = self.validate(request)?;
        let seed = random_seed();
        let input = effective_parameters(model, prompt, seed);

        info!(model = %model.key, seed, "submitting generation job");
        let snapshot = self.service.create(&model.external_model_id, input).await?;
        if snapshot.id.trim().is_empty() {
            return Err(Error::upstream("No prediction ID received from upstream"));
        }
        debug!(job_id = %snapshot.id, status = %snapshot.status, "job accepted");
        Ok(snapshot)
    }

    /// Create the job and return as soon as the upstream acknowledges it.
    pub async fn submit(&self, request: &GenerationRequest) -> Result<Job> {
        let snapshot = self.create(request).await?;
        Ok(Job {
            id: snapshot.id,
            status: JobStatus::Processing,
        })
    }

    /// Create the job and block until it settles or `wait_timeout` elapses.
    /// Returns the image URL.
    pub async fn submit_and_wait(&self, request: &GenerationRequest) -> Result<String> {
        // validation errors must not be masked by the timeout
        self.validate(request)?;

        let settled = tokio::time::timeout(self.config.wait_timeout, async {
            let mut snapshot = self.create(request).await?;
            while snapshot.error().is_none() && !snapshot.status().is_terminal() {
                tokio::time::sleep(self.config.wait_poll_interval).await;
                snapshot = self.service.get(&snapshot.id).await?;
            }
            Ok::<_, Error>(snapshot)
        })
        .await
        .map_err(|_| Error::Timeout("Request timeout".to_string()))??;

        match status::normalize(&settled)? {
            StatusOutcome::Success { image_url } => {
                info!(job_id = %settled.id, %image_url, "job finished");
                Ok(image_url)
            }
            StatusOutcome::Failed { reason } => Err(Error::JobFailed(reason)),
            StatusOutcome::Processing { status } => Err(Error::upstream(format!(
                "job {} still '{status}' after settling",
                settled.id
            ))),
        }
    }
}
