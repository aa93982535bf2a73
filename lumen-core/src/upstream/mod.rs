use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::{JobSnapshot, Result};

mod replicate;

pub use replicate::{ReplicateClient, ReplicateConfig, DEFAULT_API_BASE};

/// The hosted generation service, reduced to the two calls the proxy needs.
#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Create a job for `external_model_id` with the given input parameters.
    async fn create(&self, external_model_id: &str, input: Map<String, Value>)
        -> Result<JobSnapshot>;

    /// Read the current state of job `id`.
    async fn get(&self, id: &str) -> Result<JobSnapshot>;
}
