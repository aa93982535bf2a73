use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    GenerationApi, GenerationRequest, GenerationService, Job, JobSubmitter, ModelRegistry, Result,
    StatusOutcome, StatusPoller, SubmitterConfig,
};

/// In-process facade bundling the registry, submitter and poller around one
/// upstream service.
#[derive(Clone)]
pub struct Generator {
    registry: Arc<ModelRegistry>,
    submitter: JobSubmitter,
    poller: StatusPoller,
}

impl Generator {
    pub fn new(service: Arc<dyn GenerationService>, config: SubmitterConfig) -> Self {
        let registry = Arc::new(ModelRegistry::builtin());
        Self {
            submitter: JobSubmitter::new(registry.clone(), service.clone(), config),
            poller: StatusPoller::new(service),
            registry,
        }
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn submitter(&self) -> &JobSubmitter {
        &self.submitter
    }

    pub fn poller(&self) -> &StatusPoller {
        &self.poller
    }
}

#[async_trait]
impl GenerationApi for Generator {
    async fn submit(&self, prompt: &str, model: &str) -> Result<Job> {
        self.submitter
            .submit(&GenerationRequest::new(prompt, model))
            .await
    }

    async fn check_status(&self, job_id: &str) -> Result<StatusOutcome> {
        self.poller.check_status(Some(job_id)).await
    }
}
