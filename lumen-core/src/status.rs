use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::{Error, GenerationService, JobSnapshot, JobStatus, Result, StatusOutcome};

/// Pick the image URL out of a job's output.
///
/// The upstream returns either a list of URLs (we take the first) or a single
/// URL string. Every other shape is rejected.
pub fn extract_image_url(output: &Value) -> Result<String> {
    let url = match output {
        Value::Array(items) => match items.first() {
            Some(Value::String(url)) => url,
            Some(_) => return Err(Error::upstream("Unexpected output format")),
            None => return Err(Error::upstream("No image URL generated")),
        },
        Value::String(url) => url,
        _ => return Err(Error::upstream("Unexpected output format")),
    };

    if url.trim().is_empty() {
        return Err(Error::upstream("No image URL generated"));
    }
    Ok(url.clone())
}

/// Collapse an upstream snapshot into one of processing / success / failed.
pub fn normalize(snapshot: &JobSnapshot) -> Result<StatusOutcome> {
    if let Some(error) = snapshot.error() {
        return Ok(StatusOutcome::Failed {
            reason: error.clone(),
        });
    }

    match snapshot.status() {
        JobStatus::Succeeded => {
            let output = snapshot
                .output()
                .ok_or_else(|| Error::upstream("Invalid prediction response structure"))?;
            Ok(StatusOutcome::Success {
                image_url: extract_image_url(output)?,
            })
        }
        // A failure without a reason is not something we can report faithfully.
        JobStatus::Failed => Err(Error::upstream(format!(
            "job {} ended with status '{}' but no error",
            snapshot.id, snapshot.status
        ))),
        JobStatus::Processing => Ok(StatusOutcome::Processing {
            status: snapshot.status.clone(),
        }),
    }
}

/// Stateless status lookups against the upstream service.
#[derive(Clone)]
pub struct StatusPoller {
    service: Arc<dyn GenerationService>,
}

impl StatusPoller {
    pub fn new(service: Arc<dyn GenerationService>) -> Self {
        Self { service }
    }

    pub async fn check_status(&self, job_id: Option<&str>) -> Result<StatusOutcome> {
        let job_id = job_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::Validation("Prediction ID is required".to_string()))?;

        let snapshot = self.service.get(job_id).await?;
        debug!(job_id, status = %snapshot.status, "checked job status");
        normalize(&snapshot)
    }
}
