use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Normalized job state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Processing,
    Succeeded,
    Failed,
}

impl JobStatus {
    /// Map the upstream vocabulary (`starting`, `processing`, `succeeded`,
    /// `failed`, `canceled`) onto the three normalized states. Anything we
    /// don't recognize is still in flight.
    pub fn from_upstream(status: &str) -> Self {
        match status.trim().to_ascii_lowercase().as_str() {
            "succeeded" => Self::Succeeded,
            "failed" | "canceled" => Self::Failed,
            _ => Self::Processing,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// Last observed state of an upstream job, as the upstream reports it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
}

impl JobSnapshot {
    pub fn status(&self) -> JobStatus {
        JobStatus::from_upstream(&self.status)
    }

    /// The `error` field, treating JSON `null` as absent.
    pub fn error(&self) -> Option<&Value> {
        self.error.as_ref().filter(|e| !e.is_null())
    }

    /// The `output` field, treating JSON `null` as absent.
    pub fn output(&self) -> Option<&Value> {
        self.output.as_ref().filter(|o| !o.is_null())
    }
}

/// Handle returned to the caller right after submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub id: String,
    pub status: JobStatus,
}

/// Result of one status check.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusOutcome {
    /// Still running; carries the raw upstream status string.
    Processing { status: String },
    Success { image_url: String },
    Failed { reason: Value },
}
