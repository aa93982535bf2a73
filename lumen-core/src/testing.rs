//! Scripted [`GenerationService`] used by the unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::{GenerationService, JobSnapshot, Result};

#[derive(Default)]
struct FakeState {
    creates: Vec<(String, Map<String, Value>)>,
    gets: Vec<String>,
    create_results: VecDeque<Result<JobSnapshot>>,
    get_results: VecDeque<Result<JobSnapshot>>,
}

/// Answers `create` with `job-<n>` / `starting` and `get` with `processing`
/// unless a result has been queued.
#[derive(Default)]
pub struct FakeService {
    state: Mutex<FakeState>,
}

impl FakeService {
    pub fn push_snapshot(&self, snapshot: JobSnapshot) {
        self.state.lock().unwrap().get_results.push_back(Ok(snapshot));
    }

    pub fn push_get_error(&self, err: crate::Error) {
        self.state.lock().unwrap().get_results.push_back(Err(err));
    }

    pub fn push_create_error(&self, err: crate::Error) {
        self.state.lock().unwrap().create_results.push_back(Err(err));
    }

    pub fn creates(&self) -> Vec<(String, Map<String, Value>)> {
        self.state.lock().unwrap().creates.clone()
    }

    pub fn gets(&self) -> Vec<String> {
        self.state.lock().unwrap().gets.clone()
    }
}

#[async_trait]
impl GenerationService for FakeService {
    async fn create(
        &self,
        external_model_id: &str,
        input: Map<String, Value>,
    ) -> Result<JobSnapshot> {
        let mut state = self.state.lock().unwrap();
        state.creates.push((external_model_id.to_string(), input));
        let n = state.creates.len();
        state.create_results.pop_front().unwrap_or_else(|| {
            Ok(JobSnapshot {
                id: format!("job-{n}"),
                status: "starting".to_string(),
                ..Default::default()
            })
        })
    }

    async fn get(&self, id: &str) -> Result<JobSnapshot> {
        let mut state = self.state.lock().unwrap();
        state.gets.push(id.to_string());
        state.get_results.pop_front().unwrap_or_else(|| {
            Ok(JobSnapshot {
                id: id.to_string(),
                status: "processing".to_string(),
                ..Default::default()
            })
        })
    }
}
