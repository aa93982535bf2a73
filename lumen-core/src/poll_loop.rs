//! Caller-side driver for the submit / poll protocol.
//!
//! A [`PollLoop`] owns one session's "current job" cell. Each call to
//! [`PollLoop::submit`] cancels whatever loop was running, bumps the session
//! generation and spawns a fresh task bound to that generation. Writes to the
//! cell are accepted only from the task whose generation is still current,
//! so a response for a superseded job can never overwrite the state of the
//! job that replaced it.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::{Job, Result, StatusOutcome};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Submit and status calls as seen by a caller, either in-process or over HTTP.
#[async_trait]
pub trait GenerationApi: Send + Sync {
    async fn submit(&self, prompt: &str, model: &str) -> Result<Job>;

    async fn check_status(&self, job_id: &str) -> Result<StatusOutcome>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Submitting,
    Polling {
        job_id: String,
        status: String,
    },
    Done {
        job_id: String,
        image_url: String,
    },
    Errored {
        job_id: Option<String>,
        reason: String,
    },
}

impl LoopState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Errored { .. })
    }

    /// Submitting or polling.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Submitting | Self::Polling { .. })
    }
}

/// The single state cell plus the generation that may write to it.
struct Session {
    generation: Mutex<u64>,
    state: watch::Sender<LoopState>,
}

impl Session {
    fn new() -> Self {
        let (state, _) = watch::channel(LoopState::Idle);
        Self {
            generation: Mutex::new(0),
            state,
        }
    }

    /// Start a new generation, publishing `initial` for it.
    fn begin(&self, initial: LoopState) -> u64 {
        let mut generation = self
            .generation
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *generation += 1;
        self.state.send_replace(initial);
        *generation
    }

    /// Publish `next` if `generation` is still current. Returns false for a
    /// superseded writer.
    fn publish(&self, generation: u64, next: LoopState) -> bool {
        let current = self
            .generation
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if *current != generation {
            debug!(generation, current = *current, "discarding update from superseded poll loop");
            return false;
        }
        self.state.send_replace(next);
        true
    }
}

pub struct PollLoop {
    api: Arc<dyn GenerationApi>,
    interval: Duration,
    session: Arc<Session>,
    task: Option<JoinHandle<()>>,
}

impl PollLoop {
    pub fn new(api: Arc<dyn GenerationApi>, interval: Duration) -> Self {
        Self {
            api,
            interval,
            session: Arc::new(Session::new()),
            task: None,
        }
    }

    /// Cancel any running loop and start a new one for this submission.
    /// Must be called from within a tokio runtime.
    pub fn submit(&mut self, prompt: impl Into<String>, model: impl Into<String>) {
        self.stop_task();
        let generation = self.session.begin(LoopState::Submitting);

        let task = drive(
            self.api.clone(),
            self.session.clone(),
            generation,
            prompt.into(),
            model.into(),
            self.interval,
        );
        self.task = Some(tokio::spawn(task));
    }

    /// Stop the active loop, if any, and go back to idle.
    pub fn cancel(&mut self) {
        self.stop_task();
        self.session.begin(LoopState::Idle);
    }

    pub fn state(&self) -> LoopState {
        self.session.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<LoopState> {
        self.session.state.subscribe()
    }

    /// Resolve once the current loop is no longer submitting or polling.
    pub async fn wait_terminal(&self) -> LoopState {
        let mut rx = self.subscribe();
        let state = match rx.wait_for(|state| !state.is_active()).await {
            Ok(state) => state.clone(),
            Err(_) => LoopState::Idle,
        };
        state
    }

    fn stop_task(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for PollLoop {
    fn drop(&mut self) {
        self.stop_task();
    }
}

fn reason_text(reason: &Value) -> String {
    match reason {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

async fn drive(
    api: Arc<dyn GenerationApi>,
    session: Arc<Session>,
    generation: u64,
    prompt: String,
    model: String,
    interval: Duration,
) {
    let job = match api.submit(&prompt, &model).await {
        Ok(job) => job,
        Err(err) => {
            warn!(%err, "submission failed");
            session.publish(
                generation,
                LoopState::Errored {
                    job_id: None,
                    reason: err.to_string(),
                },
            );
            return;
        }
    };
    info!(job_id = %job.id, "job submitted, polling for completion");

    let polling = LoopState::Polling {
        job_id: job.id.clone(),
        status: "processing".to_string(),
    };
    if !session.publish(generation, polling) {
        return;
    }

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // the first tick completes immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;

        let next = match api.check_status(&job.id).await {
            Ok(StatusOutcome::Processing { status }) => LoopState::Polling {
                job_id: job.id.clone(),
                status,
            },
            Ok(StatusOutcome::Success { image_url }) => LoopState::Done {
                job_id: job.id.clone(),
                image_url,
            },
            Ok(StatusOutcome::Failed { reason }) => LoopState::Errored {
                job_id: Some(job.id.clone()),
                reason: reason_text(&reason),
            },
            Err(err) => LoopState::Errored {
                job_id: Some(job.id.clone()),
                reason: err.to_string(),
            },
        };

        let terminal = next.is_terminal();
        if !session.publish(generation, next) || terminal {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeService;
    use crate::{Error, Generator, JobSnapshot, JobStatus, SubmitterConfig};
    use serde_json::json;
    use std::collections::{HashMap, VecDeque};

    type Scripted = (Duration, Result<StatusOutcome>);

    #[derive(Default)]
    struct ScriptedApi {
        jobs: Mutex<VecDeque<Result<Job>>>,
        outcomes: Mutex<HashMap<String, VecDeque<Scripted>>>,
        checks: Mutex<Vec<String>>,
    }

    impl ScriptedApi {
        fn job(&self, id: &str) {
            self.jobs.lock().unwrap().push_back(Ok(Job {
                id: id.to_string(),
                status: JobStatus::Processing,
            }));
        }

        fn outcome(&self, id: &str, delay: Duration, outcome: Result<StatusOutcome>) {
            self.outcomes
                .lock()
                .unwrap()
                .entry(id.to_string())
                .or_default()
                .push_back((delay, outcome));
        }

        fn checks_for(&self, id: &str) -> usize {
            self.checks.lock().unwrap().iter().filter(|c| *c == id).count()
        }
    }

    #[async_trait]
    impl GenerationApi for ScriptedApi {
        async fn submit(&self, _prompt: &str, _model: &str) -> Result<Job> {
            self.jobs
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(Error::upstream("no job scripted")))
        }

        async fn check_status(&self, job_id: &str) -> Result<StatusOutcome> {
            self.checks.lock().unwrap().push(job_id.to_string());
            let scripted = self
                .outcomes
                .lock()
                .unwrap()
                .get_mut(job_id)
                .and_then(|queue| queue.pop_front());
            match scripted {
                Some((delay, outcome)) => {
                    tokio::time::sleep(delay).await;
                    outcome
                }
                None => Ok(StatusOutcome::Processing {
                    status: "processing".to_string(),
                }),
            }
        }
    }

    fn success(url: &str) -> Result<StatusOutcome> {
        Ok(StatusOutcome::Success {
            image_url: url.to_string(),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_until_success() {
        let api = Arc::new(ScriptedApi::default());
        api.job("abc123");
        api.outcome(
            "abc123",
            Duration::ZERO,
            Ok(StatusOutcome::Processing {
                status: "starting".to_string(),
            }),
        );
        api.outcome("abc123", Duration::ZERO, success("https://x/y.png"));

        let mut poll_loop = PollLoop::new(api.clone(), DEFAULT_POLL_INTERVAL);
        assert_eq!(poll_loop.state(), LoopState::Idle);
        poll_loop.submit("a red fox", "flux");
        assert_eq!(poll_loop.state(), LoopState::Submitting);

        assert_eq!(
            poll_loop.wait_terminal().await,
            LoopState::Done {
                job_id: "abc123".to_string(),
                image_url: "https://x/y.png".to_string(),
            }
        );

        // no orphaned timer keeps polling after completion
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(api.checks_for("abc123"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drives_in_process_generator_to_done() {
        let service = Arc::new(FakeService::default());
        service.push_snapshot(JobSnapshot {
            id: "job-1".to_string(),
            status: "starting".to_string(),
            ..Default::default()
        });
        service.push_snapshot(JobSnapshot {
            id: "job-1".to_string(),
            status: "succeeded".to_string(),
            output: Some(json!("https://x/y.png")),
            error: None,
        });
        let generator = Generator::new(service.clone(), SubmitterConfig::default());

        let mut poll_loop = PollLoop::new(Arc::new(generator), DEFAULT_POLL_INTERVAL);
        let mut updates = poll_loop.subscribe();
        poll_loop.submit("a red fox", "flux");

        let mut seen = Vec::new();
        loop {
            let state = updates.borrow_and_update().clone();
            let done = state.is_terminal();
            seen.push(state);
            if done {
                break;
            }
            updates.changed().await.unwrap();
        }

        assert_eq!(
            seen.last(),
            Some(&LoopState::Done {
                job_id: "job-1".to_string(),
                image_url: "https://x/y.png".to_string(),
            })
        );
        assert!(seen.contains(&LoopState::Polling {
            job_id: "job-1".to_string(),
            status: "starting".to_string(),
        }));

        let creates = service.creates();
        assert_eq!(creates.len(), 1);
        assert_eq!(creates[0].0, "black-forest-labs/flux-1.1-pro-ultra");
        assert_eq!(creates[0].1["prompt"], "a red fox");
        assert!(creates[0].1["seed"].is_u64());
        assert_eq!(service.gets(), vec!["job-1".to_string(), "job-1".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_submission_failure_is_errored() {
        let api = Arc::new(ScriptedApi::default());
        api.jobs
            .lock()
            .unwrap()
            .push_back(Err(Error::Validation("Prompt is required".to_string())));

        let mut poll_loop = PollLoop::new(api.clone(), DEFAULT_POLL_INTERVAL);
        poll_loop.submit("", "flux");
        assert_eq!(
            poll_loop.wait_terminal().await,
            LoopState::Errored {
                job_id: None,
                reason: "Prompt is required".to_string(),
            }
        );
        assert!(api.checks.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_job_is_errored() {
        let api = Arc::new(ScriptedApi::default());
        api.job("abc123");
        api.outcome(
            "abc123",
            Duration::ZERO,
            Ok(StatusOutcome::Failed {
                reason: json!("NSFW content detected"),
            }),
        );

        let mut poll_loop = PollLoop::new(api, DEFAULT_POLL_INTERVAL);
        poll_loop.submit("a red fox", "ideogram");
        assert_eq!(
            poll_loop.wait_terminal().await,
            LoopState::Errored {
                job_id: Some("abc123".to_string()),
                reason: "NSFW content detected".to_string(),
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_error_stops_loop() {
        let api = Arc::new(ScriptedApi::default());
        api.job("abc123");
        api.outcome(
            "abc123",
            Duration::ZERO,
            Err(Error::upstream("Unexpected output format")),
        );

        let mut poll_loop = PollLoop::new(api.clone(), DEFAULT_POLL_INTERVAL);
        poll_loop.submit("a red fox", "flux");
        assert!(matches!(
            poll_loop.wait_terminal().await,
            LoopState::Errored { job_id: Some(_), .. }
        ));
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(api.checks_for("abc123"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_submission_supersedes_previous_loop() {
        let api = Arc::new(ScriptedApi::default());
        api.job("job-a");
        api.job("job-b");
        // job A's first status call is slow and would report success late
        api.outcome("job-a", Duration::from_secs(3), success("https://x/a.png"));
        api.outcome(
            "job-b",
            Duration::ZERO,
            Ok(StatusOutcome::Processing {
                status: "starting".to_string(),
            }),
        );
        api.outcome("job-b", Duration::ZERO, success("https://x/b.png"));

        let mut poll_loop = PollLoop::new(api.clone(), DEFAULT_POLL_INTERVAL);
        poll_loop.submit("a red fox", "flux");

        // let A's first status request get in flight
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(api.checks_for("job-a"), 1);

        poll_loop.submit("an owl", "flux");
        let mut rx = poll_loop.subscribe();

        assert_eq!(
            poll_loop.wait_terminal().await,
            LoopState::Done {
                job_id: "job-b".to_string(),
                image_url: "https://x/b.png".to_string(),
            }
        );

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(api.checks_for("job-a"), 1);
        assert_eq!(
            *rx.borrow_and_update(),
            LoopState::Done {
                job_id: "job-b".to_string(),
                image_url: "https://x/b.png".to_string(),
            }
        );
    }

    #[test]
    fn test_stale_generation_cannot_write() {
        let session = Session::new();
        let first = session.begin(LoopState::Submitting);
        let second = session.begin(LoopState::Submitting);

        assert!(!session.publish(
            first,
            LoopState::Done {
                job_id: "job-a".to_string(),
                image_url: "https://x/a.png".to_string(),
            }
        ));
        assert_eq!(*session.state.borrow(), LoopState::Submitting);

        assert!(session.publish(
            second,
            LoopState::Polling {
                job_id: "job-b".to_string(),
                status: "starting".to_string(),
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_returns_to_idle() {
        let api = Arc::new(ScriptedApi::default());
        api.job("abc123");

        let mut poll_loop = PollLoop::new(api.clone(), DEFAULT_POLL_INTERVAL);
        poll_loop.submit("a red fox", "flux");
        tokio::time::sleep(Duration::from_millis(2500)).await;
        let seen = api.checks_for("abc123");
        assert!(seen >= 1);

        poll_loop.cancel();
        assert_eq!(poll_loop.state(), LoopState::Idle);
        assert_eq!(poll_loop.wait_terminal().await, LoopState::Idle);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(api.checks_for("abc123"), seen);
    }
}
