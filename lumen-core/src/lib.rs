pub mod client;
pub mod error;
pub mod generator;
pub mod job;
pub mod poll_loop;
pub mod registry;
pub mod status;
pub mod submit;
pub mod upstream;

#[cfg(test)]
mod testing;

pub use client::{ProxyClient, ProxyClientConfig};
pub use error::{Error, Result};
pub use generator::Generator;
pub use job::*;
pub use poll_loop::{GenerationApi, LoopState, PollLoop, DEFAULT_POLL_INTERVAL};
pub use registry::{ModelConfig, ModelKey, ModelRegistry};
pub use status::StatusPoller;
pub use submit::{GenerationRequest, JobSubmitter, SubmitterConfig};
pub use upstream::{GenerationService, ReplicateClient, ReplicateConfig};
