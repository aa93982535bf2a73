use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::Args;
use lumen_core::{LoopState, PollLoop, ProxyClient, ProxyClientConfig};
use tracing::{info, warn};

#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Base URL of a running lumen server
    #[arg(long, default_value = "http://127.0.0.1:3000")]
    server: String,

    /// Model key: stable-diffusion, flux or ideogram
    #[arg(long, default_value = "stable-diffusion")]
    model: String,

    /// Delay between status checks, in milliseconds
    #[arg(long, default_value_t = 1000)]
    interval_ms: u64,

    /// Ceiling for the submission request, in seconds
    #[arg(long, default_value_t = 60)]
    submit_timeout_secs: u64,

    /// Ceiling for each status request, in seconds
    #[arg(long, default_value_t = 10)]
    status_timeout_secs: u64,

    /// Text prompt describing the image
    #[arg(required = true, num_args = 1..)]
    prompt: Vec<String>,
}

pub async fn run(args: GenerateArgs) -> Result<()> {
    let client = ProxyClient::new(ProxyClientConfig {
        base_url: args.server,
        submit_timeout: Duration::from_secs(args.submit_timeout_secs),
        status_timeout: Duration::from_secs(args.status_timeout_secs),
    })?;

    let mut poll_loop = PollLoop::new(Arc::new(client), Duration::from_millis(args.interval_ms));
    poll_loop.submit(args.prompt.join(" "), args.model);
    let mut updates = poll_loop.subscribe();

    loop {
        let state = updates.borrow_and_update().clone();
        match state {
            LoopState::Submitting => info!("submitting prompt"),
            LoopState::Polling { job_id, status } => info!(%job_id, %status, "waiting for image"),
            LoopState::Done { job_id, image_url } => {
                info!(%job_id, "image ready");
                println!("{image_url}");
                return Ok(());
            }
            LoopState::Errored { job_id, reason } => {
                bail!("generation failed (job {job_id:?}): {reason}")
            }
            LoopState::Idle => bail!("generation cancelled"),
        }

        tokio::select! {
            changed = updates.changed() => changed?,
            _ = tokio::signal::ctrl_c() => {
                warn!("interrupted, cancelling poll loop");
                poll_loop.cancel();
            }
        }
    }
}
