use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use lumen_core::{Generator, ReplicateClient, ReplicateConfig, SubmitterConfig};
use tokio::{self, net::TcpListener};
use tracing::info;

mod generate;
mod responses;
mod routes;

use routes::{create_router, AppState};

// Define command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about = "Lumen image generation proxy")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP proxy
    Serve(ServeArgs),
    /// Submit a prompt to a running server and print the image URL
    Generate(generate::GenerateArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Host address to bind the server to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to bind the server to
    #[arg(long, default_value_t = 3000)]
    port: u16,

    /// Base URL of the generation service API
    #[arg(long, env = "REPLICATE_API_BASE", default_value = lumen_core::upstream::DEFAULT_API_BASE)]
    api_base: String,

    /// API token for the generation service
    #[arg(long, env = "REPLICATE_API_TOKEN", hide_env_values = true)]
    api_token: String,

    /// Ceiling for a single upstream HTTP request, in seconds
    #[arg(long, default_value_t = 180)]
    request_timeout_secs: u64,

    /// Ceiling for synchronous generation, in seconds
    #[arg(long, default_value_t = 150)]
    wait_timeout_secs: u64,

    /// Delay between upstream reads in synchronous mode, in milliseconds
    #[arg(long, default_value_t = 1000)]
    wait_poll_interval_ms: u64,
}

fn init_logging(verbose: bool) {
    let log_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(%err, "failed to listen for shutdown signal");
    }
    info!("shutting down");
}

async fn serve(args: ServeArgs) -> Result<()> {
    let upstream = ReplicateClient::new(ReplicateConfig {
        api_base: args.api_base,
        api_token: args.api_token,
        request_timeout: Duration::from_secs(args.request_timeout_secs),
    })
    .context("failed to set up generation service client")?;

    let generator = Generator::new(
        Arc::new(upstream),
        SubmitterConfig {
            wait_timeout: Duration::from_secs(args.wait_timeout_secs),
            wait_poll_interval: Duration::from_millis(args.wait_poll_interval_ms),
        },
    );

    // --- Build axum router with shared state ---
    let app = create_router(AppState { generator });

    // --- Start the server ---
    let bind_address = format!("{}:{}", args.host, args.port);
    let listener = TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("failed to bind {bind_address}"))?;
    info!("Started server on {}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // a missing .env file is fine
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Generate(args) => generate::run(args).await,
    }
}
