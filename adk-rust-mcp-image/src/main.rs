//! ADK Rust MCP Image Server
//!
//! MCP server for image generation using Vertex AI Imagen API, with a
//! persistent job queue for long-running work.

use adk_rust_mcp_common::{Config, McpServerBuilder, TransportArgs};
use adk_rust_mcp_image::{ImageServer, SharedHandler, executors};
use adk_rust_mcp_jobs::{JobQueue, JobStore, QueueConfig};
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments for the image server.
#[derive(Parser, Debug)]
#[command(name = "adk-rust-mcp-image")]
#[command(about = "MCP server for image generation using Vertex AI Imagen")]
struct Args {
    /// Transport configuration
    #[command(flatten)]
    transport: TransportArgs,

    /// SQLite database for jobs (overrides JOBS_DB_PATH)
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Jobs allowed to run at once (overrides MAX_CONCURRENT_JOBS)
    #[arg(long)]
    max_concurrent_jobs: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::from_env()?;
    if let Some(db_path) = args.db_path {
        config.jobs_db_path = db_path;
    }
    if let Some(max) = args.max_concurrent_jobs {
        config.max_concurrent_jobs = max;
    }

    adk_rust_mcp_common::tracing::init_tracing(config.debug);
    tracing::info!("adk-rust-mcp-image server starting...");
    tracing::info!(
        project_id = %config.project_id,
        location = %config.location,
        jobs_db = %config.jobs_db_path.display(),
        max_concurrent_jobs = config.max_concurrent_jobs,
        "Configuration loaded"
    );

    let store = JobStore::open(&config.jobs_db_path)
        .await
        .with_context(|| format!("Failed to open job store at {}", config.jobs_db_path.display()))?;

    let handler = SharedHandler::new(config.clone());
    let queue = JobQueue::start(
        store,
        executors::registry(handler.clone()),
        QueueConfig::default()
            .with_max_concurrent_jobs(config.max_concurrent_jobs)
            .with_debug(config.debug),
    )
    .await?;

    let server = ImageServer::new(handler, queue.clone());

    let transport = args.transport.into_transport();
    tracing::info!(transport = %transport, "Starting MCP server");

    let served = McpServerBuilder::new(server)
        .with_transport(transport)
        .run()
        .await;

    queue.shutdown().await;
    served?;

    tracing::info!("Server stopped");
    Ok(())
}
