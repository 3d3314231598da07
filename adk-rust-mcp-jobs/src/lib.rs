//! ADK Rust MCP Jobs Library
//!
//! Asynchronous job execution for the MCP GenMedia servers: a durable SQLite
//! job store, a bounded-concurrency scheduler with cooperative cancellation and
//! crash recovery, and a batch orchestrator built on top of the queue.
//!
//! # Overview
//!
//! ```ignore
//! use adk_rust_mcp_jobs::{ExecutorRegistry, JobQueue, JobStore, JobType, QueueConfig};
//!
//! let store = JobStore::open("./data/jobs.db").await?;
//! let executors = ExecutorRegistry::new().with(JobType::Generate, my_executor);
//! let queue = JobQueue::start(store, executors, QueueConfig::default()).await?;
//!
//! let id = queue.create_job(JobType::Generate, serde_json::json!({"prompt": "a cat"})).await?;
//! let job = queue.get_job(&id).await?;
//! ```

pub mod batch;
pub mod error;
pub mod executor;
pub mod model;
pub mod queue;
pub mod store;

pub use batch::{BatchConfig, BatchItem, BatchItemResult, BatchItemStatus, BatchOrchestrator, BatchReport};
pub use error::{BatchError, JobError, StoreError};
pub use executor::{ExecutorRegistry, JobContext, ToolExecutor};
pub use model::{Job, JobResult, JobStatus, JobType, ToolOutput};
pub use queue::{CancelOutcome, JobQueue, QueueConfig, QueueStats};
pub use store::{JobStats, JobStore};
