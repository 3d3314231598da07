//! Tool executor seam.
//!
//! A [`ToolExecutor`] performs the actual work for one [`JobType`]. Executors own
//! their long-lived dependencies (auth, HTTP client, configuration), which are
//! constructed once at startup and handed in, so tests can substitute fresh
//! instances per run.

use crate::model::{JobType, ToolOutput};
use crate::store::JobStore;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Per-invocation context handed to an executor.
#[derive(Debug, Clone)]
pub struct JobContext {
    /// Id of the job being executed
    pub job_id: String,
    /// Type of the job being executed
    pub job_type: JobType,
    /// The job store, for executors that record history alongside the job
    pub store: JobStore,
}

/// Performs the work for a job.
///
/// Implementations either return a [`ToolOutput`] or an error; they are never
/// interrupted by the scheduler. Retry and rate-limit policy is their own
/// concern.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Execute a job with its stored params.
    async fn execute(&self, ctx: JobContext, params: serde_json::Value) -> anyhow::Result<ToolOutput>;
}

/// Mapping from job type to the executor that runs it.
#[derive(Clone, Default)]
pub struct ExecutorRegistry {
    executors: HashMap<JobType, Arc<dyn ToolExecutor>>,
}

impl ExecutorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `executor` for `job_type`, replacing any previous one.
    pub fn register(&mut self, job_type: JobType, executor: Arc<dyn ToolExecutor>) {
        self.executors.insert(job_type, executor);
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, job_type: JobType, executor: impl ToolExecutor + 'static) -> Self {
        self.register(job_type, Arc::new(executor));
        self
    }

    /// Executor for `job_type`, if one is registered.
    pub fn get(&self, job_type: JobType) -> Option<Arc<dyn ToolExecutor>> {
        self.executors.get(&job_type).cloned()
    }

    /// Whether an executor is registered for `job_type`.
    pub fn supports(&self, job_type: JobType) -> bool {
        self.executors.contains_key(&job_type)
    }

    /// Registered job types, in [`JobType::ALL`] order.
    pub fn job_types(&self) -> Vec<JobType> {
        JobType::ALL
            .into_iter()
            .filter(|t| self.supports(*t))
            .collect()
    }
}

impl fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutorRegistry")
            .field("job_types", &self.job_types())
            .finish()
    }
}
