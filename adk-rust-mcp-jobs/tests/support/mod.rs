//! Controllable executors and polling helpers shared by the integration tests.

#![allow(dead_code)]

use adk_rust_mcp_jobs::{Job, JobContext, JobQueue, JobStatus, ToolExecutor, ToolOutput};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

/// Executor that blocks each invocation until the test releases a permit.
///
/// Prompts starting with `fail` make the executor return an error once released.
#[derive(Clone)]
pub struct Gated {
    gate: Arc<Semaphore>,
    seen: Arc<Mutex<Vec<String>>>,
}

impl Gated {
    pub fn new() -> Self {
        Self {
            gate: Arc::new(Semaphore::new(0)),
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Let `n` blocked (or future) invocations return.
    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    /// Prompts of every invocation so far, in call order.
    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

#[async_trait]
impl ToolExecutor for Gated {
    async fn execute(&self, ctx: JobContext, params: serde_json::Value) -> anyhow::Result<ToolOutput> {
        let prompt = params["prompt"].as_str().unwrap_or_default().to_string();
        self.seen.lock().unwrap().push(prompt.clone());

        self.gate.acquire().await?.forget();

        if prompt.starts_with("fail") {
            anyhow::bail!("Imagen rejected prompt '{}'", prompt);
        }
        Ok(ToolOutput::png(format!("/out/{}.png", ctx.job_id)))
    }
}

/// Executor that succeeds after a fixed delay.
pub struct Delayed {
    pub delay: Duration,
    pub calls: Arc<AtomicUsize>,
}

impl Delayed {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl ToolExecutor for Delayed {
    async fn execute(&self, ctx: JobContext, params: serde_json::Value) -> anyhow::Result<ToolOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        if params["prompt"].as_str().is_some_and(|p| p.starts_with("fail")) {
            anyhow::bail!("quota exceeded");
        }
        Ok(ToolOutput::png(format!("/out/{}.png", ctx.job_id)))
    }
}

/// Executor that never returns.
pub struct Never;

#[async_trait]
impl ToolExecutor for Never {
    async fn execute(&self, _ctx: JobContext, _params: serde_json::Value) -> anyhow::Result<ToolOutput> {
        std::future::pending().await
    }
}

/// Poll until `id` reaches `status`.
pub async fn wait_for_status(queue: &JobQueue, id: &str, status: JobStatus) -> Job {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(job) = queue.get_job(id).await.unwrap() {
                if job.status == status {
                    return job;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("job {} never reached {}", id, status))
}

/// Poll until `id` is completed or failed.
pub async fn wait_terminal(queue: &JobQueue, id: &str) -> Job {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(job) = queue.get_job(id).await.unwrap() {
                if job.status.is_terminal() {
                    return job;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("job {} never finished", id))
}

/// Poll until `gated` has seen `n` invocations.
pub async fn wait_for_calls(gated: &Gated, n: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while gated.calls() < n {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("executor never reached {} calls", n))
}
