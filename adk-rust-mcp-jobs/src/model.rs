//! Job records and the payload types that flow through the queue.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Current time truncated to millisecond precision, the resolution the store keeps.
pub fn now_millis() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}

/// Kind of tool a job runs. Closed set; each kind maps to one executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// Text-to-image generation
    Generate,
    /// Mask-based image editing
    Edit,
    /// Subject/style customization from reference images
    Customize,
    /// Image upscaling
    Upscale,
    /// Generation followed by upscaling of every generated image
    GenerateAndUpscale,
}

impl JobType {
    /// Every job type, in declaration order.
    pub const ALL: [JobType; 5] = [
        JobType::Generate,
        JobType::Edit,
        JobType::Customize,
        JobType::Upscale,
        JobType::GenerateAndUpscale,
    ];

    /// Stable string form used in the store and on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Generate => "generate",
            JobType::Edit => "edit",
            JobType::Customize => "customize",
            JobType::Upscale => "upscale",
            JobType::GenerateAndUpscale => "generate_and_upscale",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| {
                format!(
                    "Unknown job type '{}'. Valid options: {}",
                    s,
                    JobType::ALL.map(|t| t.as_str()).join(", ")
                )
            })
    }
}

/// Lifecycle state of a job.
///
/// `Pending -> Running -> {Completed | Failed}`, plus `Pending -> Failed` when a
/// job is cancelled before dispatch. Completed and failed are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for a free slot
    Pending,
    /// Handed to an executor
    Running,
    /// Finished with a result
    Completed,
    /// Finished with an error
    Failed,
}

impl JobStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [JobStatus; 4] = [
        JobStatus::Pending,
        JobStatus::Running,
        JobStatus::Completed,
        JobStatus::Failed,
    ];

    /// Stable string form used in the store and on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Whether no further transition can leave this state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStatus::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| format!("Unknown job status '{}'", s))
    }
}

/// A unit of asynchronous work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique id, generated at creation
    pub id: String,
    /// Tool kind
    pub job_type: JobType,
    /// Current lifecycle state
    pub status: JobStatus,
    /// Tool-specific input, immutable after creation
    pub params: serde_json::Value,
    /// Normalized output, present only when completed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
    /// Failure description, present only when failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Time of the most recent dispatch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// Time the job reached a terminal state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a new pending job with a fresh id.
    pub fn new(job_type: JobType, params: serde_json::Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            job_type,
            status: JobStatus::Pending,
            params,
            result: None,
            error: None,
            created_at: now_millis(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Milliseconds from creation to completion, if the job has completed.
    ///
    /// After a crash-resume this still measures from the original creation.
    pub fn duration_ms(&self) -> Option<u64> {
        self.completed_at
            .map(|done| (done - self.created_at).num_milliseconds().max(0) as u64)
    }
}

/// What a tool executor hands back on success.
///
/// Executors are required to pick a variant; the scheduler normalizes it into a
/// [`JobResult`] without inspecting tool-specific payloads.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    /// One output resource
    Resource {
        /// Path or URI of the output
        locator: String,
        /// Media type of the output
        mime_type: String,
    },
    /// Several output resources of the same media type
    Resources {
        /// Paths or URIs of the outputs
        locators: Vec<String>,
        /// Media type shared by the outputs
        mime_type: String,
    },
    /// A textual result with no resource attached
    Message {
        /// The message
        text: String,
    },
}

impl ToolOutput {
    /// Convenience constructor for a single PNG file.
    pub fn png(locator: impl Into<String>) -> Self {
        ToolOutput::Resource {
            locator: locator.into(),
            mime_type: "image/png".to_string(),
        }
    }
}

/// Tool-agnostic projection of a successful job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    /// Output locators (file paths or URIs)
    pub outputs: Vec<String>,
    /// Media type of the outputs
    pub mime_type: String,
    /// Textual result, when the tool produced one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl JobResult {
    /// Normalize an executor's output.
    ///
    /// Outputs that carry no usable locator are rejected so the job fails
    /// instead of completing with nothing to show for it.
    pub fn from_output(output: ToolOutput) -> Result<Self, String> {
        match output {
            ToolOutput::Resource { locator, mime_type } => {
                if locator.trim().is_empty() {
                    return Err("Executor returned no output locators".to_string());
                }
                Ok(Self {
                    outputs: vec![locator],
                    mime_type,
                    message: None,
                })
            }
            ToolOutput::Resources { locators, mime_type } => {
                if locators.is_empty() || locators.iter().any(|l| l.trim().is_empty()) {
                    return Err("Executor returned no output locators".to_string());
                }
                Ok(Self {
                    outputs: locators,
                    mime_type,
                    message: None,
                })
            }
            ToolOutput::Message { text } => Ok(Self {
                outputs: Vec::new(),
                mime_type: "text/plain".to_string(),
                message: Some(text),
            }),
        }
    }
}
