//! Error types for the job subsystem.
//!
//! - `StoreError`: persistence failures and malformed stored rows
//! - `JobError`: queue-level failures returned to callers (submission, lookup, cancel)
//! - `BatchError`: structural batch failures (bad config, unreadable config file)
//!
//! Failures of an individual job's execution are never surfaced through these
//! types. They are recorded on the job itself.

use crate::model::{JobStatus, JobType};
use thiserror::Error;

/// Job store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The underlying database reported an error
    #[error("Job store database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A params or result payload could not be (de)serialized
    #[error("Job store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored row holds a value this version cannot interpret
    #[error("Corrupt job record {id}: {message}")]
    Corrupt {
        /// Id of the offending job
        id: String,
        /// What was wrong with it
        message: String,
    },

    /// A job with this id already exists
    #[error("Job {0} already exists")]
    DuplicateId(String),
}

impl StoreError {
    /// Create a corrupt-record error.
    pub fn corrupt(id: impl Into<String>, message: impl Into<String>) -> Self {
        StoreError::Corrupt {
            id: id.into(),
            message: message.into(),
        }
    }
}

/// Errors returned by [`JobQueue`](crate::queue::JobQueue) operations.
#[derive(Debug, Error)]
pub enum JobError {
    /// The submission was rejected before anything was persisted
    #[error("Invalid job submission: {0}")]
    Submission(String),

    /// No job with this id exists
    #[error("Job {0} not found")]
    NotFound(String),

    /// The job already reached a terminal state and cannot be cancelled
    #[error("Job {id} is already {status} and cannot be cancelled")]
    AlreadyTerminal {
        /// Id of the job
        id: String,
        /// Its terminal status
        status: JobStatus,
    },

    /// The job store failed
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The scheduler has been shut down
    #[error("Job queue is shut down")]
    QueueClosed,
}

impl JobError {
    /// Create a submission error.
    pub fn submission(message: impl Into<String>) -> Self {
        JobError::Submission(message.into())
    }

    /// Submission error for a job type with no registered executor.
    pub fn no_executor(job_type: JobType) -> Self {
        JobError::Submission(format!("No executor registered for job type '{}'", job_type))
    }
}

/// Batch orchestration errors.
///
/// Only structural problems are errors; individual job failures are part of the
/// [`BatchReport`](crate::batch::BatchReport).
#[derive(Debug, Error)]
pub enum BatchError {
    /// The batch configuration is malformed
    #[error("Invalid batch configuration: {0}")]
    InvalidConfig(String),

    /// The batch configuration file could not be read
    #[error("Failed to read batch configuration {path}: {source}")]
    Io {
        /// Path of the configuration file
        path: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

impl BatchError {
    /// Create an invalid-configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        BatchError::InvalidConfig(message.into())
    }
}
