//! Configuration module for loading environment variables and settings.

use crate::error::ConfigError;
use std::path::PathBuf;
use std::str::FromStr;

/// Default Vertex AI region.
pub const DEFAULT_LOCATION: &str = "us-central1";
/// Default location of the job database.
pub const DEFAULT_JOBS_DB_PATH: &str = "./data/jobs.db";
/// Default number of jobs allowed to run at once.
pub const DEFAULT_MAX_CONCURRENT_JOBS: usize = 2;
/// Default directory for generated files.
pub const DEFAULT_OUTPUT_DIR: &str = "./output";

/// Application configuration loaded from environment variables.
///
/// The HTTP listen port is not part of this; it comes from `TransportArgs`.
#[derive(Debug, Clone)]
pub struct Config {
    /// Google Cloud project ID (required)
    pub project_id: String,
    /// Google Cloud location/region
    pub location: String,
    /// SQLite database holding job records
    pub jobs_db_path: PathBuf,
    /// Maximum number of jobs running at once (at least 1)
    pub max_concurrent_jobs: usize,
    /// Directory for outputs when a request names no file
    pub output_dir: PathBuf,
    /// Verbose diagnostics for failures
    pub debug: bool,
}

impl Config {
    /// Load configuration from environment variables and .env file.
    ///
    /// # Errors
    /// Returns `ConfigError::MissingEnvVar` if PROJECT_ID is not set and
    /// `ConfigError::InvalidValue` if a numeric or boolean variable does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let project_id = lookup("PROJECT_ID")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ConfigError::missing_env_var("PROJECT_ID"))?;

        let location = lookup("LOCATION").unwrap_or_else(|| DEFAULT_LOCATION.to_string());

        let jobs_db_path = lookup("JOBS_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_JOBS_DB_PATH));

        let max_concurrent_jobs =
            parse_var(&lookup, "MAX_CONCURRENT_JOBS")?.unwrap_or(DEFAULT_MAX_CONCURRENT_JOBS);
        if max_concurrent_jobs == 0 {
            return Err(ConfigError::invalid_value("MAX_CONCURRENT_JOBS", "must be at least 1"));
        }

        let output_dir = lookup("OUTPUT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR));

        let debug = match lookup("DEBUG") {
            Some(value) => parse_flag(&value)
                .ok_or_else(|| ConfigError::invalid_value("DEBUG", format!("'{}' is not a boolean", value)))?,
            None => false,
        };

        Ok(Self {
            project_id,
            location,
            jobs_db_path,
            max_concurrent_jobs,
            output_dir,
            debug,
        })
    }

    /// Get the Vertex AI endpoint URL for a given API.
    pub fn vertex_ai_endpoint(&self, api: &str) -> String {
        format!(
            "https://{}-aiplatform.googleapis.com/v1/projects/{}/locations/{}/publishers/google/models/{}",
            self.location, self.project_id, self.location, api
        )
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    lookup(name)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| ConfigError::invalid_value(name, format!("'{}': {}", raw, e)))
        })
        .transpose()
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}
