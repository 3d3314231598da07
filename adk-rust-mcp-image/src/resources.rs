//! MCP Resources for the Image server.
//!
//! This module provides resource implementations for:
//! - `image://models` - Imagen models and what they are used for
//! - `image://providers` - List available image providers
//! - `jobs://stats` - Job counts and scheduler occupancy

use adk_rust_mcp_common::models::{ImagenCapability, ModelRegistry};
use adk_rust_mcp_jobs::{JobStats, QueueStats};
use serde::Serialize;

/// URI of the models resource.
pub const MODELS_URI: &str = "image://models";
/// URI of the providers resource.
pub const PROVIDERS_URI: &str = "image://providers";
/// URI of the job statistics resource.
pub const JOB_STATS_URI: &str = "jobs://stats";

/// Information about an available Imagen model.
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    /// Model identifier
    pub id: &'static str,
    /// Model aliases
    pub aliases: Vec<&'static str>,
    /// What the model is used for
    pub capability: ImagenCapability,
    /// Maximum prompt length in characters
    pub max_prompt_length: usize,
    /// Supported aspect ratios
    pub supported_aspect_ratios: Vec<&'static str>,
    /// Maximum number of images per request
    pub max_images: u8,
}

/// Information about an available image provider.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderInfo {
    /// Provider identifier
    pub id: String,
    /// Provider display name
    pub name: String,
    /// Provider description
    pub description: String,
    /// Whether this is the default provider
    pub is_default: bool,
}

/// Body of `jobs://stats`.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatsInfo {
    /// Persisted job counts per status
    pub jobs: JobStats,
    /// Total persisted jobs
    pub total: u64,
    /// Scheduler occupancy
    pub scheduler: QueueStats,
}

/// List all available Imagen models.
pub fn list_models() -> Vec<ModelInfo> {
    ModelRegistry::list_imagen_models()
        .iter()
        .map(|m| ModelInfo {
            id: m.id,
            aliases: m.aliases.to_vec(),
            capability: m.capability,
            max_prompt_length: m.max_prompt_length,
            supported_aspect_ratios: m.supported_aspect_ratios.to_vec(),
            max_images: m.max_images,
        })
        .collect()
}

/// List all available image providers.
pub fn list_providers() -> Vec<ProviderInfo> {
    vec![ProviderInfo {
        id: "google-imagen".to_string(),
        name: "Google Imagen".to_string(),
        description: "Google's Vertex AI Imagen API for generation, editing, customization and upscaling"
            .to_string(),
        is_default: true,
    }]
}

/// Get models resource as JSON string.
pub fn models_resource_json() -> String {
    serde_json::to_string_pretty(&list_models()).unwrap_or_else(|_| "[]".to_string())
}

/// Get providers resource as JSON string.
pub fn providers_resource_json() -> String {
    serde_json::to_string_pretty(&list_providers()).unwrap_or_else(|_| "[]".to_string())
}

/// Get job statistics as JSON string.
pub fn job_stats_resource_json(jobs: JobStats, scheduler: QueueStats) -> String {
    let info = JobStatsInfo {
        jobs,
        total: jobs.total(),
        scheduler,
    };
    serde_json::to_string_pretty(&info).unwrap_or_else(|_| "{}".to_string())
}
