//! Job executors backed by the Imagen handler.
//!
//! Each [`JobType`] gets one executor. They all share a [`SharedHandler`], so
//! credentials are looked up once, on the first job that needs them. Job
//! outputs are always files: a job whose params name no `output_file` writes
//! to `OUTPUT_DIR/<job_id>.png`.

use crate::handler::{
    GenerateAndUpscaleParams, ImageCustomizeParams, ImageEditParams, ImageGenerateParams,
    ImageGenerateResult, ImageUpscaleParams, ImageUpscaleResult, SharedHandler,
};
use adk_rust_mcp_jobs::{ExecutorRegistry, JobContext, JobType, ToolExecutor, ToolOutput};
use anyhow::{Context, bail};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::path::Path;
use tracing::debug;

const PNG: &str = "image/png";

/// Registry with an executor for every job type.
pub fn registry(handler: SharedHandler) -> ExecutorRegistry {
    ExecutorRegistry::new()
        .with(JobType::Generate, GenerateExecutor(handler.clone()))
        .with(JobType::Edit, EditExecutor(handler.clone()))
        .with(JobType::Customize, CustomizeExecutor(handler.clone()))
        .with(JobType::Upscale, UpscaleExecutor(handler.clone()))
        .with(JobType::GenerateAndUpscale, GenerateAndUpscaleExecutor(handler))
}

/// `<output_dir>/<job_id>.png`.
pub fn default_output_file(output_dir: &Path, job_id: &str) -> String {
    output_dir.join(format!("{}.png", job_id)).display().to_string()
}

/// Decode a job's params, filling in `output_file` when it is missing.
fn job_params<P: DeserializeOwned>(ctx: &JobContext, output_dir: &Path, params: Value) -> anyhow::Result<P> {
    let mut params = params;
    if let Value::Object(map) = &mut params {
        let missing = map.get("output_file").is_none_or(Value::is_null);
        if missing {
            let file = default_output_file(output_dir, &ctx.job_id);
            debug!(job_id = %ctx.job_id, output_file = %file, "Using default output file");
            map.insert("output_file".to_string(), Value::String(file));
        }
    }
    serde_json::from_value(params).with_context(|| format!("Invalid parameters for {} job", ctx.job_type))
}

fn files_output(paths: Vec<String>) -> ToolOutput {
    match <[String; 1]>::try_from(paths) {
        Ok([locator]) => ToolOutput::Resource {
            locator,
            mime_type: PNG.to_string(),
        },
        Err(locators) => ToolOutput::Resources {
            locators,
            mime_type: PNG.to_string(),
        },
    }
}

fn generated_output(result: ImageGenerateResult) -> anyhow::Result<ToolOutput> {
    match result {
        ImageGenerateResult::LocalFiles(paths) => Ok(files_output(paths)),
        ImageGenerateResult::Base64(_) => bail!("Image was returned inline instead of written to a file"),
    }
}

/// Runs `generate` jobs.
#[derive(Debug, Clone)]
pub struct GenerateExecutor(pub SharedHandler);

#[async_trait]
impl ToolExecutor for GenerateExecutor {
    async fn execute(&self, ctx: JobContext, params: Value) -> anyhow::Result<ToolOutput> {
        let params: ImageGenerateParams = job_params(&ctx, &self.0.config().output_dir, params)?;
        let result = self.0.get().await?.generate_image(params).await?;
        generated_output(result)
    }
}

/// Runs `edit` jobs.
#[derive(Debug, Clone)]
pub struct EditExecutor(pub SharedHandler);

#[async_trait]
impl ToolExecutor for EditExecutor {
    async fn execute(&self, ctx: JobContext, params: Value) -> anyhow::Result<ToolOutput> {
        let params: ImageEditParams = job_params(&ctx, &self.0.config().output_dir, params)?;
        let result = self.0.get().await?.edit_image(params).await?;
        generated_output(result)
    }
}

/// Runs `customize` jobs.
#[derive(Debug, Clone)]
pub struct CustomizeExecutor(pub SharedHandler);

#[async_trait]
impl ToolExecutor for CustomizeExecutor {
    async fn execute(&self, ctx: JobContext, params: Value) -> anyhow::Result<ToolOutput> {
        let params: ImageCustomizeParams = job_params(&ctx, &self.0.config().output_dir, params)?;
        let result = self.0.get().await?.customize_image(params).await?;
        generated_output(result)
    }
}

/// Runs `upscale` jobs.
#[derive(Debug, Clone)]
pub struct UpscaleExecutor(pub SharedHandler);

#[async_trait]
impl ToolExecutor for UpscaleExecutor {
    async fn execute(&self, ctx: JobContext, params: Value) -> anyhow::Result<ToolOutput> {
        let params: ImageUpscaleParams = job_params(&ctx, &self.0.config().output_dir, params)?;
        match self.0.get().await?.upscale_image(params).await? {
            ImageUpscaleResult::LocalFile(path) => Ok(ToolOutput::png(path)),
            ImageUpscaleResult::Base64(_) => bail!("Image was returned inline instead of written to a file"),
        }
    }
}

/// Runs `generate_and_upscale` jobs.
#[derive(Debug, Clone)]
pub struct GenerateAndUpscaleExecutor(pub SharedHandler);

#[async_trait]
impl ToolExecutor for GenerateAndUpscaleExecutor {
    async fn execute(&self, ctx: JobContext, params: Value) -> anyhow::Result<ToolOutput> {
        let params: GenerateAndUpscaleParams = job_params(&ctx, &self.0.config().output_dir, params)?;
        let paths = self.0.get().await?.generate_and_upscale(params).await?;
        Ok(files_output(paths))
    }
}
