//! MCP Server implementation for the Image server.
//!
//! This module provides the MCP server handler that exposes:
//! - `image_generate` and `image_upscale` tools that run synchronously
//! - `job_submit`, `job_get`, `job_list` and `job_cancel` tools over the job queue
//! - `image_batch` for running many prompts as jobs and waiting for the report
//! - Resources for models, providers and job statistics

use crate::handler::{ImageGenerateParams, ImageGenerateResult, ImageUpscaleParams, ImageUpscaleResult, SharedHandler};
use crate::resources;
use adk_rust_mcp_jobs::{
    BatchConfig, BatchError, BatchItem, BatchOrchestrator, JobError, JobQueue, JobStatus, JobType,
};
use rmcp::{
    model::{
        CallToolResult, Content, JsonObject, ListResourcesResult, ReadResourceResult, Resource,
        ResourceContents, ServerCapabilities, ServerInfo, Tool,
    },
    ErrorData as McpError, ServerHandler,
};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::sync::Arc;
use tracing::{debug, info};

/// Default page size for `job_list`.
pub const DEFAULT_JOB_LIST_LIMIT: u32 = 20;

/// Largest page `job_list` returns.
pub const MAX_JOB_LIST_LIMIT: u32 = 100;

/// MCP Server for image generation.
#[derive(Debug, Clone)]
pub struct ImageServer {
    /// Handler shared with the job executors
    handler: SharedHandler,
    /// Job scheduler
    queue: JobQueue,
}

/// Tool parameters wrapper for image_generate.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct ImageGenerateToolParams {
    /// Text prompt describing the image to generate
    pub prompt: String,
    /// Negative prompt - what to avoid in the generated image
    #[serde(default)]
    pub negative_prompt: Option<String>,
    /// Model to use for generation (default: imagen-4.0-generate-preview-06-06)
    #[serde(default)]
    pub model: Option<String>,
    /// Aspect ratio (1:1, 3:4, 4:3, 9:16, 16:9)
    #[serde(default)]
    pub aspect_ratio: Option<String>,
    /// Number of images to generate (1-4)
    #[serde(default)]
    pub number_of_images: Option<u8>,
    /// Random seed for reproducibility
    #[serde(default)]
    pub seed: Option<i64>,
    /// Output file path for saving locally
    #[serde(default)]
    pub output_file: Option<String>,
}

impl From<ImageGenerateToolParams> for ImageGenerateParams {
    fn from(params: ImageGenerateToolParams) -> Self {
        Self {
            prompt: params.prompt,
            negative_prompt: params.negative_prompt,
            model: params.model.unwrap_or_else(|| crate::handler::DEFAULT_MODEL.to_string()),
            aspect_ratio: params.aspect_ratio.unwrap_or_else(|| "1:1".to_string()),
            number_of_images: params.number_of_images.unwrap_or(1),
            seed: params.seed,
            output_file: params.output_file,
        }
    }
}

/// Tool parameters wrapper for image_upscale.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct ImageUpscaleToolParams {
    /// Source image to upscale (base64 data or local path)
    pub image: String,
    /// Upscale factor: "x2" or "x4" (default: "x2")
    #[serde(default)]
    pub upscale_factor: Option<String>,
    /// Output file path for saving locally
    #[serde(default)]
    pub output_file: Option<String>,
}

impl From<ImageUpscaleToolParams> for ImageUpscaleParams {
    fn from(params: ImageUpscaleToolParams) -> Self {
        Self {
            image: params.image,
            upscale_factor: params.upscale_factor.unwrap_or_else(|| "x2".to_string()),
            output_file: params.output_file,
        }
    }
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

/// Tool parameters for job_submit.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct JobSubmitParams {
    /// Job type: generate, edit, customize, upscale or generate_and_upscale
    pub job_type: JobType,
    /// Tool parameters for the job, as accepted by the matching image tool
    #[serde(default = "empty_object")]
    pub params: Value,
}

/// Tool parameters for job_get and job_cancel.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct JobIdParams {
    /// Id returned by job_submit
    pub job_id: String,
}

/// Tool parameters for job_list.
#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct JobListParams {
    /// Only list jobs with this status
    #[serde(default)]
    pub status: Option<JobStatus>,
    /// Maximum number of jobs to return (default 20, max 100)
    #[serde(default)]
    pub limit: Option<u32>,
}

impl JobListParams {
    /// Requested page size, clamped to 1..=100.
    pub fn effective_limit(&self) -> u32 {
        self.limit
            .unwrap_or(DEFAULT_JOB_LIST_LIMIT)
            .clamp(1, MAX_JOB_LIST_LIMIT)
    }
}

/// Tool parameters for image_batch.
#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct ImageBatchParams {
    /// Items to run. Each needs a prompt and may set job_type and further tool parameters.
    #[serde(default)]
    pub items: Option<Vec<BatchItem>>,
    /// Path of a JSON batch file, instead of items
    #[serde(default)]
    pub config_file: Option<String>,
    /// Directory for outputs of items without their own output_file
    #[serde(default)]
    pub output_dir: Option<String>,
    /// Deadline for the whole batch in milliseconds (default 600000)
    #[serde(default)]
    pub max_wait_ms: Option<u64>,
    /// Parameters applied on top of every item's own parameters
    #[serde(default)]
    pub overrides: Option<Map<String, Value>>,
}

#[derive(Debug, Serialize)]
struct SubmittedJob<'a> {
    job_id: &'a str,
    job_type: JobType,
    status: JobStatus,
}

#[derive(Debug, Serialize)]
struct CancelledJob<'a> {
    job_id: &'a str,
    outcome: adk_rust_mcp_jobs::CancelOutcome,
}

fn parse_args<T: DeserializeOwned>(arguments: Option<JsonObject>) -> Result<T, McpError> {
    let args = Value::Object(arguments.unwrap_or_default());
    serde_json::from_value(args)
        .map_err(|e| McpError::invalid_params(format!("Invalid parameters: {}", e), None))
}

fn json_result<T: Serialize>(value: &T) -> Result<CallToolResult, McpError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| McpError::internal_error(format!("Failed to serialize result: {}", e), None))?;
    Ok(CallToolResult::success(vec![Content::text(text)]))
}

fn job_error(err: JobError) -> McpError {
    match err {
        JobError::Submission(_) | JobError::NotFound(_) | JobError::AlreadyTerminal { .. } => {
            McpError::invalid_params(err.to_string(), None)
        }
        JobError::Store(_) | JobError::QueueClosed => McpError::internal_error(err.to_string(), None),
    }
}

fn batch_error(err: BatchError) -> McpError {
    McpError::invalid_params(err.to_string(), None)
}

fn tool<T: JsonSchema>(name: &'static str, description: &'static str) -> Tool {
    let schema = schemars::schema_for!(T);
    let input_schema = match serde_json::to_value(&schema).unwrap_or_default() {
        Value::Object(map) => Arc::new(map),
        _ => Arc::new(Map::new()),
    };
    Tool {
        name: Cow::Borrowed(name),
        description: Some(Cow::Borrowed(description)),
        input_schema,
        annotations: None,
        icons: None,
        meta: None,
        output_schema: None,
        title: None,
    }
}

fn resource(uri: &str, name: &str, description: &str) -> Resource {
    Resource {
        raw: rmcp::model::RawResource {
            uri: uri.to_string(),
            name: name.to_string(),
            title: None,
            description: Some(description.to_string()),
            mime_type: Some("application/json".to_string()),
            size: None,
            icons: None,
            meta: None,
        },
        annotations: None,
    }
}

impl ImageServer {
    /// Create a server over a shared handler and a running job queue.
    pub fn new(handler: SharedHandler, queue: JobQueue) -> Self {
        Self { handler, queue }
    }

    /// The job queue behind the job tools.
    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    /// Generate images from a text prompt.
    pub async fn generate_image(&self, params: ImageGenerateToolParams) -> Result<CallToolResult, McpError> {
        info!(prompt = %params.prompt, "Generating image");

        let handler = self.handler.get().await.map_err(|e| {
            McpError::internal_error(format!("Failed to initialize handler: {}", e), None)
        })?;

        let result = handler.generate_image(params.into()).await.map_err(|e| {
            McpError::internal_error(format!("Image generation failed: {}", e), None)
        })?;

        let content = match result {
            ImageGenerateResult::Base64(images) => images
                .into_iter()
                .map(|img| Content::image(img.data, img.mime_type))
                .collect(),
            ImageGenerateResult::LocalFiles(paths) => {
                vec![Content::text(format!("Images saved to: {}", paths.join(", ")))]
            }
        };

        Ok(CallToolResult::success(content))
    }

    /// Upscale an image.
    pub async fn upscale_image(&self, params: ImageUpscaleToolParams) -> Result<CallToolResult, McpError> {
        info!(upscale_factor = ?params.upscale_factor, "Upscaling image");

        let handler = self.handler.get().await.map_err(|e| {
            McpError::internal_error(format!("Failed to initialize handler: {}", e), None)
        })?;

        let result = handler.upscale_image(params.into()).await.map_err(|e| {
            McpError::internal_error(format!("Image upscaling failed: {}", e), None)
        })?;

        let content = match result {
            ImageUpscaleResult::Base64(image) => vec![Content::image(image.data, image.mime_type)],
            ImageUpscaleResult::LocalFile(path) => {
                vec![Content::text(format!("Upscaled image saved to: {}", path))]
            }
        };

        Ok(CallToolResult::success(content))
    }

    /// Queue a job and return its id.
    pub async fn submit_job(&self, params: JobSubmitParams) -> Result<CallToolResult, McpError> {
        info!(job_type = %params.job_type, "Submitting job");

        let job_id = self
            .queue
            .create_job(params.job_type, params.params)
            .await
            .map_err(job_error)?;
        let status = self
            .queue
            .get_job(&job_id)
            .await
            .map_err(job_error)?
            .map(|job| job.status)
            .unwrap_or(JobStatus::Pending);

        json_result(&SubmittedJob {
            job_id: &job_id,
            job_type: params.job_type,
            status,
        })
    }

    /// Fetch one job.
    pub async fn get_job(&self, params: JobIdParams) -> Result<CallToolResult, McpError> {
        let job = self
            .queue
            .get_job(&params.job_id)
            .await
            .map_err(job_error)?
            .ok_or_else(|| job_error(JobError::NotFound(params.job_id.clone())))?;
        json_result(&job)
    }

    /// List jobs, newest first.
    pub async fn list_jobs(&self, params: JobListParams) -> Result<CallToolResult, McpError> {
        let jobs = self
            .queue
            .list_jobs(params.status, params.effective_limit())
            .await
            .map_err(job_error)?;
        json_result(&jobs)
    }

    /// Cancel a pending or running job.
    pub async fn cancel_job(&self, params: JobIdParams) -> Result<CallToolResult, McpError> {
        info!(job_id = %params.job_id, "Cancelling job");

        let outcome = self.queue.cancel_job(&params.job_id).await.map_err(job_error)?;
        json_result(&CancelledJob {
            job_id: &params.job_id,
            outcome,
        })
    }

    /// Run a batch to completion and return its report.
    pub async fn run_batch(&self, params: ImageBatchParams) -> Result<CallToolResult, McpError> {
        let mut config = match (params.items, params.config_file) {
            (Some(items), None) => BatchConfig::new(items),
            (None, Some(path)) => BatchConfig::from_file(&path).await.map_err(batch_error)?,
            (Some(_), Some(_)) => {
                return Err(McpError::invalid_params(
                    "Provide either items or config_file, not both",
                    None,
                ));
            }
            (None, None) => {
                return Err(McpError::invalid_params("Either items or config_file is required", None));
            }
        };

        if params.output_dir.is_some() {
            config.output_dir = params.output_dir;
        }
        if params.max_wait_ms.is_some() {
            config.max_wait_ms = params.max_wait_ms;
        }
        if params.overrides.is_some() {
            config.overrides = params.overrides;
        }

        info!(items = config.items.len(), "Running batch");
        let report = BatchOrchestrator::new(self.queue.clone())
            .run(&config)
            .await
            .map_err(batch_error)?;
        json_result(&report)
    }

    async fn job_stats_json(&self) -> Result<String, McpError> {
        let jobs = self
            .queue
            .store()
            .count_by_status()
            .await
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;
        let scheduler = self.queue.stats().await.map_err(job_error)?;
        Ok(resources::job_stats_resource_json(jobs, scheduler))
    }
}

impl ServerHandler for ImageServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Image generation and processing server using Google Vertex AI Imagen API. \
                 Use image_generate and image_upscale for immediate results. \
                 Use job_submit to queue generate, edit, customize, upscale or generate_and_upscale \
                 work, then job_get, job_list and job_cancel to track it. \
                 Use image_batch to run many prompts at once."
                    .to_string(),
            ),
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_resources()
                .build(),
            ..Default::default()
        }
    }

    fn list_tools(
        &self,
        _params: Option<rmcp::model::PaginatedRequestParam>,
        _context: rmcp::service::RequestContext<rmcp::service::RoleServer>,
    ) -> impl std::future::Future<Output = Result<rmcp::model::ListToolsResult, McpError>> + Send + '_ {
        async move {
            Ok(rmcp::model::ListToolsResult {
                tools: vec![
                    tool::<ImageGenerateToolParams>(
                        "image_generate",
                        "Generate images from a text prompt using Google's Imagen API. \
                         Returns base64-encoded image data, or local file paths when output_file is set.",
                    ),
                    tool::<ImageUpscaleToolParams>(
                        "image_upscale",
                        "Upscale an image using Google's Imagen 4.0 Upscale API. \
                         Supports x2 and x4 upscale factors. \
                         Accepts base64 image data or a local file path as input.",
                    ),
                    tool::<JobSubmitParams>(
                        "job_submit",
                        "Queue an image job and return its id immediately. \
                         Outputs default to OUTPUT_DIR/<job_id>.png.",
                    ),
                    tool::<JobIdParams>("job_get", "Get the status, result or error of a job."),
                    tool::<JobListParams>("job_list", "List jobs, newest first, optionally filtered by status."),
                    tool::<JobIdParams>(
                        "job_cancel",
                        "Cancel a job. Pending jobs fail immediately; running jobs fail when their work returns.",
                    ),
                    tool::<ImageBatchParams>(
                        "image_batch",
                        "Run a batch of prompts as jobs and wait for all of them, \
                         up to max_wait_ms. Returns a per-item report.",
                    ),
                ],
                next_cursor: None,
                meta: None,
            })
        }
    }

    fn call_tool(
        &self,
        params: rmcp::model::CallToolRequestParam,
        _context: rmcp::service::RequestContext<rmcp::service::RoleServer>,
    ) -> impl std::future::Future<Output = Result<CallToolResult, McpError>> + Send + '_ {
        async move {
            debug!(tool = %params.name, "Calling tool");
            match params.name.as_ref() {
                "image_generate" => self.generate_image(parse_args(params.arguments)?).await,
                "image_upscale" => self.upscale_image(parse_args(params.arguments)?).await,
                "job_submit" => self.submit_job(parse_args(params.arguments)?).await,
                "job_get" => self.get_job(parse_args(params.arguments)?).await,
                "job_list" => self.list_jobs(parse_args(params.arguments)?).await,
                "job_cancel" => self.cancel_job(parse_args(params.arguments)?).await,
                "image_batch" => self.run_batch(parse_args(params.arguments)?).await,
                _ => Err(McpError::invalid_params(format!("Unknown tool: {}", params.name), None)),
            }
        }
    }

    fn list_resources(
        &self,
        _params: Option<rmcp::model::PaginatedRequestParam>,
        _context: rmcp::service::RequestContext<rmcp::service::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListResourcesResult, McpError>> + Send + '_ {
        async move {
            debug!("Listing resources");

            Ok(ListResourcesResult {
                resources: vec![
                    resource(
                        resources::MODELS_URI,
                        "Available Image Models",
                        "Imagen models for generation, editing and upscaling",
                    ),
                    resource(
                        resources::PROVIDERS_URI,
                        "Available Providers",
                        "List of available image generation providers",
                    ),
                    resource(
                        resources::JOB_STATS_URI,
                        "Job Statistics",
                        "Job counts by status and scheduler occupancy",
                    ),
                ],
                next_cursor: None,
                meta: None,
            })
        }
    }

    fn read_resource(
        &self,
        params: rmcp::model::ReadResourceRequestParam,
        _context: rmcp::service::RequestContext<rmcp::service::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ReadResourceResult, McpError>> + Send + '_ {
        async move {
            let uri = &params.uri;
            debug!(uri = %uri, "Reading resource");

            let content = match uri.as_str() {
                resources::MODELS_URI => resources::models_resource_json(),
                resources::PROVIDERS_URI => resources::providers_resource_json(),
                resources::JOB_STATS_URI => self.job_stats_json().await?,
                _ => {
                    return Err(McpError::resource_not_found(
                        format!("Unknown resource: {}", uri),
                        None,
                    ));
                }
            };

            Ok(ReadResourceResult {
                contents: vec![ResourceContents::text(content, uri.clone())],
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adk_rust_mcp_common::config::Config;
    use adk_rust_mcp_jobs::{
        ExecutorRegistry, JobContext, JobStore, QueueConfig, ToolExecutor, ToolOutput,
    };
    use async_trait::async_trait;
    use rmcp::model::RawContent;
    use serde_json::json;
    use std::time::Duration;

    /// Writes nothing; reports the path it was asked for.
    struct Echo;

    #[async_trait]
    impl ToolExecutor for Echo {
        async fn execute(&self, ctx: JobContext, params: Value) -> anyhow::Result<ToolOutput> {
            tokio::time::sleep(Duration::from_millis(5)).await;
            let file = params["output_file"]
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| format!("/out/{}.png", ctx.job_id));
            Ok(ToolOutput::png(file))
        }
    }

    fn test_config() -> Config {
        Config::from_lookup(|name| match name {
            "PROJECT_ID" => Some("test-project".to_string()),
            _ => None,
        })
        .unwrap()
    }

    async fn server() -> ImageServer {
        let store = JobStore::in_memory().await.unwrap();
        let executors = ExecutorRegistry::new().with(JobType::Generate, Echo);
        let queue = JobQueue::start(store, executors, QueueConfig::default()).await.unwrap();
        ImageServer::new(SharedHandler::new(test_config()), queue)
    }

    fn text(result: &CallToolResult) -> Value {
        match &result.content[0].raw {
            RawContent::Text(t) => serde_json::from_str(&t.text).unwrap(),
            other => panic!("expected text content, got {:?}", other),
        }
    }

    fn args(value: Value) -> Option<JsonObject> {
        match value {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    async fn wait_completed(server: &ImageServer, job_id: &str) -> Value {
        for _ in 0..200 {
            let job = text(
                &server
                    .get_job(JobIdParams {
                        job_id: job_id.to_string(),
                    })
                    .await
                    .unwrap(),
            );
            if job["status"] == "completed" {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {} did not complete", job_id);
    }

    #[tokio::test]
    async fn test_server_info() {
        let info = server().await.get_info();
        assert!(info.instructions.unwrap().contains("job_submit"));
    }

    #[test]
    fn test_tool_params_conversion() {
        let tool_params = ImageGenerateToolParams {
            prompt: "A cat".to_string(),
            negative_prompt: Some("blurry".to_string()),
            model: Some("imagen-4".to_string()),
            aspect_ratio: Some("16:9".to_string()),
            number_of_images: Some(2),
            seed: Some(42),
            output_file: None,
        };

        let gen_params: ImageGenerateParams = tool_params.into();
        assert_eq!(gen_params.prompt, "A cat");
        assert_eq!(gen_params.negative_prompt, Some("blurry".to_string()));
        assert_eq!(gen_params.model, "imagen-4");
        assert_eq!(gen_params.aspect_ratio, "16:9");
        assert_eq!(gen_params.number_of_images, 2);
        assert_eq!(gen_params.seed, Some(42));
    }

    #[test]
    fn test_tool_params_defaults() {
        let tool_params: ImageGenerateToolParams = parse_args(args(json!({ "prompt": "A cat" }))).unwrap();

        let gen_params: ImageGenerateParams = tool_params.into();
        assert_eq!(gen_params.model, crate::handler::DEFAULT_MODEL);
        assert_eq!(gen_params.aspect_ratio, "1:1");
        assert_eq!(gen_params.number_of_images, 1);
    }

    #[test]
    fn test_missing_arguments_are_invalid_params() {
        let err = parse_args::<JobIdParams>(None).unwrap_err();
        assert!(err.message.contains("job_id"));

        let params: JobListParams = parse_args(None).unwrap();
        assert_eq!(params.effective_limit(), DEFAULT_JOB_LIST_LIMIT);
    }

    #[test]
    fn test_job_list_limit_is_clamped() {
        let limit = |n| JobListParams { status: None, limit: Some(n) }.effective_limit();
        assert_eq!(limit(0), 1);
        assert_eq!(limit(50), 50);
        assert_eq!(limit(5000), MAX_JOB_LIST_LIMIT);
    }

    #[test]
    fn test_job_submit_params_default_to_empty_object() {
        let params: JobSubmitParams = parse_args(args(json!({ "job_type": "upscale" }))).unwrap();
        assert_eq!(params.job_type, JobType::Upscale);
        assert_eq!(params.params, json!({}));

        assert!(parse_args::<JobSubmitParams>(args(json!({ "job_type": "paint" }))).is_err());
    }

    #[tokio::test]
    async fn test_submit_then_get_job() {
        let server = server().await;

        let submitted = text(
            &server
                .submit_job(JobSubmitParams {
                    job_type: JobType::Generate,
                    params: json!({ "prompt": "a lighthouse" }),
                })
                .await
                .unwrap(),
        );
        let job_id = submitted["job_id"].as_str().unwrap().to_string();
        assert_eq!(submitted["job_type"], "generate");

        let job = wait_completed(&server, &job_id).await;
        assert_eq!(job["result"]["outputs"][0], format!("/out/{}.png", job_id));
        assert_eq!(job["params"]["prompt"], "a lighthouse");

        let listed = text(&server.list_jobs(JobListParams::default()).await.unwrap());
        assert_eq!(listed.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_submit_unsupported_type_is_invalid_params() {
        let server = server().await;
        let err = server
            .submit_job(JobSubmitParams {
                job_type: JobType::Edit,
                params: json!({ "prompt": "x" }),
            })
            .await
            .unwrap_err();
        assert_eq!(err.code, rmcp::model::ErrorCode::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_unknown_job_is_invalid_params() {
        let server = server().await;
        let id = JobIdParams {
            job_id: "missing".to_string(),
        };
        let err = server.get_job(id).await.unwrap_err();
        assert!(err.message.contains("missing"));

        let err = server
            .cancel_job(JobIdParams {
                job_id: "missing".to_string(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.code, rmcp::model::ErrorCode::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_batch_tool_runs_items() {
        let server = server().await;
        let params: ImageBatchParams = parse_args(args(json!({
            "items": [{ "prompt": "one" }, { "prompt": "two", "aspect_ratio": "16:9" }],
            "output_dir": "/batch",
            "max_wait_ms": 5000,
        })))
        .unwrap();

        let report = text(&server.run_batch(params).await.unwrap());

        assert_eq!(report["total"], 2);
        assert_eq!(report["succeeded"], 2);
        let first_output = report["results"][0]["outputs"][0].as_str().unwrap();
        assert!(first_output.ends_with("batch_0.png"));
    }

    #[tokio::test]
    async fn test_batch_tool_needs_exactly_one_source() {
        let server = server().await;

        let err = server.run_batch(ImageBatchParams::default()).await.unwrap_err();
        assert!(err.message.contains("required"));

        let params = ImageBatchParams {
            items: Some(vec![BatchItem::new("x")]),
            config_file: Some("/tmp/batch.json".to_string()),
            ..Default::default()
        };
        assert!(server.run_batch(params).await.is_err());
    }

    #[tokio::test]
    async fn test_batch_tool_reads_config_file() {
        let server = server().await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("batch.json");
        tokio::fs::write(&path, r#"{"items": [{"prompt": "from file"}]}"#)
            .await
            .unwrap();

        let report = text(
            &server
                .run_batch(ImageBatchParams {
                    config_file: Some(path.display().to_string()),
                    max_wait_ms: Some(5000),
                    ..Default::default()
                })
                .await
                .unwrap(),
        );
        assert_eq!(report["results"][0]["prompt"], "from file");
        assert_eq!(report["results"][0]["status"], "completed");
    }

    #[tokio::test]
    async fn test_job_stats_resource() {
        let server = server().await;
        server
            .queue()
            .create_job(JobType::Generate, json!({ "prompt": "a" }))
            .await
            .unwrap();

        let stats: Value = serde_json::from_str(&server.job_stats_json().await.unwrap()).unwrap();
        assert_eq!(stats["total"], 1);
        assert_eq!(stats["scheduler"]["max_concurrent_jobs"], 2);
    }
}
