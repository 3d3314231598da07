//! Imagen handler for the MCP Image server.
//!
//! This module provides the `ImageHandler` struct and parameter types for
//! generation, mask-based editing, subject/style customization and upscaling
//! through the Vertex AI Imagen `:predict` endpoint.

use adk_rust_mcp_common::auth::{AuthProvider, scopes};
use adk_rust_mcp_common::config::Config;
use adk_rust_mcp_common::error::Error;
use adk_rust_mcp_common::models::{
    IMAGEN_3_0_CAPABILITY_001, IMAGEN_4_0_GENERATE_PREVIEW_06_06, IMAGEN_4_0_UPSCALE_PREVIEW,
    ImagenCapability, ImagenModel, ModelRegistry,
};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument, warn};

/// Valid aspect ratios for image generation.
pub const VALID_ASPECT_RATIOS: &[&str] = &["1:1", "3:4", "4:3", "9:16", "16:9"];

/// Default model for image generation.
pub const DEFAULT_MODEL: &str = IMAGEN_4_0_GENERATE_PREVIEW_06_06.id;

/// Default model for editing and customization.
pub const DEFAULT_EDIT_MODEL: &str = IMAGEN_3_0_CAPABILITY_001.id;

/// Upscale model.
pub const UPSCALE_MODEL: &str = IMAGEN_4_0_UPSCALE_PREVIEW.id;

/// Minimum number of images that can be generated.
pub const MIN_NUMBER_OF_IMAGES: u8 = 1;

/// Maximum number of images that can be generated.
pub const MAX_NUMBER_OF_IMAGES: u8 = 4;

/// Valid upscale factors.
pub const VALID_UPSCALE_FACTORS: &[&str] = &["x2", "x4"];

/// Edit mode used when a request does not name one.
pub const DEFAULT_EDIT_MODE: &str = "EDIT_MODE_INPAINT_INSERTION";

/// Edit mode that removes masked content and needs no prompt.
pub const EDIT_MODE_REMOVAL: &str = "EDIT_MODE_INPAINT_REMOVAL";

/// Subject type used when a customization request does not name one.
pub const DEFAULT_SUBJECT_TYPE: &str = "SUBJECT_TYPE_DEFAULT";

/// Maximum number of reference images in one customization request.
pub const MAX_REFERENCE_IMAGES: usize = 4;

/// Rate-limit retry configuration
pub const RATE_LIMIT_MAX_ATTEMPTS: u32 = 3;
pub const RATE_LIMIT_INITIAL_DELAY_MS: u64 = 2000;
pub const RATE_LIMIT_BACKOFF_MULTIPLIER: u64 = 2;

/// Text-to-image generation parameters.
///
/// These parameters control the image generation process via the Vertex AI Imagen API.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct ImageGenerateParams {
    /// Text prompt describing the image to generate.
    /// Maximum length depends on the model (480 chars for Imagen 3, 2000 for Imagen 4).
    pub prompt: String,

    /// Negative prompt - what to avoid in the generated image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,

    /// Model to use for generation.
    /// Defaults to "imagen-4.0-generate-preview-06-06".
    #[serde(default = "default_model")]
    pub model: String,

    /// Aspect ratio for the generated image.
    /// Valid values: "1:1", "3:4", "4:3", "9:16", "16:9".
    #[serde(default = "default_aspect_ratio")]
    pub aspect_ratio: String,

    /// Number of images to generate (1-4).
    #[serde(default = "default_number_of_images")]
    pub number_of_images: u8,

    /// Random seed for reproducible generation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,

    /// Output file path for saving the image locally.
    /// If not specified, returns base64-encoded data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_file: Option<String>,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_edit_model() -> String {
    DEFAULT_EDIT_MODEL.to_string()
}

fn default_aspect_ratio() -> String {
    "1:1".to_string()
}

fn default_number_of_images() -> u8 {
    1
}

fn default_upscale_factor() -> String {
    "x2".to_string()
}

fn default_edit_mode() -> String {
    DEFAULT_EDIT_MODE.to_string()
}

fn default_subject_type() -> String {
    DEFAULT_SUBJECT_TYPE.to_string()
}

/// Mask-based editing parameters.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct ImageEditParams {
    /// Text prompt describing the edit. May be empty for removal.
    #[serde(default)]
    pub prompt: String,

    /// Source image (base64 data or local file path).
    pub image: String,

    /// Mask image (base64 data or local file path). White marks the region to edit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask: Option<String>,

    /// Automatic mask mode used when no mask image is given
    /// (e.g. "MASK_MODE_BACKGROUND", "MASK_MODE_FOREGROUND").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask_mode: Option<String>,

    /// Mask dilation as a fraction of image width.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask_dilation: Option<f32>,

    /// Imagen edit mode, passed through to the API.
    /// Defaults to "EDIT_MODE_INPAINT_INSERTION".
    #[serde(default = "default_edit_mode")]
    pub edit_mode: String,

    /// Model to use. Defaults to "imagen-3.0-capability-001".
    #[serde(default = "default_edit_model")]
    pub model: String,

    /// Negative prompt - what to avoid in the result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,

    /// Number of images to produce (1-4).
    #[serde(default = "default_number_of_images")]
    pub number_of_images: u8,

    /// Random seed for reproducible results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,

    /// Output file path for saving the result locally.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_file: Option<String>,
}

/// Subject and style customization parameters.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct ImageCustomizeParams {
    /// Prompt referring to the reference images by id, e.g. "a photo of [1] on a beach".
    pub prompt: String,

    /// Subject reference images (base64 data or local file paths), ids 1..n.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subject_images: Vec<String>,

    /// Short description of the subject.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_description: Option<String>,

    /// Imagen subject type. Defaults to "SUBJECT_TYPE_DEFAULT".
    #[serde(default = "default_subject_type")]
    pub subject_type: String,

    /// Style reference images, numbered after the subject images.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub style_images: Vec<String>,

    /// Short description of the style.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style_description: Option<String>,

    /// Model to use. Defaults to "imagen-3.0-capability-001".
    #[serde(default = "default_edit_model")]
    pub model: String,

    /// Negative prompt - what to avoid in the result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,

    /// Aspect ratio for the result.
    #[serde(default = "default_aspect_ratio")]
    pub aspect_ratio: String,

    /// Number of images to produce (1-4).
    #[serde(default = "default_number_of_images")]
    pub number_of_images: u8,

    /// Random seed for reproducible results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,

    /// Output file path for saving the result locally.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_file: Option<String>,
}

/// Image upscaling parameters.
///
/// These parameters control the image upscaling process via the Vertex AI Imagen Upscale API.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct ImageUpscaleParams {
    /// Source image to upscale.
    /// Can be base64 data or a local file path.
    pub image: String,

    /// Upscale factor: "x2" or "x4".
    #[serde(default = "default_upscale_factor")]
    pub upscale_factor: String,

    /// Output file path for saving the upscaled image locally.
    /// If not specified, returns base64-encoded data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_file: Option<String>,
}

/// Generation followed by upscaling of every generated image.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct GenerateAndUpscaleParams {
    /// Generation parameters. `output_file` is required.
    #[serde(flatten)]
    pub generate: ImageGenerateParams,

    /// Upscale factor: "x2" or "x4".
    #[serde(default = "default_upscale_factor")]
    pub upscale_factor: String,
}

/// Validation error details for image parameters.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field that failed validation.
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn finish(errors: Vec<ValidationError>) -> Result<(), Vec<ValidationError>> {
    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

fn into_error(errors: Vec<ValidationError>) -> Error {
    let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
    Error::validation(messages.join("; "))
}

fn check_model(
    name: &str,
    capability: ImagenCapability,
    errors: &mut Vec<ValidationError>,
) -> Option<&'static ImagenModel> {
    let model = ModelRegistry::resolve_for(capability, name);
    if model.is_none() {
        let valid: Vec<&str> = ModelRegistry::list_for(capability).map(|m| m.id).collect();
        errors.push(ValidationError::new(
            "model",
            format!("Unknown model '{}'. Valid models: {}", name, valid.join(", ")),
        ));
    }
    model
}

fn check_prompt_length(prompt: &str, model: Option<&ImagenModel>, errors: &mut Vec<ValidationError>) {
    if let Some(model) = model {
        if prompt.len() > model.max_prompt_length {
            errors.push(ValidationError::new(
                "prompt",
                format!(
                    "Prompt length {} exceeds maximum {} for model {}",
                    prompt.len(),
                    model.max_prompt_length,
                    model.id
                ),
            ));
        }
    }
}

fn check_aspect_ratio(aspect_ratio: &str, model: Option<&ImagenModel>, errors: &mut Vec<ValidationError>) {
    let (valid, model_id) = match model {
        Some(model) => (model.supported_aspect_ratios, Some(model.id)),
        None => (VALID_ASPECT_RATIOS, None),
    };
    if !valid.contains(&aspect_ratio) {
        let message = match model_id {
            Some(id) => format!(
                "Invalid aspect ratio '{}'. Valid options for {}: {}",
                aspect_ratio,
                id,
                valid.join(", ")
            ),
            None => format!("Invalid aspect ratio '{}'. Valid options: {}", aspect_ratio, valid.join(", ")),
        };
        errors.push(ValidationError::new("aspect_ratio", message));
    }
}

fn check_number_of_images(n: u8, errors: &mut Vec<ValidationError>) {
    if !(MIN_NUMBER_OF_IMAGES..=MAX_NUMBER_OF_IMAGES).contains(&n) {
        errors.push(ValidationError::new(
            "number_of_images",
            format!(
                "number_of_images must be between {} and {}, got {}",
                MIN_NUMBER_OF_IMAGES, MAX_NUMBER_OF_IMAGES, n
            ),
        ));
    }
}

fn check_upscale_factor(factor: &str, errors: &mut Vec<ValidationError>) {
    if !VALID_UPSCALE_FACTORS.contains(&factor) {
        errors.push(ValidationError::new(
            "upscale_factor",
            format!(
                "Invalid upscale factor '{}'. Valid options: {}",
                factor,
                VALID_UPSCALE_FACTORS.join(", ")
            ),
        ));
    }
}

impl ImageGenerateParams {
    /// Validate the parameters against the model constraints.
    ///
    /// # Returns
    /// - `Ok(())` if all parameters are valid
    /// - `Err(Vec<ValidationError>)` with all validation errors
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        let model = check_model(&self.model, ImagenCapability::Generate, &mut errors);
        check_prompt_length(&self.prompt, model, &mut errors);
        check_aspect_ratio(&self.aspect_ratio, model, &mut errors);
        check_number_of_images(self.number_of_images, &mut errors);

        if self.prompt.trim().is_empty() {
            errors.push(ValidationError::new("prompt", "Prompt cannot be empty"));
        }

        finish(errors)
    }

    /// Get the resolved model definition.
    pub fn get_model(&self) -> Option<&'static ImagenModel> {
        ModelRegistry::resolve_for(ImagenCapability::Generate, &self.model)
    }
}

impl ImageEditParams {
    /// Validate the edit parameters.
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        let model = check_model(&self.model, ImagenCapability::Edit, &mut errors);
        check_prompt_length(&self.prompt, model, &mut errors);
        check_number_of_images(self.number_of_images, &mut errors);

        if self.image.trim().is_empty() {
            errors.push(ValidationError::new("image", "Image cannot be empty"));
        }
        if self.edit_mode.trim().is_empty() {
            errors.push(ValidationError::new("edit_mode", "Edit mode cannot be empty"));
        }
        if self.prompt.trim().is_empty() && self.edit_mode != EDIT_MODE_REMOVAL {
            errors.push(ValidationError::new(
                "prompt",
                format!("Prompt cannot be empty unless edit_mode is {}", EDIT_MODE_REMOVAL),
            ));
        }

        finish(errors)
    }
}

impl ImageCustomizeParams {
    /// Validate the customization parameters.
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        let model = check_model(&self.model, ImagenCapability::Edit, &mut errors);
        check_prompt_length(&self.prompt, model, &mut errors);
        check_aspect_ratio(&self.aspect_ratio, model, &mut errors);
        check_number_of_images(self.number_of_images, &mut errors);

        if self.prompt.trim().is_empty() {
            errors.push(ValidationError::new("prompt", "Prompt cannot be empty"));
        }

        let references = self.subject_images.len() + self.style_images.len();
        if references == 0 {
            errors.push(ValidationError::new(
                "subject_images",
                "At least one subject or style reference image is required",
            ));
        } else if references > MAX_REFERENCE_IMAGES {
            errors.push(ValidationError::new(
                "subject_images",
                format!(
                    "At most {} reference images are allowed, got {}",
                    MAX_REFERENCE_IMAGES, references
                ),
            ));
        }

        finish(errors)
    }
}

impl ImageUpscaleParams {
    /// Validate the upscale parameters.
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.image.trim().is_empty() {
            errors.push(ValidationError::new("image", "Image cannot be empty"));
        }
        check_upscale_factor(&self.upscale_factor, &mut errors);

        finish(errors)
    }
}

impl GenerateAndUpscaleParams {
    /// Validate both stages up front.
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = match self.generate.validate() {
            Ok(()) => Vec::new(),
            Err(errors) => errors,
        };
        check_upscale_factor(&self.upscale_factor, &mut errors);
        if self.generate.output_file.is_none() {
            errors.push(ValidationError::new("output_file", "output_file is required"));
        }
        finish(errors)
    }
}

/// Image handler.
///
/// Calls the Vertex AI Imagen API and writes results to disk.
#[derive(Debug)]
pub struct ImageHandler {
    /// Application configuration.
    pub config: Config,
    /// HTTP client for API requests.
    pub http: reqwest::Client,
    /// Authentication provider.
    pub auth: AuthProvider,
}

impl ImageHandler {
    /// Create a new ImageHandler with the given configuration.
    ///
    /// # Errors
    /// Returns an error if the auth provider cannot find credentials.
    #[instrument(level = "debug", name = "image_handler_new", skip_all)]
    pub async fn new(config: Config) -> Result<Self, Error> {
        debug!("Initializing ImageHandler");

        let auth = AuthProvider::new().await?;
        Ok(Self::with_deps(config, reqwest::Client::new(), auth))
    }

    /// Create a new ImageHandler with provided dependencies.
    pub fn with_deps(config: Config, http: reqwest::Client, auth: AuthProvider) -> Self {
        Self { config, http, auth }
    }

    /// Get the Vertex AI `:predict` endpoint for the given model.
    pub fn get_endpoint(&self, model: &str) -> String {
        format!("{}:predict", self.config.vertex_ai_endpoint(model))
    }

    /// Generate images from a text prompt.
    ///
    /// # Returns
    /// * `Ok(ImageGenerateResult)` - Generated images with their data or paths
    /// * `Err(Error)` - If validation fails, API call fails, or output handling fails
    #[instrument(level = "info", name = "generate_image", skip(self, params), fields(model = %params.model, aspect_ratio = %params.aspect_ratio))]
    pub async fn generate_image(&self, params: ImageGenerateParams) -> Result<ImageGenerateResult, Error> {
        let images = self.generate_raw(&params).await?;
        write_outputs(images, params.output_file.as_deref()).await
    }

    async fn generate_raw(&self, params: &ImageGenerateParams) -> Result<Vec<GeneratedImage>, Error> {
        params.validate().map_err(into_error)?;

        let model = params
            .get_model()
            .ok_or_else(|| Error::validation(format!("Unknown model: {}", params.model)))?;

        info!(model_id = model.id, "Generating image with Imagen API");

        let request = ImagenRequest {
            instances: vec![ImagenInstance {
                prompt: params.prompt.clone(),
                negative_prompt: params.negative_prompt.clone(),
            }],
            parameters: ImagenParameters {
                sample_count: params.number_of_images,
                aspect_ratio: params.aspect_ratio.clone(),
                seed: params.seed,
            },
        };

        let response: ImagenResponse = self.predict(model.id, &request).await?;
        let images = images_from_predictions(&self.get_endpoint(model.id), response.predictions)?;

        info!(count = images.len(), "Received images from API");
        Ok(images)
    }

    /// Edit an image using a mask or an automatic mask mode.
    #[instrument(level = "info", name = "edit_image", skip(self, params), fields(model = %params.model, edit_mode = %params.edit_mode))]
    pub async fn edit_image(&self, params: ImageEditParams) -> Result<ImageGenerateResult, Error> {
        params.validate().map_err(into_error)?;

        let model = ModelRegistry::resolve_for(ImagenCapability::Edit, &params.model)
            .ok_or_else(|| Error::validation(format!("Unknown model: {}", params.model)))?;

        let mut reference_images = vec![ReferenceImage::raw(1, resolve_image_input(&params.image).await?)];
        if let Some(mask) = &params.mask {
            let mask = resolve_image_input(mask).await?;
            reference_images.push(ReferenceImage::mask(2, Some(mask), "MASK_MODE_USER_PROVIDED", params.mask_dilation));
        } else if let Some(mode) = &params.mask_mode {
            reference_images.push(ReferenceImage::mask(2, None, mode, params.mask_dilation));
        }

        let request = CapabilityRequest {
            instances: vec![CapabilityInstance {
                prompt: params.prompt.clone(),
                reference_images,
            }],
            parameters: CapabilityParameters {
                edit_mode: Some(params.edit_mode.clone()),
                sample_count: params.number_of_images,
                negative_prompt: params.negative_prompt.clone(),
                seed: params.seed,
                aspect_ratio: None,
            },
        };

        let response: ImagenResponse = self.predict(model.id, &request).await?;
        let images = images_from_predictions(&self.get_endpoint(model.id), response.predictions)?;

        info!(count = images.len(), "Received edited images from API");
        write_outputs(images, params.output_file.as_deref()).await
    }

    /// Generate images guided by subject and style reference images.
    #[instrument(level = "info", name = "customize_image", skip(self, params), fields(model = %params.model))]
    pub async fn customize_image(&self, params: ImageCustomizeParams) -> Result<ImageGenerateResult, Error> {
        params.validate().map_err(into_error)?;

        let model = ModelRegistry::resolve_for(ImagenCapability::Edit, &params.model)
            .ok_or_else(|| Error::validation(format!("Unknown model: {}", params.model)))?;

        let mut reference_images = Vec::new();
        let mut next_id = 1;
        for image in &params.subject_images {
            let config = SubjectImageConfig {
                subject_description: params.subject_description.clone().unwrap_or_default(),
                subject_type: params.subject_type.clone(),
            };
            reference_images.push(ReferenceImage::subject(next_id, resolve_image_input(image).await?, config));
            next_id += 1;
        }
        for image in &params.style_images {
            let config = StyleImageConfig {
                style_description: params.style_description.clone(),
            };
            reference_images.push(ReferenceImage::style(next_id, resolve_image_input(image).await?, config));
            next_id += 1;
        }

        let request = CapabilityRequest {
            instances: vec![CapabilityInstance {
                prompt: params.prompt.clone(),
                reference_images,
            }],
            parameters: CapabilityParameters {
                edit_mode: None,
                sample_count: params.number_of_images,
                negative_prompt: params.negative_prompt.clone(),
                seed: params.seed,
                aspect_ratio: Some(params.aspect_ratio.clone()),
            },
        };

        let response: ImagenResponse = self.predict(model.id, &request).await?;
        let images = images_from_predictions(&self.get_endpoint(model.id), response.predictions)?;

        info!(count = images.len(), "Received customized images from API");
        write_outputs(images, params.output_file.as_deref()).await
    }

    /// Upscale an image using the Imagen Upscale API.
    ///
    /// # Returns
    /// * `Ok(ImageUpscaleResult)` - Upscaled image with data or path
    /// * `Err(Error)` - If validation fails, API call fails, or output handling fails
    #[instrument(level = "info", name = "upscale_image", skip(self, params), fields(upscale_factor = %params.upscale_factor))]
    pub async fn upscale_image(&self, params: ImageUpscaleParams) -> Result<ImageUpscaleResult, Error> {
        params.validate().map_err(into_error)?;

        let image_data = resolve_image_input(&params.image).await?;
        let image = self.upscale_raw(image_data, &params.upscale_factor).await?;

        match &params.output_file {
            Some(output_file) => {
                write_file(output_file, &image).await?;
                info!(path = %output_file, "Saved upscaled image to local file");
                Ok(ImageUpscaleResult::LocalFile(output_file.clone()))
            }
            None => Ok(ImageUpscaleResult::Base64(image)),
        }
    }

    async fn upscale_raw(&self, image_data: String, upscale_factor: &str) -> Result<GeneratedImage, Error> {
        info!(upscale_factor = %upscale_factor, "Upscaling image with Imagen Upscale API");

        let request = UpscaleRequest {
            instances: vec![UpscaleInstance {
                image: ImageBytes {
                    bytes_base64_encoded: image_data,
                },
            }],
            parameters: UpscaleParameters {
                upscale_factor: upscale_factor.to_string(),
                output_mime_type: "image/png".to_string(),
            },
        };

        let response: ImagenResponse = self.predict(UPSCALE_MODEL, &request).await?;
        let endpoint = self.get_endpoint(UPSCALE_MODEL);
        images_from_predictions(&endpoint, response.predictions)?
            .into_iter()
            .next()
            .ok_or_else(|| Error::no_images(&endpoint, None))
    }

    /// Generate images to `output_file`, then upscale each one.
    ///
    /// Upscaled copies are written next to the originals with an `_upscaled`
    /// suffix; their paths are returned in generation order.
    #[instrument(level = "info", name = "generate_and_upscale", skip(self, params), fields(model = %params.generate.model, upscale_factor = %params.upscale_factor))]
    pub async fn generate_and_upscale(&self, params: GenerateAndUpscaleParams) -> Result<Vec<String>, Error> {
        params.validate().map_err(into_error)?;
        let output_file = params
            .generate
            .output_file
            .clone()
            .ok_or_else(|| Error::validation("output_file: output_file is required"))?;

        let images = self.generate_raw(&params.generate).await?;
        let generated = save_to_file(&images, &output_file).await?;

        let mut upscaled = Vec::with_capacity(images.len());
        for (image, path) in images.into_iter().zip(&generated) {
            let large = self.upscale_raw(image.data, &params.upscale_factor).await?;
            let target = suffixed_path(path, "_upscaled");
            write_file(&target, &large).await?;
            upscaled.push(target);
        }

        info!(count = upscaled.len(), "Generated and upscaled images");
        Ok(upscaled)
    }

    /// POST `request` to the model's `:predict` endpoint.
    ///
    /// Rate-limited calls (HTTP 429) are retried with exponential backoff.
    async fn predict<Req, Resp>(&self, model_id: &str, request: &Req) -> Result<Resp, Error>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let endpoint = self.get_endpoint(model_id);
        let mut delay_ms = RATE_LIMIT_INITIAL_DELAY_MS;
        let mut attempt = 1;

        loop {
            match self.predict_once(&endpoint, request).await {
                Err(err) if err.is_rate_limited() && attempt < RATE_LIMIT_MAX_ATTEMPTS => {
                    warn!(endpoint = %endpoint, attempt, retry_in_ms = delay_ms, "Imagen API rate limited");
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    delay_ms *= RATE_LIMIT_BACKOFF_MULTIPLIER;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    async fn predict_once<Req, Resp>(&self, endpoint: &str, request: &Req) -> Result<Resp, Error>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let token = self.auth.get_token(&[scopes::CLOUD_PLATFORM]).await?;

        debug!(endpoint = %endpoint, "Calling Imagen API");

        let response = self
            .http
            .post(endpoint)
            .header("Authorization", format!("Bearer {}", token))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| Error::request(endpoint, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::api(endpoint, status.as_u16(), body));
        }

        response.json().await.map_err(|e| {
            Error::api(endpoint, status.as_u16(), format!("Failed to parse response: {}", e))
        })
    }
}

fn images_from_predictions(endpoint: &str, predictions: Vec<ImagenPrediction>) -> Result<Vec<GeneratedImage>, Error> {
    let mut images = Vec::with_capacity(predictions.len());
    let mut filtered = None;
    for prediction in predictions {
        match prediction.bytes_base64_encoded {
            Some(data) => images.push(GeneratedImage {
                data,
                mime_type: prediction.mime_type.unwrap_or_else(|| "image/png".to_string()),
            }),
            None => filtered = filtered.or(prediction.rai_filtered_reason),
        }
    }

    if images.is_empty() {
        return Err(Error::no_images(endpoint, filtered));
    }
    if let Some(reason) = filtered {
        warn!(endpoint = %endpoint, reason = %reason, "Some images were filtered");
    }
    Ok(images)
}

/// Save to `output_file` when given, otherwise hand back the base64 data.
async fn write_outputs(images: Vec<GeneratedImage>, output_file: Option<&str>) -> Result<ImageGenerateResult, Error> {
    match output_file {
        Some(output_file) => Ok(ImageGenerateResult::LocalFiles(save_to_file(&images, output_file).await?)),
        None => Ok(ImageGenerateResult::Base64(images)),
    }
}

/// Save images to local files.
///
/// A single image goes to `output_file` itself; several get an index suffix.
pub async fn save_to_file(images: &[GeneratedImage], output_file: &str) -> Result<Vec<String>, Error> {
    let mut paths = Vec::with_capacity(images.len());

    for (i, image) in images.iter().enumerate() {
        let path = if images.len() == 1 {
            output_file.to_string()
        } else {
            indexed_path(output_file, i)
        };
        write_file(&path, image).await?;
        paths.push(path);
    }

    info!(count = paths.len(), "Saved images to local files");
    Ok(paths)
}

async fn write_file(path: &str, image: &GeneratedImage) -> Result<(), Error> {
    let data = BASE64
        .decode(&image.data)
        .map_err(|e| Error::validation(format!("Invalid base64 data: {}", e)))?;

    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    tokio::fs::write(path, &data).await?;
    Ok(())
}

/// `dir/stem.ext` -> `dir/stem_<index>.ext`.
pub fn indexed_path(path: &str, index: usize) -> String {
    suffixed_path(path, &format!("_{}", index))
}

/// `dir/stem.ext` -> `dir/stem<suffix>.ext`, defaulting to `image` and `png`.
pub fn suffixed_path(path: &str, suffix: &str) -> String {
    let p = Path::new(path);
    let stem = p.file_stem().and_then(|s| s.to_str()).unwrap_or("image");
    let ext = p.extension().and_then(|s| s.to_str()).unwrap_or("png");
    let parent = p.parent().and_then(|p| p.to_str()).unwrap_or("");
    if parent.is_empty() {
        format!("{}{}.{}", stem, suffix, ext)
    } else {
        format!("{}/{}{}.{}", parent, stem, suffix, ext)
    }
}

/// Resolve image input (local path or base64) to base64 data.
pub async fn resolve_image_input(image: &str) -> Result<String, Error> {
    if image.starts_with("gs://") {
        return Err(Error::validation(format!(
            "Cloud Storage inputs are not supported, use a local path: {}",
            image
        )));
    }

    let looks_like_path = image.starts_with('/')
        || image.starts_with("./")
        || image.starts_with("../")
        || image.starts_with("~/")
        || (image.len() < 500 && image.contains('/'));

    if looks_like_path {
        let path = Path::new(image);
        if !path.exists() {
            return Err(Error::validation(format!("Image file not found: {}", image)));
        }
        let data = tokio::fs::read(path).await?;
        return Ok(BASE64.encode(&data));
    }

    let path = Path::new(image);
    if path.exists() {
        let data = tokio::fs::read(path).await?;
        return Ok(BASE64.encode(&data));
    }

    if image.len() > 100 && BASE64.decode(image).is_ok() {
        return Ok(image.to_string());
    }

    Err(Error::validation(
        "Image input is not a valid file path or base64 data",
    ))
}

/// Lazily constructed [`ImageHandler`] shared by the MCP tools and the job executors.
///
/// Credentials are only looked up on first use, so the server starts without them.
#[derive(Clone)]
pub struct SharedHandler {
    config: Config,
    cell: Arc<OnceCell<ImageHandler>>,
}

impl SharedHandler {
    /// Handler built from `config` on first use.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            cell: Arc::new(OnceCell::new()),
        }
    }

    /// Wrap an already constructed handler.
    pub fn from_handler(handler: ImageHandler) -> Self {
        Self {
            config: handler.config.clone(),
            cell: Arc::new(OnceCell::new_with(Some(handler))),
        }
    }

    /// Server configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The handler, constructing it if needed.
    pub async fn get(&self) -> Result<&ImageHandler, Error> {
        self.cell
            .get_or_try_init(|| ImageHandler::new(self.config.clone()))
            .await
    }
}

impl std::fmt::Debug for SharedHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedHandler")
            .field("initialized", &self.cell.initialized())
            .finish()
    }
}

// =============================================================================
// API Request/Response Types
// =============================================================================

/// Vertex AI Imagen API request.
#[derive(Debug, Serialize)]
pub struct ImagenRequest {
    /// Input instances (prompts)
    pub instances: Vec<ImagenInstance>,
    /// Generation parameters
    pub parameters: ImagenParameters,
}

/// Imagen API instance (prompt).
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagenInstance {
    /// Text prompt describing the image
    pub prompt: String,
    /// Negative prompt - what to avoid
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
}

/// Imagen API parameters.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagenParameters {
    /// Number of images to generate
    pub sample_count: u8,
    /// Aspect ratio
    pub aspect_ratio: String,
    /// Random seed for reproducibility
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
}

/// Vertex AI Imagen API response, shared by every Imagen model.
#[derive(Debug, Deserialize)]
pub struct ImagenResponse {
    /// Generated image predictions
    #[serde(default)]
    pub predictions: Vec<ImagenPrediction>,
}

/// Imagen API prediction (generated image).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagenPrediction {
    /// Base64-encoded image data
    pub bytes_base64_encoded: Option<String>,
    /// MIME type of the image
    pub mime_type: Option<String>,
    /// Why the image was withheld, when it was
    #[serde(default)]
    pub rai_filtered_reason: Option<String>,
}

/// Capability model request (editing and customization).
#[derive(Debug, Serialize)]
pub struct CapabilityRequest {
    /// Input instances
    pub instances: Vec<CapabilityInstance>,
    /// Request parameters
    pub parameters: CapabilityParameters,
}

/// Capability model instance.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityInstance {
    /// Text prompt
    pub prompt: String,
    /// Reference images, addressed from the prompt by id
    pub reference_images: Vec<ReferenceImage>,
}

/// One reference image of a capability request.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceImage {
    /// REFERENCE_TYPE_RAW, _MASK, _SUBJECT or _STYLE
    pub reference_type: &'static str,
    /// Id the prompt refers to
    pub reference_id: u32,
    /// Image bytes; absent for automatic masks
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_image: Option<ImageBytes>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mask_image_config: Option<MaskImageConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_image_config: Option<SubjectImageConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style_image_config: Option<StyleImageConfig>,
}

impl ReferenceImage {
    fn bare(reference_type: &'static str, reference_id: u32, data: Option<String>) -> Self {
        Self {
            reference_type,
            reference_id,
            reference_image: data.map(|bytes_base64_encoded| ImageBytes { bytes_base64_encoded }),
            mask_image_config: None,
            subject_image_config: None,
            style_image_config: None,
        }
    }

    fn raw(reference_id: u32, data: String) -> Self {
        Self::bare("REFERENCE_TYPE_RAW", reference_id, Some(data))
    }

    fn mask(reference_id: u32, data: Option<String>, mask_mode: &str, dilation: Option<f32>) -> Self {
        Self {
            mask_image_config: Some(MaskImageConfig {
                mask_mode: mask_mode.to_string(),
                dilation,
            }),
            ..Self::bare("REFERENCE_TYPE_MASK", reference_id, data)
        }
    }

    fn subject(reference_id: u32, data: String, config: SubjectImageConfig) -> Self {
        Self {
            subject_image_config: Some(config),
            ..Self::bare("REFERENCE_TYPE_SUBJECT", reference_id, Some(data))
        }
    }

    fn style(reference_id: u32, data: String, config: StyleImageConfig) -> Self {
        Self {
            style_image_config: Some(config),
            ..Self::bare("REFERENCE_TYPE_STYLE", reference_id, Some(data))
        }
    }
}

/// Inline image bytes.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageBytes {
    /// Base64-encoded image data
    pub bytes_base64_encoded: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaskImageConfig {
    pub mask_mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dilation: Option<f32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectImageConfig {
    pub subject_description: String,
    pub subject_type: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleImageConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style_description: Option<String>,
}

/// Capability model parameters.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityParameters {
    /// Edit mode; absent for customization
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edit_mode: Option<String>,
    /// Number of images to produce
    pub sample_count: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<String>,
}

/// Vertex AI Imagen Upscale API request.
#[derive(Debug, Serialize)]
pub struct UpscaleRequest {
    /// Input instances (images to upscale)
    pub instances: Vec<UpscaleInstance>,
    /// Upscale parameters
    pub parameters: UpscaleParameters,
}

/// Upscale API instance.
#[derive(Debug, Serialize)]
pub struct UpscaleInstance {
    /// Source image to upscale
    pub image: ImageBytes,
}

/// Upscale API parameters.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpscaleParameters {
    /// Upscale factor: "x2" or "x4"
    pub upscale_factor: String,
    /// Output MIME type
    pub output_mime_type: String,
}

// =============================================================================
// Result Types
// =============================================================================

/// Generated image data.
#[derive(Debug, Clone)]
pub struct GeneratedImage {
    /// Base64-encoded image data
    pub data: String,
    /// MIME type of the image
    pub mime_type: String,
}

/// Result of generation, editing or customization.
#[derive(Debug)]
pub enum ImageGenerateResult {
    /// Base64-encoded image data (when no output specified)
    Base64(Vec<GeneratedImage>),
    /// Local file paths (when output_file specified)
    LocalFiles(Vec<String>),
}

/// Result of image upscaling.
#[derive(Debug)]
pub enum ImageUpscaleResult {
    /// Base64-encoded image data (when no output specified)
    Base64(GeneratedImage),
    /// Local file path (when output_file specified)
    LocalFile(String),
}
