//! Model definitions and registry for Imagen models.
//!
//! This module provides static model definitions and a registry for resolving
//! model names and aliases to their full definitions.

use serde::Serialize;

/// What an Imagen model can be asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImagenCapability {
    /// Text-to-image generation
    Generate,
    /// Mask-based editing and subject/style customization
    Edit,
    /// Super-resolution of an existing image
    Upscale,
}

/// Imagen model definition.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ImagenModel {
    /// Full model identifier
    pub id: &'static str,
    /// Model aliases for convenience
    #[serde(skip)]
    pub aliases: &'static [&'static str],
    /// What the model is used for
    pub capability: ImagenCapability,
    /// Maximum prompt length in characters
    pub max_prompt_length: usize,
    /// Supported aspect ratios
    pub supported_aspect_ratios: &'static [&'static str],
    /// Maximum number of images per request
    pub max_images: u8,
}

const ASPECT_RATIOS: &[&str] = &["1:1", "3:4", "4:3", "9:16", "16:9"];

/// Imagen 3.0 Generate model (stable)
pub const IMAGEN_3_0_GENERATE_002: ImagenModel = ImagenModel {
    id: "imagen-3.0-generate-002",
    aliases: &["imagen-3", "imagen-3.0", "imagen3"],
    capability: ImagenCapability::Generate,
    max_prompt_length: 480,
    supported_aspect_ratios: ASPECT_RATIOS,
    max_images: 4,
};

/// Imagen 3.0 Fast Generate model
pub const IMAGEN_3_0_FAST_GENERATE_001: ImagenModel = ImagenModel {
    id: "imagen-3.0-fast-generate-001",
    aliases: &["imagen-3-fast", "imagen-3.0-fast"],
    capability: ImagenCapability::Generate,
    max_prompt_length: 480,
    supported_aspect_ratios: ASPECT_RATIOS,
    max_images: 4,
};

/// Imagen 4.0 Generate Preview model (June 2025)
pub const IMAGEN_4_0_GENERATE_PREVIEW_06_06: ImagenModel = ImagenModel {
    id: "imagen-4.0-generate-preview-06-06",
    aliases: &["imagen-4", "imagen-4.0", "imagen4", "imagen-4-preview"],
    capability: ImagenCapability::Generate,
    max_prompt_length: 2000,
    supported_aspect_ratios: ASPECT_RATIOS,
    max_images: 4,
};

/// Imagen 3.0 Capability model, used for editing and customization
pub const IMAGEN_3_0_CAPABILITY_001: ImagenModel = ImagenModel {
    id: "imagen-3.0-capability-001",
    aliases: &["imagen-3-capability", "imagen-edit"],
    capability: ImagenCapability::Edit,
    max_prompt_length: 480,
    supported_aspect_ratios: ASPECT_RATIOS,
    max_images: 4,
};

/// Imagen 4.0 Upscale Preview model
pub const IMAGEN_4_0_UPSCALE_PREVIEW: ImagenModel = ImagenModel {
    id: "imagen-4.0-upscale-preview",
    aliases: &["imagen-upscale", "imagen-4-upscale"],
    capability: ImagenCapability::Upscale,
    max_prompt_length: 0,
    supported_aspect_ratios: &[],
    max_images: 1,
};

/// All available Imagen models
pub const IMAGEN_MODELS: &[ImagenModel] = &[
    IMAGEN_3_0_GENERATE_002,
    IMAGEN_3_0_FAST_GENERATE_001,
    IMAGEN_4_0_GENERATE_PREVIEW_06_06,
    IMAGEN_3_0_CAPABILITY_001,
    IMAGEN_4_0_UPSCALE_PREVIEW,
];

/// Model registry for resolution and listing.
pub struct ModelRegistry;

impl ModelRegistry {
    /// Resolve an Imagen model name or alias to full model definition.
    ///
    /// Accepts either the canonical model ID (e.g., "imagen-3.0-generate-002")
    /// or any of its aliases (e.g., "imagen-3", "imagen3").
    ///
    /// ```
    /// use adk_rust_mcp_common::models::ModelRegistry;
    ///
    /// assert!(ModelRegistry::resolve_imagen("imagen-3.0-generate-002").is_some());
    /// assert!(ModelRegistry::resolve_imagen("imagen-3").is_some());
    /// ```
    pub fn resolve_imagen(name: &str) -> Option<&'static ImagenModel> {
        IMAGEN_MODELS
            .iter()
            .find(|model| model.id == name || model.aliases.contains(&name))
    }

    /// Resolve a model name, accepting it only if it has `capability`.
    ///
    /// ```
    /// use adk_rust_mcp_common::models::{ImagenCapability, ModelRegistry};
    ///
    /// assert!(ModelRegistry::resolve_for(ImagenCapability::Edit, "imagen-edit").is_some());
    /// assert!(ModelRegistry::resolve_for(ImagenCapability::Edit, "imagen-3").is_none());
    /// ```
    pub fn resolve_for(capability: ImagenCapability, name: &str) -> Option<&'static ImagenModel> {
        Self::resolve_imagen(name).filter(|model| model.capability == capability)
    }

    /// Model used when a request does not name one.
    pub fn default_for(capability: ImagenCapability) -> &'static ImagenModel {
        match capability {
            ImagenCapability::Generate => &IMAGEN_4_0_GENERATE_PREVIEW_06_06,
            ImagenCapability::Edit => &IMAGEN_3_0_CAPABILITY_001,
            ImagenCapability::Upscale => &IMAGEN_4_0_UPSCALE_PREVIEW,
        }
    }

    /// List all available Imagen models.
    pub fn list_imagen_models() -> &'static [ImagenModel] {
        IMAGEN_MODELS
    }

    /// Models with `capability`, in declaration order.
    pub fn list_for(capability: ImagenCapability) -> impl Iterator<Item = &'static ImagenModel> {
        IMAGEN_MODELS.iter().filter(move |model| model.capability == capability)
    }
}
