//! ADK Rust MCP Image Server Library
//!
//! This library provides image generation, editing, customization and upscaling
//! using the Vertex AI Imagen API, either directly or as queued jobs.

pub mod executors;
pub mod handler;
pub mod resources;
pub mod server;

pub use handler::{
    GeneratedImage, ImageGenerateParams, ImageGenerateResult, ImageHandler, ImageUpscaleParams,
    ImageUpscaleResult, SharedHandler,
};
pub use server::ImageServer;
