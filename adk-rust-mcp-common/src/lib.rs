//! ADK Rust MCP Common Library
//!
//! Configuration, the Imagen model registry, ADC authentication, errors,
//! logging setup and MCP transports for the Imagen job server.

pub mod auth;
pub mod config;
pub mod error;
pub mod models;
pub mod server;
pub mod tracing;
pub mod transport;


pub use config::Config;
pub use error::{AuthError, ConfigError, Error, Result};
pub use server::{McpServerBuilder, ServerError};
pub use transport::{Transport, TransportArgs, TransportMode};
