//! Tracing initialization for the Imagen job server.
//!
//! Logs are written to stderr so they never interleave with the MCP protocol
//! on stdout when the server runs over the stdio transport.
//!
//! # Usage
//!
//! ```no_run
//! use adk_rust_mcp_common::tracing::init_tracing;
//!
//! init_tracing(false);
//! tracing::info!("Application started");
//! ```
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Controls the log level and filtering, and wins over the
//!   default chosen from the debug flag. Examples:
//!   - `RUST_LOG=debug` - Enable debug logging for all modules
//!   - `RUST_LOG=adk_rust_mcp_jobs=debug` - Enable debug for the job queue
//!   - `RUST_LOG=warn,adk_rust_mcp_image=debug` - Warn by default, debug for image

use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    prelude::*,
    util::TryInitError,
};

/// Filter used when `RUST_LOG` is not set.
pub fn default_filter(debug: bool) -> &'static str {
    if debug { "debug" } else { "info" }
}

fn env_filter(debug: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(debug)))
}

/// Initialize the tracing subscriber.
///
/// With `debug` set the default level is `debug` and span source locations
/// are included.
///
/// # Panics
///
/// Panics if a global subscriber is already installed. Use
/// [`try_init_tracing`] where that can happen.
pub fn init_tracing(debug: bool) {
    if let Err(e) = try_init_tracing(debug) {
        panic!("Failed to initialize tracing: {}", e);
    }
}

/// Try to initialize tracing, returning an error if already initialized.
///
/// ```
/// use adk_rust_mcp_common::tracing::try_init_tracing;
///
/// // Ok or Err depending on prior initialization, never a panic
/// let _ = try_init_tracing(false);
/// ```
pub fn try_init_tracing(debug: bool) -> Result<(), TryInitError> {
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(false)
        .with_file(debug)
        .with_line_number(debug)
        .with_span_events(FmtSpan::NONE);

    tracing_subscriber::registry()
        .with(env_filter(debug))
        .with(fmt_layer)
        .try_init()
}
