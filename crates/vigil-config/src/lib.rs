#![allow(clippy::must_use_candidate)]

mod env;
mod loader;
pub mod server;
pub mod telemetry;

use serde::Deserialize;

pub use server::*;
pub use telemetry::*;

/// Top-level Vigil configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Logging and trace propagation configuration
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}
