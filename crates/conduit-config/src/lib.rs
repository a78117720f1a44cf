//! Configuration for the conduit gateway
//!
//! Everything is deserialized from a single TOML file. Secrets are held as
//! [`secrecy::SecretString`] and durations are written as human strings
//! (`"250ms"`, `"30s"`).

#![allow(clippy::must_use_candidate)]

mod duration;
mod env;
pub mod llm;
mod loader;
pub mod server;
pub mod telemetry;
pub mod tools;

use serde::Deserialize;

pub use llm::*;
pub use server::*;
pub use telemetry::*;
pub use tools::*;

/// Top-level conduit configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Logging configuration
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    /// Upstream LLM provider configuration
    #[serde(default)]
    pub llm: LlmConfig,
    /// Tool provider and tool-calling configuration
    #[serde(default)]
    pub tools: ToolsConfig,
}
