//! Tool providers for conduit
//!
//! A [`ToolProvider`] advertises tools and resources and executes tool calls.
//! The [`ToolRegistry`] holds the live set and guarantees that tool names
//! stay unique across providers.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod error;
pub mod provider;
pub mod registry;
pub mod search;
pub mod types;

pub use error::ToolError;
pub use provider::{ToolProvider, build_provider};
pub use registry::{ProviderRecord, RegistrationOptions, ToolFilter, ToolRegistry};
pub use search::SearchToolProvider;
pub use types::{
    HealthReport, ProviderState, ResourceContent, ResourceDescriptor, ToolContent, ToolDefinition, ToolResult,
};
