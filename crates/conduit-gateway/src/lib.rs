//! Tool-augmented completions for conduit
//!
//! The [`AutoInjectionManager`] attaches tool schemas to outgoing requests,
//! executes the tool calls a model makes and resubmits the results. The
//! [`Gateway`] facade wires it to the provider and tool registries and, with
//! the `http` feature, exposes everything over an axum router.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod error;
pub mod gateway;
pub mod history;
#[cfg(feature = "http")]
pub mod http;
pub mod injection;

pub use error::tool_error;
pub use gateway::Gateway;
pub use history::{HistoryEntry, HistoryStore};
#[cfg(feature = "http")]
pub use http::{ChatRequest, gateway_router};
pub use injection::{AutoInjectionManager, InjectionSettings, ToolOptions};
