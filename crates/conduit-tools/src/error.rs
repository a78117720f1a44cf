use thiserror::Error;

/// Tool subsystem errors
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    /// Provider configuration rejected before any connection attempt
    #[error("invalid tool provider config: {0}")]
    InvalidConfig(String),

    /// Provider could not be reached or refused the connection
    #[error("connection failed: {0}")]
    Connection(String),

    /// Another provider already publishes this tool name
    #[error("tool '{tool}' is already provided by '{provider}'")]
    NameCollision { tool: String, provider: String },

    /// A provider with this id is already registered
    #[error("tool provider already registered: {id}")]
    AlreadyRegistered { id: String },

    #[error("tool provider not found: {id}")]
    ProviderNotFound { id: String },

    #[error("resource not found: {uri}")]
    ResourceNotFound { uri: String },

    /// Provider failed while serving a request
    #[error("tool execution failed: {0}")]
    Execution(String),
}
