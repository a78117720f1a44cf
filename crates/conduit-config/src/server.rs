use std::net::SocketAddr;

use serde::Deserialize;

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Address to bind; the `--listen` flag takes precedence
    #[serde(default)]
    pub listen_address: Option<SocketAddr>,
    /// Path of the liveness endpoint
    #[serde(default = "default_health_path")]
    pub health_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: None,
            health_path: default_health_path(),
        }
    }
}

fn default_health_path() -> String {
    "/health".to_owned()
}
