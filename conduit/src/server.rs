use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use conduit_config::Config;
use conduit_gateway::{Gateway, gateway_router};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

/// Assembled HTTP server
pub struct Server {
    router: Router,
    listen_address: SocketAddr,
}

impl Server {
    /// Build the gateway and its routes from configuration
    ///
    /// `listen` takes precedence over `server.listen_address`.
    ///
    /// # Errors
    ///
    /// Returns an error if an LLM provider cannot be built
    pub async fn new(config: &Config, listen: Option<SocketAddr>) -> anyhow::Result<Self> {
        let listen_address = listen
            .or(config.server.listen_address)
            .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 3000)));

        let gateway = Gateway::from_config(config).await?;

        let router = gateway_router(Arc::new(gateway), &config.server.health_path).layer(TraceLayer::new_for_http());

        Ok(Self { router, listen_address })
    }

    /// Serve until `shutdown` is cancelled
    ///
    /// # Errors
    ///
    /// Returns an error if binding the TCP listener or serving fails
    pub async fn serve(self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.listen_address).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!(%local_addr, "server listening");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                shutdown.cancelled().await;
                tracing::info!("graceful shutdown initiated");
            })
            .await?;

        Ok(())
    }
}
