//! Test server wrapper that serves the gateway on a random port

use std::net::SocketAddr;
use std::sync::Arc;

use conduit_config::Config;
use conduit_gateway::{Gateway, gateway_router};
use tokio_util::sync::CancellationToken;

/// A running test server instance
pub struct TestServer {
    addr: SocketAddr,
    shutdown: CancellationToken,
    client: reqwest::Client,
    gateway: Arc<Gateway>,
}

impl TestServer {
    /// Build the gateway from `config` and serve it on `127.0.0.1:0`
    pub async fn start(config: Config) -> anyhow::Result<Self> {
        let gateway = Arc::new(Gateway::from_config(&config).await?);
        let router = gateway_router(Arc::clone(&gateway), &config.server.health_path);

        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    shutdown_clone.cancelled().await;
                })
                .await
                .ok();
        });

        Ok(Self {
            addr,
            shutdown,
            client: reqwest::Client::new(),
            gateway,
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// The gateway behind the routes, for direct API calls
    pub fn gateway(&self) -> &Arc<Gateway> {
        &self.gateway
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
