//! Test server wrapper that starts Vigil on a random port

use std::net::SocketAddr;

use tokio_util::sync::CancellationToken;
use tower::Layer;
use vigil_client::{HttpClient, HttpClientLayer, ReqwestTransport};
use vigil_config::Config;
use vigil_server::Server;
use vigil_telemetry::Telemetry;

/// A running test server instance
pub struct TestServer {
    addr: SocketAddr,
    shutdown: CancellationToken,
    client: reqwest::Client,
}

impl TestServer {
    /// Start a test server with the given configuration and no-op telemetry
    pub async fn start(config: Config) -> anyhow::Result<Self> {
        Self::serve(Server::new(&config, Telemetry::new())).await
    }

    /// Start an already assembled server
    ///
    /// Binds to port 0 for automatic port assignment
    pub async fn serve(server: Server) -> anyhow::Result<Self> {
        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();

        // Bind the listener here so we know the actual port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        tokio::spawn(async move {
            axum::serve(listener, server.into_router())
                .with_graceful_shutdown(async move {
                    shutdown_clone.cancelled().await;
                })
                .await
                .ok();
        });

        let client = reqwest::Client::new();

        Ok(Self { addr, shutdown, client })
    }

    /// Base URL of the running test server
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    /// Get a reference to the plain HTTP client
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Observed client service over a reqwest transport
    pub fn observed_client(&self, telemetry: Telemetry) -> HttpClient<ReqwestTransport> {
        HttpClientLayer::new(telemetry).layer(ReqwestTransport::new(self.client.clone()))
    }

    /// Server address
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
