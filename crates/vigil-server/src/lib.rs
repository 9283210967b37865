//! Server-side interceptors for Vigil
//!
//! [`HttpObserver`] and [`GrpcObserver`] wrap handlers so that every call is
//! traced, timed, logged, and recovered from panics, and [`Server`] assembles
//! them into the demo application.

#![allow(clippy::must_use_candidate)]

mod demo;
mod encoder;
pub mod grpc_observer;
pub mod health;
pub mod http_observer;

use std::net::SocketAddr;

use axum::Router;
use axum::routing::get;
use tower_http::trace::TraceLayer;
use vigil_config::Config;
use vigil_telemetry::Telemetry;

pub use demo::demo_handler;
pub use encoder::{ErrorEncoder, JsonErrorEncoder};
pub use grpc_observer::GrpcObserver;
pub use health::{CheckFn, Checker, HealthChecks};
pub use http_observer::{BoxError, Handler, HttpObserver, ObservedHandler};

/// Path of the demonstration endpoint
pub const DEMO_PATH: &str = "/demo";

/// Assembled server with all routes and middleware
pub struct Server {
    telemetry: Telemetry,
    listen_address: SocketAddr,
    health_path: Option<String>,
    health_checks: HealthChecks,
}

impl Server {
    /// Build the server from configuration
    pub fn new(config: &Config, telemetry: Telemetry) -> Self {
        let listen_address = config
            .server
            .listen_address
            .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

        let health_path = config
            .server
            .health
            .enabled
            .then(|| config.server.health.path.clone());

        Self {
            telemetry,
            listen_address,
            health_path,
            health_checks: HealthChecks::new(),
        }
    }

    /// Report `checks` on the health endpoint
    #[must_use]
    pub fn with_health_checks(mut self, checks: HealthChecks) -> Self {
        self.health_checks = checks;
        self
    }

    /// Get the configured listen address
    #[must_use]
    pub const fn listen_address(&self) -> SocketAddr {
        self.listen_address
    }

    /// Consume the server and return the inner router
    ///
    /// Useful for testing when the caller manages the listener
    pub fn into_router(self) -> Router {
        let observer = HttpObserver::new(self.telemetry);

        let mut app = Router::new().route_service(DEMO_PATH, observer.wrap(demo_handler));

        // Health check
        if let Some(path) = self.health_path {
            let checks = self.health_checks;
            app = app.route(
                &path,
                get(move || {
                    let checks = checks.clone();
                    async move { health::health_handler(checks).await }
                }),
            );
        }

        app.layer(TraceLayer::new_for_http())
    }

    /// Start serving requests
    ///
    /// Blocks until the cancellation token is triggered.
    ///
    /// # Errors
    ///
    /// Returns an error if binding the TCP listener or serving fails
    pub async fn serve(self, shutdown: tokio_util::sync::CancellationToken) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.listen_address).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!(%local_addr, "server listening");

        axum::serve(listener, self.into_router())
            .with_graceful_shutdown(async move {
                shutdown.cancelled().await;
                tracing::info!("graceful shutdown initiated");
            })
            .await?;

        Ok(())
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("listen_address", &self.listen_address)
            .field("health_path", &self.health_path)
            .field("health_checks", &self.health_checks)
            .finish_non_exhaustive()
    }
}
