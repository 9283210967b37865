//! Aggregated health endpoint

use std::collections::BTreeMap;
use std::error::Error;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use axum::Json;
use axum::response::{IntoResponse, Response};
use futures::future::join_all;
use http::StatusCode;
use serde_json::json;
use vigil_telemetry::Context;

/// Probe for one dependency
#[async_trait]
pub trait Checker: Send + Sync {
    /// # Errors
    ///
    /// Returns the reason the dependency is unhealthy
    async fn check(&self, cx: &Context) -> Result<(), Box<dyn Error + Send + Sync>>;
}

/// Adapter turning an async closure into a [`Checker`]
pub struct CheckFn<F>(pub F);

#[async_trait]
impl<F, Fut> Checker for CheckFn<F>
where
    F: Fn(Context) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), Box<dyn Error + Send + Sync>>> + Send,
{
    async fn check(&self, cx: &Context) -> Result<(), Box<dyn Error + Send + Sync>> {
        (self.0)(cx.clone()).await
    }
}

/// Named set of health checks
#[derive(Clone, Default)]
pub struct HealthChecks {
    checks: BTreeMap<String, Arc<dyn Checker>>,
}

impl HealthChecks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `checker` under `name`, replacing any previous check of that name
    #[must_use]
    pub fn with_check(mut self, name: impl Into<String>, checker: impl Checker + 'static) -> Self {
        self.checks.insert(name.into(), Arc::new(checker));
        self
    }

    /// Run every check concurrently
    ///
    /// Returns whether all passed and each check's result, `"ok"` or its error text.
    pub async fn run(&self, cx: &Context) -> (bool, BTreeMap<String, String>) {
        let results = join_all(self.checks.iter().map(|(name, checker)| async move {
            let outcome = checker.check(cx).await.map_err(|e| e.to_string());
            (name.clone(), outcome)
        }))
        .await;

        let healthy = results.iter().all(|(_, outcome)| outcome.is_ok());
        let report = results
            .into_iter()
            .map(|(name, outcome)| (name, outcome.err().unwrap_or_else(|| "ok".to_owned())))
            .collect();

        (healthy, report)
    }

    /// Health response: 200 when every check passes, 503 otherwise
    pub async fn respond(&self, cx: &Context) -> Response {
        let (healthy, checks) = self.run(cx).await;
        let status = if healthy {
            StatusCode::OK
        } else {
            StatusCode::SERVICE_UNAVAILABLE
        };

        (status, Json(json!({ "ok": healthy, "checks": checks }))).into_response()
    }
}

impl std::fmt::Debug for HealthChecks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthChecks")
            .field("checks", &self.checks.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Health check handler
pub async fn health_handler(checks: HealthChecks) -> Response {
    checks.respond(&Context::current()).await
}
