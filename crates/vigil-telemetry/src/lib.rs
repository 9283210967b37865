//! Telemetry collaborators for Vigil
//!
//! Logging, metrics, and trace propagation are injected into interceptors as a
//! [`Telemetry`] bundle. Every part defaults to a no-op implementation, so a
//! bundle built with [`Telemetry::new`] is always safe to use.

#![allow(clippy::must_use_candidate)]

mod logger;
pub mod metrics;
pub mod propagation;
pub mod recover;
pub mod task;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod trace;

use std::fmt;
use std::sync::Arc;

use opentelemetry::global;
use opentelemetry::propagation::{TextMapCompositePropagator, TextMapPropagator};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::propagation::{BaggagePropagator, TraceContextPropagator};
use opentelemetry_sdk::trace::SdkTracerProvider;
use vigil_config::{LogFormat, PropagationFormat, TelemetryConfig};

pub use logger::{Logger, NoopLogger, Sanitizer, TracingLogger};
pub use metrics::{Counter, Histogram, Monitor, NoopMonitor, OtelMonitor};
pub use opentelemetry::{Context, KeyValue};
pub use propagation::Propagator;

/// Logging, metrics, and propagation collaborators shared by interceptors
#[derive(Clone)]
pub struct Telemetry {
    logger: Arc<dyn Logger>,
    monitor: Arc<dyn Monitor>,
    propagator: Propagator,
}

impl Telemetry {
    /// Bundle with no-op logging and metrics and the global propagator
    pub fn new() -> Self {
        Self {
            logger: Arc::new(NoopLogger),
            monitor: Arc::new(NoopMonitor),
            propagator: Propagator::Global,
        }
    }

    /// Replace the logging collaborator
    #[must_use]
    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    /// Replace the metrics collaborator
    #[must_use]
    pub fn with_monitor(mut self, monitor: Arc<dyn Monitor>) -> Self {
        self.monitor = monitor;
        self
    }

    /// Replace the trace propagator
    #[must_use]
    pub fn with_propagator(mut self, propagator: Propagator) -> Self {
        self.propagator = propagator;
        self
    }

    pub fn logger(&self) -> &dyn Logger {
        self.logger.as_ref()
    }

    pub fn monitor(&self) -> &dyn Monitor {
        self.monitor.as_ref()
    }

    pub const fn propagator(&self) -> &Propagator {
        &self.propagator
    }
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Telemetry")
            .field("propagator", &self.propagator)
            .finish_non_exhaustive()
    }
}

/// Guard that shuts down the tracer provider on drop
pub struct TelemetryGuard {
    tracer_provider: Option<SdkTracerProvider>,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.tracer_provider.take()
            && let Err(e) = provider.shutdown()
        {
            eprintln!("failed to shutdown tracer provider: {e}");
        }
    }
}

/// Initialize process-wide logging and trace propagation from configuration
///
/// Installs the `tracing-subscriber` formatter, a tracer provider so spans
/// carry real identifiers, and the configured text map propagators. Returns a
/// guard that must be held for the lifetime of the application.
///
/// # Errors
///
/// Returns an error if the log filter is invalid or a global subscriber is
/// already installed
pub fn init(config: &TelemetryConfig) -> anyhow::Result<TelemetryGuard> {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = EnvFilter::try_new(&config.log_filter)
        .map_err(|e| anyhow::anyhow!("invalid log filter '{}': {e}", config.log_filter))?;

    let (text_layer, json_layer) = match config.log_format {
        LogFormat::Text => (Some(tracing_subscriber::fmt::layer().with_target(true)), None),
        LogFormat::Json => (None, Some(tracing_subscriber::fmt::layer().json().with_target(true))),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(text_layer)
        .with(json_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))?;

    let tracer_provider = SdkTracerProvider::builder()
        .with_resource(
            Resource::builder()
                .with_service_name(config.service_name.clone())
                .build(),
        )
        .build();
    global::set_tracer_provider(tracer_provider.clone());

    global::set_text_map_propagator(build_propagator(&config.propagation));
    trace::set_tracer_name(config.tracer_name.clone());

    Ok(TelemetryGuard {
        tracer_provider: Some(tracer_provider),
    })
}

/// Compose the configured propagation formats
fn build_propagator(formats: &[PropagationFormat]) -> TextMapCompositePropagator {
    let propagators = formats
        .iter()
        .map(|format| -> Box<dyn TextMapPropagator + Send + Sync> {
            match format {
                PropagationFormat::TraceContext => Box::new(TraceContextPropagator::new()),
                PropagationFormat::Baggage => Box::new(BaggagePropagator::new()),
            }
        })
        .collect();

    TextMapCompositePropagator::new(propagators)
}
