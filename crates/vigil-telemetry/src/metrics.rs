//! Metric name constants and instrument traits

use std::fmt;
use std::sync::Arc;

use opentelemetry::KeyValue;
use opentelemetry::metrics::Meter;

// HTTP metric names
pub const HTTP_REQUEST_COUNT: &str = "http.server.request.count";
pub const HTTP_REQUEST_DURATION: &str = "http.server.request.duration";
pub const HTTP_PANIC_COUNT: &str = "http.server.panic.count";

// RPC metric names
pub const RPC_REQUEST_COUNT: &str = "rpc.server.request.count";
pub const RPC_REQUEST_DURATION: &str = "rpc.server.request.duration";
pub const RPC_PANIC_COUNT: &str = "rpc.server.panic.count";

// Background task metric names
pub const TASK_PANIC_COUNT: &str = "task.panic.count";

/// Monotonic counter
pub trait Counter: Send + Sync {
    fn add(&self, value: f64, attributes: &[KeyValue]);

    fn inc(&self, attributes: &[KeyValue]) {
        self.add(1.0, attributes);
    }
}

/// Distribution of recorded values
pub trait Histogram: Send + Sync {
    fn record(&self, value: f64, attributes: &[KeyValue]);
}

/// Factory for named instruments
pub trait Monitor: Send + Sync {
    fn counter(&self, name: &str) -> Arc<dyn Counter>;

    fn histogram(&self, name: &str) -> Arc<dyn Histogram>;
}

/// Monitor that discards every measurement
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMonitor;

impl Counter for NoopMonitor {
    fn add(&self, _: f64, _: &[KeyValue]) {}
}

impl Histogram for NoopMonitor {
    fn record(&self, _: f64, _: &[KeyValue]) {}
}

impl Monitor for NoopMonitor {
    fn counter(&self, _: &str) -> Arc<dyn Counter> {
        Arc::new(Self)
    }

    fn histogram(&self, _: &str) -> Arc<dyn Histogram> {
        Arc::new(Self)
    }
}

/// Monitor backed by an OpenTelemetry [`Meter`]
///
/// Exporting is left to whichever meter provider the application installs.
#[derive(Clone)]
pub struct OtelMonitor {
    meter: Meter,
}

impl OtelMonitor {
    pub const fn new(meter: Meter) -> Self {
        Self { meter }
    }

    /// Monitor using the global meter provider
    pub fn global() -> Self {
        Self::new(opentelemetry::global::meter("vigil"))
    }
}

impl fmt::Debug for OtelMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OtelMonitor").finish_non_exhaustive()
    }
}

struct OtelCounter(opentelemetry::metrics::Counter<f64>);

impl Counter for OtelCounter {
    fn add(&self, value: f64, attributes: &[KeyValue]) {
        self.0.add(value, attributes);
    }
}

struct OtelHistogram(opentelemetry::metrics::Histogram<f64>);

impl Histogram for OtelHistogram {
    fn record(&self, value: f64, attributes: &[KeyValue]) {
        self.0.record(value, attributes);
    }
}

impl Monitor for OtelMonitor {
    fn counter(&self, name: &str) -> Arc<dyn Counter> {
        Arc::new(OtelCounter(self.meter.f64_counter(name.to_owned()).build()))
    }

    fn histogram(&self, name: &str) -> Arc<dyn Histogram> {
        Arc::new(OtelHistogram(
            self.meter.f64_histogram(name.to_owned()).with_unit("s").build(),
        ))
    }
}
