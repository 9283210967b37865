//! Capturing telemetry bundles for asserting on server and client output

use std::sync::Arc;

use opentelemetry::propagation::TextMapCompositePropagator;
use opentelemetry::trace::{SpanContext, SpanId, TraceContextExt, TraceFlags, TraceId, TraceState};
use opentelemetry_sdk::propagation::{BaggagePropagator, TraceContextPropagator};
use vigil_telemetry::testing::{CapturingLogger, CapturingMonitor};
use vigil_telemetry::{Context, Propagator, Telemetry};

pub const TRACE_ID: &str = "4bf92f3577b34da6a3ce929d0e0e4736";

/// Telemetry bundle recording everything it sees
pub struct Captured {
    pub telemetry: Telemetry,
    pub logger: Arc<CapturingLogger>,
    pub monitor: Arc<CapturingMonitor>,
}

impl Captured {
    /// Capturing logger and monitor with W3C trace context and baggage propagation
    pub fn new() -> Self {
        let logger = Arc::new(CapturingLogger::new());
        let monitor = Arc::new(CapturingMonitor::new());
        let telemetry = Telemetry::new()
            .with_logger(logger.clone())
            .with_monitor(monitor.clone())
            .with_propagator(w3c());

        Self {
            telemetry,
            logger,
            monitor,
        }
    }
}

/// Trace context plus baggage propagator
pub fn w3c() -> Propagator {
    Propagator::Custom(Arc::new(TextMapCompositePropagator::new(vec![
        Box::new(TraceContextPropagator::new()),
        Box::new(BaggagePropagator::new()),
    ])))
}

/// Context carrying a sampled remote span with [`TRACE_ID`]
pub fn traced() -> Context {
    Context::new().with_remote_span_context(SpanContext::new(
        TraceId::from_hex(TRACE_ID).unwrap(),
        SpanId::from_hex("00f067aa0ba902b7").unwrap(),
        TraceFlags::SAMPLED,
        true,
        TraceState::default(),
    ))
}
