//! Trace context carriers for HTTP headers and RPC metadata

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::Poll;

use http::{HeaderMap, HeaderName, HeaderValue};
use opentelemetry::propagation::{Extractor, Injector, TextMapPropagator};
use opentelemetry::{Context, global};
use tonic::metadata::{KeyRef, MetadataKey, MetadataMap, MetadataValue};

/// Read-only view of HTTP headers as a propagation carrier
pub struct HeaderExtractor<'a>(pub &'a HeaderMap);

impl Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|value| value.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(HeaderName::as_str).collect()
    }
}

/// Writable view of HTTP headers as a propagation carrier
pub struct HeaderInjector<'a>(pub &'a mut HeaderMap);

impl Injector for HeaderInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        if let Ok(name) = HeaderName::from_bytes(key.as_bytes())
            && let Ok(value) = HeaderValue::from_str(&value)
        {
            self.0.insert(name, value);
        }
    }
}

/// Read-only view of RPC metadata as a propagation carrier
pub struct MetadataExtractor<'a>(pub &'a MetadataMap);

impl Extractor for MetadataExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|value| value.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0
            .keys()
            .map(|key| match key {
                KeyRef::Ascii(key) => key.as_str(),
                KeyRef::Binary(key) => key.as_str(),
            })
            .collect()
    }
}

/// Writable view of RPC metadata as a propagation carrier
pub struct MetadataInjector<'a>(pub &'a mut MetadataMap);

impl Injector for MetadataInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        if let Ok(key) = MetadataKey::from_bytes(key.as_bytes())
            && let Ok(value) = MetadataValue::try_from(value.as_str())
        {
            self.0.insert(key, value);
        }
    }
}

/// Source of the text map propagator used by interceptors
#[derive(Clone, Default)]
pub enum Propagator {
    /// Whatever propagator is installed process-wide
    #[default]
    Global,
    /// A fixed propagator, independent of global state
    Custom(Arc<dyn TextMapPropagator + Send + Sync>),
}

impl Propagator {
    /// Merge the carrier's trace context and baggage into `cx`
    pub fn extract(&self, cx: &Context, carrier: &dyn Extractor) -> Context {
        match self {
            Self::Global => global::get_text_map_propagator(|p| p.extract_with_context(cx, carrier)),
            Self::Custom(p) => p.extract_with_context(cx, carrier),
        }
    }

    /// Write the trace context and baggage of `cx` into the carrier
    pub fn inject(&self, cx: &Context, carrier: &mut dyn Injector) {
        match self {
            Self::Global => global::get_text_map_propagator(|p| p.inject_context(cx, carrier)),
            Self::Custom(p) => p.inject_context(cx, carrier),
        }
    }
}

impl fmt::Debug for Propagator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => f.write_str("Global"),
            Self::Custom(_) => f.write_str("Custom"),
        }
    }
}

/// Future that runs with a context attached as current on every poll
pub struct Attached<F> {
    inner: Pin<Box<F>>,
    cx: Context,
}

impl<F: Future> Future for Attached<F> {
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, task: &mut std::task::Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let _guard = this.cx.clone().attach();
        this.inner.as_mut().poll(task)
    }
}

/// Run `future` with `cx` as the current context
pub fn attach<F: Future>(cx: Context, future: F) -> Attached<F> {
    Attached {
        inner: Box::pin(future),
        cx,
    }
}

#[cfg(test)]
mod tests {
    use opentelemetry::KeyValue;
    use opentelemetry::baggage::BaggageExt;
    use opentelemetry::trace::{SpanContext, SpanId, TraceContextExt, TraceFlags, TraceId, TraceState};
    use opentelemetry_sdk::propagation::{BaggagePropagator, TraceContextPropagator};

    use super::*;

    const TRACEPARENT: &str = "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01";

    fn trace_context() -> Propagator {
        Propagator::Custom(Arc::new(TraceContextPropagator::new()))
    }

    #[test]
    fn extracts_traceparent_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("traceparent", HeaderValue::from_static(TRACEPARENT));

        let cx = trace_context().extract(&Context::new(), &HeaderExtractor(&headers));
        let span = cx.span();
        assert!(span.span_context().is_remote());
        assert_eq!(
            span.span_context().trace_id().to_string(),
            "4bf92f3577b34da6a3ce929d0e0e4736"
        );
    }

    #[test]
    fn injects_into_metadata() {
        let span_context = SpanContext::new(
            TraceId::from_hex("4bf92f3577b34da6a3ce929d0e0e4736").unwrap(),
            SpanId::from_hex("00f067aa0ba902b7").unwrap(),
            TraceFlags::SAMPLED,
            true,
            TraceState::default(),
        );
        let cx = Context::new().with_remote_span_context(span_context);

        let mut metadata = MetadataMap::new();
        trace_context().inject(&cx, &mut MetadataInjector(&mut metadata));

        assert_eq!(metadata.get("traceparent").unwrap().to_str().unwrap(), TRACEPARENT);
    }

    #[test]
    fn baggage_round_trips_through_metadata() {
        let propagator = Propagator::Custom(Arc::new(BaggagePropagator::new()));
        let cx = Context::new().with_baggage([KeyValue::new("tenant", "acme")]);

        let mut metadata = MetadataMap::new();
        propagator.inject(&cx, &mut MetadataInjector(&mut metadata));
        let extracted = propagator.extract(&Context::new(), &MetadataExtractor(&metadata));

        assert_eq!(
            extracted.baggage().get("tenant").map(ToString::to_string).as_deref(),
            Some("acme")
        );
    }

    #[test]
    fn extracting_from_empty_carrier_keeps_base_context() {
        let base = Context::new().with_baggage([KeyValue::new("tenant", "acme")]);
        let headers = HeaderMap::new();

        let cx = trace_context().extract(&base, &HeaderExtractor(&headers));
        assert!(!cx.span().span_context().is_valid());
        assert_eq!(cx.baggage().len(), 1);
    }

    #[tokio::test]
    async fn attached_future_sees_context() {
        let cx = Context::new().with_baggage([KeyValue::new("tenant", "acme")]);

        let seen = attach(cx, async {
            tokio::task::yield_now().await;
            Context::current()
                .baggage()
                .get("tenant")
                .map(ToString::to_string)
        })
        .await;

        assert_eq!(seen.as_deref(), Some("acme"));
    }
}
