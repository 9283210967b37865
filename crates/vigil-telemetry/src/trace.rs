//! Span and baggage helpers

use std::error::Error;
use std::sync::OnceLock;

use opentelemetry::baggage::BaggageExt;
use opentelemetry::trace::{Status, TraceContextExt, Tracer};
use opentelemetry::{Context, KeyValue, global};

/// Default instrumentation scope name for spans started by Vigil
pub const TRACER_NAME: &str = "vigil";

static CONFIGURED_TRACER: OnceLock<String> = OnceLock::new();

/// Set the instrumentation scope name used by [`start`]
///
/// Only the first call has an effect. Returns whether the name was applied.
pub fn set_tracer_name(name: impl Into<String>) -> bool {
    CONFIGURED_TRACER.set(name.into()).is_ok()
}

fn tracer_name() -> String {
    CONFIGURED_TRACER.get().map_or_else(|| TRACER_NAME.to_owned(), Clone::clone)
}

/// Handle that ends a span exactly once
///
/// Dropping the handle without calling [`SpanEnd::end`] ends the span with an
/// unset status.
#[derive(Debug)]
pub struct SpanEnd {
    cx: Context,
    ended: bool,
}

impl SpanEnd {
    /// End the span, recording the error of a failed outcome
    pub fn end<T, E>(self, outcome: &Result<T, E>)
    where
        E: Error + 'static,
    {
        self.end_with(outcome.as_ref().err().map(|e| e as &(dyn Error + 'static)));
    }

    /// End the span, recording `error` when present
    pub fn end_with(mut self, error: Option<&(dyn Error + 'static)>) {
        let span = self.cx.span();
        if let Some(err) = error {
            span.record_error(err);
            span.set_status(Status::error(err.to_string()));
        }
        span.end();
        self.ended = true;
    }
}

impl Drop for SpanEnd {
    fn drop(&mut self) {
        if !self.ended {
            self.cx.span().end();
        }
    }
}

/// Start a child span of `cx` named `name`
///
/// Returns the context carrying the new span and the handle that ends it.
pub fn start(cx: &Context, name: impl Into<String>) -> (Context, SpanEnd) {
    let tracer = global::tracer(tracer_name());
    let span = tracer.start_with_context(name.into(), cx);
    let cx = cx.with_span(span);

    (cx.clone(), SpanEnd { cx, ended: false })
}

/// Return a context with `key` set in its baggage
pub fn set_baggage(cx: &Context, key: impl Into<String>, value: impl Into<String>) -> Context {
    let key = key.into();
    let mut members: Vec<KeyValue> = cx
        .baggage()
        .iter()
        .filter(|(k, _)| k.as_str() != key)
        .map(|(k, (v, _))| KeyValue::new(k.clone(), v.clone()))
        .collect();
    members.push(KeyValue::new(key, value.into()));
    cx.with_baggage(members)
}

/// Read a baggage member of `cx`
pub fn get_baggage(cx: &Context, key: &str) -> Option<String> {
    cx.baggage().get(key).map(ToString::to_string)
}
