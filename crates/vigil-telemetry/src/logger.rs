//! Structured, context-aware logging
//!
//! Every log call receives the request [`Context`], so trace identifiers and
//! baggage members are attached to the record without the caller repeating them.

use std::error::Error;
use std::fmt::Write as _;
use std::sync::Arc;

use opentelemetry::baggage::BaggageExt;
use opentelemetry::trace::TraceContextExt;
use opentelemetry::{Context, Key, KeyValue, Value};

/// Rewrites a field value before it is emitted, e.g. to mask secrets
pub type Sanitizer = Arc<dyn Fn(&Key, &Value) -> Value + Send + Sync>;

/// Leveled, structured logger receiving the request context on every call
pub trait Logger: Send + Sync {
    fn debug(&self, cx: &Context, message: &str, fields: &[KeyValue]);

    fn info(&self, cx: &Context, message: &str, fields: &[KeyValue]);

    fn warn(&self, cx: &Context, message: &str, fields: &[KeyValue]);

    /// Log a failure, attaching the cause when one is known
    fn error(&self, cx: &Context, message: &str, cause: Option<&(dyn Error + 'static)>, fields: &[KeyValue]);
}

/// Logger that discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLogger;

impl Logger for NoopLogger {
    fn debug(&self, _: &Context, _: &str, _: &[KeyValue]) {}

    fn info(&self, _: &Context, _: &str, _: &[KeyValue]) {}

    fn warn(&self, _: &Context, _: &str, _: &[KeyValue]) {}

    fn error(&self, _: &Context, _: &str, _: Option<&(dyn Error + 'static)>, _: &[KeyValue]) {}
}

/// Logger that emits `tracing` events under the `vigil` target
///
/// Records carry `trace_id` and `span_id` when the context holds a valid span,
/// every baggage member as an extra field, and the cause under `error`.
#[derive(Clone, Default)]
pub struct TracingLogger {
    sanitizer: Option<Sanitizer>,
}

impl TracingLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `sanitizer` to every field value before emission
    #[must_use]
    pub fn with_sanitizer(mut self, sanitizer: impl Fn(&Key, &Value) -> Value + Send + Sync + 'static) -> Self {
        self.sanitizer = Some(Arc::new(sanitizer));
        self
    }

    /// Render call-site fields followed by baggage members as `key=value` pairs
    fn render_fields(&self, cx: &Context, fields: &[KeyValue]) -> String {
        let mut out = String::new();
        let baggage = cx.baggage();

        let entries = fields
            .iter()
            .map(|kv| (kv.key.clone(), kv.value.clone()))
            .chain(baggage.iter().map(|(key, (value, _))| (key.clone(), Value::from(value.clone()))));

        for (key, value) in entries {
            let value = match &self.sanitizer {
                Some(sanitize) => sanitize(&key, &value),
                None => value,
            };
            if !out.is_empty() {
                out.push(' ');
            }
            let _ = write!(out, "{key}={value}");
        }

        out
    }
}

impl std::fmt::Debug for TracingLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TracingLogger")
            .field("sanitized", &self.sanitizer.is_some())
            .finish()
    }
}

/// Trace and span identifiers of the context's span, if it is valid
pub(crate) fn span_ids(cx: &Context) -> Option<(String, String)> {
    let span = cx.span();
    let span_context = span.span_context();
    span_context
        .is_valid()
        .then(|| (span_context.trace_id().to_string(), span_context.span_id().to_string()))
}

macro_rules! emit {
    ($level:expr, $cx:expr, $message:expr, $error:expr, $fields:expr) => {{
        let ids = span_ids($cx);
        let trace_id = ids.as_ref().map(|(trace, _)| trace.as_str());
        let span_id = ids.as_ref().map(|(_, span)| span.as_str());
        let error: Option<String> = $error;
        let fields: String = $fields;
        tracing::event!(
            target: "vigil",
            $level,
            trace_id,
            span_id,
            error = error.as_deref(),
            fields = fields.as_str(),
            "{}",
            $message
        );
    }};
}

impl Logger for TracingLogger {
    fn debug(&self, cx: &Context, message: &str, fields: &[KeyValue]) {
        emit!(tracing::Level::DEBUG, cx, message, None, self.render_fields(cx, fields));
    }

    fn info(&self, cx: &Context, message: &str, fields: &[KeyValue]) {
        emit!(tracing::Level::INFO, cx, message, None, self.render_fields(cx, fields));
    }

    fn warn(&self, cx: &Context, message: &str, fields: &[KeyValue]) {
        emit!(tracing::Level::WARN, cx, message, None, self.render_fields(cx, fields));
    }

    fn error(&self, cx: &Context, message: &str, cause: Option<&(dyn Error + 'static)>, fields: &[KeyValue]) {
        emit!(
            tracing::Level::ERROR,
            cx,
            message,
            cause.map(ToString::to_string),
            self.render_fields(cx, fields)
        );
    }
}
