//! In-memory logger and monitor for assertions in tests

use std::error::Error;
use std::sync::{Arc, Mutex};

use opentelemetry::baggage::BaggageExt;
use opentelemetry::{Context, KeyValue};

use crate::logger::span_ids;
use crate::metrics::{Counter, Histogram, Monitor};
use crate::Logger;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

/// One captured log call
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub level: Level,
    pub message: String,
    pub cause: Option<String>,
    /// Call-site fields followed by baggage members
    pub fields: Vec<KeyValue>,
    pub trace_id: Option<String>,
}

impl LogEntry {
    /// Rendered value of the first field named `key`
    pub fn field(&self, key: &str) -> Option<String> {
        self.fields
            .iter()
            .find(|kv| kv.key.as_str() == key)
            .map(|kv| kv.value.to_string())
    }
}

/// Logger that records every call
#[derive(Debug, Default)]
pub struct CapturingLogger {
    entries: Mutex<Vec<LogEntry>>,
}

impl CapturingLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn last(&self) -> Option<LogEntry> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).last().cloned()
    }

    /// Entries with the given message
    pub fn find(&self, message: &str) -> Vec<LogEntry> {
        self.entries()
            .into_iter()
            .filter(|entry| entry.message == message)
            .collect()
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    fn record(&self, level: Level, cx: &Context, message: &str, cause: Option<String>, fields: &[KeyValue]) {
        let mut all = fields.to_vec();
        all.extend(
            cx.baggage()
                .iter()
                .map(|(key, (value, _))| KeyValue::new(key.clone(), value.clone())),
        );

        let entry = LogEntry {
            level,
            message: message.to_owned(),
            cause,
            fields: all,
            trace_id: span_ids(cx).map(|(trace_id, _)| trace_id),
        };
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).push(entry);
    }
}

impl Logger for CapturingLogger {
    fn debug(&self, cx: &Context, message: &str, fields: &[KeyValue]) {
        self.record(Level::Debug, cx, message, None, fields);
    }

    fn info(&self, cx: &Context, message: &str, fields: &[KeyValue]) {
        self.record(Level::Info, cx, message, None, fields);
    }

    fn warn(&self, cx: &Context, message: &str, fields: &[KeyValue]) {
        self.record(Level::Warn, cx, message, None, fields);
    }

    fn error(&self, cx: &Context, message: &str, cause: Option<&(dyn Error + 'static)>, fields: &[KeyValue]) {
        self.record(Level::Error, cx, message, cause.map(ToString::to_string), fields);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Counter,
    Histogram,
}

/// One captured counter increment or histogram record
#[derive(Debug, Clone)]
pub struct Measurement {
    pub name: String,
    pub value: f64,
    pub attributes: Vec<KeyValue>,
}

impl Measurement {
    /// Rendered value of the tag named `key`
    pub fn attribute(&self, key: &str) -> Option<String> {
        self.attributes
            .iter()
            .find(|kv| kv.key.as_str() == key)
            .map(|kv| kv.value.to_string())
    }
}

type Store = Arc<Mutex<Vec<(Kind, Measurement)>>>;

/// Monitor that records every measurement
#[derive(Debug, Default, Clone)]
pub struct CapturingMonitor {
    store: Store,
}

struct Instrument {
    kind: Kind,
    name: String,
    store: Store,
}

impl Instrument {
    fn push(&self, value: f64, attributes: &[KeyValue]) {
        let measurement = Measurement {
            name: self.name.clone(),
            value,
            attributes: attributes.to_vec(),
        };
        self.store
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((self.kind, measurement));
    }
}

impl Counter for Instrument {
    fn add(&self, value: f64, attributes: &[KeyValue]) {
        self.push(value, attributes);
    }
}

impl Histogram for Instrument {
    fn record(&self, value: f64, attributes: &[KeyValue]) {
        self.push(value, attributes);
    }
}

impl CapturingMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    fn measurements(&self, kind: Kind, name: &str) -> Vec<Measurement> {
        self.store
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|(k, m)| *k == kind && m.name == name)
            .map(|(_, m)| m.clone())
            .collect()
    }

    pub fn counter_measurements(&self, name: &str) -> Vec<Measurement> {
        self.measurements(Kind::Counter, name)
    }

    pub fn histogram_measurements(&self, name: &str) -> Vec<Measurement> {
        self.measurements(Kind::Histogram, name)
    }

    /// Sum of every increment of the counter named `name`
    pub fn counter_total(&self, name: &str) -> f64 {
        self.counter_measurements(name).iter().map(|m| m.value).sum()
    }
}

impl Monitor for CapturingMonitor {
    fn counter(&self, name: &str) -> Arc<dyn Counter> {
        Arc::new(Instrument {
            kind: Kind::Counter,
            name: name.to_owned(),
            store: self.store.clone(),
        })
    }

    fn histogram(&self, name: &str) -> Arc<dyn Histogram> {
        Arc::new(Instrument {
            kind: Kind::Histogram,
            name: name.to_owned(),
            store: self.store.clone(),
        })
    }
}
