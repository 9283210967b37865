use serde::Deserialize;

/// Logging and trace propagation configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TelemetryConfig {
    /// Service name reported on spans
    #[serde(default = "default_service_name")]
    pub service_name: String,
    /// `EnvFilter` directives, e.g. `info,vigil=debug`
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    #[serde(default)]
    pub log_format: LogFormat,
    /// Instrumentation scope name for spans
    #[serde(default = "default_tracer_name")]
    pub tracer_name: String,
    /// Propagation formats, applied in order
    #[serde(default = "default_propagation")]
    pub propagation: Vec<PropagationFormat>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            log_filter: default_log_filter(),
            log_format: LogFormat::default(),
            tracer_name: default_tracer_name(),
            propagation: default_propagation(),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

/// Trace context propagation format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropagationFormat {
    /// W3C Trace Context
    TraceContext,
    /// W3C Baggage
    Baggage,
}

fn default_service_name() -> String {
    "vigil".to_string()
}

fn default_log_filter() -> String {
    "info".to_string()
}

fn default_tracer_name() -> String {
    "vigil".to_string()
}

fn default_propagation() -> Vec<PropagationFormat> {
    vec![PropagationFormat::TraceContext, PropagationFormat::Baggage]
}
