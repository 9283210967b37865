//! Panic capture shared by interceptors and the task supervisor

use std::any::Any;
use std::backtrace::Backtrace;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};

use opentelemetry::{Context, KeyValue};

use crate::Logger;

/// Human-readable message of a panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

/// A recovered panic: its message and the stack at the recovery point
#[derive(Debug, Clone)]
pub struct PanicReport {
    pub message: String,
    pub stack: String,
}

impl PanicReport {
    pub fn capture(payload: &(dyn Any + Send)) -> Self {
        Self {
            message: panic_message(payload),
            stack: Backtrace::force_capture().to_string(),
        }
    }

    /// Report fields as log attributes
    pub fn fields(&self) -> [KeyValue; 2] {
        [
            KeyValue::new("panic", self.message.clone()),
            KeyValue::new("stack", self.stack.clone()),
        ]
    }
}

impl fmt::Display for PanicReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "panic: {}", self.message)
    }
}

impl std::error::Error for PanicReport {}

/// Log a recovered panic at error level
///
/// A panic raised by the logger itself is swallowed. Returns whether the log
/// call completed.
pub fn log_panic(logger: &dyn Logger, cx: &Context, event: &str, report: &PanicReport, fields: &[KeyValue]) -> bool {
    let mut all: Vec<KeyValue> = fields.to_vec();
    all.extend(report.fields());

    catch_unwind(AssertUnwindSafe(|| logger.error(cx, event, None, &all))).is_ok()
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::*;
    use crate::testing::CapturingLogger;

    struct PanickingLogger;

    impl Logger for PanickingLogger {
        fn debug(&self, _: &Context, _: &str, _: &[KeyValue]) {}

        fn info(&self, _: &Context, _: &str, _: &[KeyValue]) {}

        fn warn(&self, _: &Context, _: &str, _: &[KeyValue]) {}

        fn error(&self, _: &Context, _: &str, _: Option<&(dyn Error + 'static)>, _: &[KeyValue]) {
            panic!("logger exploded");
        }
    }

    #[test]
    fn messages_from_common_payloads() {
        let payload = catch_unwind(|| panic!("static message")).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "static message");

        let payload = catch_unwind(|| panic!("formatted {}", 42)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "formatted 42");

        let payload = catch_unwind(|| std::panic::panic_any(7_u32)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
    }

    #[test]
    fn log_panic_attaches_report_fields() {
        let logger = CapturingLogger::new();
        let report = PanicReport {
            message: "boom".to_owned(),
            stack: "frame 0".to_owned(),
        };

        assert!(log_panic(&logger, &Context::new(), "panic_recovered", &report, &[
            KeyValue::new("path", "/orders")
        ]));

        let entry = logger.last().unwrap();
        assert_eq!(entry.message, "panic_recovered");
        assert_eq!(entry.field("panic").as_deref(), Some("boom"));
        assert_eq!(entry.field("stack").as_deref(), Some("frame 0"));
        assert_eq!(entry.field("path").as_deref(), Some("/orders"));
    }

    #[test]
    fn report_is_an_error_carrying_the_message() {
        let payload = catch_unwind(|| panic!("ledger corrupted")).unwrap_err();
        let report = PanicReport::capture(payload.as_ref());

        let err: &(dyn Error + 'static) = &report;
        assert_eq!(err.to_string(), "panic: ledger corrupted");
        assert!(err.source().is_none());
    }

    #[test]
    fn panicking_logger_is_contained() {
        let report = PanicReport {
            message: "boom".to_owned(),
            stack: String::new(),
        };
        assert!(!log_panic(&PanickingLogger, &Context::new(), "panic_recovered", &report, &[]));
    }
}
