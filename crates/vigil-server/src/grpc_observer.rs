//! Server-side unary RPC interceptor

use std::error::Error;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt as _;
use vigil_core::convert::rpc_code_name;
use vigil_core::{SemanticError, to_rpc_status};
use vigil_telemetry::metrics::{RPC_PANIC_COUNT, RPC_REQUEST_COUNT, RPC_REQUEST_DURATION};
use vigil_telemetry::propagation::{MetadataExtractor, attach};
use vigil_telemetry::recover::{PanicReport, log_panic};
use vigil_telemetry::{Context, Counter, Histogram, KeyValue, Telemetry, trace};

use crate::http_observer::BoxError;

const PANIC_MESSAGE: &str = "internal server error";

/// Observes unary RPC handlers
///
/// Handlers return any error; semantic errors are converted into a status
/// carrying only their safe message, and a `tonic::Status` returned directly
/// is passed through untouched.
#[derive(Clone)]
pub struct GrpcObserver {
    telemetry: Telemetry,
    requests: Arc<dyn Counter>,
    durations: Arc<dyn Histogram>,
    panics: Arc<dyn Counter>,
}

impl GrpcObserver {
    pub fn new(telemetry: Telemetry) -> Self {
        let monitor = telemetry.monitor();
        let requests = monitor.counter(RPC_REQUEST_COUNT);
        let durations = monitor.histogram(RPC_REQUEST_DURATION);
        let panics = monitor.counter(RPC_PANIC_COUNT);

        Self {
            telemetry,
            requests,
            durations,
            panics,
        }
    }

    /// Run `handler` for the call to `method`
    ///
    /// The extracted trace context is attached while the handler runs and is
    /// also stored in the request extensions.
    ///
    /// # Errors
    ///
    /// Returns the status derived from the handler's error, or `Internal` when
    /// the handler panicked
    pub async fn unary<T, R, F, Fut>(
        &self,
        method: &str,
        mut request: tonic::Request<T>,
        handler: F,
    ) -> Result<tonic::Response<R>, tonic::Status>
    where
        F: FnOnce(tonic::Request<T>) -> Fut,
        Fut: Future<Output = Result<tonic::Response<R>, BoxError>>,
    {
        let parent = self
            .telemetry
            .propagator()
            .extract(&Context::current(), &MetadataExtractor(request.metadata()));
        let (cx, span) = trace::start(&parent, method.to_owned());
        request.extensions_mut().insert(cx.clone());

        let start = Instant::now();
        let call = attach(cx.clone(), async move { handler(request).await });
        let outcome = AssertUnwindSafe(call).catch_unwind().await;
        let duration = start.elapsed().as_secs_f64();

        let result = match outcome {
            Ok(Ok(response)) => {
                span.end_with(None);
                self.telemetry
                    .logger()
                    .info(&cx, "grpc_request_success", &fields(tonic::Code::Ok, duration, method));
                Ok(response)
            }
            Ok(Err(err)) => {
                let err: &(dyn Error + 'static) = &*err;
                span.end_with(Some(err));
                let status = match err.downcast_ref::<tonic::Status>() {
                    Some(status) => status.clone(),
                    None => to_rpc_status(Some(err)),
                };
                self.log_failure(&cx, err, fields(status.code(), duration, method));
                Err(status)
            }
            Err(payload) => {
                let report = PanicReport::capture(payload.as_ref());
                span.end_with(Some(&report));
                log_panic(
                    self.telemetry.logger(),
                    &cx,
                    "panic_recovered",
                    &report,
                    &fields(tonic::Code::Internal, duration, method),
                );
                self.panics.inc(&[KeyValue::new("method", method.to_owned())]);
                Err(tonic::Status::internal(PANIC_MESSAGE))
            }
        };

        let code = result.as_ref().map_or_else(tonic::Status::code, |_| tonic::Code::Ok);
        let tags = [
            KeyValue::new("method", method.to_owned()),
            KeyValue::new("code", rpc_code_name(code)),
        ];
        self.requests.inc(&tags);
        self.durations.record(duration, &tags);

        result
    }

    fn log_failure(&self, cx: &Context, err: &(dyn Error + 'static), mut fields: Vec<KeyValue>) {
        let logger = self.telemetry.logger();

        match SemanticError::find(err) {
            Some(semantic) => {
                fields.push(KeyValue::new("code", semantic.code().symbol()));
                if let Some(operation) = semantic.operation() {
                    fields.push(KeyValue::new("operation", operation.to_owned()));
                }

                let message = if semantic.message().is_empty() {
                    "grpc_request_failed"
                } else {
                    semantic.message()
                };
                let causes = semantic.causes();
                let cause = (!causes.is_empty()).then_some(causes as &(dyn Error + 'static));
                logger.error(cx, message, cause, &fields);
            }
            None => logger.error(cx, "grpc_request_failed", Some(err), &fields),
        }
    }
}

impl std::fmt::Debug for GrpcObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrpcObserver")
            .field("telemetry", &self.telemetry)
            .finish_non_exhaustive()
    }
}

fn fields(code: tonic::Code, duration: f64, method: &str) -> Vec<KeyValue> {
    vec![
        KeyValue::new("grpc_code", rpc_code_name(code)),
        KeyValue::new("duration", duration),
        KeyValue::new("method", method.to_owned()),
    ]
}
