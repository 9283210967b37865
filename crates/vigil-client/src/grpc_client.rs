//! Outbound unary RPC interceptor

use std::error::Error;
use std::future::Future;
use std::time::Instant;

use vigil_core::SemanticError;
use vigil_telemetry::propagation::MetadataInjector;
use vigil_telemetry::{Context, KeyValue, Telemetry};

use crate::hydrate::hydrate_status;

/// Observes outbound unary RPCs
///
/// [`unary`](Self::unary) wraps a single call end to end. Installed as a
/// tonic [`Interceptor`](tonic::service::Interceptor) it only injects trace
/// context, since tonic interceptors never see the outcome.
#[derive(Clone, Default)]
pub struct GrpcClientInterceptor {
    telemetry: Telemetry,
}

impl GrpcClientInterceptor {
    pub fn new(telemetry: Telemetry) -> Self {
        Self { telemetry }
    }

    /// Invoke `method` through `invoke` with trace context injected
    ///
    /// # Errors
    ///
    /// Returns the semantic error hydrated from the failed call's status. The
    /// status is kept as the error's cause.
    pub async fn unary<T, R, F, Fut>(
        &self,
        method: &str,
        mut request: tonic::Request<T>,
        invoke: F,
    ) -> Result<tonic::Response<R>, SemanticError>
    where
        F: FnOnce(tonic::Request<T>) -> Fut,
        Fut: Future<Output = Result<tonic::Response<R>, tonic::Status>>,
    {
        let cx = Context::current();
        self.inject(&cx, &mut request);

        let start = Instant::now();
        let result = invoke(request).await;
        let fields = [
            KeyValue::new("duration", start.elapsed().as_secs_f64()),
            KeyValue::new("method", method.to_owned()),
        ];

        match result {
            Ok(response) => {
                self.telemetry.logger().info(&cx, "outbound_rpc_success", &fields);
                Ok(response)
            }
            Err(status) => {
                let cause: &(dyn Error + 'static) = &status;
                self.telemetry
                    .logger()
                    .error(&cx, "outbound_rpc_failed", Some(cause), &fields);
                Err(hydrate_status(status))
            }
        }
    }

    fn inject<T>(&self, cx: &Context, request: &mut tonic::Request<T>) {
        self.telemetry
            .propagator()
            .inject(cx, &mut MetadataInjector(request.metadata_mut()));
    }
}

impl tonic::service::Interceptor for GrpcClientInterceptor {
    fn call(&mut self, mut request: tonic::Request<()>) -> Result<tonic::Request<()>, tonic::Status> {
        self.inject(&Context::current(), &mut request);
        Ok(request)
    }
}

impl std::fmt::Debug for GrpcClientInterceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrpcClientInterceptor").finish_non_exhaustive()
    }
}
