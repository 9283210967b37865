//! Outbound HTTP interceptor

use std::error::Error;
use std::task::{Context as TaskContext, Poll};
use std::time::Instant;

use bytes::Bytes;
use futures::future::BoxFuture;
use http::{Request, Response};
use http_body::Body;
use tower::{Layer, Service};
use vigil_telemetry::propagation::HeaderInjector;
use vigil_telemetry::{Context, KeyValue, Telemetry};

use crate::{BoxError, ClientBody};

/// Layer producing [`HttpClient`] services
#[derive(Clone, Default)]
pub struct HttpClientLayer {
    telemetry: Telemetry,
}

impl HttpClientLayer {
    pub fn new(telemetry: Telemetry) -> Self {
        Self { telemetry }
    }
}

impl<S> Layer<S> for HttpClientLayer {
    type Service = HttpClient<S>;

    fn layer(&self, inner: S) -> Self::Service {
        HttpClient {
            inner,
            telemetry: self.telemetry.clone(),
        }
    }
}

impl std::fmt::Debug for HttpClientLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClientLayer").finish_non_exhaustive()
    }
}

/// Injects trace context into outbound requests and logs each exchange
///
/// Transport errors are logged and returned unchanged. Any response that
/// arrives, whatever its status, counts as a completed exchange; pass it to
/// [`check_response`](crate::check_response) to classify failures.
#[derive(Clone)]
pub struct HttpClient<S> {
    inner: S,
    telemetry: Telemetry,
}

impl<S> HttpClient<S> {
    pub fn new(inner: S, telemetry: Telemetry) -> Self {
        Self { inner, telemetry }
    }
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for HttpClient<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    S::Future: Send + 'static,
    S::Error: Error + Send + Sync + 'static,
    ResBody: Body<Data = Bytes> + Send + 'static,
    ResBody::Error: Into<BoxError>,
{
    type Response = Response<ClientBody>;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut TaskContext<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<ReqBody>) -> Self::Future {
        let cx = Context::current();
        self.telemetry
            .propagator()
            .inject(&cx, &mut HeaderInjector(request.headers_mut()));

        let method = request.method().to_string();
        let url = request.uri().to_string();
        let telemetry = self.telemetry.clone();

        let start = Instant::now();
        let call = self.inner.call(request);

        Box::pin(async move {
            let result = call.await;
            let mut fields = vec![
                KeyValue::new("duration", start.elapsed().as_secs_f64()),
                KeyValue::new("method", method),
                KeyValue::new("url", url),
            ];

            match result {
                Ok(response) => {
                    fields.push(KeyValue::new("status", i64::from(response.status().as_u16())));
                    telemetry.logger().info(&cx, "outbound_request_success", &fields);
                    Ok(response.map(ClientBody::new))
                }
                Err(e) => {
                    let cause: &(dyn Error + 'static) = &e;
                    telemetry
                        .logger()
                        .error(&cx, "outbound_request_failed", Some(cause), &fields);
                    Err(e)
                }
            }
        })
    }
}

impl<S> std::fmt::Debug for HttpClient<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient").finish_non_exhaustive()
    }
}
