//! Server-side HTTP interceptor
//!
//! [`HttpObserver::wrap`] turns a fallible handler into a tower service that
//! extracts the caller's trace context, times the call, recovers panics, logs
//! the internal side of failures, and writes only the safe side to the client.

use std::convert::Infallible;
use std::error::Error;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};
use std::time::Instant;

use axum::extract::{MatchedPath, Request};
use axum::response::{IntoResponse, Response};
use futures::FutureExt as _;
use futures::future::BoxFuture;
use http::StatusCode;
use tower::Service;
use vigil_core::{SemanticError, WireError, to_http_status};
use vigil_telemetry::metrics::{HTTP_PANIC_COUNT, HTTP_REQUEST_COUNT, HTTP_REQUEST_DURATION};
use vigil_telemetry::propagation::{HeaderExtractor, attach};
use vigil_telemetry::recover::{PanicReport, log_panic};
use vigil_telemetry::{Context, Counter, Histogram, KeyValue, Telemetry, trace};

use crate::encoder::{ErrorEncoder, JsonErrorEncoder, json_response};

/// Error type returned by observed handlers
pub type BoxError = Box<dyn Error + Send + Sync>;

/// A fallible request handler
///
/// Implemented for every `Fn(Request) -> impl Future<Output = Result<impl
/// IntoResponse, impl Into<BoxError>>>`.
pub trait Handler: Clone + Send + Sync + 'static {
    fn call(&self, request: Request) -> BoxFuture<'static, Result<Response, BoxError>>;
}

impl<F, Fut, R, E> Handler for F
where
    F: Fn(Request) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    R: IntoResponse,
    E: Into<BoxError>,
{
    fn call(&self, request: Request) -> BoxFuture<'static, Result<Response, BoxError>> {
        let future = self(request);
        Box::pin(async move { future.await.map(IntoResponse::into_response).map_err(Into::into) })
    }
}

/// Builds observed HTTP handlers sharing one set of collaborators
#[derive(Clone)]
pub struct HttpObserver {
    inner: Arc<Observer>,
}

struct Observer {
    telemetry: Telemetry,
    encoder: Arc<dyn ErrorEncoder>,
    requests: Arc<dyn Counter>,
    durations: Arc<dyn Histogram>,
    panics: Arc<dyn Counter>,
}

impl HttpObserver {
    pub fn new(telemetry: Telemetry) -> Self {
        Self::with_encoder(telemetry, JsonErrorEncoder)
    }

    /// Observer writing failure responses through `encoder`
    pub fn with_encoder(telemetry: Telemetry, encoder: impl ErrorEncoder + 'static) -> Self {
        let monitor = telemetry.monitor();
        let requests = monitor.counter(HTTP_REQUEST_COUNT);
        let durations = monitor.histogram(HTTP_REQUEST_DURATION);
        let panics = monitor.counter(HTTP_PANIC_COUNT);

        Self {
            inner: Arc::new(Observer {
                telemetry,
                encoder: Arc::new(encoder),
                requests,
                durations,
                panics,
            }),
        }
    }

    /// Wrap `handler` into a service mountable with `Router::route_service`
    pub fn wrap<H: Handler>(&self, handler: H) -> ObservedHandler<H> {
        ObservedHandler {
            handler,
            observer: self.inner.clone(),
        }
    }
}

impl std::fmt::Debug for HttpObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpObserver")
            .field("telemetry", &self.inner.telemetry)
            .finish_non_exhaustive()
    }
}

/// A handler wrapped by [`HttpObserver::wrap`]
#[derive(Clone)]
pub struct ObservedHandler<H> {
    handler: H,
    observer: Arc<Observer>,
}

impl<H: Handler> Service<Request> for ObservedHandler<H> {
    type Response = Response;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Response, Infallible>>;

    fn poll_ready(&mut self, _: &mut TaskContext<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let handler = self.handler.clone();
        let observer = self.observer.clone();
        Box::pin(async move { Ok(observer.observe(handler, request).await) })
    }
}

enum Outcome {
    Success(Response),
    Failure(BoxError),
    Panic(PanicReport),
}

impl Observer {
    async fn observe<H: Handler>(&self, handler: H, mut request: Request) -> Response {
        let parent = self
            .telemetry
            .propagator()
            .extract(&Context::current(), &HeaderExtractor(request.headers()));

        let method = request.method().to_string();
        let path = request
            .extensions()
            .get::<MatchedPath>()
            .map_or_else(|| request.uri().path().to_owned(), |matched| matched.as_str().to_owned());

        let (cx, span) = trace::start(&parent, format!("{method} {path}"));
        request.extensions_mut().insert(cx.clone());

        let start = Instant::now();
        let call = attach(cx.clone(), async move { handler.call(request).await });
        let outcome = match AssertUnwindSafe(call).catch_unwind().await {
            Ok(Ok(response)) => Outcome::Success(response),
            Ok(Err(err)) => Outcome::Failure(err),
            Err(payload) => Outcome::Panic(PanicReport::capture(payload.as_ref())),
        };
        let duration = start.elapsed().as_secs_f64();

        let response = match outcome {
            Outcome::Success(response) => {
                span.end_with(None);
                self.telemetry
                    .logger()
                    .info(&cx, "request_success", &fields(response.status(), duration, &method, &path));
                response
            }
            Outcome::Failure(err) => {
                let err: &(dyn Error + 'static) = &*err;
                span.end_with(Some(err));
                let status = to_http_status(Some(err));
                self.log_failure(&cx, err, fields(status, duration, &method, &path));
                self.encoder.encode(err)
            }
            Outcome::Panic(report) => {
                span.end_with(Some(&report));
                let status = StatusCode::INTERNAL_SERVER_ERROR;
                log_panic(
                    self.telemetry.logger(),
                    &cx,
                    "panic_recovered",
                    &report,
                    &fields(status, duration, &method, &path),
                );
                self.panics.inc(&[KeyValue::new("method", method.clone()), KeyValue::new("path", path.clone())]);
                json_response(status, &WireError::internal())
            }
        };

        let tags = [
            KeyValue::new("method", method),
            KeyValue::new("path", path),
            KeyValue::new("status", response.status().as_u16().to_string()),
        ];
        self.requests.inc(&tags);
        self.durations.record(duration, &tags);

        response
    }

    /// Log the internal side of a failure: diagnostic message, causes, and code
    fn log_failure(&self, cx: &Context, err: &(dyn Error + 'static), mut fields: Vec<KeyValue>) {
        let logger = self.telemetry.logger();

        match SemanticError::find(err) {
            Some(semantic) => {
                fields.push(KeyValue::new("code", semantic.code().symbol()));
                if let Some(operation) = semantic.operation() {
                    fields.push(KeyValue::new("operation", operation.to_owned()));
                }

                let message = if semantic.message().is_empty() {
                    "request_failed"
                } else {
                    semantic.message()
                };
                let causes = semantic.causes();
                let cause = (!causes.is_empty()).then_some(causes as &(dyn Error + 'static));
                logger.error(cx, message, cause, &fields);
            }
            None => logger.error(cx, "request_failed", Some(err), &fields),
        }
    }
}

fn fields(status: StatusCode, duration: f64, method: &str, path: &str) -> Vec<KeyValue> {
    vec![
        KeyValue::new("status", i64::from(status.as_u16())),
        KeyValue::new("duration", duration),
        KeyValue::new("method", method.to_owned()),
        KeyValue::new("path", path.to_owned()),
    ]
}
