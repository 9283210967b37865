use std::error::Error;

use axum::body::Body;
use axum::response::Response;
use http::{HeaderValue, StatusCode, header};
use vigil_core::{SemanticError, WireError, to_http_status};

/// Writes the client-facing response for a failed call
///
/// Implementations must only expose the safe projection of an error.
pub trait ErrorEncoder: Send + Sync {
    fn encode(&self, err: &(dyn Error + 'static)) -> Response;
}

impl<F> ErrorEncoder for F
where
    F: Fn(&(dyn Error + 'static)) -> Response + Send + Sync,
{
    fn encode(&self, err: &(dyn Error + 'static)) -> Response {
        self(err)
    }
}

/// Default encoder writing the JSON wire body
///
/// Errors without a semantic error in their chain become a generic
/// `INTERNAL` body regardless of their text.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonErrorEncoder;

impl ErrorEncoder for JsonErrorEncoder {
    fn encode(&self, err: &(dyn Error + 'static)) -> Response {
        let wire = SemanticError::find(err).map_or_else(WireError::internal, SemanticError::to_wire);
        json_response(to_http_status(Some(err)), &wire)
    }
}

/// JSON response carrying a wire error body
pub(crate) fn json_response(status: StatusCode, wire: &WireError) -> Response {
    let mut response = Response::new(Body::from(wire.to_json()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}
