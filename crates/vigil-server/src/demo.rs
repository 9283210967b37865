//! Demonstration endpoint exercising every interceptor outcome

use axum::Json;
use axum::extract::{Query, Request};
use serde::Deserialize;
use serde_json::{Value, json};
use vigil_core::{Code, SemanticError};
use vigil_telemetry::Context;
use vigil_telemetry::trace::get_baggage;

#[derive(Debug, Default, Deserialize)]
struct DemoParams {
    error: Option<String>,
}

/// Answers according to the `error` query parameter
///
/// `not_found`, `unauthorized`, `internal`, and `panic` produce the matching
/// failure; anything else succeeds.
///
/// # Errors
///
/// Returns the semantic error selected by the query, or `Invalid` for a
/// malformed query string
///
/// # Panics
///
/// Panics when asked to with `error=panic`
pub async fn demo_handler(request: Request) -> Result<Json<Value>, SemanticError> {
    let params = Query::<DemoParams>::try_from_uri(request.uri())
        .map(|Query(params)| params)
        .map_err(|e| {
            SemanticError::new(Code::Invalid)
                .with_message(format!("malformed query: {e}"))
                .with_safe_message("malformed query string")
        })?;

    match params.error.as_deref() {
        Some("not_found") => Err(SemanticError::new(Code::NotFound).with_operation("Demo.Get")),
        Some("unauthorized") => Err(SemanticError::new(Code::Unauthorized)
            .with_operation("Demo.Get")
            .with_message("db fail")
            .with_safe_message("access denied")),
        Some("internal") => Err(SemanticError::new(Code::Internal)
            .with_operation("Demo.Get")
            .with_message("invariant violated while loading demo record")
            .with_cause(std::io::Error::other("disk full"))),
        Some("panic") => panic!("demo handler panicked on request"),
        _ => {
            let tenant = request
                .extensions()
                .get::<Context>()
                .and_then(|cx| get_baggage(cx, "tenant"));
            Ok(Json(json!({ "ok": true, "tenant": tenant })))
        }
    }
}
