//! Rebuilding semantic errors from failed responses

use http::{Response, header};
use vigil_core::{SemanticError, WireError, from_http_status, from_rpc_code};

use crate::ClientBody;

/// Largest error body prefix inspected when hydrating a response
pub const MAX_ERROR_BODY: usize = 64 * 1024;

/// Classify a response as success or semantic failure
///
/// Statuses below 400 are successes and the body is not touched. For error
/// statuses the first [`MAX_ERROR_BODY`] bytes are inspected: a JSON wire body
/// with a recognized code is decoded, otherwise the status line is classified
/// and the body text becomes the message. The body stays readable afterwards,
/// byte-for-byte.
///
/// # Errors
///
/// Returns the hydrated error for any status of 400 or above
pub async fn check_response(response: &mut Response<ClientBody>) -> Result<(), SemanticError> {
    let status = response.status();
    if status.as_u16() < 400 {
        return Ok(());
    }

    let declared_json = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(is_json_content_type);

    let prefix = response.body_mut().peek(MAX_ERROR_BODY).await;

    if (declared_json || prefix.first() == Some(&b'{'))
        && let Some(err) = WireError::decode(&prefix)
    {
        return Err(err);
    }

    Err(SemanticError::new(from_http_status(status)).with_message(String::from_utf8_lossy(&prefix)))
}

fn is_json_content_type(value: &str) -> bool {
    value
        .split(';')
        .next()
        .is_some_and(|essence| essence.trim().eq_ignore_ascii_case("application/json"))
}

/// Rebuild a semantic error from a failed RPC status
///
/// Structured details are preferred; otherwise the status code is classified
/// and its message is kept as both the internal and safe message. The status
/// itself is attached as the cause.
pub fn hydrate_status(status: tonic::Status) -> SemanticError {
    let hydrated = WireError::decode(status.details()).unwrap_or_else(|| {
        SemanticError::new(from_rpc_code(status.code()))
            .with_message(status.message())
            .with_safe_message(status.message())
    });

    hydrated.with_cause(status)
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use http_body_util::BodyExt;
    use serde_json::json;
    use vigil_core::Code;

    use super::*;

    fn reply(status: u16, content_type: Option<&str>, body: impl Into<ClientBody>) -> Response<ClientBody> {
        let mut builder = Response::builder().status(status);
        if let Some(content_type) = content_type {
            builder = builder.header(header::CONTENT_TYPE, content_type);
        }
        builder.body(body.into()).unwrap()
    }

    async fn body_of(response: Response<ClientBody>) -> Bytes {
        response.into_body().collect().await.unwrap().to_bytes()
    }

    #[tokio::test]
    async fn success_is_untouched() {
        let mut response = reply(204, None, "");
        assert!(check_response(&mut response).await.is_ok());

        let mut response = reply(302, Some("application/json"), "{\"code\":\"NOT_FOUND\"}");
        assert!(check_response(&mut response).await.is_ok());
    }

    #[tokio::test]
    async fn decodes_wire_body() {
        let body = json!({
            "code": "PERMISSION_DENIED",
            "message": "forbidden",
            "details": {"resource": "invoice", "attempt": 2},
        })
        .to_string();
        let mut response = reply(403, Some("application/json; charset=utf-8"), body.clone());

        let err = check_response(&mut response).await.unwrap_err();
        assert_eq!(err.code(), Code::PermissionDenied);
        assert_eq!(err.safe_message(), "forbidden");
        assert_eq!(err.details()["resource"], "invoice");
        assert_eq!(err.details()["attempt"], 2);

        assert_eq!(body_of(response).await, body);
    }

    #[tokio::test]
    async fn symbol_message_survives_round_trip() {
        let mut response = reply(404, Some("application/json"), r#"{"code":"NOT_FOUND","message":"NOT_FOUND"}"#);

        let err = check_response(&mut response).await.unwrap_err();
        assert_eq!(err.code(), Code::NotFound);
        assert_eq!(err.safe_message(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn brace_prefix_is_decoded_without_content_type() {
        let mut response = reply(503, None, r#"{"code":"UNAVAILABLE","message":"maintenance"}"#);

        let err = check_response(&mut response).await.unwrap_err();
        assert_eq!(err.code(), Code::Unavailable);
        assert_eq!(err.safe_message(), "maintenance");
    }

    #[tokio::test]
    async fn plain_text_falls_back_to_status() {
        let mut response = reply(502, Some("text/plain"), "upstream connect error");

        let err = check_response(&mut response).await.unwrap_err();
        assert_eq!(err.code(), Code::Internal);
        assert_eq!(err.message(), "upstream connect error");

        assert_eq!(body_of(response).await, "upstream connect error");
    }

    #[tokio::test]
    async fn unknown_code_falls_back_to_status() {
        let body = json!({"code": "TEAPOT", "message": "short and stout"}).to_string();
        let mut response = reply(404, Some("application/json"), body.clone());

        let err = check_response(&mut response).await.unwrap_err();
        assert_eq!(err.code(), Code::NotFound);
        assert_eq!(err.message(), body);
    }

    #[tokio::test]
    async fn oversized_body_is_limited_but_restored() {
        let big = "x".repeat(MAX_ERROR_BODY + 10);
        let mut response = reply(500, Some("text/plain"), big.clone());

        let err = check_response(&mut response).await.unwrap_err();
        assert_eq!(err.code(), Code::Internal);
        assert_eq!(err.message().len(), MAX_ERROR_BODY);

        assert_eq!(body_of(response).await.len(), big.len());
    }

    #[test]
    fn rpc_status_prefers_details() {
        let wire = br#"{"code":"NOT_FOUND","message":"order not found"}"#;
        let status = tonic::Status::with_details(tonic::Code::NotFound, "order not found", Bytes::from_static(wire));

        let err = hydrate_status(status);
        assert_eq!(err.code(), Code::NotFound);
        assert_eq!(err.safe_message(), "order not found");
        assert_eq!(err.causes().len(), 1);
    }

    #[test]
    fn rpc_status_without_details_uses_code() {
        let err = hydrate_status(tonic::Status::unauthenticated("token expired"));
        assert_eq!(err.code(), Code::Unauthorized);
        assert_eq!(err.message(), "token expired");
        assert_eq!(err.safe_message(), "token expired");
    }

    #[test]
    fn unmapped_rpc_code_is_unknown() {
        let err = hydrate_status(tonic::Status::resource_exhausted("quota"));
        assert_eq!(err.code(), Code::Unknown);
    }

    #[test]
    fn content_type_detection() {
        assert!(is_json_content_type("application/json"));
        assert!(is_json_content_type("Application/JSON; charset=utf-8"));
        assert!(!is_json_content_type("application/problem+json"));
        assert!(!is_json_content_type("text/html"));
    }
}
