//! Two-way translation between [`Code`] and transport status representations
//!
//! Outbound translation (code to wire) is exact. Inbound translation (wire to
//! code) is coarse for anything outside the canonical table and never fails.

use std::error::Error;

use bytes::Bytes;
use http::StatusCode;

use crate::{Code, SemanticError};

/// Message returned for RPC failures that carry no classification
const RPC_GENERIC_MESSAGE: &str = "internal server error";

/// HTTP status for a call outcome
///
/// `None` is success. Errors without a semantic error in their chain are
/// always server-side failures.
pub fn to_http_status(err: Option<&(dyn Error + 'static)>) -> StatusCode {
    match err {
        None => StatusCode::OK,
        Some(err) => SemanticError::find(err).map_or(StatusCode::INTERNAL_SERVER_ERROR, |e| http_status_for(e.code())),
    }
}

/// HTTP status for a code
pub const fn http_status_for(code: Code) -> StatusCode {
    match code {
        Code::Ok => StatusCode::OK,
        Code::Invalid => StatusCode::BAD_REQUEST,
        Code::Unauthorized => StatusCode::UNAUTHORIZED,
        Code::PermissionDenied => StatusCode::FORBIDDEN,
        Code::NotFound => StatusCode::NOT_FOUND,
        Code::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        Code::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
        Code::Internal | Code::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Classify a received HTTP status
pub fn from_http_status(status: StatusCode) -> Code {
    match status.as_u16() {
        200 | 201 | 202 | 204 => Code::Ok,
        400 => Code::Invalid,
        401 => Code::Unauthorized,
        403 => Code::PermissionDenied,
        404 => Code::NotFound,
        503 => Code::Unavailable,
        504 => Code::DeadlineExceeded,
        500 => Code::Internal,
        400..=499 => Code::Invalid,
        500..=599 => Code::Internal,
        _ => Code::Unknown,
    }
}

/// RPC status code for a code
pub const fn rpc_code_for(code: Code) -> tonic::Code {
    match code {
        Code::Ok => tonic::Code::Ok,
        Code::Invalid => tonic::Code::InvalidArgument,
        Code::Unauthorized => tonic::Code::Unauthenticated,
        Code::PermissionDenied => tonic::Code::PermissionDenied,
        Code::NotFound => tonic::Code::NotFound,
        Code::Internal => tonic::Code::Internal,
        Code::Unavailable => tonic::Code::Unavailable,
        Code::DeadlineExceeded => tonic::Code::DeadlineExceeded,
        Code::Unknown => tonic::Code::Unknown,
    }
}

/// Classify a received RPC status code
pub const fn from_rpc_code(code: tonic::Code) -> Code {
    match code {
        tonic::Code::Ok => Code::Ok,
        tonic::Code::InvalidArgument => Code::Invalid,
        tonic::Code::Unauthenticated => Code::Unauthorized,
        tonic::Code::PermissionDenied => Code::PermissionDenied,
        tonic::Code::NotFound => Code::NotFound,
        tonic::Code::Internal => Code::Internal,
        tonic::Code::Unavailable => Code::Unavailable,
        tonic::Code::DeadlineExceeded => Code::DeadlineExceeded,
        _ => Code::Unknown,
    }
}

/// RPC status for a call outcome
///
/// Semantic errors carry their safe message and the JSON wire body in the
/// status details. Anything else is reported as `Unknown` with a generic
/// message.
pub fn to_rpc_status(err: Option<&(dyn Error + 'static)>) -> tonic::Status {
    let Some(err) = err else {
        return tonic::Status::new(tonic::Code::Ok, Code::Ok.symbol());
    };

    match SemanticError::find(err) {
        Some(semantic) => tonic::Status::with_details(
            rpc_code_for(semantic.code()),
            semantic.safe_message(),
            Bytes::from(semantic.to_wire().to_json()),
        ),
        None => tonic::Status::new(tonic::Code::Unknown, RPC_GENERIC_MESSAGE),
    }
}

/// Canonical upper-case name of an RPC status code, used as a metric tag
pub const fn rpc_code_name(code: tonic::Code) -> &'static str {
    match code {
        tonic::Code::Ok => "OK",
        tonic::Code::Cancelled => "CANCELLED",
        tonic::Code::Unknown => "UNKNOWN",
        tonic::Code::InvalidArgument => "INVALID_ARGUMENT",
        tonic::Code::DeadlineExceeded => "DEADLINE_EXCEEDED",
        tonic::Code::NotFound => "NOT_FOUND",
        tonic::Code::AlreadyExists => "ALREADY_EXISTS",
        tonic::Code::PermissionDenied => "PERMISSION_DENIED",
        tonic::Code::ResourceExhausted => "RESOURCE_EXHAUSTED",
        tonic::Code::FailedPrecondition => "FAILED_PRECONDITION",
        tonic::Code::Aborted => "ABORTED",
        tonic::Code::OutOfRange => "OUT_OF_RANGE",
        tonic::Code::Unimplemented => "UNIMPLEMENTED",
        tonic::Code::Internal => "INTERNAL",
        tonic::Code::Unavailable => "UNAVAILABLE",
        tonic::Code::DataLoss => "DATA_LOSS",
        tonic::Code::Unauthenticated => "UNAUTHENTICATED",
    }
}
