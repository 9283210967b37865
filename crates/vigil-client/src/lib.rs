//! Client-side interceptors for Vigil
//!
//! [`HttpClientLayer`] wraps any tower HTTP service so outbound requests carry
//! the caller's trace context and are timed and logged; [`check_response`]
//! turns a failed response back into a [`SemanticError`](vigil_core::SemanticError)
//! without consuming its body. [`GrpcClientInterceptor`] does the same for
//! unary RPCs.

#![allow(clippy::must_use_candidate)]

mod body;
pub mod grpc_client;
pub mod hydrate;
pub mod http_client;
mod transport;

use std::error::Error;

pub use body::ClientBody;
pub use grpc_client::GrpcClientInterceptor;
pub use hydrate::{MAX_ERROR_BODY, check_response, hydrate_status};
pub use http_client::{HttpClient, HttpClientLayer};
pub use transport::{ReqwestTransport, TransportError};

/// Boxed error used for response body failures
pub type BoxError = Box<dyn Error + Send + Sync>;
