//! Canonical status taxonomy, semantic errors, and wire status translation
//!
//! Everything in this crate is a pure value or a pure function. Transport
//! interception lives in `vigil-server` and `vigil-client`.

#![allow(clippy::must_use_candidate)]

mod code;
pub mod convert;
mod error;

pub use code::Code;
pub use convert::{
    from_http_status, from_rpc_code, http_status_for, rpc_code_for, to_http_status, to_rpc_status,
};
pub use error::{Causes, SemanticError, WireError, is};
