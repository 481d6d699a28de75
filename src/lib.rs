//! Outcall Library
//!
//! Two independent tools for reaching outside the process:
//!
//! - [`native`] - bind exports of shared libraries at runtime and call them
//!   with a declared signature, calling convention and string policy
//! - [`http`] - build GET/POST requests and consume responses as streams,
//!   text, bytes or files, with throttled progress callbacks
//!
//! The two modules share nothing besides the crate-wide lint policy.

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod http;
pub mod native;
mod user_agent;

// Re-export commonly used types
pub use http::{
    HttpClient, HttpClientConfig, HttpRequest, ResponseInfo, TransferProgress, TransportError,
};
pub use native::{
    CallingConvention, CharSet, FunctionBinding, NativeBinder, NativeLibrary, NativeResolutionError,
    NativeReturn, NativeType, NativeValue, VoidBinding,
};
