//! Shared types and pairing semantics used across the pairwise service.
//!
//! The `common` module defines reusable abstractions that are shared between
//! the gRPC service layer and its clients.
//!
//! ## Submodules
//!
//! - [`error`] - Centralized service error type used throughout request
//!   handling.
//! - [`key`] - Correlation-key derivation from request timestamps.
//! - [`reduce`] - The quotient/remainder reduction over a completed pair.
//! - [`types`] - Common constants and key-related type aliases.
//!
//! These definitions are not tied to any specific layer and are imported
//! throughout the server for error propagation and pairing.

pub mod error;
pub mod key;
pub mod reduce;
pub mod types;

pub use error::{Error, Result};

/// gRPC service and message definitions generated from `proto/pairwise.proto`.
///
/// ## Service
///
/// - `PairReducer/ReducePairs` - Bidirectional stream: requests in, buffered
///   reduction results out once the client half-closes.
///
/// ## Message Format
///
/// - `Request` - `{service_name, payload, timestamp}`; the `timestamp` string
///   is the pairing key, the `payload` a signed decimal integer.
/// - `Response` - Same shape; `payload` carries `quotient:<q>` or
///   `remainder:<r>`, and `timestamp` is stamped at creation time.
///
/// See `proto/pairwise.proto` for the full schema and comments.
pub mod proto {
    tonic::include_proto!("pairwise");
    pub const FILE_DESCRIPTOR_SET: &[u8] =
        tonic::include_file_descriptor_set!("pairwise_descriptor");
}
