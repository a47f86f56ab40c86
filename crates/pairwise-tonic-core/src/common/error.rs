//! Error types for the pairwise reduction service.
//!
//! This module defines the central `Error` enum, which captures all
//! recoverable and reportable error cases within the pairing system. It
//! implements `From<Error>` for `tonic::Status` to enable seamless gRPC error
//! propagation to clients with appropriate status codes and messages.
//!
//! None of these errors is process-fatal: each is handled at the level of a
//! single stream or a single correlation key.
//!
//! ## Error Cases
//! - `TimestampParse`: An inbound timestamp did not match the fixed format.
//! - `PayloadParse`: A request payload was not a valid signed integer.
//! - `DivisionByZero`: The divisor of a completed pair was zero.
//! - `ProtocolViolation`: A third request arrived for an already-paired key.
//! - `ChannelError`: An internal communication failure between tasks.
//! - `ServiceShutdown`: A request arrived while the service was shutting down.

use crate::types::CorrelationKey;
use tonic::Status;

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the pairwise reduction service.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// An inbound timestamp did not match [`TIMESTAMP_FORMAT`].
    ///
    /// [`TIMESTAMP_FORMAT`]: crate::types::TIMESTAMP_FORMAT
    #[error("Unparseable timestamp: {input:?}")]
    TimestampParse { input: String },

    /// A request payload was not a valid signed decimal integer.
    #[error("Unparseable payload: {payload:?}")]
    PayloadParse { payload: String },

    /// The second operand of a completed pair was zero.
    #[error("Division by zero (dividend: {dividend})")]
    DivisionByZero { dividend: i64 },

    /// A third or later request arrived for a key whose pair was already
    /// reduced but not yet drained.
    #[error("Key {key} is already paired")]
    ProtocolViolation { key: CorrelationKey },

    /// Internal channel send/receive failure (e.g., closed or full channel).
    #[error("Channel error: {context}")]
    ChannelError { context: String },

    /// The service is in the process of shutting down.
    #[error("Service is shutting down")]
    ServiceShutdown,
}

impl From<Error> for Status {
    fn from(err: Error) -> Self {
        match err {
            Error::TimestampParse { input } => {
                Status::invalid_argument(format!("Unparseable timestamp: {input:?}"))
            }
            Error::PayloadParse { payload } => {
                Status::invalid_argument(format!("Unparseable payload: {payload:?}"))
            }
            Error::DivisionByZero { dividend } => {
                Status::invalid_argument(format!("Division by zero (dividend: {dividend})"))
            }
            Error::ProtocolViolation { key } => {
                Status::failed_precondition(format!("Key {key} is already paired"))
            }
            Error::ChannelError { context } => {
                Status::internal(format!("Channel error: {context}"))
            }
            Error::ServiceShutdown => Status::unavailable("Service is shutting down"),
        }
    }
}
