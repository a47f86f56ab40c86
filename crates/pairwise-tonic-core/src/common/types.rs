//! # Common Pairing Types and Constants
//!
//! This module defines the shared types and constants used for correlating
//! requests across the system. It ensures that client and server components
//! adhere to a consistent contract for the pairing key space.

/// The key under which two requests pair.
///
/// Derived from a request's `timestamp` field as milliseconds since the Unix
/// epoch, interpreted in the server's local time zone. Keys are intentionally
/// *not* unique: two requests sharing a timestamp string share a key, and that
/// collision is the pairing mechanism.
pub type CorrelationKey = i64;

/// The fixed textual layout of request and response timestamps,
/// `YYYY-MM-DD HH:MM:SS` (chrono strftime syntax).
///
/// Used both to parse inbound request timestamps into a [`CorrelationKey`]
/// and to stamp outbound responses at creation time.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
