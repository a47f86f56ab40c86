//! Correlation-key derivation.
//!
//! A request's `timestamp` string is the only input to its pairing key: the
//! string is parsed under the server's local time zone and mapped to
//! milliseconds since the Unix epoch. Two requests pair exactly when their
//! timestamp strings resolve to the same millisecond.

use crate::{
    Error, Result,
    types::{CorrelationKey, TIMESTAMP_FORMAT},
};
use chrono::{Local, LocalResult, NaiveDateTime, TimeZone};

/// Derives the [`CorrelationKey`] for a request timestamp.
///
/// The input must match [`TIMESTAMP_FORMAT`] exactly; anything else is a
/// [`Error::TimestampParse`] so that a malformed request is rejected rather
/// than silently colliding under an arbitrary key.
///
/// Derivation is a pure function of the string within one process run: the
/// same input always yields the same key, regardless of arrival order or
/// wall-clock time.
pub fn derive_key(timestamp: &str) -> Result<CorrelationKey> {
    let parsed = NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT).map_err(|_| {
        Error::TimestampParse {
            input: timestamp.to_owned(),
        }
    })?;

    match Local.from_local_datetime(&parsed) {
        LocalResult::Single(instant) => Ok(instant.timestamp_millis()),
        // A DST fold maps one wall-clock string onto two instants; resolve to
        // the earlier one so derivation stays deterministic.
        LocalResult::Ambiguous(earliest, _) => Ok(earliest.timestamp_millis()),
        // Wall-clock times skipped by a DST gap never occur locally.
        LocalResult::None => Err(Error::TimestampParse {
            input: timestamp.to_owned(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_string_same_key() {
        let a = derive_key("2024-06-01 10:15:30").unwrap();
        let b = derive_key("2024-06-01 10:15:30").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn adjacent_seconds_are_a_second_apart() {
        let a = derive_key("2024-06-01 10:15:30").unwrap();
        let b = derive_key("2024-06-01 10:15:31").unwrap();
        assert_eq!(b - a, 1_000);
    }

    #[test]
    fn distinct_strings_never_collide() {
        let a = derive_key("2024-06-01 10:15:30").unwrap();
        let b = derive_key("2024-06-02 10:15:30").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn rejects_malformed_input() {
        for input in [
            "",
            "garbage",
            "2024-06-01",
            "10:15:30",
            "2024-06-01T10:15:30",
            "2024-13-01 10:15:30",
            "2024-06-01 10:15:30 extra",
        ] {
            assert_eq!(
                derive_key(input),
                Err(Error::TimestampParse {
                    input: input.to_owned()
                }),
                "expected {input:?} to be rejected"
            );
        }
    }
}
