//! The arithmetic reduction applied to a completed pair.
//!
//! Once two requests share a correlation key, the first arrival's payload is
//! divided by the second arrival's payload. The quotient is always emitted;
//! the remainder only when the division is inexact. Operand roles are fixed
//! by arrival order at the store, not by any field on the wire.

use crate::{
    Error, Result,
    proto::Response,
    types::TIMESTAMP_FORMAT,
};
use chrono::Local;

/// Reduces a completed pair into one or two [`Response`] messages.
///
/// Both payloads must parse as signed 64-bit integers and the divisor must be
/// non-zero. Division truncates toward zero and the remainder takes the sign
/// of the dividend, so `reduce(_, "-7", "2")` yields `quotient:-3` and
/// `remainder:-1`.
///
/// The quotient response always precedes the remainder response; callers must
/// preserve that order through to the client. Responses carry `service_name`
/// and are stamped with the current local time in [`TIMESTAMP_FORMAT`].
pub fn reduce(service_name: &str, first: &str, second: &str) -> Result<Vec<Response>> {
    let dividend = parse_operand(first)?;
    let divisor = parse_operand(second)?;

    if divisor == 0 {
        return Err(Error::DivisionByZero { dividend });
    }

    let quotient = dividend / divisor;
    let remainder = dividend % divisor;

    let mut responses = vec![stamp(service_name, format!("quotient:{quotient}"))];
    if remainder != 0 {
        responses.push(stamp(service_name, format!("remainder:{remainder}")));
    }

    Ok(responses)
}

fn parse_operand(payload: &str) -> Result<i64> {
    payload.parse().map_err(|_| Error::PayloadParse {
        payload: payload.to_owned(),
    })
}

fn stamp(service_name: &str, payload: String) -> Response {
    Response {
        service_name: service_name.to_owned(),
        payload,
        timestamp: Local::now().format(TIMESTAMP_FORMAT).to_string(),
    }
}
