//! Duration literal grammar for tag attributes
//!
//! Accepts one or more `<number><unit>` segments where the number may carry
//! a fractional part and the unit is one of `ns`, `us`, `µs`, `ms`, `s`,
//! `m`, `h`. Segments concatenate (`1h30m`). A bare `0` is accepted.

use std::time::Duration;
use thiserror::Error;

/// Error returned when a duration literal cannot be parsed.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid duration {literal:?}: {reason}")]
pub struct DurationError {
    pub literal: String,
    pub reason: &'static str,
}

impl DurationError {
    fn new(literal: &str, reason: &'static str) -> Self {
        DurationError {
            literal: literal.to_string(),
            reason,
        }
    }
}

// Unit table in nanoseconds. Two-character units come first so that the
// prefix scan never mistakes "ms" for "m".
const UNITS: &[(&str, u64)] = &[
    ("ns", 1),
    ("us", 1_000),
    ("µs", 1_000),
    ("ms", 1_000_000),
    ("s", 1_000_000_000),
    ("m", 60 * 1_000_000_000),
    ("h", 3_600 * 1_000_000_000),
];

/// Parse a duration literal such as `8ms`, `1.5h`, or `1h30m`.
pub fn parse_duration(s: &str) -> Result<Duration, DurationError> {
    if s.is_empty() {
        return Err(DurationError::new(s, "empty string"));
    }
    if s == "0" {
        return Ok(Duration::ZERO);
    }

    let mut rest = s;
    let mut total_nanos: u128 = 0;

    while !rest.is_empty() {
        let num_end = rest
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .unwrap_or(rest.len());
        let num = &rest[..num_end];
        if num.is_empty() {
            return Err(DurationError::new(s, "expected a number"));
        }
        let value: f64 = num
            .parse()
            .map_err(|_| DurationError::new(s, "malformed number"))?;
        rest = &rest[num_end..];

        let Some(&(unit, nanos)) = UNITS.iter().find(|(u, _)| rest.starts_with(u)) else {
            return Err(DurationError::new(s, "missing or unknown unit"));
        };
        rest = &rest[unit.len()..];

        total_nanos += (value * nanos as f64).round() as u128;
    }

    if total_nanos > u64::MAX as u128 {
        return Err(DurationError::new(s, "duration overflows"));
    }
    Ok(Duration::from_nanos(total_nanos as u64))
}
