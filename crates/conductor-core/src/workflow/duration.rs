//! Go-style duration strings (`"200ms"`, `"1.5s"`, `"2m30s"`).

use std::time::Duration;

use thiserror::Error;

/// Why a duration string was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DurationError {
    #[error("duration is empty")]
    Empty,
    #[error("negative durations are not allowed")]
    Negative,
    #[error("expected a number at `{0}`")]
    MissingNumber(String),
    #[error("missing unit after `{0}`")]
    MissingUnit(String),
    #[error("unknown unit `{0}`")]
    UnknownUnit(String),
    #[error("duration must be positive")]
    NotPositive,
    #[error("duration is too large")]
    Overflow,
}

const NANOS_PER_MICRO: f64 = 1e3;
const NANOS_PER_MILLI: f64 = 1e6;
const NANOS_PER_SEC: f64 = 1e9;

fn unit_nanos(unit: &str) -> Option<f64> {
    match unit {
        "ns" => Some(1.0),
        "us" | "µs" | "μs" => Some(NANOS_PER_MICRO),
        "ms" => Some(NANOS_PER_MILLI),
        "s" => Some(NANOS_PER_SEC),
        "m" => Some(60.0 * NANOS_PER_SEC),
        "h" => Some(3600.0 * NANOS_PER_SEC),
        _ => None,
    }
}

/// Parse a strictly positive duration.
///
/// A string is a sequence of decimal numbers, each with an optional fraction
/// and a mandatory unit suffix. Valid units are `ns`, `us` (or `µs`), `ms`,
/// `s`, `m` and `h`.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn parse_duration(input: &str) -> Result<Duration, DurationError> {
    let s = input.trim();
    if s.is_empty() {
        return Err(DurationError::Empty);
    }
    if s.starts_with('-') {
        return Err(DurationError::Negative);
    }
    let mut rest = s.strip_prefix('+').unwrap_or(s);
    if rest == "0" {
        return Err(DurationError::NotPositive);
    }

    let mut total = 0.0_f64;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (number, after) = rest.split_at(number_len);
        let value: f64 = match number {
            "" | "." => return Err(DurationError::MissingNumber(rest.to_string())),
            _ => number
                .parse()
                .map_err(|_| DurationError::MissingNumber(rest.to_string()))?,
        };

        let unit_len = after
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(after.len());
        let (unit, tail) = after.split_at(unit_len);
        if unit.is_empty() {
            return Err(DurationError::MissingUnit(number.to_string()));
        }
        let scale = unit_nanos(unit).ok_or_else(|| DurationError::UnknownUnit(unit.to_string()))?;

        total += value * scale;
        rest = tail;
    }

    if total >= u64::MAX as f64 {
        return Err(DurationError::Overflow);
    }
    let nanos = total.round() as u64;
    if nanos == 0 {
        return Err(DurationError::NotPositive);
    }
    Ok(Duration::from_nanos(nanos))
}
