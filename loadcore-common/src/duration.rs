//! # Duration String Parsing
//!
//! Purpose: parse the duration grammar used throughout scenario
//! configuration (`30s`, `5m`, `1h30m`, `500ms`) plus bare integers,
//! which are treated as whole seconds.
//!
//! ## Design Principles
//! 1. **No External Grammar Crate**: the grammar is a closed set of four
//!    unit suffixes; a hand-written scanner is cheaper and easier to audit
//!    than pulling in a parser-combinator dependency for it.
//! 2. **Strict Ordering**: units must appear in descending order (`h` before
//!    `m` before `s` before `ms`) to catch typos like `30sm` early.

use std::time::Duration;

use crate::error::{LoadcoreError, LoadcoreResult};

/// Parses a duration string such as `30s`, `5m`, `1h30m`, `500ms`, or a bare
/// integer (treated as whole seconds).
pub fn parse_duration(input: &str) -> LoadcoreResult<Duration> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(LoadcoreError::parse("empty duration string"));
    }

    if let Ok(secs) = trimmed.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let mut total = Duration::ZERO;
    let mut rest = trimmed;
    let mut last_unit_rank = 4; // higher than any real rank, so first unit always passes

    while !rest.is_empty() {
        let digits_end = rest
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .ok_or_else(|| LoadcoreError::parse(format!("missing unit in {trimmed:?}")))?;
        if digits_end == 0 {
            return Err(LoadcoreError::parse(format!(
                "expected a number in {trimmed:?}"
            )));
        }
        let (number, remainder) = rest.split_at(digits_end);
        let value: f64 = number
            .parse()
            .map_err(|_| LoadcoreError::parse(format!("invalid number {number:?} in {trimmed:?}")))?;

        let (unit_len, rank, secs_per_unit) = if remainder.starts_with("ms") {
            (2, 0, 0.001)
        } else if remainder.starts_with('s') {
            (1, 1, 1.0)
        } else if remainder.starts_with('m') {
            (1, 2, 60.0)
        } else if remainder.starts_with('h') {
            (1, 3, 3600.0)
        } else {
            return Err(LoadcoreError::parse(format!(
                "unknown duration unit in {trimmed:?}"
            )));
        };

        if rank >= last_unit_rank {
            return Err(LoadcoreError::parse(format!(
                "duration units out of order in {trimmed:?}"
            )));
        }
        last_unit_rank = rank;

        total += Duration::from_secs_f64(value * secs_per_unit);
        rest = &remainder[unit_len..];
    }

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_seconds() {
        assert_eq!(parse_duration("30").unwrap(), Duration::from_secs(30));
    }

    #[test]
    fn parses_single_units() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
    }

    #[test]
    fn parses_compound_units() {
        assert_eq!(
            parse_duration("1h30m").unwrap(),
            Duration::from_secs(3600 + 30 * 60)
        );
    }

    #[test]
    fn rejects_out_of_order_units() {
        assert!(parse_duration("30s5m").is_err());
    }

    #[test]
    fn rejects_empty_and_garbage() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("abc").is_err());
    }
}
