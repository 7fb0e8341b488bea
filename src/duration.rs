// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Duration parsing and formatting for Go-style duration strings.
//!
//! Command-line flags and certificate records express durations the way the
//! Kubernetes ecosystem does (e.g., "1441h", "10m", "1h30m"). This module
//! converts between those strings and `std::time::Duration`.

use anyhow::{bail, Context, Result};
use std::time::Duration;

const SECONDS_PER_MINUTE: u64 = 60;
const SECONDS_PER_HOUR: u64 = 3600;
const SECONDS_PER_DAY: u64 = 86400;
const SECONDS_PER_WEEK: u64 = 604_800;

/// Parse a Go-style duration string into a Rust `Duration`.
///
/// Supported units: `ms`, `s`, `m`, `h`, `d`, `w`. Components may be
/// chained (`1h30m`). The result must be greater than zero.
///
/// # Examples
///
/// ```
/// use klm_certs::duration::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("24h").unwrap(), Duration::from_secs(86400));
/// assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
/// assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
///
/// assert!(parse_duration("").is_err());
/// assert!(parse_duration("10").is_err());  // Missing unit
/// assert!(parse_duration("10x").is_err()); // Invalid unit
/// ```
///
/// # Errors
///
/// Returns an error if:
/// - The string is empty or zero
/// - A component has no unit or an unsupported unit
/// - The value overflows
pub fn parse_duration(duration_str: &str) -> Result<Duration> {
    if duration_str.is_empty() {
        bail!("Duration string cannot be empty");
    }

    let mut total_millis: u64 = 0;
    let mut rest = duration_str;

    while !rest.is_empty() {
        let digits_end = rest
            .chars()
            .position(|c| !c.is_ascii_digit())
            .context("Duration must end with a unit (ms, s, m, h, d, or w)")?;
        if digits_end == 0 {
            bail!("Duration '{duration_str}' has a unit without a value");
        }

        let (value_str, tail) = rest.split_at(digits_end);
        let unit_end = tail
            .chars()
            .position(|c| c.is_ascii_digit())
            .unwrap_or(tail.len());
        let (unit, next) = tail.split_at(unit_end);

        let value: u64 = value_str
            .parse()
            .context("Duration value must be a positive integer")?;

        let millis_per_unit = match unit {
            "ms" => 1,
            "s" => 1000,
            "m" => SECONDS_PER_MINUTE * 1000,
            "h" => SECONDS_PER_HOUR * 1000,
            "d" => SECONDS_PER_DAY * 1000,
            "w" => SECONDS_PER_WEEK * 1000,
            _ => bail!(
                "Unsupported duration unit '{unit}'. Use 'ms', 's', 'm', 'h', 'd', or 'w'"
            ),
        };

        total_millis = value
            .checked_mul(millis_per_unit)
            .and_then(|millis| total_millis.checked_add(millis))
            .context("Duration value too large (overflow)")?;
        rest = next;
    }

    if total_millis == 0 {
        bail!("Duration '{duration_str}' must be greater than zero");
    }

    Ok(Duration::from_millis(total_millis))
}

/// Format a `Duration` the way Go's `time.Duration.String` does for whole seconds.
///
/// Kubernetes controllers serialize `metav1.Duration` in this form
/// (e.g., `1441h0m0s`). Sub-second precision is dropped.
#[must_use]
pub fn format_go_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let hours = total / SECONDS_PER_HOUR;
    let minutes = (total % SECONDS_PER_HOUR) / SECONDS_PER_MINUTE;
    let seconds = total % SECONDS_PER_MINUTE;

    if hours > 0 {
        format!("{hours}h{minutes}m{seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m{seconds}s")
    } else {
        format!("{seconds}s")
    }
}

#[cfg(test)]
#[path = "duration_tests.rs"]
mod duration_tests;
