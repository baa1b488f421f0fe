//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Sync interval duration grammar
//!
//! Intervals on the MCPRegistry sync policy use a human-readable duration
//! grammar with units `s` (seconds), `m` (minutes) and `h` (hours), e.g.
//! "30s", "5m", "1h", "1h30m".

use std::time::Duration;

use crate::error::{RegistryError, RegistryResult};

/// Parse a duration string with s/m/h units
pub fn parse_duration(value: &str) -> RegistryResult<Duration> {
    let invalid = |message: &str| RegistryError::InvalidDuration {
        value: value.to_string(),
        message: message.to_string(),
    };

    if value.is_empty() {
        return Err(invalid("empty duration"));
    }

    let mut total = Duration::ZERO;
    let mut digits = String::new();
    let mut saw_segment = false;

    for c in value.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }

        let multiplier = match c {
            's' => 1u64,
            'm' => 60,
            'h' => 3600,
            _ => return Err(invalid("valid units are s, m and h")),
        };

        if digits.is_empty() {
            return Err(invalid("unit without a leading number"));
        }

        let amount: u64 = digits
            .parse()
            .map_err(|_| invalid("number segment out of range"))?;
        total += Duration::from_secs(amount * multiplier);
        digits.clear();
        saw_segment = true;
    }

    if !digits.is_empty() {
        return Err(invalid("trailing number without a unit"));
    }
    if !saw_segment {
        return Err(invalid("no duration segments"));
    }

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_units() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("24h").unwrap(), Duration::from_secs(86400));
    }

    #[test]
    fn test_compound_durations() {
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("2m30s").unwrap(), Duration::from_secs(150));
    }

    #[test]
    fn test_invalid_durations() {
        for value in ["", "h", "5", "10d", "5 m", "-5m"] {
            assert!(parse_duration(value).is_err(), "expected error for {value:?}");
        }
    }
}
