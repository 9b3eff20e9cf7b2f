/*
Copyright 2024 The Kubernetes Authors.

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

use std::fmt;
use std::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Duration can be an integer or a string. An integer is interpreted as
/// nanoseconds. If a string, it is a Caddy duration value such as `300ms`,
/// `1.5h`, or `2h45m`; valid units are `ns`, `us`/`µs`, `ms`, `s`, `m`, `h`,
/// and `d` (a day is assumed to be 24h).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Duration(i64);

impl Duration {
    pub const fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    pub const fn from_secs(secs: i64) -> Self {
        Self(secs * 1_000_000_000)
    }

    pub const fn as_nanos(self) -> i64 {
        self.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl Serialize for Duration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.0)
    }
}

impl<'de> Deserialize<'de> for Duration {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct DurationVisitor;

        impl Visitor<'_> for DurationVisitor {
            type Value = Duration;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a duration string or integer nanoseconds")
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Duration, E> {
                Ok(Duration(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Duration, E> {
                i64::try_from(v)
                    .map(Duration)
                    .map_err(|_| E::custom("duration out of range"))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Duration, E> {
                parse_duration(v).map_err(E::custom)
            }
        }

        deserializer.deserialize_any(DurationVisitor)
    }
}

impl fmt::Display for Duration {
    // Matches Go's time.Duration formatting so formatted values parse back to
    // the same duration.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            return f.write_str("0s");
        }
        if self.0 < 0 {
            f.write_str("-")?;
        }
        let u = self.0.unsigned_abs();

        if u < 1_000_000_000 {
            // Sub-second: pick ns, µs, or ms.
            let (unit, div) = if u < 1_000 {
                ("ns", 1)
            } else if u < 1_000_000 {
                ("µs", 1_000)
            } else {
                ("ms", 1_000_000)
            };
            write_with_frac(f, u / div, u % div, div)?;
            return f.write_str(unit);
        }

        let secs = u / 1_000_000_000;
        let nanos = u % 1_000_000_000;
        let hours = secs / 3600;
        let mins = (secs % 3600) / 60;
        if hours > 0 {
            write!(f, "{hours}h")?;
        }
        if hours > 0 || mins > 0 {
            write!(f, "{mins}m")?;
        }
        write_with_frac(f, secs % 60, nanos, 1_000_000_000)?;
        f.write_str("s")
    }
}

fn write_with_frac(f: &mut fmt::Formatter<'_>, int: u64, frac: u64, scale: u64) -> fmt::Result {
    write!(f, "{int}")?;
    if frac == 0 {
        return Ok(());
    }
    let mut digits = String::new();
    let mut rem = frac;
    let mut unit = scale / 10;
    while unit > 0 {
        digits.push(char::from(b'0' + (rem / unit) as u8));
        rem %= unit;
        unit /= 10;
    }
    write!(f, ".{}", digits.trim_end_matches('0'))
}

impl FromStr for Duration {
    type Err = ParseDurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_duration(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseDurationError(String);

impl fmt::Display for ParseDurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "parsing duration: {}", self.0)
    }
}

impl std::error::Error for ParseDurationError {}

fn nanos_per(unit: &str) -> Option<i64> {
    match unit {
        "ns" => Some(1),
        "us" | "µs" | "μs" => Some(1_000),
        "ms" => Some(1_000_000),
        "s" => Some(1_000_000_000),
        "m" => Some(60 * 1_000_000_000),
        "h" => Some(3600 * 1_000_000_000),
        // Caddy extension over Go: days, assumed to be 24 hours.
        "d" => Some(24 * 3600 * 1_000_000_000),
        _ => None,
    }
}

/// Parses a duration string such as `300ms`, `1.5h`, `2h45m`, or `1d`. The
/// maximum input string length is 1024.
pub fn parse_duration(s: &str) -> Result<Duration, ParseDurationError> {
    if s.len() > 1024 {
        return Err(ParseDurationError("input string too long".into()));
    }
    let original = s;
    let mut rest = s;

    let mut neg = false;
    if let Some(stripped) = rest.strip_prefix('-') {
        neg = true;
        rest = stripped;
    } else if let Some(stripped) = rest.strip_prefix('+') {
        rest = stripped;
    }
    if rest == "0" {
        return Ok(Duration(0));
    }
    if rest.is_empty() {
        return Err(ParseDurationError(format!("invalid duration {original:?}")));
    }

    let mut total: i64 = 0;
    while !rest.is_empty() {
        // Integer part.
        let int_len = rest.chars().take_while(char::is_ascii_digit).count();
        let int_part: i64 = if int_len > 0 {
            rest[..int_len]
                .parse()
                .map_err(|_| ParseDurationError(format!("invalid duration {original:?}")))?
        } else {
            0
        };
        rest = &rest[int_len..];

        // Optional fractional part.
        let mut frac = 0i64;
        let mut scale = 1f64;
        let mut frac_len = 0;
        if let Some(stripped) = rest.strip_prefix('.') {
            frac_len = stripped.chars().take_while(char::is_ascii_digit).count();
            for b in stripped[..frac_len].bytes() {
                frac = frac * 10 + i64::from(b - b'0');
                scale *= 10.0;
            }
            rest = &stripped[frac_len..];
        }
        if int_len == 0 && frac_len == 0 {
            return Err(ParseDurationError(format!("invalid duration {original:?}")));
        }

        // Unit.
        let unit_len = rest
            .chars()
            .take_while(|c| !c.is_ascii_digit() && *c != '.')
            .map(char::len_utf8)
            .sum();
        if unit_len == 0 {
            return Err(ParseDurationError(format!(
                "missing unit in duration {original:?}"
            )));
        }
        let unit = nanos_per(&rest[..unit_len]).ok_or_else(|| {
            ParseDurationError(format!(
                "unknown unit {:?} in duration {original:?}",
                &rest[..unit_len]
            ))
        })?;
        rest = &rest[unit_len..];

        let mut value = int_part
            .checked_mul(unit)
            .ok_or_else(|| ParseDurationError(format!("invalid duration {original:?}")))?;
        if frac > 0 {
            value += (frac as f64 * (unit as f64 / scale)) as i64;
        }
        total = total
            .checked_add(value)
            .ok_or_else(|| ParseDurationError(format!("invalid duration {original:?}")))?;
    }

    if neg {
        total = -total;
    }
    Ok(Duration(total))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_values() {
        assert_eq!(parse_duration("0").unwrap(), Duration::from_nanos(0));
        assert_eq!(parse_duration("300ms").unwrap(), Duration::from_nanos(300_000_000));
        assert_eq!(parse_duration("15s").unwrap(), Duration::from_secs(15));
        assert_eq!(parse_duration("2h45m").unwrap(), Duration::from_secs(2 * 3600 + 45 * 60));
        assert_eq!(parse_duration("1.5h").unwrap(), Duration::from_secs(90 * 60));
        assert_eq!(parse_duration("-5s").unwrap(), Duration::from_secs(-5));
    }

    #[test]
    fn day_unit_is_twenty_four_hours() {
        assert_eq!(parse_duration("1d").unwrap(), parse_duration("24h").unwrap());
        assert_eq!(parse_duration("2d12h").unwrap(), parse_duration("60h").unwrap());
        assert_eq!(parse_duration("0.5d").unwrap(), parse_duration("12h").unwrap());
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("5").is_err());
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("5parsecs").is_err());
        assert!(parse_duration(&"9".repeat(1025)).is_err());
    }

    #[test]
    fn format_round_trips() {
        for raw in [
            "0s", "15s", "300ms", "1.5h", "2h45m", "750ns", "1.5µs", "90m", "36h",
        ] {
            let d = parse_duration(raw).unwrap();
            assert_eq!(parse_duration(&d.to_string()).unwrap(), d, "round trip {raw}");
        }
    }

    #[test]
    fn formats_like_go() {
        assert_eq!(Duration::from_nanos(0).to_string(), "0s");
        assert_eq!(Duration::from_secs(15).to_string(), "15s");
        assert_eq!(Duration::from_secs(9900).to_string(), "2h45m0s");
        assert_eq!(Duration::from_nanos(1_500).to_string(), "1.5µs");
        assert_eq!(Duration::from_nanos(300_000_000).to_string(), "300ms");
        assert_eq!(Duration::from_secs(-5).to_string(), "-5s");
    }

    #[test]
    fn serializes_as_nanoseconds() {
        let d = Duration::from_secs(15);
        assert_eq!(serde_json::to_string(&d).unwrap(), "15000000000");
        let parsed: Duration = serde_json::from_str("15000000000").unwrap();
        assert_eq!(parsed, d);
        let parsed: Duration = serde_json::from_str(r#""15s""#).unwrap();
        assert_eq!(parsed, d);
    }
}
