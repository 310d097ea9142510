use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ParseError;

const NANOS_PER_MICRO: i64 = 1_000;
const NANOS_PER_MILLI: i64 = 1_000_000;
const NANOS_PER_SECOND: i64 = 1_000_000_000;
const NANOS_PER_MINUTE: i64 = 60 * NANOS_PER_SECOND;
const NANOS_PER_HOUR: i64 = 60 * NANOS_PER_MINUTE;

/// A signed elapsed-time quantity with a compact text form such as `20s`,
/// `1m30s` or `250ms`.
///
/// Zero is the "unset" value in bundle documents; zero and negative spans are
/// never used as an active timeout or wait, see [`Timeout::to_std`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timeout(i64);

impl Timeout {
    pub const ZERO: Timeout = Timeout(0);

    pub const fn from_nanos(nanos: i64) -> Self {
        Timeout(nanos)
    }

    pub const fn from_millis(millis: i64) -> Self {
        Timeout(millis * NANOS_PER_MILLI)
    }

    pub const fn from_secs(secs: i64) -> Self {
        Timeout(secs * NANOS_PER_SECOND)
    }

    pub fn from_std(duration: Duration) -> Self {
        Timeout(i64::try_from(duration.as_nanos()).unwrap_or(i64::MAX))
    }

    pub const fn as_nanos(&self) -> i64 {
        self.0
    }

    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// The span as a std duration, or `None` when it is zero or negative.
    pub fn to_std(&self) -> Option<Duration> {
        u64::try_from(self.0)
            .ok()
            .filter(|nanos| *nanos > 0)
            .map(Duration::from_nanos)
    }

    /// Returns `self` when positive, `fallback` otherwise.
    pub fn or(self, fallback: Timeout) -> Timeout {
        if self.is_positive() {
            self
        } else {
            fallback
        }
    }
}

fn unit_nanos(unit: &str) -> Option<i128> {
    let nanos = match unit {
        "ns" => 1,
        "us" | "µs" | "μs" => NANOS_PER_MICRO,
        "ms" => NANOS_PER_MILLI,
        "s" => NANOS_PER_SECOND,
        "m" => NANOS_PER_MINUTE,
        "h" => NANOS_PER_HOUR,
        _ => return None,
    };
    Some(i128::from(nanos))
}

impl FromStr for Timeout {
    type Err = ParseError;

    /// Parses a sequence of decimal numbers, each with an optional fraction
    /// and a mandatory unit suffix (`ns`, `us`/`µs`, `ms`, `s`, `m`, `h`),
    /// optionally signed. A bare `0` is accepted.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseError::Duration(value.to_string());
        let trimmed = value.trim();
        let (negative, mut rest) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
        };
        if rest == "0" {
            return Ok(Timeout::ZERO);
        }
        if rest.is_empty() {
            return Err(invalid());
        }

        let mut total: i128 = 0;
        while !rest.is_empty() {
            let number_end = rest
                .find(|c: char| !(c.is_ascii_digit() || c == '.'))
                .unwrap_or(rest.len());
            let (number, tail) = rest.split_at(number_end);
            let unit_end = tail
                .find(|c: char| c.is_ascii_digit() || c == '.')
                .unwrap_or(tail.len());
            let (unit, next) = tail.split_at(unit_end);
            let scale = unit_nanos(unit).ok_or_else(invalid)?;

            let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
            if whole.is_empty() && fraction.is_empty() {
                return Err(invalid());
            }
            let whole: i128 = if whole.is_empty() {
                0
            } else {
                whole.parse().map_err(|_| invalid())?
            };
            let mut nanos = whole.checked_mul(scale).ok_or_else(invalid)?;
            if !fraction.is_empty() {
                // digits beyond nanosecond precision of an hour do not matter
                let digits = &fraction[..fraction.len().min(18)];
                let fraction: i128 = digits.parse().map_err(|_| invalid())?;
                nanos += fraction * scale / 10_i128.pow(digits.len() as u32);
            }
            total = total.checked_add(nanos).ok_or_else(invalid)?;
            if total > i128::from(i64::MAX) {
                return Err(invalid());
            }
            rest = next;
        }

        let total = total as i64;
        Ok(Timeout(if negative { -total } else { total }))
    }
}

/// `value / scale` rendered with the remainder as a trimmed decimal fraction.
fn decimal(value: u64, scale: u64) -> String {
    let whole = value / scale;
    let remainder = value % scale;
    if remainder == 0 {
        return whole.to_string();
    }
    let width = scale.ilog10() as usize;
    let fraction = format!("{remainder:0width$}");
    format!("{whole}.{}", fraction.trim_end_matches('0'))
}

impl fmt::Display for Timeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let nanos = self.0.unsigned_abs();
        if nanos == 0 {
            return f.write_str("0s");
        }
        if nanos < NANOS_PER_SECOND as u64 {
            let (unit, scale) = if nanos < NANOS_PER_MICRO as u64 {
                ("ns", 1)
            } else if nanos < NANOS_PER_MILLI as u64 {
                ("µs", NANOS_PER_MICRO as u64)
            } else {
                ("ms", NANOS_PER_MILLI as u64)
            };
            return write!(f, "{sign}{}{unit}", decimal(nanos, scale));
        }

        let hours = nanos / NANOS_PER_HOUR as u64;
        let minutes = (nanos % NANOS_PER_HOUR as u64) / NANOS_PER_MINUTE as u64;
        let seconds = nanos % NANOS_PER_MINUTE as u64;
        f.write_str(sign)?;
        if hours > 0 {
            write!(f, "{hours}h")?;
        }
        if hours > 0 || minutes > 0 {
            write!(f, "{minutes}m")?;
        }
        write!(f, "{}s", decimal(seconds, NANOS_PER_SECOND as u64))
    }
}

impl Serialize for Timeout {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

struct TimeoutVisitor;

impl Visitor<'_> for TimeoutVisitor {
    type Value = Timeout;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a duration string such as \"20s\" or \"1m30s\"")
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Timeout, E> {
        value.parse().map_err(E::custom)
    }
}

impl<'de> Deserialize<'de> for Timeout {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_str(TimeoutVisitor)
    }
}
