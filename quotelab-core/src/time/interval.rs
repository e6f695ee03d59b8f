//! Bucket widths and resolution tokens.
//!
//! Vendors and callers spell resolutions many ways (`"1"`, `"1m"`, `"60"`,
//! `"1h"`, `"D"`, ...). Everything is canonicalized to [`Interval`] before it
//! reaches a provider or the bucketer, so both sides agree on bucket width.

use chrono::Duration;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Supported bucket widths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Interval {
    M1,
    M5,
    M10,
    M15,
    M30,
    H1,
    H4,
    D1,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntervalError {
    #[error("unsupported resolution token: {0:?}")]
    Unsupported(String),

    #[error("resolution {0:?} is finer than one minute")]
    TooFine(String),
}

impl Interval {
    pub const ALL: [Interval; 8] = [
        Interval::M1,
        Interval::M5,
        Interval::M10,
        Interval::M15,
        Interval::M30,
        Interval::H1,
        Interval::H4,
        Interval::D1,
    ];

    /// Nominal width in minutes.
    pub fn minutes(self) -> u32 {
        match self {
            Interval::M1 => 1,
            Interval::M5 => 5,
            Interval::M10 => 10,
            Interval::M15 => 15,
            Interval::M30 => 30,
            Interval::H1 => 60,
            Interval::H4 => 240,
            Interval::D1 => 1440,
        }
    }

    /// Nominal width. Wall-clock buckets are longer or shorter across DST transitions.
    pub fn duration(self) -> Duration {
        Duration::minutes(i64::from(self.minutes()))
    }

    pub fn is_daily(self) -> bool {
        self == Interval::D1
    }

    /// Canonical token.
    pub fn token(self) -> &'static str {
        match self {
            Interval::M1 => "1m",
            Interval::M5 => "5m",
            Interval::M10 => "10m",
            Interval::M15 => "15m",
            Interval::M30 => "30m",
            Interval::H1 => "1h",
            Interval::H4 => "4h",
            Interval::D1 => "1d",
        }
    }

    fn from_minutes(minutes: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|i| i.minutes() == minutes)
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for Interval {
    type Err = IntervalError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let token = raw.trim().to_ascii_lowercase();
        let unsupported = || IntervalError::Unsupported(raw.to_string());

        if token.is_empty() {
            return Err(unsupported());
        }

        let digits_end = token
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(token.len());
        let (num, unit) = token.split_at(digits_end);
        let amount: u32 = if num.is_empty() {
            1
        } else {
            num.parse().map_err(|_| unsupported())?
        };
        if amount == 0 {
            return Err(unsupported());
        }

        let minutes = match unit {
            "" | "m" | "min" | "mins" | "minute" | "minutes" | "t" => {
                // A bare unit ("m") is not a resolution.
                if num.is_empty() {
                    return Err(unsupported());
                }
                amount
            }
            "h" | "hr" | "hour" | "hours" => amount.checked_mul(60).ok_or_else(unsupported)?,
            "d" | "day" | "days" => amount.checked_mul(1440).ok_or_else(unsupported)?,
            "s" | "sec" | "secs" | "second" | "seconds" => {
                return Err(IntervalError::TooFine(raw.to_string()))
            }
            _ => return Err(unsupported()),
        };

        Self::from_minutes(minutes).ok_or_else(unsupported)
    }
}

impl Serialize for Interval {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.token())
    }
}

impl<'de> Deserialize<'de> for Interval {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
