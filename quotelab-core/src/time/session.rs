//! Trading-session templates and session filtering.
//!
//! A session is a set of wall-clock windows in a fixed time zone. A window
//! whose start is after its end wraps midnight (futures trade 18:00 -> 17:00
//! the next day).

use crate::domain::Bar;
use chrono::{DateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("invalid wall-clock time {0:?} (expected HH:MM or HH:MM:SS)")]
    InvalidTime(String),

    #[error("unknown time zone: {0}")]
    UnknownTimeZone(String),

    #[error("unknown session preset: {0}")]
    UnknownPreset(String),
}

/// One `[start, end]` wall-clock window, both ends inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl SessionWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// Parse `"HH:MM"` / `"HH:MM:SS"` bounds.
    pub fn parse(start: &str, end: &str) -> Result<Self, SessionError> {
        Ok(Self::new(parse_wall_time(start)?, parse_wall_time(end)?))
    }

    pub fn wraps_midnight(&self) -> bool {
        self.start > self.end
    }

    pub fn contains(&self, time: NaiveTime) -> bool {
        if self.wraps_midnight() {
            time >= self.start || time <= self.end
        } else {
            self.start <= time && time <= self.end
        }
    }
}

fn parse_wall_time(raw: &str) -> Result<NaiveTime, SessionError> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .map_err(|_| SessionError::InvalidTime(raw.to_string()))
}

/// Named trading-hours template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub name: String,
    pub timezone: Tz,
    pub windows: Vec<SessionWindow>,
}

impl Session {
    pub fn new(name: impl Into<String>, timezone: Tz, windows: Vec<SessionWindow>) -> Self {
        Self {
            name: name.into(),
            timezone,
            windows,
        }
    }

    /// US equities regular hours, 09:30-16:00 New York.
    pub fn us_equities_regular() -> Self {
        Self::preset("regular", chrono_tz::America::New_York, (9, 30), (16, 0))
    }

    /// US equities pre- and post-market, 04:00-20:00 New York.
    pub fn us_equities_extended() -> Self {
        Self::preset("extended", chrono_tz::America::New_York, (4, 0), (20, 0))
    }

    /// CME-style futures day, 18:00-17:00 New York (wraps midnight).
    pub fn futures() -> Self {
        Self::preset("futures", chrono_tz::America::New_York, (18, 0), (17, 0))
    }

    /// Always open.
    pub fn crypto() -> Self {
        let end = NaiveTime::from_hms_nano_opt(23, 59, 59, 999_999_999).unwrap_or(NaiveTime::MIN);
        Self::new(
            "crypto",
            chrono_tz::UTC,
            vec![SessionWindow::new(NaiveTime::MIN, end)],
        )
    }

    /// Look up a preset by name: `regular`, `extended`, `futures`, `crypto`.
    pub fn from_name(name: &str) -> Result<Self, SessionError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "regular" | "rth" | "equities" => Ok(Self::us_equities_regular()),
            "extended" | "eth" => Ok(Self::us_equities_extended()),
            "futures" => Ok(Self::futures()),
            "crypto" | "24x7" | "always" => Ok(Self::crypto()),
            other => Err(SessionError::UnknownPreset(other.to_string())),
        }
    }

    /// Build a custom session from an IANA zone name and `(start, end)` strings.
    pub fn custom(
        name: impl Into<String>,
        timezone: &str,
        windows: &[(&str, &str)],
    ) -> Result<Self, SessionError> {
        let tz: Tz = timezone
            .parse()
            .map_err(|_| SessionError::UnknownTimeZone(timezone.to_string()))?;
        let windows = windows
            .iter()
            .map(|(start, end)| SessionWindow::parse(start, end))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(name, tz, windows))
    }

    fn preset(name: &str, timezone: Tz, start: (u32, u32), end: (u32, u32)) -> Self {
        let at = |(h, m): (u32, u32)| NaiveTime::from_hms_opt(h, m, 0).unwrap_or(NaiveTime::MIN);
        Self::new(name, timezone, vec![SessionWindow::new(at(start), at(end))])
    }

    /// Whether `ts` falls inside any window, on the session's local clock.
    pub fn is_active(&self, ts: DateTime<Utc>) -> bool {
        let local = ts.with_timezone(&self.timezone).time();
        self.windows.iter().any(|w| w.contains(local))
    }
}

/// Bars whose timestamp is active in `session`, in input order.
pub fn filter_by_session(bars: &[Bar], session: &Session) -> Vec<Bar> {
    bars.iter()
        .filter(|bar| session.is_active(bar.timestamp))
        .copied()
        .collect()
}
