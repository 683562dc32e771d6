//! TTL classes and per-data-shape defaults.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Closed set of cache lifetimes.
///
/// Every write picks one of these; there is no free-form TTL. The lookup
/// from class to milliseconds is fixed.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub enum TtlClass {
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "5m")]
    #[default]
    FiveMinutes,
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "30m")]
    ThirtyMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "6h")]
    SixHours,
    #[serde(rename = "12h")]
    TwelveHours,
    #[serde(rename = "24h")]
    TwentyFourHours,
}

const MINUTE_MS: u64 = 60 * 1000;
const HOUR_MS: u64 = 60 * MINUTE_MS;

impl TtlClass {
    /// All classes, shortest first.
    pub const ALL: [TtlClass; 8] = [
        TtlClass::OneMinute,
        TtlClass::FiveMinutes,
        TtlClass::FifteenMinutes,
        TtlClass::ThirtyMinutes,
        TtlClass::OneHour,
        TtlClass::SixHours,
        TtlClass::TwelveHours,
        TtlClass::TwentyFourHours,
    ];

    /// Lifetime in milliseconds.
    pub const fn ttl_millis(self) -> u64 {
        match self {
            TtlClass::OneMinute => MINUTE_MS,
            TtlClass::FiveMinutes => 5 * MINUTE_MS,
            TtlClass::FifteenMinutes => 15 * MINUTE_MS,
            TtlClass::ThirtyMinutes => 30 * MINUTE_MS,
            TtlClass::OneHour => HOUR_MS,
            TtlClass::SixHours => 6 * HOUR_MS,
            TtlClass::TwelveHours => 12 * HOUR_MS,
            TtlClass::TwentyFourHours => 24 * HOUR_MS,
        }
    }

    /// Lifetime as a [`Duration`].
    pub const fn duration(self) -> Duration {
        Duration::from_millis(self.ttl_millis())
    }

    /// Short label, e.g. `"15m"`.
    pub const fn label(self) -> &'static str {
        match self {
            TtlClass::OneMinute => "1m",
            TtlClass::FiveMinutes => "5m",
            TtlClass::FifteenMinutes => "15m",
            TtlClass::ThirtyMinutes => "30m",
            TtlClass::OneHour => "1h",
            TtlClass::SixHours => "6h",
            TtlClass::TwelveHours => "12h",
            TtlClass::TwentyFourHours => "24h",
        }
    }
}

impl fmt::Display for TtlClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for TtlClass {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let label = s.trim().to_lowercase();
        TtlClass::ALL
            .into_iter()
            .find(|class| class.label() == label)
            .ok_or(ConfigError::UnknownTtlClass { label })
    }
}

/// The shape of data being cached, used to pick a default TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataShape {
    /// Filtered collections.
    List,
    /// Single record by id.
    Detail,
    /// Aggregate counts backing pagination.
    Count,
    /// Reference data that rarely changes.
    Static,
    /// Computed reports.
    Report,
    /// Dashboard widgets that should feel live.
    Dashboard,
    /// Free-text search results.
    Search,
    /// Dropdown and lookup tables.
    Lookup,
}

impl DataShape {
    /// Default TTL class for this shape.
    pub const fn default_ttl(self) -> TtlClass {
        match self {
            DataShape::List => TtlClass::FiveMinutes,
            DataShape::Detail => TtlClass::FifteenMinutes,
            DataShape::Count => TtlClass::FiveMinutes,
            DataShape::Static => TtlClass::TwentyFourHours,
            DataShape::Report => TtlClass::OneHour,
            DataShape::Dashboard => TtlClass::OneMinute,
            DataShape::Search => TtlClass::OneMinute,
            DataShape::Lookup => TtlClass::SixHours,
        }
    }
}
