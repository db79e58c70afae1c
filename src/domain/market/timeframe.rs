use anyhow::{Result, anyhow};
use chrono::{DateTime, Duration, DurationRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Timeframe intervals used across the analysis cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    M1,
    M5,
    M15,
    H1,
    H4,
    D1,
}

impl Timeframe {
    pub fn minutes(&self) -> i64 {
        match self {
            Timeframe::M1 => 1,
            Timeframe::M5 => 5,
            Timeframe::M15 => 15,
            Timeframe::H1 => 60,
            Timeframe::H4 => 240,
            Timeframe::D1 => 1440,
        }
    }

    pub fn seconds(&self) -> i64 {
        self.minutes() * 60
    }

    pub fn duration(&self) -> Duration {
        Duration::minutes(self.minutes())
    }

    /// Floors a timestamp to the start of the period containing it.
    pub fn period_start(&self, time: DateTime<Utc>) -> DateTime<Utc> {
        time.duration_trunc(self.duration())
            .expect("timeframe durations are far below the rounding limit")
    }

    /// True when `time` falls exactly on a period boundary.
    pub fn is_period_start(&self, time: DateTime<Utc>) -> bool {
        self.period_start(time) == time
    }

    /// Number of complete M1 bars one bar of this timeframe aggregates.
    pub fn m1_bars_required(&self) -> usize {
        self.minutes() as usize
    }
}

impl FromStr for Timeframe {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "M1" | "1M" | "1MIN" => Ok(Timeframe::M1),
            "M5" | "5M" | "5MIN" => Ok(Timeframe::M5),
            "M15" | "15M" | "15MIN" => Ok(Timeframe::M15),
            "H1" | "1H" | "1HOUR" => Ok(Timeframe::H1),
            "H4" | "4H" | "4HOUR" => Ok(Timeframe::H4),
            "D1" | "1D" | "1DAY" => Ok(Timeframe::D1),
            _ => Err(anyhow!(
                "Invalid timeframe: '{}'. Valid options: M1, M5, M15, H1, H4, D1",
                s
            )),
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Timeframe::M1 => "M1",
            Timeframe::M5 => "M5",
            Timeframe::M15 => "M15",
            Timeframe::H1 => "H1",
            Timeframe::H4 => "H4",
            Timeframe::D1 => "D1",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_minutes() {
        assert_eq!(Timeframe::M1.minutes(), 1);
        assert_eq!(Timeframe::M15.minutes(), 15);
        assert_eq!(Timeframe::H4.minutes(), 240);
        assert_eq!(Timeframe::D1.minutes(), 1440);
    }

    #[test]
    fn test_from_str() {
        assert_eq!(Timeframe::from_str("m15").unwrap(), Timeframe::M15);
        assert_eq!(Timeframe::from_str("4h").unwrap(), Timeframe::H4);
        assert_eq!(Timeframe::from_str("H1").unwrap(), Timeframe::H1);
        assert!(Timeframe::from_str("w1").is_err());
    }

    #[test]
    fn test_period_start_m15() {
        let t = Utc.with_ymd_and_hms(2025, 1, 6, 9, 37, 12).unwrap();
        let start = Timeframe::M15.period_start(t);
        assert_eq!(start, Utc.with_ymd_and_hms(2025, 1, 6, 9, 30, 0).unwrap());
    }

    #[test]
    fn test_period_start_h4() {
        let t = Utc.with_ymd_and_hms(2025, 1, 6, 14, 59, 59).unwrap();
        let start = Timeframe::H4.period_start(t);
        assert_eq!(start, Utc.with_ymd_and_hms(2025, 1, 6, 12, 0, 0).unwrap());
    }

    #[test]
    fn test_is_period_start() {
        let aligned = Utc.with_ymd_and_hms(2025, 1, 6, 8, 0, 0).unwrap();
        assert!(Timeframe::H1.is_period_start(aligned));
        assert!(!Timeframe::H1.is_period_start(aligned + Duration::minutes(1)));
    }

    #[test]
    fn test_m1_bars_required() {
        assert_eq!(Timeframe::H4.m1_bars_required(), 240);
        assert_eq!(Timeframe::M15.m1_bars_required(), 15);
    }
}
