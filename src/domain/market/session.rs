use chrono::{DateTime, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// A trading-session window expressed in engine-timezone hours.
///
/// Windows may wrap midnight (e.g. Sydney 22-06).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionWindow {
    pub name: String,
    pub start_hour: u32,
    pub end_hour: u32,
}

impl SessionWindow {
    pub fn new(name: impl Into<String>, start_hour: u32, end_hour: u32) -> Self {
        Self {
            name: name.into(),
            start_hour,
            end_hour,
        }
    }

    pub fn contains(&self, time: DateTime<Utc>, tz: Tz) -> bool {
        let hour = time.with_timezone(&tz).hour();
        if self.start_hour <= self.end_hour {
            hour >= self.start_hour && hour < self.end_hour
        } else {
            // Overnight wrap
            hour >= self.start_hour || hour < self.end_hour
        }
    }
}

/// True when `time` falls inside at least one configured window.
pub fn in_any_session(windows: &[SessionWindow], time: DateTime<Utc>, tz: Tz) -> bool {
    windows.iter().any(|w| w.contains(time, tz))
}

/// Default session set for a forex/metals book.
pub fn default_sessions() -> Vec<SessionWindow> {
    vec![
        SessionWindow::new("london", 8, 17),
        SessionWindow::new("newyork", 13, 22),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::Europe::London;
    use chrono_tz::UTC;

    #[test]
    fn test_contains_simple_window() {
        let w = SessionWindow::new("london", 8, 17);
        let inside = Utc.with_ymd_and_hms(2025, 1, 6, 9, 0, 0).unwrap();
        let outside = Utc.with_ymd_and_hms(2025, 1, 6, 18, 0, 0).unwrap();
        assert!(w.contains(inside, UTC));
        assert!(!w.contains(outside, UTC));
    }

    #[test]
    fn test_end_hour_exclusive() {
        let w = SessionWindow::new("london", 8, 17);
        let boundary = Utc.with_ymd_and_hms(2025, 1, 6, 17, 0, 0).unwrap();
        assert!(!w.contains(boundary, UTC));
    }

    #[test]
    fn test_overnight_wrap() {
        let w = SessionWindow::new("sydney", 22, 6);
        let late = Utc.with_ymd_and_hms(2025, 1, 6, 23, 0, 0).unwrap();
        let early = Utc.with_ymd_and_hms(2025, 1, 6, 3, 0, 0).unwrap();
        let midday = Utc.with_ymd_and_hms(2025, 1, 6, 12, 0, 0).unwrap();
        assert!(w.contains(late, UTC));
        assert!(w.contains(early, UTC));
        assert!(!w.contains(midday, UTC));
    }

    #[test]
    fn test_timezone_shift() {
        // 07:30 UTC in winter is 07:30 in London; outside an 8-17 window.
        let w = SessionWindow::new("london", 8, 17);
        let t = Utc.with_ymd_and_hms(2025, 1, 6, 7, 30, 0).unwrap();
        assert!(!w.contains(t, London));
        // But 08:30 UTC is inside.
        let t2 = Utc.with_ymd_and_hms(2025, 1, 6, 8, 30, 0).unwrap();
        assert!(w.contains(t2, London));
    }

    #[test]
    fn test_in_any_session() {
        let windows = default_sessions();
        let ny_only = Utc.with_ymd_and_hms(2025, 1, 6, 20, 0, 0).unwrap();
        let closed = Utc.with_ymd_and_hms(2025, 1, 6, 2, 0, 0).unwrap();
        assert!(in_any_session(&windows, ny_only, UTC));
        assert!(!in_any_session(&windows, closed, UTC));
    }
}
