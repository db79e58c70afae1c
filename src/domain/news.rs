use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Trading posture derived from the news calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuardrailMode {
    Normal,
    Reduced,
    Blocked,
}

impl fmt::Display for GuardrailMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuardrailMode::Normal => write!(f, "normal"),
            GuardrailMode::Reduced => write!(f, "reduced"),
            GuardrailMode::Blocked => write!(f, "blocked"),
        }
    }
}

impl FromStr for GuardrailMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "normal" => Ok(GuardrailMode::Normal),
            "reduced" => Ok(GuardrailMode::Reduced),
            "blocked" => Ok(GuardrailMode::Blocked),
            _ => anyhow::bail!("Invalid guardrail mode: {}", s),
        }
    }
}

/// One avoid-window around a scheduled news event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsWindow {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub currency: String,
    pub impact: String,
    pub event_name: String,
    pub is_critical: bool,
    /// 0..=100.
    pub risk_score: u8,
    pub avoid_before_minutes: i64,
    pub avoid_after_minutes: i64,
    pub reason: String,
    #[serde(default)]
    pub detailed_description: String,
}

impl NewsWindow {
    /// The effective no-trade span including the before/after buffers.
    pub fn effective_span(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        (
            self.start_time - Duration::minutes(self.avoid_before_minutes),
            self.end_time + Duration::minutes(self.avoid_after_minutes),
        )
    }

    pub fn covers(&self, now: DateTime<Utc>) -> bool {
        let (start, end) = self.effective_span();
        now >= start && now <= end
    }

    /// Mode this window imposes while active: critical or high-risk windows
    /// block, moderate ones reduce size.
    pub fn mode(&self) -> GuardrailMode {
        if self.is_critical || self.risk_score >= 70 {
            GuardrailMode::Blocked
        } else if self.risk_score >= 40 {
            GuardrailMode::Reduced
        } else {
            GuardrailMode::Normal
        }
    }
}

/// The day's avoid-windows, keyed by date (unique per day).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayNews {
    pub date: NaiveDate,
    pub avoid_windows: Vec<NewsWindow>,
}

impl DayNews {
    /// Strictest mode among the windows covering `now`, with the reason of
    /// the dominating window.
    pub fn mode_at(&self, now: DateTime<Utc>) -> (GuardrailMode, Option<&NewsWindow>) {
        let mut mode = GuardrailMode::Normal;
        let mut active: Option<&NewsWindow> = None;
        for w in self.avoid_windows.iter().filter(|w| w.covers(now)) {
            let m = w.mode();
            let stricter = matches!(
                (mode, m),
                (GuardrailMode::Normal, GuardrailMode::Reduced)
                    | (GuardrailMode::Normal, GuardrailMode::Blocked)
                    | (GuardrailMode::Reduced, GuardrailMode::Blocked)
            );
            if active.is_none() || stricter {
                mode = m;
                active = Some(w);
            }
        }
        (mode, active)
    }
}
