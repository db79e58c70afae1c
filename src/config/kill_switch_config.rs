use crate::config::parse_env;
use anyhow::Result;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

#[derive(Debug, Clone)]
pub struct KillSwitchConfig {
    pub enabled: bool,
    /// Absolute daily loss in account currency.
    pub daily_max_loss: Decimal,
    /// Daily loss as percent of starting equity; whichever trips first.
    pub daily_max_loss_pct: Decimal,
    pub weekly_max_loss: Decimal,
    pub max_losing_streak: u32,
    pub max_daily_trades: u32,
    pub max_weekly_trades: u32,
    /// Global default; per-symbol filter rules own the per-symbol spread cap.
    pub max_spread_pips: Decimal,
    pub max_exposure_risk: Decimal,
    pub auto_resume_next_day: bool,
    pub auto_resume_next_week: bool,
    /// Flatten every governed position on arming.
    pub close_positions_on_arm: bool,
}

impl KillSwitchConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            enabled: parse_env("KILL_SWITCH_ENABLED", "true")?,
            daily_max_loss: parse_env("KILL_SWITCH_DAILY_MAX_LOSS", "500")?,
            daily_max_loss_pct: parse_env("KILL_SWITCH_DAILY_MAX_LOSS_PCT", "5")?,
            weekly_max_loss: parse_env("KILL_SWITCH_WEEKLY_MAX_LOSS", "1200")?,
            max_losing_streak: parse_env("KILL_SWITCH_MAX_LOSING_STREAK", "5")?,
            max_daily_trades: parse_env("KILL_SWITCH_MAX_DAILY_TRADES", "12")?,
            max_weekly_trades: parse_env("KILL_SWITCH_MAX_WEEKLY_TRADES", "40")?,
            max_spread_pips: parse_env("KILL_SWITCH_MAX_SPREAD_PIPS", "50")?,
            max_exposure_risk: parse_env("KILL_SWITCH_MAX_EXPOSURE_RISK", "2000")?,
            auto_resume_next_day: parse_env("KILL_SWITCH_AUTO_RESUME_NEXT_DAY", "true")?,
            auto_resume_next_week: parse_env("KILL_SWITCH_AUTO_RESUME_NEXT_WEEK", "true")?,
            close_positions_on_arm: parse_env("KILL_SWITCH_CLOSE_POSITIONS", "false")?,
        })
    }
}

impl Default for KillSwitchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            daily_max_loss: dec!(500),
            daily_max_loss_pct: dec!(5),
            weekly_max_loss: dec!(1200),
            max_losing_streak: 5,
            max_daily_trades: 12,
            max_weekly_trades: 40,
            max_spread_pips: dec!(50),
            max_exposure_risk: dec!(2000),
            auto_resume_next_day: true,
            auto_resume_next_week: true,
            close_positions_on_arm: false,
        }
    }
}
