pub mod daily_stats;
pub mod exposure_tracker;
pub mod kill_switch;
pub mod loss_streak;
pub mod risk_service;
