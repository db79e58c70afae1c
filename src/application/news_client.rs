use crate::domain::news::{DayNews, GuardrailMode};
use crate::domain::ports::{GuardrailClient, NewsDayRepository};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// The guardrail verdict the orchestrator acts on.
#[derive(Debug, Clone)]
pub struct GuardrailVerdict {
    pub mode: GuardrailMode,
    pub reason: Option<String>,
}

/// Caches the day's avoid-windows and answers "can trade now".
///
/// The upstream can-i-trade-now call is authoritative; on failure the
/// service degrades to the cached day map (and then to normal mode with a
/// warning), never blocking the loop on news-side outages.
pub struct GuardrailService {
    client: Arc<dyn GuardrailClient>,
    news_days: Arc<dyn NewsDayRepository>,
    tz: Tz,
    cached_day: RwLock<Option<DayNews>>,
}

impl GuardrailService {
    pub fn new(
        client: Arc<dyn GuardrailClient>,
        news_days: Arc<dyn NewsDayRepository>,
        tz: Tz,
    ) -> Self {
        Self {
            client,
            news_days,
            tz,
            cached_day: RwLock::new(None),
        }
    }

    async fn ensure_day_cached(&self, now: DateTime<Utc>) {
        let date = now.with_timezone(&self.tz).date_naive();
        {
            let cached = self.cached_day.read().await;
            if cached.as_ref().is_some_and(|d| d.date == date) {
                return;
            }
        }
        match self.client.day_windows(date).await {
            Ok(day) => {
                if let Err(e) = self.news_days.upsert(&day).await {
                    warn!("GuardrailService: day map persist failed: {}", e);
                }
                *self.cached_day.write().await = Some(day);
            }
            Err(e) => {
                warn!("GuardrailService: day map fetch failed ({}), trying store", e);
                match self.news_days.get(date).await {
                    Ok(Some(day)) => *self.cached_day.write().await = Some(day),
                    Ok(None) => debug!("GuardrailService: no stored day map for {}", date),
                    Err(e) => warn!("GuardrailService: day map load failed: {}", e),
                }
            }
        }
    }

    /// Mode for this instant, per strategy.
    pub async fn check(
        &self,
        strategy: crate::domain::risk::context::StrategyKind,
        now: DateTime<Utc>,
    ) -> GuardrailVerdict {
        self.ensure_day_cached(now).await;

        match self.client.can_trade_now(strategy).await {
            Ok(answer) => {
                if !answer.can_trade {
                    let reason = answer
                        .active_window
                        .as_ref()
                        .map(|w| w.reason.clone())
                        .unwrap_or_else(|| "inside news avoid-window".to_string());
                    return GuardrailVerdict {
                        mode: GuardrailMode::Blocked,
                        reason: Some(reason),
                    };
                }
                if answer.inside_avoid_window {
                    // Tradeable but inside a moderate window: reduce size
                    let reason = answer.active_window.as_ref().map(|w| w.reason.clone());
                    return GuardrailVerdict {
                        mode: GuardrailMode::Reduced,
                        reason,
                    };
                }
                GuardrailVerdict {
                    mode: GuardrailMode::Normal,
                    reason: None,
                }
            }
            Err(e) => {
                debug!("GuardrailService: live check failed ({}), using cached map", e);
                let cached = self.cached_day.read().await;
                match cached.as_ref() {
                    Some(day) => {
                        let (mode, window) = day.mode_at(now);
                        GuardrailVerdict {
                            mode,
                            reason: window.map(|w| w.reason.clone()),
                        }
                    }
                    None => {
                        warn!("GuardrailService: no cached day map, defaulting to normal");
                        GuardrailVerdict {
                            mode: GuardrailMode::Normal,
                            reason: None,
                        }
                    }
                }
            }
        }
    }
}
