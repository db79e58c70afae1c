use crate::domain::errors::GuardrailError;
use crate::domain::news::{DayNews, NewsWindow};
use crate::domain::ports::{GuardrailAnswer, GuardrailClient};
use crate::domain::risk::context::StrategyKind;
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::RwLock;

const GUARDRAIL_TIMEOUT: Duration = Duration::from_secs(2);

/// HTTP client for the news-analysis subsystem.
pub struct HttpGuardrailClient {
    client: ClientWithMiddleware,
    base_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CanTradeDto {
    can_trade: bool,
    inside_avoid_window: bool,
    #[serde(default)]
    active_window: Option<NewsWindow>,
}

impl HttpGuardrailClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, GuardrailError> {
        let inner = reqwest::Client::builder()
            .timeout(GUARDRAIL_TIMEOUT)
            .build()
            .map_err(|e| GuardrailError::RequestFailed {
                reason: e.to_string(),
            })?;
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(1);
        let client = ClientBuilder::new(inner)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    fn map_err(e: reqwest_middleware::Error) -> GuardrailError {
        match e {
            reqwest_middleware::Error::Reqwest(e) if e.is_timeout() => GuardrailError::Timeout {
                duration_ms: GUARDRAIL_TIMEOUT.as_millis() as u64,
            },
            other => GuardrailError::RequestFailed {
                reason: other.to_string(),
            },
        }
    }
}

#[async_trait]
impl GuardrailClient for HttpGuardrailClient {
    async fn can_trade_now(
        &self,
        strategy: StrategyKind,
    ) -> Result<GuardrailAnswer, GuardrailError> {
        let url = format!("{}/can-i-trade-now?strategy={}", self.base_url, strategy);
        let response = self.client.get(&url).send().await.map_err(Self::map_err)?;
        let status = response.status();
        if !status.is_success() {
            return Err(GuardrailError::RequestFailed {
                reason: format!("HTTP {}", status),
            });
        }
        let dto: CanTradeDto =
            response
                .json()
                .await
                .map_err(|e| GuardrailError::InvalidPayload {
                    reason: e.to_string(),
                })?;
        Ok(GuardrailAnswer {
            can_trade: dto.can_trade,
            inside_avoid_window: dto.inside_avoid_window,
            active_window: dto.active_window,
        })
    }

    async fn day_windows(&self, date: NaiveDate) -> Result<DayNews, GuardrailError> {
        let url = format!("{}/news-map/{}", self.base_url, date);
        let response = self.client.get(&url).send().await.map_err(Self::map_err)?;
        let status = response.status();
        if !status.is_success() {
            return Err(GuardrailError::RequestFailed {
                reason: format!("HTTP {}", status),
            });
        }
        response
            .json::<DayNews>()
            .await
            .map_err(|e| GuardrailError::InvalidPayload {
                reason: e.to_string(),
            })
    }
}

/// Canned guardrail for tests.
#[derive(Default)]
pub struct MockGuardrail {
    can_trade: RwLock<(bool, Option<NewsWindow>)>,
    inside_window: RwLock<bool>,
    day: RwLock<Option<DayNews>>,
    fail_can_trade: RwLock<bool>,
}

impl MockGuardrail {
    pub fn new() -> Self {
        Self {
            can_trade: RwLock::new((true, None)),
            ..Default::default()
        }
    }

    pub async fn set_can_trade(&self, can_trade: bool, window: Option<NewsWindow>) {
        *self.inside_window.write().await = window.is_some();
        *self.can_trade.write().await = (can_trade, window);
    }

    pub async fn set_day(&self, day: DayNews) {
        *self.day.write().await = Some(day);
    }

    pub async fn fail_can_trade(&self, fail: bool) {
        *self.fail_can_trade.write().await = fail;
    }
}

#[async_trait]
impl GuardrailClient for MockGuardrail {
    async fn can_trade_now(
        &self,
        _strategy: StrategyKind,
    ) -> Result<GuardrailAnswer, GuardrailError> {
        if *self.fail_can_trade.read().await {
            return Err(GuardrailError::Timeout { duration_ms: 2000 });
        }
        let (can_trade, window) = self.can_trade.read().await.clone();
        Ok(GuardrailAnswer {
            can_trade,
            inside_avoid_window: *self.inside_window.read().await,
            active_window: window,
        })
    }

    async fn day_windows(&self, date: NaiveDate) -> Result<DayNews, GuardrailError> {
        match self.day.read().await.clone() {
            Some(day) => Ok(day),
            None => Ok(DayNews {
                date,
                avoid_windows: Vec::new(),
            }),
        }
    }
}
