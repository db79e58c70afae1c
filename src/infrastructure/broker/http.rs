use crate::domain::errors::BrokerError;
use crate::domain::market::timeframe::Timeframe;
use crate::domain::market::types::{
    Candle, Direction, OpenPosition, OrderKind, Tick, TradeExecution, TradeRequest,
};
use crate::domain::ports::BrokerAdapter;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const BROKER_TIMEOUT: Duration = Duration::from_secs(5);

/// HTTP client for the broker bridge (§ external interfaces).
///
/// Transient failures retry with exponential backoff via middleware; the
/// per-request timeout stays bounded so a wedged bridge cannot stall the
/// pipeline.
pub struct HttpBrokerBridge {
    client: ClientWithMiddleware,
    base_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PriceDto {
    symbol: String,
    bid: Decimal,
    ask: Decimal,
    time: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PositionDto {
    ticket: i64,
    symbol: String,
    direction: Direction,
    volume: Decimal,
    entry_price: Decimal,
    entry_time: DateTime<Utc>,
    #[serde(default)]
    sl: Option<Decimal>,
    #[serde(default)]
    tp: Option<Decimal>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OpenTradeDto<'a> {
    symbol: &'a str,
    direction: Direction,
    order_kind: OrderKind,
    volume: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    entry_price: Option<Decimal>,
    stop_loss: Decimal,
    take_profit: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_limit_price: Option<Decimal>,
    magic_number: i64,
    comment: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExecutionDto {
    success: bool,
    #[serde(default)]
    ticket: Option<i64>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CandleDto {
    open: Decimal,
    high: Decimal,
    low: Decimal,
    close: Decimal,
    volume: Decimal,
    start_time: DateTime<Utc>,
}

impl HttpBrokerBridge {
    pub fn new(base_url: impl Into<String>) -> Result<Self, BrokerError> {
        let inner = reqwest::Client::builder()
            .timeout(BROKER_TIMEOUT)
            .build()
            .map_err(|e| BrokerError::RequestFailed {
                reason: e.to_string(),
            })?;
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(2);
        let client = ClientBuilder::new(inner)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    fn map_err(e: reqwest_middleware::Error) -> BrokerError {
        match e {
            reqwest_middleware::Error::Reqwest(e) if e.is_timeout() => BrokerError::Timeout {
                duration_ms: BROKER_TIMEOUT.as_millis() as u64,
            },
            other => BrokerError::RequestFailed {
                reason: other.to_string(),
            },
        }
    }

    async fn parse<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, BrokerError> {
        let status = response.status();
        if !status.is_success() {
            return Err(BrokerError::RequestFailed {
                reason: format!("HTTP {}", status),
            });
        }
        response
            .json::<T>()
            .await
            .map_err(|e| BrokerError::InvalidPayload {
                reason: e.to_string(),
            })
    }
}

#[async_trait]
impl BrokerAdapter for HttpBrokerBridge {
    async fn latest_price(&self, symbol: &str) -> Result<Tick, BrokerError> {
        let url = format!("{}/price/{}", self.base_url, symbol);
        let response = self.client.get(&url).send().await.map_err(Self::map_err)?;
        let dto: PriceDto = Self::parse(response).await?;
        Ok(Tick::new(dto.symbol, dto.bid, dto.ask, dto.time))
    }

    async fn open_positions(&self) -> Result<Vec<OpenPosition>, BrokerError> {
        let url = format!("{}/open-positions", self.base_url);
        let response = self.client.get(&url).send().await.map_err(Self::map_err)?;
        let dtos: Vec<PositionDto> = Self::parse(response).await?;
        Ok(dtos
            .into_iter()
            .map(|dto| OpenPosition {
                ticket: dto.ticket,
                symbol: dto.symbol,
                direction: dto.direction,
                volume: dto.volume,
                entry_price: dto.entry_price,
                entry_time: dto.entry_time,
                stop_loss: dto.sl,
                take_profit: dto.tp,
            })
            .collect())
    }

    async fn open_trade(&self, request: &TradeRequest) -> Result<TradeExecution, BrokerError> {
        let url = format!("{}/trades/open", self.base_url);
        let body = OpenTradeDto {
            symbol: &request.symbol,
            direction: request.direction,
            order_kind: request.order_kind,
            volume: request.volume,
            entry_price: request.entry_price,
            stop_loss: request.stop_loss,
            take_profit: request.take_profit,
            stop_limit_price: request.stop_limit_price,
            magic_number: request.magic_number,
            comment: &request.comment,
        };
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(Self::map_err)?;
        let dto: ExecutionDto = Self::parse(response).await?;
        Ok(TradeExecution {
            success: dto.success,
            ticket: dto.ticket,
            error: dto.error,
        })
    }

    async fn close_trade(
        &self,
        ticket: i64,
        volume: Option<Decimal>,
    ) -> Result<TradeExecution, BrokerError> {
        let url = format!("{}/trades/close", self.base_url);
        let mut body = serde_json::json!({ "ticket": ticket });
        if let Some(volume) = volume {
            body["volume"] = serde_json::json!(volume);
        }
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(Self::map_err)?;
        let dto: ExecutionDto = Self::parse(response).await?;
        Ok(TradeExecution {
            success: dto.success,
            ticket: Some(ticket),
            error: dto.error,
        })
    }

    async fn modify_trade(
        &self,
        ticket: i64,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
    ) -> Result<(), BrokerError> {
        let url = format!("{}/trades/modify", self.base_url);
        let body = serde_json::json!({
            "ticket": ticket,
            "sl": stop_loss,
            "tp": take_profit,
        });
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(Self::map_err)?;
        let dto: ExecutionDto = Self::parse(response).await?;
        if dto.success {
            Ok(())
        } else {
            Err(BrokerError::OrderRejected {
                reason: dto.error.unwrap_or_else(|| "modify rejected".to_string()),
            })
        }
    }

    async fn historical_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        count: usize,
    ) -> Result<Vec<Candle>, BrokerError> {
        let url = format!(
            "{}/history/{}?timeframe={}&count={}",
            self.base_url, symbol, timeframe, count
        );
        let response = self.client.get(&url).send().await.map_err(Self::map_err)?;
        let dtos: Vec<CandleDto> = Self::parse(response).await?;
        Ok(dtos
            .into_iter()
            .map(|dto| Candle {
                symbol: symbol.to_string(),
                timeframe,
                open: dto.open,
                high: dto.high,
                low: dto.low,
                close: dto.close,
                volume: dto.volume,
                start_time: dto.start_time,
                end_time: dto.start_time + timeframe.duration(),
            })
            .collect())
    }
}
