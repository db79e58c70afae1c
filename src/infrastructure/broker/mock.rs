use crate::domain::errors::BrokerError;
use crate::domain::market::timeframe::Timeframe;
use crate::domain::market::types::{
    Candle, OpenPosition, Tick, TradeExecution, TradeRequest,
};
use crate::domain::ports::BrokerAdapter;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::RwLock;

/// In-memory broker for tests: canned prices, positions and history, plus a
/// record of every order it received.
#[derive(Default)]
pub struct MockBroker {
    prices: RwLock<HashMap<String, Tick>>,
    positions: RwLock<Vec<OpenPosition>>,
    history: RwLock<HashMap<String, Vec<Candle>>>,
    pub open_requests: RwLock<Vec<TradeRequest>>,
    pub close_requests: RwLock<Vec<(i64, Option<Decimal>)>>,
    pub modify_requests: RwLock<Vec<(i64, Option<Decimal>, Option<Decimal>)>>,
    next_ticket: AtomicI64,
    fail_prices: RwLock<bool>,
    reject_orders: RwLock<Option<String>>,
}

impl MockBroker {
    pub fn new() -> Self {
        Self {
            next_ticket: AtomicI64::new(1000),
            ..Default::default()
        }
    }

    pub async fn set_price(&self, tick: Tick) {
        self.prices.write().await.insert(tick.symbol.clone(), tick);
    }

    pub async fn set_open_positions(&self, positions: Vec<OpenPosition>) {
        *self.positions.write().await = positions;
    }

    pub async fn set_history(&self, symbol: &str, candles: Vec<Candle>) {
        self.history.write().await.insert(symbol.to_string(), candles);
    }

    pub async fn fail_prices(&self, fail: bool) {
        *self.fail_prices.write().await = fail;
    }

    pub async fn reject_orders(&self, reason: Option<String>) {
        *self.reject_orders.write().await = reason;
    }

    pub async fn open_request_count(&self) -> usize {
        self.open_requests.read().await.len()
    }
}

#[async_trait]
impl BrokerAdapter for MockBroker {
    async fn latest_price(&self, symbol: &str) -> Result<Tick, BrokerError> {
        if *self.fail_prices.read().await {
            return Err(BrokerError::RequestFailed {
                reason: "mock price failure".to_string(),
            });
        }
        self.prices
            .read()
            .await
            .get(symbol)
            .cloned()
            .ok_or_else(|| BrokerError::RequestFailed {
                reason: format!("no mock price for {}", symbol),
            })
    }

    async fn open_positions(&self) -> Result<Vec<OpenPosition>, BrokerError> {
        Ok(self.positions.read().await.clone())
    }

    async fn open_trade(&self, request: &TradeRequest) -> Result<TradeExecution, BrokerError> {
        self.open_requests.write().await.push(request.clone());
        if let Some(reason) = self.reject_orders.read().await.clone() {
            return Ok(TradeExecution {
                success: false,
                ticket: None,
                error: Some(reason),
            });
        }
        let ticket = self.next_ticket.fetch_add(1, Ordering::SeqCst);
        Ok(TradeExecution {
            success: true,
            ticket: Some(ticket),
            error: None,
        })
    }

    async fn close_trade(
        &self,
        ticket: i64,
        volume: Option<Decimal>,
    ) -> Result<TradeExecution, BrokerError> {
        self.close_requests.write().await.push((ticket, volume));
        Ok(TradeExecution {
            success: true,
            ticket: Some(ticket),
            error: None,
        })
    }

    async fn modify_trade(
        &self,
        ticket: i64,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
    ) -> Result<(), BrokerError> {
        self.modify_requests
            .write()
            .await
            .push((ticket, stop_loss, take_profit));
        // Reflect the modification on the held position like a real bridge
        let mut positions = self.positions.write().await;
        if let Some(position) = positions.iter_mut().find(|p| p.ticket == ticket) {
            if stop_loss.is_some() {
                position.stop_loss = stop_loss;
            }
            if take_profit.is_some() {
                position.take_profit = take_profit;
            }
        }
        Ok(())
    }

    async fn historical_candles(
        &self,
        symbol: &str,
        _timeframe: Timeframe,
        count: usize,
    ) -> Result<Vec<Candle>, BrokerError> {
        let history = self.history.read().await;
        let candles = history.get(symbol).cloned().unwrap_or_default();
        let skip = candles.len().saturating_sub(count);
        Ok(candles.into_iter().skip(skip).collect())
    }
}
