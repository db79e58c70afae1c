use crate::domain::decision::DecisionAction;
use crate::domain::errors::{BrokerError, GuardrailError, StoreError};
use crate::domain::events::OrderEvent;
use crate::domain::exit::{ExitPlan, ExitProgress};
use crate::domain::market::timeframe::Timeframe;
use crate::domain::market::types::{Candle, OpenPosition, Tick, TradeExecution, TradeRequest};
use crate::domain::news::{DayNews, GuardrailMode};
use crate::domain::risk::context::StrategyKind;
use crate::domain::risk::kill_switch::KillSwitchEvent;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// The broker bridge consumed by the core (§6 contract).
#[async_trait]
pub trait BrokerAdapter: Send + Sync {
    async fn latest_price(&self, symbol: &str) -> Result<Tick, BrokerError>;
    async fn open_positions(&self) -> Result<Vec<OpenPosition>, BrokerError>;
    async fn open_trade(&self, request: &TradeRequest) -> Result<TradeExecution, BrokerError>;
    async fn close_trade(
        &self,
        ticket: i64,
        volume: Option<Decimal>,
    ) -> Result<TradeExecution, BrokerError>;
    async fn modify_trade(
        &self,
        ticket: i64,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
    ) -> Result<(), BrokerError>;
    /// Historical bars for startup backfill.
    async fn historical_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        count: usize,
    ) -> Result<Vec<Candle>, BrokerError>;
}

/// Response from `can-i-trade-now`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardrailAnswer {
    pub can_trade: bool,
    pub inside_avoid_window: bool,
    #[serde(default)]
    pub active_window: Option<crate::domain::news::NewsWindow>,
}

/// The news-analysis subsystem, consumed through its HTTP contract.
#[async_trait]
pub trait GuardrailClient: Send + Sync {
    async fn can_trade_now(&self, strategy: StrategyKind) -> Result<GuardrailAnswer, GuardrailError>;
    async fn day_windows(&self, date: NaiveDate) -> Result<DayNews, GuardrailError>;
}

/// One persisted evaluation outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionRecord {
    pub id: Option<i64>,
    pub symbol: String,
    pub strategy: StrategyKind,
    pub guardrail_mode: GuardrailMode,
    pub guardrail_reason: Option<String>,
    pub signal_reason: Option<String>,
    pub decision: DecisionAction,
    pub reasons: Vec<String>,
    pub risk_reason: Option<String>,
    pub kill_switch_active: bool,
    pub kill_switch_reasons: Vec<String>,
    pub trade_request: Option<serde_json::Value>,
    pub execution_result: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Query filter for the admin decisions endpoint.
#[derive(Debug, Clone, Default)]
pub struct DecisionQuery {
    pub symbol: Option<String>,
    pub strategy: Option<StrategyKind>,
    pub decision: Option<DecisionAction>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: i64,
    pub offset: i64,
}

/// Aggregates for one trading day.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyMetrics {
    pub date: NaiveDate,
    pub evaluations: i64,
    pub trades: i64,
    pub skips: i64,
    pub top_skip_reasons: Vec<(String, i64)>,
}

#[async_trait]
pub trait DecisionLogRepository: Send + Sync {
    async fn insert(&self, record: &DecisionRecord) -> Result<(), StoreError>;
    async fn query(&self, query: &DecisionQuery) -> Result<Vec<DecisionRecord>, StoreError>;
    async fn daily_metrics(&self, date: NaiveDate) -> Result<DailyMetrics, StoreError>;
}

#[async_trait]
pub trait OrderEventRepository: Send + Sync {
    /// Inserts the event; returns false when the idempotency key already
    /// exists (the event is a duplicate and must be ignored).
    async fn insert_idempotent(&self, event: &OrderEvent) -> Result<bool, StoreError>;
}

/// A realized trade derived from close-family order events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClosedTrade {
    pub ticket: i64,
    pub symbol: String,
    pub direction: crate::domain::market::types::Direction,
    pub volume: Decimal,
    pub entry_price: Option<Decimal>,
    pub exit_price: Option<Decimal>,
    pub profit: Decimal,
    pub commission: Decimal,
    pub swap: Decimal,
    pub closed_at: DateTime<Utc>,
}

#[async_trait]
pub trait LiveTradeRepository: Send + Sync {
    async fn record_closed(&self, trade: &ClosedTrade) -> Result<(), StoreError>;
    async fn record_open(&self, position: &OpenPosition) -> Result<(), StoreError>;
    async fn remove_open(&self, ticket: i64) -> Result<(), StoreError>;
    /// Open positions as last reported through order events; the exposure
    /// fallback when the in-memory snapshot is missing.
    async fn open_positions(&self) -> Result<Vec<OpenPosition>, StoreError>;
    async fn realized_pnl_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Decimal, StoreError>;
}

#[async_trait]
pub trait ExitPlanRepository: Send + Sync {
    async fn save(&self, ticket: i64, plan: &ExitPlan) -> Result<(), StoreError>;
    async fn load(&self, ticket: i64) -> Result<Option<(ExitPlan, ExitProgress)>, StoreError>;
    async fn update_progress(&self, ticket: i64, progress: &ExitProgress) -> Result<(), StoreError>;
    async fn remove(&self, ticket: i64) -> Result<(), StoreError>;
}

#[async_trait]
pub trait KillSwitchEventRepository: Send + Sync {
    async fn insert(&self, event: &KillSwitchEvent) -> Result<(), StoreError>;
}

#[async_trait]
pub trait NewsDayRepository: Send + Sync {
    async fn upsert(&self, day: &DayNews) -> Result<(), StoreError>;
    async fn get(&self, date: NaiveDate) -> Result<Option<DayNews>, StoreError>;
}
