use crate::domain::decision::DecisionAction;
use crate::domain::errors::StoreError;
use crate::domain::events::OrderEvent;
use crate::domain::exit::{ExitPlan, ExitProgress};
use crate::domain::market::types::{Direction, OpenPosition};
use crate::domain::news::DayNews;
use crate::domain::ports::{
    ClosedTrade, DailyMetrics, DecisionLogRepository, DecisionQuery, DecisionRecord,
    ExitPlanRepository, KillSwitchEventRepository, LiveTradeRepository, NewsDayRepository,
    OrderEventRepository,
};
use crate::domain::risk::context::StrategyKind;
use crate::domain::risk::kill_switch::KillSwitchEvent;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use std::collections::HashMap;
use std::str::FromStr;

fn parse_decimal(raw: &str) -> Result<Decimal, StoreError> {
    Decimal::from_str(raw).map_err(|e| StoreError::Corrupt(format!("decimal '{}': {}", raw, e)))
}

fn parse_decimal_opt(raw: Option<String>) -> Result<Option<Decimal>, StoreError> {
    raw.map(|s| parse_decimal(&s)).transpose()
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("timestamp '{}': {}", raw, e)))
}

fn parse_direction(raw: &str) -> Result<Direction, StoreError> {
    match raw {
        "BUY" => Ok(Direction::Buy),
        "SELL" => Ok(Direction::Sell),
        other => Err(StoreError::Corrupt(format!("direction '{}'", other))),
    }
}

// ===== Decision log =====

pub struct SqliteDecisionLogRepository {
    pool: SqlitePool,
}

impl SqliteDecisionLogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn map_row(row: SqliteRow) -> Result<DecisionRecord, StoreError> {
        let strategy: String = row.try_get("strategy")?;
        let guardrail_mode: String = row.try_get("guardrail_mode")?;
        let decision: String = row.try_get("decision")?;
        let reasons: String = row.try_get("reasons")?;
        let ks_reasons: String = row.try_get("kill_switch_reasons")?;
        let created_at: String = row.try_get("created_at")?;
        let trade_request: Option<String> = row.try_get("trade_request")?;
        let execution_result: Option<String> = row.try_get("execution_result")?;

        Ok(DecisionRecord {
            id: Some(row.try_get("id")?),
            symbol: row.try_get("symbol")?,
            strategy: StrategyKind::from_str(&strategy)
                .map_err(|e| StoreError::Corrupt(e.to_string()))?,
            guardrail_mode: guardrail_mode
                .parse()
                .map_err(|e: anyhow::Error| StoreError::Corrupt(e.to_string()))?,
            guardrail_reason: row.try_get("guardrail_reason")?,
            signal_reason: row.try_get("signal_reason")?,
            decision: if decision == "TRADE" {
                DecisionAction::Trade
            } else {
                DecisionAction::Skip
            },
            reasons: serde_json::from_str(&reasons)?,
            risk_reason: row.try_get("risk_reason")?,
            kill_switch_active: row.try_get::<i64, _>("kill_switch_active")? != 0,
            kill_switch_reasons: serde_json::from_str(&ks_reasons)?,
            trade_request: trade_request.map(|s| serde_json::from_str(&s)).transpose()?,
            execution_result: execution_result
                .map(|s| serde_json::from_str(&s))
                .transpose()?,
            created_at: parse_time(&created_at)?,
        })
    }
}

#[async_trait]
impl DecisionLogRepository for SqliteDecisionLogRepository {
    async fn insert(&self, record: &DecisionRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO decision_log (
                symbol, strategy, guardrail_mode, guardrail_reason, signal_reason,
                decision, reasons, risk_reason, kill_switch_active,
                kill_switch_reasons, trade_request, execution_result, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.symbol)
        .bind(record.strategy.to_string())
        .bind(record.guardrail_mode.to_string())
        .bind(&record.guardrail_reason)
        .bind(&record.signal_reason)
        .bind(record.decision.to_string())
        .bind(serde_json::to_string(&record.reasons)?)
        .bind(&record.risk_reason)
        .bind(record.kill_switch_active as i64)
        .bind(serde_json::to_string(&record.kill_switch_reasons)?)
        .bind(
            record
                .trade_request
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
        )
        .bind(
            record
                .execution_result
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
        )
        .bind(record.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn query(&self, query: &DecisionQuery) -> Result<Vec<DecisionRecord>, StoreError> {
        let mut sql = String::from("SELECT * FROM decision_log WHERE 1=1");
        if query.symbol.is_some() {
            sql.push_str(" AND symbol = ?");
        }
        if query.strategy.is_some() {
            sql.push_str(" AND strategy = ?");
        }
        if query.decision.is_some() {
            sql.push_str(" AND decision = ?");
        }
        if query.from.is_some() {
            sql.push_str(" AND created_at >= ?");
        }
        if query.to.is_some() {
            sql.push_str(" AND created_at <= ?");
        }
        sql.push_str(" ORDER BY created_at DESC LIMIT ? OFFSET ?");

        let mut q = sqlx::query(&sql);
        if let Some(symbol) = &query.symbol {
            q = q.bind(symbol);
        }
        if let Some(strategy) = &query.strategy {
            q = q.bind(strategy.to_string());
        }
        if let Some(decision) = &query.decision {
            q = q.bind(decision.to_string());
        }
        if let Some(from) = &query.from {
            q = q.bind(from.to_rfc3339());
        }
        if let Some(to) = &query.to {
            q = q.bind(to.to_rfc3339());
        }
        let limit = if query.limit <= 0 { 100 } else { query.limit };
        q = q.bind(limit).bind(query.offset.max(0));

        let rows = q.fetch_all(&self.pool).await?;
        rows.into_iter().map(Self::map_row).collect()
    }

    async fn daily_metrics(&self, date: NaiveDate) -> Result<DailyMetrics, StoreError> {
        let from = format!("{}T00:00:00+00:00", date);
        let to = format!("{}T00:00:00+00:00", date.succ_opt().unwrap_or(date));
        let rows = sqlx::query(
            "SELECT decision, reasons FROM decision_log WHERE created_at >= ? AND created_at < ?",
        )
        .bind(&from)
        .bind(&to)
        .fetch_all(&self.pool)
        .await?;

        let mut evaluations = 0i64;
        let mut trades = 0i64;
        let mut skips = 0i64;
        let mut tally: HashMap<String, i64> = HashMap::new();
        for row in rows {
            evaluations += 1;
            let decision: String = row.try_get("decision")?;
            if decision == "TRADE" {
                trades += 1;
            } else {
                skips += 1;
                let reasons: Vec<String> =
                    serde_json::from_str(&row.try_get::<String, _>("reasons")?)?;
                for reason in reasons {
                    *tally.entry(reason).or_insert(0) += 1;
                }
            }
        }
        let mut top: Vec<(String, i64)> = tally.into_iter().collect();
        top.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        top.truncate(10);

        Ok(DailyMetrics {
            date,
            evaluations,
            trades,
            skips,
            top_skip_reasons: top,
        })
    }
}

// ===== Order events =====

pub struct SqliteOrderEventRepository {
    pool: SqlitePool,
}

impl SqliteOrderEventRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderEventRepository for SqliteOrderEventRepository {
    async fn insert_idempotent(&self, event: &OrderEvent) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO order_events (event_key, ticket, event_type, symbol, payload, timestamp)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(event_key) DO NOTHING
            "#,
        )
        .bind(event.idempotency_key())
        .bind(event.ticket)
        .bind(event.event_type.to_string())
        .bind(&event.symbol)
        .bind(serde_json::to_string(event)?)
        .bind(event.timestamp.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

// ===== Live / open trades =====

pub struct SqliteLiveTradeRepository {
    pool: SqlitePool,
}

impl SqliteLiveTradeRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LiveTradeRepository for SqliteLiveTradeRepository {
    async fn record_closed(&self, trade: &ClosedTrade) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO live_trades (
                ticket, symbol, direction, volume, entry_price, exit_price,
                profit, commission, swap, closed_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(trade.ticket)
        .bind(&trade.symbol)
        .bind(trade.direction.to_string())
        .bind(trade.volume.to_string())
        .bind(trade.entry_price.map(|d| d.to_string()))
        .bind(trade.exit_price.map(|d| d.to_string()))
        .bind(trade.profit.to_string())
        .bind(trade.commission.to_string())
        .bind(trade.swap.to_string())
        .bind(trade.closed_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_open(&self, position: &OpenPosition) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO open_trades (ticket, symbol, direction, volume, entry_price, entry_time, sl, tp)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(ticket) DO UPDATE SET
                volume = excluded.volume, sl = excluded.sl, tp = excluded.tp
            "#,
        )
        .bind(position.ticket)
        .bind(&position.symbol)
        .bind(position.direction.to_string())
        .bind(position.volume.to_string())
        .bind(position.entry_price.to_string())
        .bind(position.entry_time.to_rfc3339())
        .bind(position.stop_loss.map(|d| d.to_string()))
        .bind(position.take_profit.map(|d| d.to_string()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove_open(&self, ticket: i64) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM open_trades WHERE ticket = ?")
            .bind(ticket)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn open_positions(&self) -> Result<Vec<OpenPosition>, StoreError> {
        let rows = sqlx::query("SELECT * FROM open_trades")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|row| {
                let direction: String = row.try_get("direction")?;
                let volume: String = row.try_get("volume")?;
                let entry_price: String = row.try_get("entry_price")?;
                let entry_time: String = row.try_get("entry_time")?;
                Ok(OpenPosition {
                    ticket: row.try_get("ticket")?,
                    symbol: row.try_get("symbol")?,
                    direction: parse_direction(&direction)?,
                    volume: parse_decimal(&volume)?,
                    entry_price: parse_decimal(&entry_price)?,
                    entry_time: parse_time(&entry_time)?,
                    stop_loss: parse_decimal_opt(row.try_get("sl")?)?,
                    take_profit: parse_decimal_opt(row.try_get("tp")?)?,
                })
            })
            .collect()
    }

    async fn realized_pnl_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Decimal, StoreError> {
        let rows = sqlx::query(
            "SELECT profit, commission, swap FROM live_trades WHERE closed_at >= ? AND closed_at < ?",
        )
        .bind(from.to_rfc3339())
        .bind(to.to_rfc3339())
        .fetch_all(&self.pool)
        .await?;
        let mut total = Decimal::ZERO;
        for row in rows {
            total += parse_decimal(&row.try_get::<String, _>("profit")?)?;
            total += parse_decimal(&row.try_get::<String, _>("commission")?)?;
            total += parse_decimal(&row.try_get::<String, _>("swap")?)?;
        }
        Ok(total)
    }
}

// ===== Exit plans =====

pub struct SqliteExitPlanRepository {
    pool: SqlitePool,
}

impl SqliteExitPlanRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExitPlanRepository for SqliteExitPlanRepository {
    async fn save(&self, ticket: i64, plan: &ExitPlan) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO exit_plans (ticket, plan, progress)
            VALUES (?, ?, ?)
            ON CONFLICT(ticket) DO UPDATE SET plan = excluded.plan
            "#,
        )
        .bind(ticket)
        .bind(serde_json::to_string(plan)?)
        .bind(serde_json::to_string(&ExitProgress::default())?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load(&self, ticket: i64) -> Result<Option<(ExitPlan, ExitProgress)>, StoreError> {
        let row = sqlx::query("SELECT plan, progress FROM exit_plans WHERE ticket = ?")
            .bind(ticket)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| {
            let plan: String = row.try_get("plan")?;
            let progress: String = row.try_get("progress")?;
            Ok((
                serde_json::from_str(&plan)?,
                serde_json::from_str(&progress)?,
            ))
        })
        .transpose()
    }

    async fn update_progress(&self, ticket: i64, progress: &ExitProgress) -> Result<(), StoreError> {
        sqlx::query("UPDATE exit_plans SET progress = ? WHERE ticket = ?")
            .bind(serde_json::to_string(progress)?)
            .bind(ticket)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn remove(&self, ticket: i64) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM exit_plans WHERE ticket = ?")
            .bind(ticket)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

// ===== Kill switch events =====

pub struct SqliteKillSwitchEventRepository {
    pool: SqlitePool,
}

impl SqliteKillSwitchEventRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl KillSwitchEventRepository for SqliteKillSwitchEventRepository {
    async fn insert(&self, event: &KillSwitchEvent) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO kill_switch_events (timestamp, scope, active, reasons) VALUES (?, ?, ?, ?)",
        )
        .bind(event.timestamp.to_rfc3339())
        .bind(&event.scope)
        .bind(event.active as i64)
        .bind(serde_json::to_string(&event.reasons)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

// ===== News days =====

pub struct SqliteNewsDayRepository {
    pool: SqlitePool,
}

impl SqliteNewsDayRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NewsDayRepository for SqliteNewsDayRepository {
    async fn upsert(&self, day: &DayNews) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO news_days (date, windows)
            VALUES (?, ?)
            ON CONFLICT(date) DO UPDATE SET windows = excluded.windows
            "#,
        )
        .bind(day.date.to_string())
        .bind(serde_json::to_string(&day.avoid_windows)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, date: NaiveDate) -> Result<Option<DayNews>, StoreError> {
        let row = sqlx::query("SELECT windows FROM news_days WHERE date = ?")
            .bind(date.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| {
            let windows: String = row.try_get("windows")?;
            Ok(DayNews {
                date,
                avoid_windows: serde_json::from_str(&windows)?,
            })
        })
        .transpose()
    }
}

/// Test double: a live-trade repository whose every call fails, used to
/// exercise the conservative-skip exposure path.
pub mod test_support {
    use super::*;
    use std::sync::Arc;

    pub struct FailingLiveTradeRepo;

    #[async_trait]
    impl LiveTradeRepository for FailingLiveTradeRepo {
        async fn record_closed(&self, _trade: &ClosedTrade) -> Result<(), StoreError> {
            Err(StoreError::Database(sqlx::Error::PoolClosed))
        }
        async fn record_open(&self, _position: &OpenPosition) -> Result<(), StoreError> {
            Err(StoreError::Database(sqlx::Error::PoolClosed))
        }
        async fn remove_open(&self, _ticket: i64) -> Result<(), StoreError> {
            Err(StoreError::Database(sqlx::Error::PoolClosed))
        }
        async fn open_positions(&self) -> Result<Vec<OpenPosition>, StoreError> {
            Err(StoreError::Database(sqlx::Error::PoolClosed))
        }
        async fn realized_pnl_between(
            &self,
            _from: DateTime<Utc>,
            _to: DateTime<Utc>,
        ) -> Result<Decimal, StoreError> {
            Err(StoreError::Database(sqlx::Error::PoolClosed))
        }
    }

    pub fn failing_live_trade_repo() -> Arc<dyn LiveTradeRepository> {
        Arc::new(FailingLiveTradeRepo)
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::domain::events::OrderEventType;
    use crate::domain::exit::TrailMode;
    use crate::domain::news::GuardrailMode;
    use crate::infrastructure::persistence::Database;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn record(symbol: &str, decision: DecisionAction, reasons: Vec<&str>, hour: u32) -> DecisionRecord {
        DecisionRecord {
            id: None,
            symbol: symbol.to_string(),
            strategy: StrategyKind::Low,
            guardrail_mode: GuardrailMode::Normal,
            guardrail_reason: None,
            signal_reason: Some("SMC: test".to_string()),
            decision,
            reasons: reasons.into_iter().map(String::from).collect(),
            risk_reason: None,
            kill_switch_active: false,
            kill_switch_reasons: Vec::new(),
            trade_request: Some(serde_json::json!({"symbol": symbol, "volume": "0.1"})),
            execution_result: None,
            created_at: Utc.with_ymd_and_hms(2025, 1, 6, hour, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_decision_roundtrip_preserves_fields() {
        let db = Database::new_in_memory().await.unwrap();
        let repo = SqliteDecisionLogRepository::new(db.pool.clone());
        let original = record("XAUUSD", DecisionAction::Skip, vec!["a", "b"], 10);
        repo.insert(&original).await.unwrap();

        let rows = repo
            .query(&DecisionQuery {
                symbol: Some("XAUUSD".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.symbol, original.symbol);
        assert_eq!(row.strategy, original.strategy);
        assert_eq!(row.decision, original.decision);
        assert_eq!(row.reasons, original.reasons);
        assert_eq!(row.signal_reason, original.signal_reason);
        assert_eq!(row.trade_request, original.trade_request);
        assert_eq!(row.created_at, original.created_at);
    }

    #[tokio::test]
    async fn test_decision_query_filters() {
        let db = Database::new_in_memory().await.unwrap();
        let repo = SqliteDecisionLogRepository::new(db.pool.clone());
        repo.insert(&record("XAUUSD", DecisionAction::Skip, vec!["x"], 9))
            .await
            .unwrap();
        repo.insert(&record("EURUSD", DecisionAction::Trade, vec![], 10))
            .await
            .unwrap();

        let trades = repo
            .query(&DecisionQuery {
                decision: Some(DecisionAction::Trade),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].symbol, "EURUSD");
    }

    #[tokio::test]
    async fn test_daily_metrics_top_reasons() {
        let db = Database::new_in_memory().await.unwrap();
        let repo = SqliteDecisionLogRepository::new(db.pool.clone());
        repo.insert(&record("XAUUSD", DecisionAction::Skip, vec!["spread too wide"], 9))
            .await
            .unwrap();
        repo.insert(&record("XAUUSD", DecisionAction::Skip, vec!["spread too wide"], 10))
            .await
            .unwrap();
        repo.insert(&record("XAUUSD", DecisionAction::Trade, vec![], 11))
            .await
            .unwrap();

        let metrics = repo
            .daily_metrics(NaiveDate::from_ymd_opt(2025, 1, 6).unwrap())
            .await
            .unwrap();
        assert_eq!(metrics.evaluations, 3);
        assert_eq!(metrics.trades, 1);
        assert_eq!(metrics.skips, 2);
        assert_eq!(metrics.top_skip_reasons[0], ("spread too wide".to_string(), 2));
    }

    #[tokio::test]
    async fn test_order_event_idempotence() {
        let db = Database::new_in_memory().await.unwrap();
        let repo = SqliteOrderEventRepository::new(db.pool.clone());
        let ts = Utc.with_ymd_and_hms(2025, 1, 6, 12, 0, 0).unwrap();
        let event = OrderEvent {
            event_type: OrderEventType::Closed,
            ticket: 5,
            position_id: None,
            symbol: "EURUSD".to_string(),
            direction: Direction::Buy,
            volume: dec!(0.1),
            entry_time: None,
            exit_time: Some(ts),
            entry_price: None,
            exit_price: None,
            sl: None,
            tp: None,
            commission: dec!(0),
            swap: dec!(0),
            profit: dec!(12),
            reason: String::new(),
            raw: serde_json::Value::Null,
            timestamp: ts,
        };
        assert!(repo.insert_idempotent(&event).await.unwrap());
        assert!(!repo.insert_idempotent(&event).await.unwrap());
        // Same ticket, different event type: distinct key
        let mut other = event.clone();
        other.event_type = OrderEventType::TpHit;
        assert!(repo.insert_idempotent(&other).await.unwrap());
    }

    #[tokio::test]
    async fn test_open_trades_roundtrip() {
        let db = Database::new_in_memory().await.unwrap();
        let repo = SqliteLiveTradeRepository::new(db.pool.clone());
        let position = OpenPosition {
            ticket: 11,
            symbol: "XAUUSD".to_string(),
            direction: Direction::Sell,
            volume: dec!(0.25),
            entry_price: dec!(2655.5),
            entry_time: Utc.with_ymd_and_hms(2025, 1, 6, 9, 0, 0).unwrap(),
            stop_loss: Some(dec!(2665)),
            take_profit: None,
        };
        repo.record_open(&position).await.unwrap();
        let open = repo.open_positions().await.unwrap();
        assert_eq!(open, vec![position]);

        repo.remove_open(11).await.unwrap();
        assert!(repo.open_positions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_realized_pnl_window() {
        let db = Database::new_in_memory().await.unwrap();
        let repo = SqliteLiveTradeRepository::new(db.pool.clone());
        let closed_at = Utc.with_ymd_and_hms(2025, 1, 6, 15, 0, 0).unwrap();
        repo.record_closed(&ClosedTrade {
            ticket: 1,
            symbol: "EURUSD".to_string(),
            direction: Direction::Buy,
            volume: dec!(0.1),
            entry_price: Some(dec!(1.1)),
            exit_price: Some(dec!(1.105)),
            profit: dec!(50),
            commission: dec!(-2),
            swap: dec!(0),
            closed_at,
        })
        .await
        .unwrap();

        let from = Utc.with_ymd_and_hms(2025, 1, 6, 0, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2025, 1, 7, 0, 0, 0).unwrap();
        assert_eq!(repo.realized_pnl_between(from, to).await.unwrap(), dec!(48));
        // Outside the window
        let far = Utc.with_ymd_and_hms(2025, 1, 8, 0, 0, 0).unwrap();
        assert_eq!(
            repo.realized_pnl_between(to, far).await.unwrap(),
            Decimal::ZERO
        );
    }

    #[tokio::test]
    async fn test_exit_plan_roundtrip_and_progress() {
        let db = Database::new_in_memory().await.unwrap();
        let repo = SqliteExitPlanRepository::new(db.pool.clone());
        let plan = ExitPlan {
            entry_price: dec!(2650),
            stop_loss_initial: dec!(2640),
            tp1: dec!(2665),
            break_even_trigger_r: dec!(1),
            partial_close_percent: dec!(0.5),
            trail_mode: TrailMode::Atr,
            trail_value: dec!(2),
            time_limit_seconds: Some(3600),
        };
        repo.save(77, &plan).await.unwrap();
        let (loaded, progress) = repo.load(77).await.unwrap().unwrap();
        assert_eq!(loaded, plan);
        assert_eq!(progress, ExitProgress::default());

        let progress = ExitProgress {
            break_even_done: true,
            partial_done: false,
            last_trail_stop: Some(dec!(2652)),
        };
        repo.update_progress(77, &progress).await.unwrap();
        let (_, loaded_progress) = repo.load(77).await.unwrap().unwrap();
        assert_eq!(loaded_progress, progress);

        repo.remove(77).await.unwrap();
        assert!(repo.load(77).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_news_day_upsert() {
        let db = Database::new_in_memory().await.unwrap();
        let repo = SqliteNewsDayRepository::new(db.pool.clone());
        let date = NaiveDate::from_ymd_opt(2025, 1, 6).unwrap();
        let day = DayNews {
            date,
            avoid_windows: Vec::new(),
        };
        repo.upsert(&day).await.unwrap();
        assert_eq!(repo.get(date).await.unwrap(), Some(day));
        assert!(
            repo.get(NaiveDate::from_ymd_opt(2025, 1, 7).unwrap())
                .await
                .unwrap()
                .is_none()
        );
    }
}
