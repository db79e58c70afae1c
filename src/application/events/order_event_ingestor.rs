use crate::application::risk::daily_stats::DailyStats;
use crate::application::risk::loss_streak::LossStreakService;
use crate::domain::events::{EngineEvent, OrderEvent, OrderEventType};
use crate::domain::market::types::OpenPosition;
use crate::domain::ports::{ClosedTrade, LiveTradeRepository, OrderEventRepository};
use crate::domain::risk::context::StrategyKind;
use crate::infrastructure::event_bus::EventBus;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use tracing::{debug, error, info};

/// Acknowledgement returned to the webhook; the bridge must never replay
/// because of us, so this is always produced.
#[derive(Debug, Clone, Serialize)]
pub struct IngestAck {
    pub acknowledged: bool,
    pub duplicate: bool,
}

/// Single entry point for broker lifecycle events.
///
/// Deduplicates on (ticket, event type, timestamp); close-family events
/// record the trade, update realized PnL and equity, advance or reset the
/// per-symbol loss streak and publish `TradeClosed` on the bus. Errors are
/// logged, never propagated.
pub struct OrderEventIngestor {
    events: Arc<dyn OrderEventRepository>,
    live_trades: Arc<dyn LiveTradeRepository>,
    stats: Arc<DailyStats>,
    loss_streak: Arc<LossStreakService>,
    bus: EventBus,
    /// Tickets the orchestrator opened, mapped to their strategy so closes
    /// can be attributed.
    strategies: Mutex<HashMap<i64, StrategyKind>>,
}

impl OrderEventIngestor {
    pub fn new(
        events: Arc<dyn OrderEventRepository>,
        live_trades: Arc<dyn LiveTradeRepository>,
        stats: Arc<DailyStats>,
        loss_streak: Arc<LossStreakService>,
        bus: EventBus,
    ) -> Self {
        Self {
            events,
            live_trades,
            stats,
            loss_streak,
            bus,
            strategies: Mutex::new(HashMap::new()),
        }
    }

    pub fn register_strategy(&self, ticket: i64, strategy: StrategyKind) {
        self.strategies
            .lock()
            .expect("strategy map lock poisoned")
            .insert(ticket, strategy);
    }

    fn strategy_for(&self, ticket: i64) -> Option<StrategyKind> {
        self.strategies
            .lock()
            .expect("strategy map lock poisoned")
            .get(&ticket)
            .copied()
    }

    pub async fn ingest(&self, event: OrderEvent) -> IngestAck {
        let duplicate = match self.events.insert_idempotent(&event).await {
            Ok(inserted) => !inserted,
            Err(e) => {
                error!(
                    "OrderEventIngestor [{}]: persist failed ({}), continuing",
                    event.ticket, e
                );
                false
            }
        };
        if duplicate {
            debug!(
                "OrderEventIngestor [{}]: duplicate {} ignored",
                event.ticket, event.event_type
            );
            return IngestAck {
                acknowledged: true,
                duplicate: true,
            };
        }

        match event.event_type {
            OrderEventType::Opened => self.on_opened(&event).await,
            t if t.is_close_family() => self.on_closed(&event).await,
            OrderEventType::Partial => self.on_partial(&event).await,
            _ => {}
        }

        IngestAck {
            acknowledged: true,
            duplicate: false,
        }
    }

    async fn on_opened(&self, event: &OrderEvent) {
        let position = OpenPosition {
            ticket: event.ticket,
            symbol: event.symbol.clone(),
            direction: event.direction,
            volume: event.volume,
            entry_price: event.entry_price.unwrap_or_default(),
            entry_time: event.entry_time.unwrap_or(event.timestamp),
            stop_loss: event.sl,
            take_profit: event.tp,
        };
        if let Err(e) = self.live_trades.record_open(&position).await {
            error!("OrderEventIngestor [{}]: open record failed: {}", event.ticket, e);
        }
        self.bus
            .publish(EngineEvent::TradeOpened {
                symbol: event.symbol.clone(),
                ticket: event.ticket,
                direction: event.direction,
            })
            .await;
    }

    async fn on_partial(&self, event: &OrderEvent) {
        // Partial profit realizes immediately; the remainder stays open
        let strategy = self.strategy_for(event.ticket);
        self.stats
            .record_trade_closed(strategy, event.profit, event.timestamp);
        debug!(
            "OrderEventIngestor [{}]: partial close, profit {}",
            event.ticket, event.profit
        );
    }

    async fn on_closed(&self, event: &OrderEvent) {
        let strategy = self.strategy_for(event.ticket);
        let net_profit = event.profit + event.commission + event.swap;

        let trade = ClosedTrade {
            ticket: event.ticket,
            symbol: event.symbol.clone(),
            direction: event.direction,
            volume: event.volume,
            entry_price: event.entry_price,
            exit_price: event.exit_price,
            profit: event.profit,
            commission: event.commission,
            swap: event.swap,
            closed_at: event.exit_time.unwrap_or(event.timestamp),
        };
        if let Err(e) = self.live_trades.record_closed(&trade).await {
            error!("OrderEventIngestor [{}]: close record failed: {}", event.ticket, e);
        }
        if let Err(e) = self.live_trades.remove_open(event.ticket).await {
            error!("OrderEventIngestor [{}]: open cleanup failed: {}", event.ticket, e);
        }

        self.stats
            .record_trade_closed(strategy, net_profit, event.timestamp);
        self.loss_streak
            .on_trade_closed(&event.symbol, net_profit, event.timestamp);

        info!(
            "OrderEventIngestor [{}]: {} {} closed, net {}",
            event.ticket, event.symbol, event.event_type, net_profit
        );
        self.bus
            .publish(EngineEvent::TradeClosed {
                symbol: event.symbol.clone(),
                strategy: strategy.map(|s| s.to_string()),
                profit: net_profit,
                ticket: event.ticket,
                closed_at: trade.closed_at,
            })
            .await;
    }
}
