//! Core status surface: health, exposure, admin decision log, daily
//! metrics, the order-events webhook and kill-switch control.

use crate::application::events::order_event_ingestor::OrderEventIngestor;
use crate::application::risk::exposure_tracker::ExposureTracker;
use crate::application::risk::kill_switch::KillSwitchService;
use crate::domain::decision::DecisionAction;
use crate::domain::events::{EngineEvent, OrderEvent};
use crate::domain::ports::{DecisionLogRepository, DecisionQuery, KillSwitchEventRepository};
use crate::domain::risk::context::StrategyKind;
use crate::domain::risk::kill_switch::KillSwitchEvent;
use crate::infrastructure::event_bus::EventBus;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

pub struct ApiState {
    pub exposure: Arc<ExposureTracker>,
    pub decisions: Arc<dyn DecisionLogRepository>,
    pub kill_switch: Arc<KillSwitchService>,
    pub kill_switch_events: Arc<dyn KillSwitchEventRepository>,
    pub ingestor: Arc<OrderEventIngestor>,
    pub bus: EventBus,
}

pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status/exposure", get(exposure))
        .route("/admin/decisions", get(decisions))
        .route("/admin/metrics/daily", get(daily_metrics))
        .route("/order-events", post(order_events))
        .route("/kill-switch", get(kill_switch))
        .route("/kill-switch/reset", post(kill_switch_reset))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn exposure(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    match state.exposure.current().await {
        Some(snapshot) => Json(serde_json::json!({
            "symbols": snapshot.symbols,
            "global": {
                "totalOpenTrades": snapshot.total_open_trades,
                "totalEstimatedRiskAmount": snapshot.total_estimated_risk_amount,
                "lastUpdated": snapshot.last_updated,
            }
        })),
        None => Json(serde_json::json!({
            "symbols": {},
            "global": {
                "totalOpenTrades": 0,
                "totalEstimatedRiskAmount": "0",
                "lastUpdated": null,
            }
        })),
    }
}

#[derive(Debug, Deserialize)]
struct DecisionParams {
    symbol: Option<String>,
    strategy: Option<String>,
    decision: Option<String>,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
    limit: Option<i64>,
    offset: Option<i64>,
}

async fn decisions(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<DecisionParams>,
) -> impl IntoResponse {
    let strategy = match params.strategy.as_deref().map(StrategyKind::from_str) {
        Some(Ok(strategy)) => Some(strategy),
        Some(Err(e)) => {
            return (StatusCode::BAD_REQUEST, Json(serde_json::json!({ "error": e.to_string() })))
                .into_response();
        }
        None => None,
    };
    let decision = match params.decision.as_deref() {
        Some("TRADE") | Some("trade") => Some(DecisionAction::Trade),
        Some("SKIP") | Some("skip") => Some(DecisionAction::Skip),
        Some(other) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "error": format!("invalid decision: {}", other) })),
            )
                .into_response();
        }
        None => None,
    };

    let query = DecisionQuery {
        symbol: params.symbol,
        strategy,
        decision,
        from: params.from,
        to: params.to,
        limit: params.limit.unwrap_or(100),
        offset: params.offset.unwrap_or(0),
    };
    match state.decisions.query(&query).await {
        Ok(rows) => Json(serde_json::json!({ "decisions": rows })).into_response(),
        Err(e) => {
            error!("API: decision query failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "query failed" })),
            )
                .into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
struct MetricsParams {
    date: NaiveDate,
}

async fn daily_metrics(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<MetricsParams>,
) -> impl IntoResponse {
    match state.decisions.daily_metrics(params.date).await {
        Ok(metrics) => Json(serde_json::json!(metrics)).into_response(),
        Err(e) => {
            error!("API: daily metrics failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "metrics failed" })),
            )
                .into_response()
        }
    }
}

/// Lifecycle webhook. Always answers 200: the bridge must never replay an
/// event because the core hiccuped.
async fn order_events(
    State(state): State<Arc<ApiState>>,
    Json(event): Json<OrderEvent>,
) -> impl IntoResponse {
    let ack = state.ingestor.ingest(event).await;
    Json(serde_json::json!(ack))
}

async fn kill_switch(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    Json(serde_json::json!(state.kill_switch.current()))
}

#[derive(Debug, Deserialize)]
struct ResetBody {
    #[serde(default)]
    reason: String,
}

async fn kill_switch_reset(
    State(state): State<Arc<ApiState>>,
    Json(body): Json<ResetBody>,
) -> impl IntoResponse {
    let reason = if body.reason.is_empty() {
        "operator reset".to_string()
    } else {
        body.reason
    };
    match state.kill_switch.operator_reset(&reason) {
        Some(transition) => {
            info!("API: kill switch reset ({})", reason);
            let event = KillSwitchEvent {
                timestamp: Utc::now(),
                scope: transition.state.scope.to_string(),
                active: transition.state.active,
                reasons: vec![format!("operator_reset: {}", reason)],
            };
            if let Err(e) = state.kill_switch_events.insert(&event).await {
                error!("API: kill switch event persist failed: {}", e);
            }
            state
                .bus
                .publish(EngineEvent::KillSwitchChanged {
                    active: false,
                    reasons: event.reasons.clone(),
                })
                .await;
            Json(serde_json::json!({ "reset": true }))
        }
        None => Json(serde_json::json!({ "reset": false, "note": "kill switch not armed" })),
    }
}

/// Serves the API until shutdown.
pub async fn serve(
    state: Arc<ApiState>,
    bind: String,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!("API: listening on {}", bind);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            loop {
                if shutdown.changed().await.is_err() || *shutdown.borrow() {
                    return;
                }
            }
        })
        .await?;
    Ok(())
}
