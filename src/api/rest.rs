// =============================================================================
// REST API Endpoints - Axum 0.7
// =============================================================================
//
// All endpoints live under `/api/`. There is no authentication: the simulator
// only ever touches the paper ledger.
//
// CORS is configured permissively so any dashboard origin can call it.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Json, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info, warn};

use crate::app_state::AppState;
use crate::ledger::{RegimeSnapshot, TradeStatistics, CASH_ASSET};
use crate::market_data::{closes, PricePoint};
use crate::regime::{PositionState, PriceSeries};
use crate::types::TradeSide;

type ApiError = (StatusCode, Json<Value>);

fn error_response(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(json!({ "error": message.into() })))
}

// =============================================================================
// Router construction
// =============================================================================

/// Build the full REST API router with CORS middleware and shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(health))
        .route("/api/portfolio", get(portfolio))
        .route("/api/market/:symbol", get(market))
        .route("/api/trade", post(trade))
        .route("/api/trades/history", get(trade_history))
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// Health
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    state_version: u64,
    uptime_secs: u64,
    server_time: i64,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        state_version: state.current_state_version(),
        uptime_secs: state.uptime_secs(),
        server_time: chrono::Utc::now().timestamp_millis(),
    })
}

// =============================================================================
// Portfolio
// =============================================================================

#[derive(Serialize)]
struct PortfolioEntry {
    asset: String,
    amount: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    avg_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    current_price: Option<f64>,
    value: f64,
    pnl: f64,
}

async fn portfolio(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let holdings = state.ledger.holdings();
    let mut entries = Vec::with_capacity(holdings.len());

    for holding in holdings {
        if holding.asset == CASH_ASSET {
            entries.push(PortfolioEntry {
                asset: holding.asset,
                amount: holding.amount,
                avg_price: None,
                current_price: None,
                value: holding.amount,
                pnl: 0.0,
            });
            continue;
        }

        let current = state.price_feed.current_price(&holding.asset).await;
        let pnl = if holding.avg_price > 0.0 {
            (current - holding.avg_price) / holding.avg_price * 100.0
        } else {
            0.0
        };
        entries.push(PortfolioEntry {
            asset: holding.asset,
            amount: holding.amount,
            avg_price: Some(holding.avg_price),
            current_price: Some(current),
            value: holding.amount * current,
            pnl,
        });
    }

    let total_value: f64 = entries.iter().map(|e| e.value).sum();
    Json(json!({
        "portfolio": entries,
        "total_value": total_value,
    }))
}

// =============================================================================
// Market analysis
// =============================================================================

/// Daily history for `symbol` plus the validated close series.
async fn load_history(
    state: &AppState,
    symbol: &str,
) -> Result<(Vec<PricePoint>, PriceSeries), ApiError> {
    let days = state.runtime_config.read().history_days;

    let (points, source) = state
        .price_feed
        .historical_prices(symbol, days)
        .await
        .map_err(|e| error_response(StatusCode::BAD_GATEWAY, e.to_string()))?;
    debug!(symbol, points = points.len(), source = ?source, "history loaded");

    let series = PriceSeries::new(closes(&points))
        .map_err(|e| error_response(StatusCode::BAD_GATEWAY, e.to_string()))?;
    Ok((points, series))
}

fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}

#[derive(Debug, Default, Deserialize)]
struct MarketQuery {
    /// Position tag overriding the ledger, e.g. `?position=LONG`.
    position: Option<String>,
}

async fn market(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
    Query(query): Query<MarketQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let symbol = symbol.trim().to_uppercase();
    let tail_len = state.runtime_config.read().price_history_tail;

    let current_price = state.price_feed.current_price(&symbol).await;
    let (points, series) = load_history(&state, &symbol).await?;

    let position = match query.position.as_deref() {
        Some(tag) => PositionState::from_tag(Some(tag)),
        None => state.ledger.position_for(&symbol),
    };
    let analysis = state.engine.analyze(&series, &position);
    let features = analysis.features;

    info!(
        symbol = %symbol,
        epi = format!("{:.4}", features.epi),
        eci = format!("{:.4}", features.eci),
        etb = format!("{:.4}", features.etb),
        regime = %analysis.regime,
        action = %analysis.recommendation.action,
        "market analyzed"
    );

    let tail = &points[points.len().saturating_sub(tail_len)..];
    Ok(Json(json!({
        "symbol": symbol,
        "current_price": current_price,
        "epi": round3(features.epi),
        "eci": round3(features.eci),
        "etb": round3(features.etb),
        "regime": analysis.regime.symbol(),
        "regime_name": analysis.regime.name(),
        "recommendation": analysis.recommendation,
        "price_history": tail,
    })))
}

// =============================================================================
// Paper trading
// =============================================================================

#[derive(Debug, Deserialize)]
struct TradeRequest {
    asset: String,
    #[serde(rename = "type")]
    side: TradeSide,
    amount: f64,
    price: f64,
}

#[derive(Serialize)]
struct TradeResponse {
    success: bool,
    message: String,
}

async fn trade(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<TradeRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload.map_err(|rejection| {
        warn!(error = %rejection.body_text(), "malformed trade request");
        error_response(StatusCode::BAD_REQUEST, rejection.body_text())
    })?;

    let asset = req.asset.trim().to_uppercase();
    let result = match req.side {
        TradeSide::Buy => state.ledger.buy(&asset, req.amount, req.price),
        TradeSide::Sell => {
            let (_, series) = load_history(&state, &asset).await?;
            let features = state.engine.features(&series);
            let snapshot = RegimeSnapshot {
                regime: features.regime(),
                features,
            };
            state
                .ledger
                .sell(&asset, req.amount, req.price, snapshot)
                .map(|_| ())
        }
    };

    result.map_err(|e| error_response(StatusCode::BAD_REQUEST, e.to_string()))?;
    state.increment_version();
    state.persist_ledger();

    Ok(Json(TradeResponse {
        success: true,
        message: format!("{} executed", req.side),
    }))
}

async fn trade_history(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let limit = state.runtime_config.read().trade_history_limit;
    let trades = state.ledger.recent_trades(limit);
    let statistics = TradeStatistics::from_trades(&trades);

    Json(json!({
        "trades": trades,
        "statistics": statistics,
    }))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request};
    use tower::ServiceExt;

    use crate::market_data::mock::spawn_coingecko;
    use crate::runtime_config::RuntimeConfig;

    fn offline_state() -> Arc<AppState> {
        let config = RuntimeConfig {
            coingecko_base_url: "http://127.0.0.1:9".to_string(),
            request_timeout_secs: 1,
            history_days: 150,
            ledger_path: None,
            ..RuntimeConfig::default()
        };
        Arc::new(AppState::new(config).unwrap())
    }

    async fn mock_state(prices: Vec<f64>) -> Arc<AppState> {
        let config = RuntimeConfig {
            coingecko_base_url: spawn_coingecko(prices).await,
            request_timeout_secs: 2,
            ledger_path: None,
            ..RuntimeConfig::default()
        };
        Arc::new(AppState::new(config).unwrap())
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let resp = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn post_trade(app: Router, body: Value) -> (StatusCode, Value) {
        let req = Request::builder()
            .method("POST")
            .uri("/api/trade")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn round3_rounds_to_three_decimals() {
        assert_eq!(round3(0.123_456), 0.123);
        assert_eq!(round3(0.5), 0.5);
        assert_eq!(round3(0.9996), 1.0);
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let app = router(offline_state());
        let (status, body) = get_json(app, "/api/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["state_version"], 0);
    }

    #[tokio::test]
    async fn fresh_portfolio_is_all_cash() {
        let app = router(offline_state());
        let (status, body) = get_json(app, "/api/portfolio").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total_value"], 50_000.0);
        let entries = body["portfolio"].as_array().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["asset"], "USD");
        assert_eq!(entries[0]["pnl"], 0.0);
        assert!(entries[0].get("avg_price").is_none());
    }

    #[tokio::test]
    async fn market_analysis_offline() {
        let app = router(offline_state());
        let (status, body) = get_json(app, "/api/market/btc").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["symbol"], "BTC");
        assert_eq!(body["current_price"], 42_150.0);
        assert_eq!(body["price_history"].as_array().unwrap().len(), 30);

        for key in ["epi", "eci", "etb"] {
            let v = body[key].as_f64().unwrap();
            assert!((0.0..=1.0).contains(&v), "{key} = {v}");
            assert_eq!(v, round3(v));
        }
        // A random walk of 100+ points always lands on the fitted-slope floor.
        assert_eq!(body["epi"], 0.3);

        let regime = body["regime"].as_str().unwrap();
        assert!(regime.starts_with('Σ'));
        assert!(body["regime_name"].is_string());
        assert!(body["recommendation"]["action"].is_string());
        assert!(body["recommendation"]["rationale"].is_array());
    }

    #[tokio::test]
    async fn market_position_override() {
        let app = router(offline_state());
        let (status, body) = get_json(app, "/api/market/SOL?position=SHORT").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["recommendation"]["action"], "HOLD");
        assert_eq!(body["recommendation"]["confidence"], "MEDIUM");
        assert_eq!(body["recommendation"]["rationale"][0], "Default");
    }

    #[tokio::test]
    async fn buy_then_sell_round_trip() {
        let state = offline_state();

        let (status, body) = post_trade(
            router(state.clone()),
            json!({ "asset": "eth", "type": "BUY", "amount": 2.0, "price": 2_000.0 }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["message"], "BUY executed");

        let (_, portfolio) = get_json(router(state.clone()), "/api/portfolio").await;
        let eth = portfolio["portfolio"]
            .as_array()
            .unwrap()
            .iter()
            .find(|e| e["asset"] == "ETH")
            .cloned()
            .unwrap();
        assert_eq!(eth["avg_price"], 2_000.0);
        assert_eq!(eth["current_price"], 2_240.0);
        assert!((eth["pnl"].as_f64().unwrap() - 12.0).abs() < 1e-9);

        let (status, body) = post_trade(
            router(state.clone()),
            json!({ "asset": "ETH", "type": "SELL", "amount": 1.0, "price": 2_200.0 }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "SELL executed");
        assert_eq!(state.current_state_version(), 2);

        let (_, history) = get_json(router(state), "/api/trades/history").await;
        let trades = history["trades"].as_array().unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0]["asset"], "ETH");
        assert_eq!(trades[0]["type"], "LONG");
        assert!((trades[0]["pnl_percent"].as_f64().unwrap() - 10.0).abs() < 1e-9);
        assert!(trades[0]["regime"].as_str().unwrap().starts_with('Σ'));
        assert_eq!(history["statistics"]["total_trades"], 1);
        assert_eq!(history["statistics"]["win_rate"], 100.0);
    }

    #[tokio::test]
    async fn zero_price_in_history_does_not_block_analysis_or_sale() {
        let mut prices: Vec<f64> = (0..120).map(|i| 2_000.0 + (i % 7) as f64).collect();
        prices[50] = 0.0;
        let state = mock_state(prices).await;
        state.ledger.buy("ETH", 1.0, 2_000.0).unwrap();

        let (status, body) = get_json(router(state.clone()), "/api/market/ETH").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["price_history"].as_array().unwrap().len(), 30);

        let (status, body) = post_trade(
            router(state.clone()),
            json!({ "asset": "ETH", "type": "SELL", "amount": 1.0, "price": 2_100.0 }),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(state.ledger.position_for("ETH"), PositionState::Flat);
        assert_eq!(state.ledger.recent_trades(1).len(), 1);
    }

    #[tokio::test]
    async fn executed_trade_is_saved() {
        let path = std::env::temp_dir().join(format!("ear_ledger_{}.json", uuid::Uuid::new_v4()));
        let config = RuntimeConfig {
            coingecko_base_url: "http://127.0.0.1:9".to_string(),
            request_timeout_secs: 1,
            ledger_path: Some(path.to_string_lossy().into_owned()),
            ..RuntimeConfig::default()
        };
        let state = Arc::new(AppState::new(config).unwrap());

        let (status, _) = post_trade(
            router(state),
            json!({ "asset": "BTC", "type": "BUY", "amount": 0.5, "price": 40_000.0 }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let saved = crate::ledger::PaperLedger::load(&path).unwrap();
        assert_eq!(saved.position_for("BTC"), PositionState::Long);
        assert_eq!(saved.cash(), 30_000.0);

        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn selling_without_holding_is_rejected() {
        let state = offline_state();
        let (status, body) = post_trade(
            router(state.clone()),
            json!({ "asset": "BTC", "type": "SELL", "amount": 1.0, "price": 40_000.0 }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Insufficient BTC balance");
        assert_eq!(state.current_state_version(), 0);
    }

    #[tokio::test]
    async fn overspending_is_rejected() {
        let (status, body) = post_trade(
            router(offline_state()),
            json!({ "asset": "BTC", "type": "BUY", "amount": 10.0, "price": 40_000.0 }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Insufficient USD balance");
    }

    #[tokio::test]
    async fn malformed_trade_is_bad_request() {
        let (status, body) = post_trade(
            router(offline_state()),
            json!({ "asset": "BTC", "type": "HOLD", "amount": 1.0, "price": 1.0 }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());

        let (status, _) = post_trade(
            router(offline_state()),
            json!({ "asset": "BTC", "type": "BUY", "amount": -1.0, "price": 1.0 }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn empty_history() {
        let (status, body) = get_json(router(offline_state()), "/api/trades/history").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["trades"].as_array().unwrap().is_empty());
        assert_eq!(body["statistics"]["sharpe_ratio"], 0.0);
    }
}
