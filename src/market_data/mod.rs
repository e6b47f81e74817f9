// =============================================================================
// Market Data - daily price history feeding the EAR engine
// =============================================================================

pub mod feed;
pub mod synthetic;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use feed::PriceFeed;

/// One daily USD price observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
}

/// Prices of `points`, oldest first.
pub fn closes(points: &[PricePoint]) -> Vec<f64> {
    points.iter().map(|p| p.price).collect()
}

/// Local stand-in for the CoinGecko history endpoint.
#[cfg(test)]
pub(crate) mod mock {
    use axum::{routing::get, Json, Router};
    use serde_json::{json, Value};

    /// Serve `prices` as a daily market chart for any coin id. Returns the base
    /// URL. Every other path answers 404.
    pub async fn spawn_coingecko(prices: Vec<f64>) -> String {
        const DAY_MS: i64 = 86_400_000;
        let start_ms = 1_704_067_200_000_i64;

        let pairs: Vec<Value> = prices
            .iter()
            .enumerate()
            .map(|(i, price)| json!([start_ms + i as i64 * DAY_MS, price]))
            .collect();
        let body = json!({ "prices": pairs, "market_caps": [], "total_volumes": [] });

        let app = Router::new().route(
            "/coins/:id/market_chart",
            get(move || {
                let body = body.clone();
                async move { Json(body) }
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }
}
