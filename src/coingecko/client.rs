// =============================================================================
// CoinGecko REST API Client - public spot and daily history endpoints
// =============================================================================
//
// Unauthenticated. Every method surfaces transport, status and decoding
// failures as `anyhow::Error`; choosing a fallback is the caller's job.
// =============================================================================

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::market_data::PricePoint;

/// Body of `GET /coins/{id}/market_chart`: `[timestamp_ms, price]` pairs.
#[derive(Debug, Deserialize)]
struct MarketChart {
    prices: Vec<(f64, f64)>,
}

/// CoinGecko REST API client.
#[derive(Clone)]
pub struct CoinGeckoClient {
    base_url: String,
    client: reqwest::Client,
}

impl CoinGeckoClient {
    /// Create a client for `base_url` with a per-request `timeout`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build reqwest client")?;

        debug!(base_url = %base_url, "CoinGeckoClient initialised");

        Ok(Self { base_url, client })
    }

    /// GET /simple/price - latest USD price for `coin_id`.
    #[instrument(skip(self), name = "coingecko::simple_price")]
    pub async fn simple_price(&self, coin_id: &str) -> Result<f64> {
        let url = format!("{}/simple/price", self.base_url);

        let resp = self
            .client
            .get(&url)
            .query(&[("ids", coin_id), ("vs_currencies", "usd")])
            .send()
            .await
            .context("GET /simple/price request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("CoinGecko GET /simple/price returned {}: {}", status, body);
        }

        let body: HashMap<String, HashMap<String, f64>> = resp
            .json()
            .await
            .context("failed to parse simple price response")?;

        let price = body
            .get(coin_id)
            .and_then(|quotes| quotes.get("usd"))
            .copied()
            .with_context(|| format!("no USD quote for '{coin_id}' in simple price response"))?;

        debug!(coin_id, price, "spot price retrieved");
        Ok(price)
    }

    /// GET /coins/{id}/market_chart - daily USD prices over the last `days`.
    #[instrument(skip(self), name = "coingecko::market_chart")]
    pub async fn market_chart(&self, coin_id: &str, days: u32) -> Result<Vec<PricePoint>> {
        let url = format!("{}/coins/{}/market_chart", self.base_url, coin_id);
        let days = days.to_string();

        let resp = self
            .client
            .get(&url)
            .query(&[("vs_currency", "usd"), ("days", days.as_str())])
            .send()
            .await
            .context("GET /coins/{id}/market_chart request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!(
                "CoinGecko GET /coins/{}/market_chart returned {}: {}",
                coin_id,
                status,
                body
            );
        }

        let chart: MarketChart = resp
            .json()
            .await
            .context("failed to parse market chart response")?;

        let points = parse_market_chart(chart)?;
        debug!(coin_id, points = points.len(), "market chart retrieved");
        Ok(points)
    }
}

fn parse_market_chart(chart: MarketChart) -> Result<Vec<PricePoint>> {
    chart
        .prices
        .into_iter()
        .map(|(ts_ms, price)| {
            let timestamp = DateTime::<Utc>::from_timestamp_millis(ts_ms as i64)
                .with_context(|| format!("timestamp {ts_ms} out of range"))?;
            Ok(PricePoint { timestamp, price })
        })
        .collect()
}
