// =============================================================================
// Price Feed - CoinGecko with offline fallbacks
// =============================================================================
//
// The simulator must keep working without network access, so every lookup
// degrades instead of failing:
//
//   spot price     configured fallback price (100.0 for unknown symbols)
//   daily history  synthetic random walk of the requested length
//
// Non-finite or non-positive chart prices are dropped before the history is
// handed on, so one bad point never invalidates a whole series.

use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tracing::{info, warn};

use super::{synthetic, PricePoint};
use crate::coingecko::CoinGeckoClient;
use crate::runtime_config::RuntimeConfig;

/// Where a history series came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistorySource {
    CoinGecko,
    Synthetic,
}

pub struct PriceFeed {
    client: CoinGeckoClient,
    /// Symbol maps and fallback prices, frozen at construction.
    config: RuntimeConfig,
}

impl PriceFeed {
    pub fn new(config: &RuntimeConfig) -> Result<Self> {
        let client = CoinGeckoClient::new(
            config.coingecko_base_url.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )?;

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    /// Latest USD price for `symbol`, or its fallback price.
    pub async fn current_price(&self, symbol: &str) -> f64 {
        let coin_id = self.config.coin_id(symbol);
        match self.client.simple_price(&coin_id).await {
            Ok(price) => price,
            Err(e) => {
                let fallback = self.config.fallback_price(symbol);
                warn!(symbol, coin_id = %coin_id, error = %e, fallback, "spot price unavailable, using fallback");
                fallback
            }
        }
    }

    /// `days` of daily history for `symbol`, oldest first.
    pub async fn historical_prices(
        &self,
        symbol: &str,
        days: u32,
    ) -> Result<(Vec<PricePoint>, HistorySource)> {
        let coin_id = self.config.coin_id(symbol);
        match self.client.market_chart(&coin_id, days).await {
            Ok(points) => {
                let points = usable_points(symbol, points);
                if points.is_empty() {
                    warn!(symbol, coin_id = %coin_id, "no usable market chart prices, generating synthetic history");
                    self.synthetic(symbol, days)
                } else {
                    Ok((points, HistorySource::CoinGecko))
                }
            }
            Err(e) => {
                warn!(symbol, coin_id = %coin_id, error = %e, "market chart unavailable, generating synthetic history");
                self.synthetic(symbol, days)
            }
        }
    }

    fn synthetic(&self, symbol: &str, days: u32) -> Result<(Vec<PricePoint>, HistorySource)> {
        let points = synthetic::random_walk(symbol, days, Utc::now(), &mut rand::thread_rng())?;
        info!(symbol, days, "synthetic history generated");
        Ok((points, HistorySource::Synthetic))
    }
}

/// Drop gaps the analysis cannot use: non-finite or non-positive prices.
fn usable_points(symbol: &str, mut points: Vec<PricePoint>) -> Vec<PricePoint> {
    let before = points.len();
    points.retain(|p| p.price.is_finite() && p.price > 0.0);

    let dropped = before - points.len();
    if dropped > 0 {
        warn!(symbol, dropped, kept = points.len(), "discarded unusable market chart prices");
    }
    points
}
