// =============================================================================
// Synthetic Price History - offline stand-in for the history endpoint
// =============================================================================
//
// Daily Gaussian random walk ending at `end`:
//
//   p_i = base + Σ_{k<=i} z_k * base * 1%,   z_k ~ N(0, 1)
//
// base is 40 000 for BTC and 2 000 otherwise. Prices are floored at 1 % of
// base so the output always forms a valid `PriceSeries`.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, Utc};
use rand::distributions::Distribution;
use rand::Rng;
use statrs::distribution::Normal;

use super::PricePoint;

const BTC_BASE: f64 = 40_000.0;
const DEFAULT_BASE: f64 = 2_000.0;
const STEP_SCALE: f64 = 0.01;
const FLOOR_FRACTION: f64 = 0.01;

/// Starting level of the synthetic walk for `symbol`.
pub fn base_price(symbol: &str) -> f64 {
    if symbol.eq_ignore_ascii_case("BTC") {
        BTC_BASE
    } else {
        DEFAULT_BASE
    }
}

/// Generate `days` daily points for `symbol`, the last one stamped `end`.
pub fn random_walk<R: Rng + ?Sized>(
    symbol: &str,
    days: u32,
    end: DateTime<Utc>,
    rng: &mut R,
) -> Result<Vec<PricePoint>> {
    let normal = Normal::new(0.0, 1.0).map_err(|e| anyhow!("invalid noise distribution: {e}"))?;
    let base = base_price(symbol);
    let step = base * STEP_SCALE;
    let floor = base * FLOOR_FRACTION;

    let mut noise = 0.0_f64;
    let points = (0..days)
        .map(|i| {
            noise += normal.sample(rng) * step;
            PricePoint {
                timestamp: end - Duration::days(i64::from(days - 1 - i)),
                price: (base + noise).max(floor),
            }
        })
        .collect();

    Ok(points)
}
