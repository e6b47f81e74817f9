// =============================================================================
// EAR Criticality Index (ECI) - proximity to a regime transition
// =============================================================================
//
// Composite of three sub-signals, each rescaled into a comparable range before
// weighting:
//
//   ECI = 0.4 * compression + 0.3 * instability * 10 + 0.3 * divergence * 5
//
//   compression  σ(last 30) / σ(last 365)        1.0 when the long σ is zero
//   instability  σ of lag-1 autocorrelations over sliding 40-price windows
//                (needs >= 100 prices, else 0)
//   divergence   |10-bar momentum - 50-bar momentum| (needs >= 50 prices)
//
// The result is clamped to [0, 1]. ECI > 0.75 reads as "near threshold",
// ECI < 0.5 as stable. Operates on the full history, not the trailing window
// used for EPI/ETB.

use tracing::trace;

use crate::indicators::stats::{pearson, population_std, tail};

const MIN_PRICES: usize = 30;
const SHORT_VOL_WINDOW: usize = 30;
const LONG_VOL_WINDOW: usize = 365;

const MIN_PRICES_INSTABILITY: usize = 100;
/// Half-width of the sliding correlation window (full width 40).
const CORR_HALF_WINDOW: usize = 20;

const MIN_PRICES_MOMENTUM: usize = 50;
const SHORT_MOMENTUM_LAG: usize = 10;
const LONG_MOMENTUM_LAG: usize = 50;

const W_COMPRESSION: f64 = 0.4;
const W_INSTABILITY: f64 = 0.3;
const W_DIVERGENCE: f64 = 0.3;
const INSTABILITY_SCALE: f64 = 10.0;
const DIVERGENCE_SCALE: f64 = 5.0;

/// Intermediate values of one ECI evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CriticalityComponents {
    pub compression: f64,
    pub instability: f64,
    pub divergence: f64,
}

impl CriticalityComponents {
    fn combine(&self) -> f64 {
        W_COMPRESSION * self.compression
            + W_INSTABILITY * self.instability * INSTABILITY_SCALE
            + W_DIVERGENCE * self.divergence * DIVERGENCE_SCALE
    }
}

/// Compute the EAR Criticality Index over the full price history.
///
/// Returns `0.0` for fewer than 30 prices; otherwise a value in `[0, 1]`.
pub fn calculate_eci(prices: &[f64]) -> f64 {
    let Some(components) = criticality_components(prices) else {
        trace!(len = prices.len(), min = MIN_PRICES, "ECI: insufficient data");
        return 0.0;
    };

    let raw = components.combine();
    let eci = if raw.is_finite() { raw.clamp(0.0, 1.0) } else { 0.0 };

    trace!(
        compression = format!("{:.4}", components.compression),
        instability = format!("{:.4}", components.instability),
        divergence = format!("{:.4}", components.divergence),
        eci = format!("{:.4}", eci),
        "ECI computed"
    );

    eci
}

/// Break the ECI down into its three sub-signals. `None` below 30 prices.
pub fn criticality_components(prices: &[f64]) -> Option<CriticalityComponents> {
    if prices.len() < MIN_PRICES {
        return None;
    }

    Some(CriticalityComponents {
        compression: volatility_compression(prices),
        instability: correlation_instability(prices),
        divergence: momentum_divergence(prices),
    })
}

fn volatility_compression(prices: &[f64]) -> f64 {
    let short_vol = population_std(tail(prices, SHORT_VOL_WINDOW)).unwrap_or(0.0);
    let long_vol = population_std(tail(prices, LONG_VOL_WINDOW)).unwrap_or(0.0);

    if long_vol == 0.0 {
        return 1.0;
    }
    let ratio = short_vol / long_vol;
    if ratio.is_finite() {
        ratio
    } else {
        1.0
    }
}

/// Dispersion of the lag-1 self-correlation inside each 40-price window.
fn correlation_instability(prices: &[f64]) -> f64 {
    if prices.len() < MIN_PRICES_INSTABILITY {
        return 0.0;
    }

    let rolling: Vec<f64> = (CORR_HALF_WINDOW..prices.len() - CORR_HALF_WINDOW)
        .filter_map(|i| {
            let window = &prices[i - CORR_HALF_WINDOW..i + CORR_HALF_WINDOW];
            pearson(&window[..window.len() - 1], &window[1..])
        })
        .collect();

    if rolling.is_empty() {
        return 0.0;
    }
    population_std(&rolling).unwrap_or(0.0)
}

fn momentum_divergence(prices: &[f64]) -> f64 {
    let n = prices.len();
    if n < MIN_PRICES_MOMENTUM {
        return 0.0;
    }

    let last = prices[n - 1];
    let short_ref = prices[n - SHORT_MOMENTUM_LAG];
    let long_ref = prices[n - LONG_MOMENTUM_LAG];

    let short_momentum = (last - short_ref) / short_ref;
    let long_momentum = (last - long_ref) / long_ref;
    let divergence = (short_momentum - long_momentum).abs();

    if divergence.is_finite() {
        divergence
    } else {
        0.0
    }
}
