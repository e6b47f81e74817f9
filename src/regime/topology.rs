// =============================================================================
// EAR Topology Balance (ETB) - structural health of the price process
// =============================================================================
//
// Approximates a tri-partite structure from price data:
//
//   tree     trend consistency     min(|mean(r) / σ(r)| * 0.3, 0.5)
//   lattice  mean-reversion        max((1 - MAD(p) / mean(p)) * 0.5, 0.2)
//   loop     cyclicality           |ρ(p, p lagged 20)| * 0.3, or 0.2 below
//                                  100 prices
//
// The three scores are normalised to sum to one and compared with the ideal
// 1/3 split: ETB = 1 - Σ|s_i - 1/3| / 2, clamped to [0, 1].
//
// ETB > 0.6 reads as a healthy balanced structure, ETB < 0.4 as degrading.

use tracing::trace;

use crate::indicators::stats::{mean, pearson, population_std, simple_returns};

const MIN_PRICES: usize = 50;
const MIN_PRICES_LOOP: usize = 100;
const LOOP_LAG: usize = 20;

const TREE_SCALE: f64 = 0.3;
const TREE_CAP: f64 = 0.5;
const LATTICE_SCALE: f64 = 0.5;
const LATTICE_FLOOR: f64 = 0.2;
const LOOP_SCALE: f64 = 0.3;
const LOOP_DEFAULT: f64 = 0.2;

/// Value reported on insufficient data or a degenerate balance.
pub const NEUTRAL_ETB: f64 = 0.5;

/// Raw (un-normalised) sub-scores.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TopologyScores {
    pub tree: f64,
    pub lattice: f64,
    pub cycle: f64,
}

impl TopologyScores {
    /// Balance against the uniform split, or `None` when the scores sum to
    /// zero or produce a non-finite value.
    fn balance(&self) -> Option<f64> {
        let total = self.tree + self.lattice + self.cycle;
        if total == 0.0 || !total.is_finite() {
            return None;
        }

        let ideal = 1.0 / 3.0;
        let deviation = [self.tree, self.lattice, self.cycle]
            .iter()
            .map(|s| (s / total - ideal).abs())
            .sum::<f64>()
            / 2.0;

        let etb = (1.0 - deviation).clamp(0.0, 1.0);
        etb.is_finite().then_some(etb)
    }
}

/// Compute the EAR Topology Balance of `prices`.
///
/// Returns `0.5` for fewer than 50 prices; otherwise a value in `[0, 1]`.
pub fn calculate_etb(prices: &[f64]) -> f64 {
    let Some(scores) = topology_scores(prices) else {
        trace!(len = prices.len(), min = MIN_PRICES, "ETB: insufficient data");
        return NEUTRAL_ETB;
    };

    let etb = scores.balance().unwrap_or(NEUTRAL_ETB);

    trace!(
        tree = format!("{:.4}", scores.tree),
        lattice = format!("{:.4}", scores.lattice),
        cycle = format!("{:.4}", scores.cycle),
        etb = format!("{:.4}", etb),
        "ETB computed"
    );

    etb
}

/// Raw tree / lattice / loop scores. `None` below 50 prices.
pub fn topology_scores(prices: &[f64]) -> Option<TopologyScores> {
    if prices.len() < MIN_PRICES {
        return None;
    }

    Some(TopologyScores {
        tree: tree_score(prices),
        lattice: lattice_score(prices),
        cycle: loop_score(prices),
    })
}

fn tree_score(prices: &[f64]) -> f64 {
    let returns = simple_returns(prices);
    let consistency = match (mean(&returns), population_std(&returns)) {
        (Some(m), Some(sd)) if sd != 0.0 => (m / sd).abs(),
        _ => 0.0,
    };
    let score = (consistency * TREE_SCALE).min(TREE_CAP);
    if score.is_finite() {
        score
    } else {
        0.0
    }
}

fn lattice_score(prices: &[f64]) -> f64 {
    let Some(mean_price) = mean(prices) else {
        return LATTICE_FLOOR;
    };
    if mean_price == 0.0 {
        return LATTICE_FLOOR;
    }

    let normalised: Vec<f64> = prices
        .iter()
        .map(|p| (p - mean_price).abs() / mean_price)
        .collect();
    let mean_reversion = 1.0 - mean(&normalised).unwrap_or(0.0);

    let score = (mean_reversion * LATTICE_SCALE).max(LATTICE_FLOOR);
    if score.is_finite() {
        score
    } else {
        LATTICE_FLOOR
    }
}

fn loop_score(prices: &[f64]) -> f64 {
    if prices.len() < MIN_PRICES_LOOP {
        return LOOP_DEFAULT;
    }

    let n = prices.len();
    pearson(&prices[..n - LOOP_LAG], &prices[LOOP_LAG..])
        .map(|rho| rho.abs() * LOOP_SCALE)
        .unwrap_or(0.0)
}
