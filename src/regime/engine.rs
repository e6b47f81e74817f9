// =============================================================================
// EAR Engine - feature extraction -> classification -> recommendation
// =============================================================================
//
// Window conventions:
//   EPI and ETB  trailing `feature_window` prices (default 100)
//   ECI          the full history (its volatility ratio looks back 365 bars)

use serde::Serialize;
use tracing::debug;

use super::classifier::{classify, Regime};
use super::criticality::calculate_eci;
use super::hurst::calculate_hurst_exponent;
use super::recommendation::{recommend, PositionState, Recommendation};
use super::series::PriceSeries;
use super::topology::calculate_etb;

/// Default trailing window for the EPI and ETB features.
pub const DEFAULT_FEATURE_WINDOW: usize = 100;

/// The three EAR features. Always finite.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FeatureSet {
    pub epi: f64,
    pub eci: f64,
    pub etb: f64,
}

impl FeatureSet {
    pub fn regime(&self) -> Regime {
        classify(self.epi, self.eci, self.etb)
    }
}

/// Outcome of one analysis call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EarAnalysis {
    pub features: FeatureSet,
    pub regime: Regime,
    pub recommendation: Recommendation,
}

/// Stateless pipeline runner; only carries the window configuration.
#[derive(Debug, Clone, Copy)]
pub struct EarEngine {
    feature_window: usize,
}

impl EarEngine {
    pub fn new(feature_window: usize) -> Self {
        Self { feature_window }
    }

    /// Compute EPI, ECI and ETB for `series`.
    pub fn features(&self, series: &PriceSeries) -> FeatureSet {
        let window = series.trailing(self.feature_window);
        FeatureSet {
            epi: calculate_hurst_exponent(window),
            eci: calculate_eci(series.as_slice()),
            etb: calculate_etb(window),
        }
    }

    /// Run the full pipeline for `series` given the caller's position.
    pub fn analyze(&self, series: &PriceSeries, position: &PositionState) -> EarAnalysis {
        let features = self.features(series);
        let regime = features.regime();
        let recommendation = recommend(features.epi, features.eci, features.etb, regime, position);

        debug!(
            len = series.as_slice().len(),
            epi = format!("{:.4}", features.epi),
            eci = format!("{:.4}", features.eci),
            etb = format!("{:.4}", features.etb),
            regime = %regime,
            action = %recommendation.action,
            "EAR analysis complete"
        );

        EarAnalysis {
            features,
            regime,
            recommendation,
        }
    }
}

impl Default for EarEngine {
    fn default() -> Self {
        Self::new(DEFAULT_FEATURE_WINDOW)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::regime::recommendation::Action;

    fn series(values: Vec<f64>) -> PriceSeries {
        PriceSeries::new(values).unwrap()
    }

    fn wavy(len: usize) -> Vec<f64> {
        (0..len)
            .map(|i| {
                let t = i as f64;
                200.0 + 8.0 * (t / 9.0).sin() + 3.0 * (t / 4.0).cos() + 0.1 * t
            })
            .collect()
    }

    #[test]
    fn empty_series_yields_neutral_features() {
        let f = EarEngine::default().features(&series(Vec::new()));
        assert_eq!(f, FeatureSet { epi: 0.5, eci: 0.0, etb: 0.5 });
        // 0.5 < 0.55 -> ranging
        assert_eq!(f.regime(), Regime::Continuita);
    }

    #[test]
    fn epi_and_etb_use_trailing_window_only() {
        // A wild prefix outside the window must not affect EPI / ETB.
        let tail = wavy(100);
        let mut full = vec![5000.0; 50];
        full.extend(tail.iter().copied());

        let engine = EarEngine::default();
        let a = engine.features(&series(tail.clone()));
        let b = engine.features(&series(full));
        assert_eq!(a.epi.to_bits(), b.epi.to_bits());
        assert_eq!(a.etb.to_bits(), b.etb.to_bits());
        assert_ne!(a.eci.to_bits(), b.eci.to_bits());
    }

    #[test]
    fn features_are_bounded() {
        for len in [10, 30, 60, 100, 200, 365, 500] {
            let f = EarEngine::default().features(&series(wavy(len)));
            assert!((0.3..=0.9).contains(&f.epi), "len={len} {f:?}");
            assert!((0.0..=1.0).contains(&f.eci), "len={len} {f:?}");
            assert!((0.0..=1.0).contains(&f.etb), "len={len} {f:?}");
        }
    }

    #[test]
    fn flat_analysis_waits_in_ranging_regime() {
        let analysis = EarEngine::default().analyze(&series(wavy(365)), &PositionState::Flat);
        // The full-window R/S pins EPI to its floor, so the regime is ranging.
        assert_eq!(analysis.regime, Regime::Continuita);
        assert_eq!(analysis.recommendation.action, Action::Wait);
    }

    #[test]
    fn analysis_is_deterministic() {
        let s = series(wavy(300));
        let engine = EarEngine::default();
        let a = engine.analyze(&s, &PositionState::Long);
        let b = engine.analyze(&s, &PositionState::Long);
        assert_eq!(a, b);
    }
}
