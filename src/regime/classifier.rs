// =============================================================================
// Regime Classifier
// =============================================================================
//
// Maps the three EAR features onto one of eight symbolic regimes.
//
// Detection hierarchy (evaluated top-to-bottom; first match wins). The
// conditions overlap, so the order is part of the contract:
//
//   1. SPIRALE       - EPI > 0.75 AND ECI < 0.6   (strong persistent trend)
//   2. SPIRALE       - EPI > 0.65 AND ECI < 0.5   (moderate trend)
//   3. ESPANSIONE    - EPI > 0.75 AND ECI > 0.75  (trend exhaustion)
//   4. CONTINUITÀ    - EPI < 0.55                 (ranging)
//   5. EVENTO        - ECI > 0.75                 (breakout imminent)
//   6. AVANZAMENTO   - EPI > 0.6 AND ECI < 0.5    (early trend)
//   7. DISSOLUZIONE  - ETB < 0.4                  (structural breakdown)
//
// If no rule fires, the regime is TRANSIZIONE.

use serde::{Deserialize, Serialize};
use tracing::trace;

// =============================================================================
// Types
// =============================================================================

/// EAR market regime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Regime {
    /// Strong persistent trend.
    Spirale,
    /// Moderate trend; reported with the same symbol as [`Regime::Spirale`].
    SpiraleModerate,
    /// Trend exhaustion: persistence with criticality.
    Espansione,
    /// Low persistence, sideways.
    Continuita,
    /// Near a threshold with no resolved direction.
    Evento,
    /// Early trend.
    Avanzamento,
    /// Structure breaking down.
    Dissoluzione,
    /// Nothing conclusive.
    Transizione,
}

impl Regime {
    /// Every label, in rule order.
    #[cfg(test)]
    pub const ALL: [Regime; 8] = [
        Self::Spirale,
        Self::SpiraleModerate,
        Self::Espansione,
        Self::Continuita,
        Self::Evento,
        Self::Avanzamento,
        Self::Dissoluzione,
        Self::Transizione,
    ];

    /// Sigma notation reported to clients.
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Spirale | Self::SpiraleModerate => "Σ₂₃₂₊",
            Self::Espansione => "Σ₃₃₁₊",
            Self::Continuita => "Σ₁₁₁₋",
            Self::Evento => "Σ₄₁₃₊",
            Self::Avanzamento => "Σ₁₃₁₊",
            Self::Dissoluzione => "Σ₃₃₃₋",
            Self::Transizione => "Σ₁₂₃₊",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Spirale | Self::SpiraleModerate => "Spirale",
            Self::Espansione => "Espansione",
            Self::Continuita => "Continuità",
            Self::Evento => "Evento",
            Self::Avanzamento => "Avanzamento",
            Self::Dissoluzione => "Dissoluzione",
            Self::Transizione => "Transizione",
        }
    }

    /// Either Spirale variant.
    pub fn is_spirale(self) -> bool {
        matches!(self, Self::Spirale | Self::SpiraleModerate)
    }
}

impl std::fmt::Display for Regime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.symbol())
    }
}

// =============================================================================
// Rule table
// =============================================================================

struct Rule {
    regime: Regime,
    label: &'static str,
    matches: fn(f64, f64, f64) -> bool,
}

const RULES: [Rule; 7] = [
    Rule {
        regime: Regime::Spirale,
        label: "strong trend",
        matches: |epi, eci, _| epi > 0.75 && eci < 0.6,
    },
    Rule {
        regime: Regime::SpiraleModerate,
        label: "moderate trend",
        matches: |epi, eci, _| epi > 0.65 && eci < 0.5,
    },
    Rule {
        regime: Regime::Espansione,
        label: "exhaustion",
        matches: |epi, eci, _| epi > 0.75 && eci > 0.75,
    },
    Rule {
        regime: Regime::Continuita,
        label: "ranging",
        matches: |epi, _, _| epi < 0.55,
    },
    Rule {
        regime: Regime::Evento,
        label: "breakout imminent",
        matches: |_, eci, _| eci > 0.75,
    },
    Rule {
        regime: Regime::Avanzamento,
        label: "early trend",
        matches: |epi, eci, _| epi > 0.6 && eci < 0.5,
    },
    Rule {
        regime: Regime::Dissoluzione,
        label: "structure breakdown",
        matches: |_, _, etb| etb < 0.4,
    },
];

/// Classify the regime from EPI, ECI and ETB. Total over all inputs.
pub fn classify(epi: f64, eci: f64, etb: f64) -> Regime {
    match RULES.iter().find(|rule| (rule.matches)(epi, eci, etb)) {
        Some(rule) => {
            trace!(
                regime = %rule.regime,
                rule = rule.label,
                epi = format!("{:.4}", epi),
                eci = format!("{:.4}", eci),
                etb = format!("{:.4}", etb),
                "Regime rule matched"
            );
            rule.regime
        }
        None => {
            trace!(
                epi = format!("{:.4}", epi),
                eci = format!("{:.4}", eci),
                etb = format!("{:.4}", etb),
                "Regime: no rule matched, defaulting to TRANSIZIONE"
            );
            Regime::Transizione
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strong_trend_wins_over_later_rules() {
        // Also satisfies rules 2 and 6.
        assert_eq!(classify(0.8, 0.4, 0.6), Regime::Spirale);
    }

    #[test]
    fn strict_boundary_does_not_match_rule_one() {
        // epi = 0.75 is not > 0.75; eci = 0.6 is not < 0.6.
        assert_ne!(classify(0.75, 0.6, 0.6), Regime::Spirale);
        assert_ne!(classify(0.8, 0.6, 0.6), Regime::Spirale);
        // 0.75 / 0.6 falls through to the default.
        assert_eq!(classify(0.75, 0.6, 0.6), Regime::Transizione);
    }

    #[test]
    fn moderate_trend() {
        assert_eq!(classify(0.7, 0.45, 0.6), Regime::SpiraleModerate);
    }

    #[test]
    fn exhaustion() {
        assert_eq!(classify(0.8, 0.8, 0.6), Regime::Espansione);
    }

    #[test]
    fn ranging_beats_breakout() {
        // Low persistence is checked before high criticality.
        assert_eq!(classify(0.5, 0.9, 0.3), Regime::Continuita);
    }

    #[test]
    fn breakout() {
        assert_eq!(classify(0.6, 0.9, 0.6), Regime::Evento);
    }

    #[test]
    fn early_trend() {
        assert_eq!(classify(0.62, 0.45, 0.6), Regime::Avanzamento);
    }

    #[test]
    fn structure_breakdown() {
        assert_eq!(classify(0.6, 0.55, 0.3), Regime::Dissoluzione);
    }

    #[test]
    fn default_transition() {
        assert_eq!(classify(0.6, 0.55, 0.6), Regime::Transizione);
    }

    #[test]
    fn total_over_a_grid() {
        let steps: Vec<f64> = (0..=20).map(|i| i as f64 * 0.05).collect();
        for &epi in &steps {
            for &eci in &steps {
                for &etb in &steps {
                    let r = classify(epi, eci, etb);
                    assert!(Regime::ALL.contains(&r));
                    assert_eq!(r, classify(epi, eci, etb));
                }
            }
        }
    }

    #[test]
    fn spirale_variants_share_symbol() {
        assert_eq!(Regime::Spirale.symbol(), Regime::SpiraleModerate.symbol());
        assert!(Regime::SpiraleModerate.is_spirale());
        assert!(!Regime::Avanzamento.is_spirale());
    }

    #[test]
    fn regime_display() {
        assert_eq!(format!("{}", Regime::Continuita), "Σ₁₁₁₋");
        assert_eq!(Regime::Continuita.name(), "Continuità");
        assert_eq!(format!("{}", Regime::Transizione), "Σ₁₂₃₊");
    }
}
