// =============================================================================
// Recommendation Engine - regime + features + position -> action
// =============================================================================
//
// Decision table keyed on the caller's position (first match wins per branch):
//
//   Flat:
//     Spirale | Avanzamento, ECI < 0.6, ETB > 0.5  -> ENTER_LONG       HIGH
//     Evento, ECI > 0.75                            -> PREPARE_BREAKOUT MEDIUM
//     otherwise                                     -> WAIT             HIGH
//   Long:
//     EPI > 0.85 or ECI > 0.8                       -> EXIT             HIGH
//     ETB < 0.4                                     -> REDUCE_50%       MEDIUM
//     otherwise                                     -> HOLD             HIGH
//   Unrecognised tag                                -> HOLD             MEDIUM

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::classifier::Regime;

// =============================================================================
// Types
// =============================================================================

/// The caller's current exposure to the analysed asset. Only long positions
/// are modelled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionState {
    #[default]
    Flat,
    Long,
    /// Any other tag. Kept so the caller's intent is visible in logs.
    Unrecognized(String),
}

impl PositionState {
    /// Parse an optional position tag: absent -> flat, `"LONG"` -> long.
    pub fn from_tag(tag: Option<&str>) -> Self {
        match tag {
            None => Self::Flat,
            Some("LONG") => Self::Long,
            Some(other) => Self::Unrecognized(other.to_string()),
        }
    }
}

impl std::fmt::Display for PositionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Flat => write!(f, "FLAT"),
            Self::Long => write!(f, "LONG"),
            Self::Unrecognized(tag) => write!(f, "{tag}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    #[serde(rename = "ENTER_LONG")]
    EnterLong,
    #[serde(rename = "PREPARE_BREAKOUT")]
    PrepareBreakout,
    #[serde(rename = "WAIT")]
    Wait,
    #[serde(rename = "EXIT")]
    Exit,
    #[serde(rename = "REDUCE_50%")]
    ReduceHalf,
    #[serde(rename = "HOLD")]
    Hold,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EnterLong => write!(f, "ENTER_LONG"),
            Self::PrepareBreakout => write!(f, "PREPARE_BREAKOUT"),
            Self::Wait => write!(f, "WAIT"),
            Self::Exit => write!(f, "EXIT"),
            Self::ReduceHalf => write!(f, "REDUCE_50%"),
            Self::Hold => write!(f, "HOLD"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

/// Suggested action with its confidence and human-readable reasons.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub action: Action,
    pub confidence: Confidence,
    pub rationale: Vec<String>,
}

impl Recommendation {
    fn new(action: Action, confidence: Confidence, rationale: Vec<String>) -> Self {
        Self {
            action,
            confidence,
            rationale,
        }
    }
}

// =============================================================================
// Decision table
// =============================================================================

/// Produce a recommendation for the given features, regime and position.
pub fn recommend(
    epi: f64,
    eci: f64,
    etb: f64,
    regime: Regime,
    position: &PositionState,
) -> Recommendation {
    let rec = match position {
        PositionState::Flat => recommend_flat(epi, eci, etb, regime),
        PositionState::Long => recommend_long(epi, eci, etb),
        PositionState::Unrecognized(_) => Recommendation::new(
            Action::Hold,
            Confidence::Medium,
            vec!["Default".to_string()],
        ),
    };

    debug!(
        position = %position,
        regime = %regime,
        action = %rec.action,
        confidence = ?rec.confidence,
        "Recommendation produced"
    );

    rec
}

fn recommend_flat(epi: f64, eci: f64, etb: f64, regime: Regime) -> Recommendation {
    let trend_regime = regime.is_spirale() || regime == Regime::Avanzamento;

    if trend_regime && eci < 0.6 && etb > 0.5 {
        Recommendation::new(
            Action::EnterLong,
            Confidence::High,
            vec![
                format!("EPI={epi:.2} confirms persistence"),
                format!("ECI={eci:.2} safe from threshold"),
                format!("ETB={etb:.2} structure healthy"),
            ],
        )
    } else if regime == Regime::Evento && eci > 0.75 {
        Recommendation::new(
            Action::PrepareBreakout,
            Confidence::Medium,
            vec![
                format!("ECI={eci:.2} near threshold"),
                "Breakout imminent (direction uncertain)".to_string(),
            ],
        )
    } else {
        Recommendation::new(
            Action::Wait,
            Confidence::High,
            vec![format!("Regime {regime} not favorable for entry")],
        )
    }
}

fn recommend_long(epi: f64, eci: f64, etb: f64) -> Recommendation {
    let exhausted = epi > 0.85;
    let critical = eci > 0.8;

    if exhausted || critical {
        // Both slots are always present; the untriggered one is empty.
        let epi_reason = if exhausted {
            format!("EPI={epi:.2} exhaustion zone")
        } else {
            String::new()
        };
        let eci_reason = if critical {
            format!("ECI={eci:.2} threshold approaching")
        } else {
            String::new()
        };
        Recommendation::new(Action::Exit, Confidence::High, vec![epi_reason, eci_reason])
    } else if etb < 0.4 {
        Recommendation::new(
            Action::ReduceHalf,
            Confidence::Medium,
            vec![format!("ETB={etb:.2} structure degrading")],
        )
    } else {
        Recommendation::new(
            Action::Hold,
            Confidence::High,
            vec![
                format!("EPI={epi:.2} trend intact"),
                format!("ECI={eci:.2} stable"),
                format!("ETB={etb:.2} healthy"),
            ],
        )
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_spirale_enters_long() {
        let rec = recommend(0.8, 0.4, 0.6, Regime::Spirale, &PositionState::Flat);
        assert_eq!(rec.action, Action::EnterLong);
        assert_eq!(rec.confidence, Confidence::High);
        assert_eq!(
            rec.rationale,
            vec![
                "EPI=0.80 confirms persistence",
                "ECI=0.40 safe from threshold",
                "ETB=0.60 structure healthy",
            ]
        );
    }

    #[test]
    fn flat_moderate_spirale_and_avanzamento_enter_long() {
        for regime in [Regime::SpiraleModerate, Regime::Avanzamento] {
            let rec = recommend(0.7, 0.45, 0.55, regime, &PositionState::Flat);
            assert_eq!(rec.action, Action::EnterLong, "{regime:?}");
        }
    }

    #[test]
    fn flat_trend_with_weak_structure_waits() {
        let rec = recommend(0.8, 0.4, 0.5, Regime::Spirale, &PositionState::Flat);
        assert_eq!(rec.action, Action::Wait);
        assert_eq!(rec.confidence, Confidence::High);
        assert_eq!(rec.rationale, vec!["Regime Σ₂₃₂₊ not favorable for entry"]);
    }

    #[test]
    fn flat_evento_prepares_breakout() {
        let rec = recommend(0.6, 0.9, 0.6, Regime::Evento, &PositionState::Flat);
        assert_eq!(rec.action, Action::PrepareBreakout);
        assert_eq!(rec.confidence, Confidence::Medium);
        assert_eq!(rec.rationale[0], "ECI=0.90 near threshold");
        assert_eq!(rec.rationale.len(), 2);
    }

    #[test]
    fn flat_evento_at_threshold_waits() {
        let rec = recommend(0.6, 0.75, 0.6, Regime::Evento, &PositionState::Flat);
        assert_eq!(rec.action, Action::Wait);
    }

    #[test]
    fn long_exits_on_exhaustion() {
        let rec = recommend(0.9, 0.5, 0.6, Regime::Spirale, &PositionState::Long);
        assert_eq!(rec.action, Action::Exit);
        assert_eq!(rec.confidence, Confidence::High);
        assert_eq!(rec.rationale, vec!["EPI=0.90 exhaustion zone".to_string(), String::new()]);
    }

    #[test]
    fn long_exits_on_criticality_with_empty_first_slot() {
        let rec = recommend(0.6, 0.85, 0.6, Regime::Evento, &PositionState::Long);
        assert_eq!(rec.action, Action::Exit);
        assert_eq!(rec.rationale, vec![String::new(), "ECI=0.85 threshold approaching".to_string()]);
    }

    #[test]
    fn long_exit_lists_both_triggers() {
        let rec = recommend(0.88, 0.95, 0.6, Regime::Espansione, &PositionState::Long);
        assert!(rec.rationale.iter().all(|r| !r.is_empty()));
    }

    #[test]
    fn long_reduces_on_weak_structure() {
        let rec = recommend(0.5, 0.3, 0.3, Regime::Dissoluzione, &PositionState::Long);
        assert_eq!(rec.action, Action::ReduceHalf);
        assert_eq!(rec.confidence, Confidence::Medium);
        assert_eq!(rec.rationale, vec!["ETB=0.30 structure degrading"]);
    }

    #[test]
    fn long_holds_otherwise() {
        let rec = recommend(0.7, 0.5, 0.6, Regime::SpiraleModerate, &PositionState::Long);
        assert_eq!(rec.action, Action::Hold);
        assert_eq!(rec.confidence, Confidence::High);
        assert_eq!(rec.rationale.len(), 3);
    }

    #[test]
    fn unrecognized_tag_falls_back_to_default_hold() {
        let position = PositionState::from_tag(Some("SHORT"));
        assert_eq!(position, PositionState::Unrecognized("SHORT".into()));
        let rec = recommend(0.9, 0.9, 0.1, Regime::Espansione, &position);
        assert_eq!(rec.action, Action::Hold);
        assert_eq!(rec.confidence, Confidence::Medium);
        assert_eq!(rec.rationale, vec!["Default"]);
    }

    #[test]
    fn position_tags() {
        assert_eq!(PositionState::from_tag(None), PositionState::Flat);
        assert_eq!(PositionState::from_tag(Some("LONG")), PositionState::Long);
    }

    #[test]
    fn wire_format() {
        let rec = recommend(0.5, 0.3, 0.3, Regime::Dissoluzione, &PositionState::Long);
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["action"], "REDUCE_50%");
        assert_eq!(json["confidence"], "MEDIUM");
        assert_eq!(Action::ReduceHalf.to_string(), "REDUCE_50%");
    }
}
