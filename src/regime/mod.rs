// =============================================================================
// EAR Regime Module
// =============================================================================
//
// Regime classification from three heuristic price features:
// - EPI (persistence, Hurst exponent estimate)
// - ECI (criticality, proximity to a regime transition)
// - ETB (topology balance, structural health)
//
// Every calculator is a pure function of its input slice and degrades to a
// documented neutral value instead of failing.

pub mod classifier;
pub mod criticality;
pub mod engine;
pub mod hurst;
pub mod recommendation;
pub mod series;
pub mod topology;

pub use classifier::Regime;
pub use engine::{EarEngine, FeatureSet};
pub use recommendation::PositionState;
pub use series::PriceSeries;
