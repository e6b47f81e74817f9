// =============================================================================
// Statistical Building Blocks
// =============================================================================
//
// Pure, side-effect-free helpers shared by the EAR feature estimators and the
// trade statistics. Functions that can be undefined on degenerate input return
// `Option<T>` so callers are forced to pick a fallback.

pub mod stats;
