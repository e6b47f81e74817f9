// =============================================================================
// Price Series - validated, chronological price observations
// =============================================================================

use serde::Serialize;
use thiserror::Error;

/// Reasons a raw price vector is rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PriceSeriesError {
    #[error("price at index {index} is not finite")]
    NonFinite { index: usize },

    #[error("price at index {index} is not positive ({value})")]
    NonPositive { index: usize, value: f64 },
}

/// Ordered (oldest first) sequence of strictly positive, finite prices.
///
/// There is no minimum length: each feature calculator guards its own minimum
/// and returns a neutral value below it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceSeries {
    prices: Vec<f64>,
}

impl PriceSeries {
    /// Validate and wrap `prices`.
    pub fn new(prices: Vec<f64>) -> Result<Self, PriceSeriesError> {
        for (index, &value) in prices.iter().enumerate() {
            if !value.is_finite() {
                return Err(PriceSeriesError::NonFinite { index });
            }
            if value <= 0.0 {
                return Err(PriceSeriesError::NonPositive { index, value });
            }
        }
        Ok(Self { prices })
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.prices
    }

    /// The most recent `n` observations (the whole series when shorter).
    pub fn trailing(&self, n: usize) -> &[f64] {
        crate::indicators::stats::tail(&self.prices, n)
    }
}

impl TryFrom<Vec<f64>> for PriceSeries {
    type Error = PriceSeriesError;

    fn try_from(prices: Vec<f64>) -> Result<Self, Self::Error> {
        Self::new(prices)
    }
}
