// =============================================================================
// Descriptive Statistics
// =============================================================================
//
// Small numeric building blocks shared by the EAR feature calculators:
// population moments, Pearson correlation and simple returns.
//
// Every helper that can be undefined (empty input, zero variance, non-finite
// intermediate) returns `Option<f64>` so that callers pick their own neutral
// substitute instead of letting NaN leak downstream.

/// Arithmetic mean. `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let m = values.iter().sum::<f64>() / values.len() as f64;
    m.is_finite().then_some(m)
}

/// Population standard deviation (σ, divisor `n`). `None` for an empty slice.
pub fn population_std(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let variance = values.iter().map(|x| (x - m).powi(2)).sum::<f64>() / values.len() as f64;
    let sd = variance.sqrt();
    sd.is_finite().then_some(sd)
}

/// Pearson correlation coefficient of two equally long series.
///
/// Returns `None` when the lengths differ, fewer than two pairs are available,
/// or either side has zero variance (the coefficient is undefined there).
pub fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }

    let mx = mean(x)?;
    let my = mean(y)?;

    let mut cov = 0.0_f64;
    let mut var_x = 0.0_f64;
    let mut var_y = 0.0_f64;
    for (a, b) in x.iter().zip(y.iter()) {
        let dx = a - mx;
        let dy = b - my;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    if var_x == 0.0 || var_y == 0.0 {
        return None;
    }

    let r = (cov / (var_x.sqrt() * var_y.sqrt())).clamp(-1.0, 1.0);
    r.is_finite().then_some(r)
}

/// Lag-1 autocorrelation: Pearson correlation of `values[..n-1]` against
/// `values[1..]`.
pub fn lag1_autocorrelation(values: &[f64]) -> Option<f64> {
    if values.len() < 3 {
        return None;
    }
    pearson(&values[..values.len() - 1], &values[1..])
}

/// Simple returns `(p[i+1] - p[i]) / p[i]`. Empty for fewer than two prices.
pub fn simple_returns(prices: &[f64]) -> Vec<f64> {
    prices.windows(2).map(|w| (w[1] - w[0]) / w[0]).collect()
}

/// The trailing `n` elements of `values` (all of them when shorter).
pub fn tail(values: &[f64], n: usize) -> &[f64] {
    &values[values.len().saturating_sub(n)..]
}
