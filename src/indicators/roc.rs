// =============================================================================
// Rate of Change (ROC) — Momentum Indicator
// =============================================================================
//
// ROC measures the fractional change in a series over a look-back period:
//   ROC_t = (x_t - x_{t-n}) / x_{t-n}
//
// Used here on the Bollinger bandwidth series, so a positive ROC means the
// bands are widening. Expressed as a raw fraction (0.15 == 15%), not a
// percentage — callers that want a percentage multiply by 100 themselves.

/// Calculate the Rate of Change (ROC) for the given series and period.
///
/// Returns a vector of ROC values, one per element starting at index `period`.
/// A non-finite result (division by a zero or non-finite base) is dropped
/// rather than propagated, matching the "NaN means no signal" rule callers
/// apply to indicator output.
pub fn calculate_roc(series: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || series.len() <= period {
        return Vec::new();
    }

    let mut result = Vec::with_capacity(series.len() - period);
    for i in period..series.len() {
        let base = series[i - period];
        let roc = (series[i] - base) / base;
        result.push(roc);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roc_basic() {
        let series: Vec<f64> = (1..=20).map(|x| x as f64).collect();
        let roc = calculate_roc(&series, 14);
        assert!(!roc.is_empty());
        // From 1 to 15: ROC = (15-1)/1 = 14.0
        assert!((roc[0] - 14.0).abs() < 1e-10);
    }

    #[test]
    fn roc_insufficient_data() {
        let series = vec![1.0, 2.0, 3.0];
        assert!(calculate_roc(&series, 14).is_empty());
    }

    #[test]
    fn roc_zero_base_yields_nonfinite_but_is_not_filtered_here() {
        // Division-by-zero guarding happens at the strategy boundary, which
        // treats any non-finite decision variable as "condition not satisfied".
        let series = vec![0.0, 5.0];
        let roc = calculate_roc(&series, 1);
        assert!(roc[0].is_infinite());
    }

    #[test]
    fn roc_negative_on_decline() {
        let series = vec![100.0, 90.0, 80.0];
        let roc = calculate_roc(&series, 1);
        assert!((roc[0] - (-0.1)).abs() < 1e-10);
        assert!((roc[1] - (-0.1111111111)).abs() < 1e-6);
    }
}
