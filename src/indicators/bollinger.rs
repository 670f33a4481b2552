// =============================================================================
// Bollinger Bands
// =============================================================================
//
// Bollinger Bands consist of a middle band (SMA), an upper band (SMA + k*σ),
// and a lower band (SMA - k*σ). `bandwidth` is the raw upper-minus-lower
// distance (a volatility proxy fed into the bandwidth-ROC signal); `width` is
// the same distance normalised by the middle band, expressed as a percentage.

/// Result of a Bollinger Band calculation.
#[derive(Debug, Clone)]
pub struct BollingerResult {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
    pub bandwidth: f64,
    pub width: f64,
}

/// Calculate Bollinger Bands for the given closing prices.
///
/// Returns `Some(BollingerResult)` containing:
/// - `upper`     = SMA + `num_std` * σ
/// - `middle`    = SMA
/// - `lower`     = SMA - `num_std` * σ
/// - `bandwidth` = upper - lower
/// - `width`     = bandwidth / middle * 100  (normalised Bollinger Band Width)
///
/// Returns `None` when:
/// - Fewer than `period` data points.
/// - Middle band is zero (degenerate input).
pub fn calculate_bollinger(closes: &[f64], period: usize, num_std: f64) -> Option<BollingerResult> {
    if period == 0 || closes.len() < period {
        return None;
    }

    let window = &closes[closes.len() - period..];
    let sum: f64 = window.iter().sum();
    let middle = sum / period as f64;

    if middle == 0.0 {
        return None;
    }

    let variance = window.iter().map(|x| (x - middle).powi(2)).sum::<f64>() / period as f64;
    let std_dev = variance.sqrt();

    let upper = middle + num_std * std_dev;
    let lower = middle - num_std * std_dev;
    let bandwidth = upper - lower;
    let width = bandwidth / middle * 100.0;

    if width.is_finite() {
        Some(BollingerResult {
            upper,
            middle,
            lower,
            bandwidth,
            width,
        })
    } else {
        None
    }
}

/// Compute the trailing series of `bandwidth` values, one per closing price
/// starting at index `period - 1`, by sliding `calculate_bollinger` over
/// `closes`. Used as the input series for the bandwidth-ROC signal.
///
/// Returns an empty vector when `closes.len() < period`.
pub fn calculate_bandwidth_series(closes: &[f64], period: usize, num_std: f64) -> Vec<f64> {
    if period == 0 || closes.len() < period {
        return Vec::new();
    }

    (period..=closes.len())
        .filter_map(|end| calculate_bollinger(&closes[..end], period, num_std).map(|bb| bb.bandwidth))
        .collect()
}
