//! # engine::indicators
//!
//! Minimal indicator set computed locally from daily closes, so one bars
//! request per asset is enough for scoring.

/// Simple moving average of the last `period` values.
/// `None` if there are fewer than `period` values.
pub fn sma(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    let window = &values[values.len() - period..];
    Some(window.iter().sum::<f64>() / period as f64)
}

/// Wilder RSI over `period`.  Needs `period + 1` closes.
pub fn rsi(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period + 1 {
        return None;
    }

    let mut changes = closes.windows(2).map(|w| w[1] - w[0]);

    // Seed with a plain average of the first `period` changes
    let (mut avg_gain, mut avg_loss) = changes
        .by_ref()
        .take(period)
        .fold((0.0, 0.0), |(g, l), c| if c > 0.0 { (g + c, l) } else { (g, l - c) });
    avg_gain /= period as f64;
    avg_loss /= period as f64;

    let p = period as f64;
    for c in changes {
        let (gain, loss) = if c > 0.0 { (c, 0.0) } else { (0.0, -c) };
        avg_gain = (avg_gain * (p - 1.0) + gain) / p;
        avg_loss = (avg_loss * (p - 1.0) + loss) / p;
    }

    if avg_loss == 0.0 {
        return Some(if avg_gain == 0.0 { 50.0 } else { 100.0 });
    }
    let rs = avg_gain / avg_loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}

/// Latest volume relative to its average; `1.0` when the average is unknown.
pub fn volume_ratio(volume: f64, avg_volume: f64) -> f64 {
    if avg_volume > 0.0 && volume.is_finite() && volume >= 0.0 {
        volume / avg_volume
    } else {
        1.0
    }
}
