/// Exponential Moving Average over a full series.
///
/// Behaviour:
///   i < period-1  → None (warming up)
///   i = period-1  → seed = simple average of the first `period` values
///   i > period-1  → out[i] = value·k + prev·(1−k)   where k = 2/(period+1)
pub fn ema(values: &[f64], period: usize) -> Vec<Option<f64>> {
    ema_alpha(values, period, 2.0 / (period as f64 + 1.0))
}

/// EMA with an explicit smoothing factor instead of the span-derived one.
pub fn ema_alpha(values: &[f64], period: usize, alpha: f64) -> Vec<Option<f64>> {
    assert!(period >= 1, "ema period must be >= 1");
    let mut out = vec![None; values.len()];
    if values.len() < period {
        return out;
    }

    let mut seed_sum = 0.0;
    for v in &values[..period] {
        seed_sum += v;
    }
    let mut prev = seed_sum / period as f64;
    out[period - 1] = Some(prev);

    for i in period..values.len() {
        prev = values[i] * alpha + prev * (1.0 - alpha);
        out[i] = Some(prev);
    }
    out
}
