use super::ema::ema;

/// MACD line, signal line and histogram over a close series.
#[derive(Debug, Clone)]
pub struct MacdOutput {
    pub macd: Vec<Option<f64>>,
    pub signal: Vec<Option<f64>>,
    pub hist: Vec<Option<f64>>,
}

/// MACD — `line = EMA(fast) − EMA(slow)` where both exist.
///
/// The signal line is an EMA over the MACD line with nulls substituted by
/// zero, so it starts counting from index 0 rather than from the first real
/// MACD value. This biases the first few signal values toward zero; it is
/// kept for parity with the data this store has always produced.
pub fn macd(close: &[f64], fast: usize, slow: usize, signal_period: usize) -> MacdOutput {
    let ema_fast = ema(close, fast);
    let ema_slow = ema(close, slow);

    let line: Vec<Option<f64>> = ema_fast
        .iter()
        .zip(&ema_slow)
        .map(|(f, s)| match (f, s) {
            (Some(f), Some(s)) => Some(f - s),
            _ => None,
        })
        .collect();

    let zero_filled: Vec<f64> = line.iter().map(|v| v.unwrap_or(0.0)).collect();
    let signal = ema(&zero_filled, signal_period);

    let hist: Vec<Option<f64>> = line
        .iter()
        .zip(&signal)
        .map(|(m, s)| match (m, s) {
            (Some(m), Some(s)) => Some(m - s),
            _ => None,
        })
        .collect();

    MacdOutput {
        macd: line,
        signal,
        hist,
    }
}
