use super::sma::{sma, stddev};

/// Bollinger Bands — SMA mid line with ±k·σ envelopes (population σ).
#[derive(Debug, Clone)]
pub struct BollingerOutput {
    pub sma: Vec<Option<f64>>,
    pub upper: Vec<Option<f64>>,
    pub lower: Vec<Option<f64>>,
}

pub fn bollinger(close: &[f64], period: usize, num_std: f64) -> BollingerOutput {
    let mid = sma(close, period);
    let sd = stddev(close, period, &mid);

    let mut upper = vec![None; close.len()];
    let mut lower = vec![None; close.len()];
    for i in 0..close.len() {
        if let (Some(m), Some(s)) = (mid[i], sd[i]) {
            upper[i] = Some(m + num_std * s);
            lower[i] = Some(m - num_std * s);
        }
    }

    BollingerOutput {
        sma: mid,
        upper,
        lower,
    }
}
