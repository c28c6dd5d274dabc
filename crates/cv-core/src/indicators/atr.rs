/// Average True Range — Wilder smoothing.
///
/// `tr[0] = high − low` (no previous close); later bars use the full
/// true-range definition. The seed at `i = period−1` is the simple mean of
/// the first `period` true ranges, then
/// `atr ← (atr·(period−1) + tr) / period`.
pub fn atr(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<Option<f64>> {
    assert!(period >= 1, "atr period must be >= 1");
    assert!(
        high.len() == low.len() && low.len() == close.len(),
        "atr inputs must be aligned"
    );
    let n = high.len();
    let mut out = vec![None; n];
    if n < period {
        return out;
    }

    let mut sum = 0.0;
    let mut prev_atr = 0.0;
    let w = period as f64;
    for i in 0..n {
        let tr = if i == 0 {
            high[0] - low[0]
        } else {
            (high[i] - low[i])
                .max((high[i] - close[i - 1]).abs())
                .max((low[i] - close[i - 1]).abs())
        };

        if i < period {
            sum += tr;
            if i == period - 1 {
                prev_atr = sum / w;
                out[i] = Some(prev_atr);
            }
        } else {
            prev_atr = (prev_atr * (w - 1.0) + tr) / w;
            out[i] = Some(prev_atr);
        }
    }
    out
}
