/// One-bar simple and logarithmic returns.
#[derive(Debug, Clone)]
pub struct ReturnsOutput {
    pub pct: Vec<Option<f64>>,
    pub log: Vec<Option<f64>>,
}

/// `pct[i] = close[i]/close[i−1] − 1`, `log[i] = ln(close[i]/close[i−1])`.
/// Both are null at index 0 and wherever the previous close is zero.
pub fn returns_1(close: &[f64]) -> ReturnsOutput {
    let n = close.len();
    let mut pct = vec![None; n];
    let mut log = vec![None; n];
    for i in 1..n {
        let prev = close[i - 1];
        if prev == 0.0 {
            continue;
        }
        let ratio = close[i] / prev;
        pct[i] = Some(ratio - 1.0);
        log[i] = Some(ratio.ln());
    }
    ReturnsOutput { pct, log }
}
