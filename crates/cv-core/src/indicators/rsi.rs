/// Relative Strength Index — Wilder smoothing of average gain/loss.
///
/// Differences start at index 1; the first `period` of them are averaged
/// arithmetically, so the first RSI value appears at `i = period`. After
/// that the averages advance by Wilder smoothing:
/// `avg ← (avg·(period−1) + x) / period`.
///
/// A window with zero average loss is treated as `rs = +∞`, i.e. RSI 100.
pub fn rsi(close: &[f64], period: usize) -> Vec<Option<f64>> {
    assert!(period >= 1, "rsi period must be >= 1");
    let mut out = vec![None; close.len()];
    if close.len() <= period {
        return out;
    }

    let mut gain_sum = 0.0;
    let mut loss_sum = 0.0;
    for i in 1..=period {
        let change = close[i] - close[i - 1];
        if change > 0.0 {
            gain_sum += change;
        } else {
            loss_sum += -change;
        }
    }
    let mut avg_gain = gain_sum / period as f64;
    let mut avg_loss = loss_sum / period as f64;
    out[period] = Some(rsi_value(avg_gain, avg_loss));

    let w = period as f64;
    for i in period + 1..close.len() {
        let change = close[i] - close[i - 1];
        let gain = if change > 0.0 { change } else { 0.0 };
        let loss = if change < 0.0 { -change } else { 0.0 };
        avg_gain = (avg_gain * (w - 1.0) + gain) / w;
        avg_loss = (avg_loss * (w - 1.0) + loss) / w;
        out[i] = Some(rsi_value(avg_gain, avg_loss));
    }
    out
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        100.0
    } else {
        let rs = avg_gain / avg_loss;
        100.0 - 100.0 / (1.0 + rs)
    }
}
