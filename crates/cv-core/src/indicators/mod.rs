//! Indicator kernels over aligned OHLCV vectors.
//!
//! Every kernel takes slices of length `N` and returns length-`N` vectors of
//! `Option<f64>`; `None` marks the warm-up prefix where the indicator is not
//! yet defined. Kernels are pure and deterministic: recomputing any suffix
//! with enough leading context reproduces the stored values up to IEEE-754
//! summation jitter.

pub mod adx;
pub mod atr;
pub mod bollinger;
pub mod ema;
pub mod macd;
pub mod returns;
pub mod rsi;
pub mod sma;

pub use adx::adx;
pub use atr::atr;
pub use bollinger::{bollinger, BollingerOutput};
pub use ema::{ema, ema_alpha};
pub use macd::{macd, MacdOutput};
pub use returns::{returns_1, ReturnsOutput};
pub use rsi::rsi;
pub use sma::{sma, stddev};

use crate::candle::{Candle, IndicatorRow};

/// Bars required before the whole battery is warm; EMA200 dominates.
/// Rows inside the first `WARMUP_BARS` of a series are expected to carry
/// nulls and are exempt from null-span checks.
pub const WARMUP_BARS: usize = 200;

/// Fixed indicator battery evaluated for every stored bar.
///
/// Output rows are aligned one-to-one with the input candles.
pub fn compute_suite(candles: &[Candle]) -> Vec<IndicatorRow> {
    let n = candles.len();
    let mut close = Vec::with_capacity(n);
    let mut high = Vec::with_capacity(n);
    let mut low = Vec::with_capacity(n);
    let mut volume = Vec::with_capacity(n);
    for c in candles {
        close.push(c.close);
        high.push(c.high);
        low.push(c.low);
        volume.push(c.volume);
    }

    let ema50 = ema(&close, 50);
    let ema200 = ema(&close, 200);
    let rsi14 = rsi(&close, 14);
    let atr14 = atr(&high, &low, &close, 14);
    let adx14 = adx(&high, &low, &close, 14);
    let vol_ma20 = sma(&volume, 20);
    let macd_out = macd(&close, 12, 26, 9);
    let bb = bollinger(&close, 20, 2.0);
    let rets = returns_1(&close);

    let mut rows = Vec::with_capacity(n);
    for i in 0..n {
        rows.push(IndicatorRow {
            open_time: candles[i].open_time,
            ema50: ema50[i],
            ema200: ema200[i],
            rsi14: rsi14[i],
            atr14: atr14[i],
            adx14: adx14[i],
            vol_ma20: vol_ma20[i],
            macd: macd_out.macd[i],
            macd_signal: macd_out.signal[i],
            macd_hist: macd_out.hist[i],
            bb_sma20: bb.sma[i],
            bb_upper: bb.upper[i],
            bb_lower: bb.lower[i],
            pct_return_1: rets.pct[i],
            log_return_1: rets.log[i],
        });
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_candle(i: usize, step_ms: i64) -> Candle {
        let close = 100.0 + 0.1 * i as f64;
        Candle {
            open_time: i as i64 * step_ms,
            open: close - 0.05,
            high: close + 0.5,
            low: close - 0.5,
            close,
            volume: 1_000.0,
            close_time: (i as i64 + 1) * step_ms - 1,
            quote_asset_volume: close * 1_000.0,
            trades: 42,
            taker_buy_base_volume: 500.0,
            taker_buy_quote_volume: close * 500.0,
        }
    }

    #[test]
    fn linear_ramp_suite() {
        let step = 3_600_000;
        let candles: Vec<Candle> = (0..300).map(|i| ramp_candle(i, step)).collect();
        let rows = compute_suite(&candles);
        assert_eq!(rows.len(), 300);

        // ema50 seed equals the simple mean of the first 50 closes.
        let sma_seed: f64 = (0..50).map(|i| 100.0 + 0.1 * i as f64).sum::<f64>() / 50.0;
        let ema50_seed = rows[49].ema50.unwrap();
        assert!((ema50_seed - sma_seed).abs() < 1e-9);

        // Strictly rising closes: no losses anywhere, rsi pinned at 100.
        for row in rows.iter().skip(14) {
            assert_eq!(row.rsi14.unwrap(), 100.0);
        }

        // ema200 defines full warm-up: null before, present from index 199.
        assert!(rows[198].ema200.is_none());
        assert!(rows[199].ema200.is_some());
        assert!(!rows[199].is_all_null());
        assert!(rows[0].is_all_null());
    }

    #[test]
    fn rows_keep_the_candle_open_time() {
        let step = 60_000;
        let candles: Vec<Candle> = (0..10).map(|i| ramp_candle(i, step)).collect();
        let rows = compute_suite(&candles);
        for (c, r) in candles.iter().zip(&rows) {
            assert_eq!(c.open_time, r.open_time);
        }
    }
}
