//! Candle (kline) and indicator-row types shared across the pipeline.

use serde::{Deserialize, Serialize};

/// One closed OHLCV bar as returned by the exchange.
///
/// `open_time` is the millisecond epoch of the bar's left edge and is always
/// a multiple of the series interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub close_time: i64,
    pub quote_asset_volume: f64,
    pub trades: i64,
    pub taker_buy_base_volume: f64,
    pub taker_buy_quote_volume: f64,
}

/// Indicator companion row for one bar. All fields are null until the
/// corresponding kernel is warm.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct IndicatorRow {
    pub open_time: i64,
    pub ema50: Option<f64>,
    pub ema200: Option<f64>,
    pub rsi14: Option<f64>,
    pub atr14: Option<f64>,
    pub adx14: Option<f64>,
    pub vol_ma20: Option<f64>,
    pub macd: Option<f64>,
    pub macd_signal: Option<f64>,
    pub macd_hist: Option<f64>,
    pub bb_sma20: Option<f64>,
    pub bb_upper: Option<f64>,
    pub bb_lower: Option<f64>,
    pub pct_return_1: Option<f64>,
    pub log_return_1: Option<f64>,
}

impl IndicatorRow {
    /// True when every indicator field is null (pre-warm-up rows look like
    /// this, and so do defective rows past warm-up).
    pub fn is_all_null(&self) -> bool {
        self.ema50.is_none()
            && self.ema200.is_none()
            && self.rsi14.is_none()
            && self.atr14.is_none()
            && self.adx14.is_none()
            && self.vol_ma20.is_none()
            && self.macd.is_none()
            && self.macd_signal.is_none()
            && self.macd_hist.is_none()
            && self.bb_sma20.is_none()
            && self.bb_upper.is_none()
            && self.bb_lower.is_none()
            && self.pct_return_1.is_none()
            && self.log_return_1.is_none()
    }
}
