//! Abstraction over the klines endpoint so the engines can run against the
//! real exchange client or a simulated one in tests.

use std::future::Future;

use cv_client::{BinanceClient, ClientError};
use cv_core::candle::Candle;
use cv_core::interval::Interval;

/// Ordered klines over `[start, end]`, at most `limit` records counted from
/// `start`. Implementations must only return closed bars.
pub trait KlineSource {
    fn get_klines(
        &self,
        symbol: &str,
        interval: Interval,
        start_ms: Option<i64>,
        end_ms: Option<i64>,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<Candle>, ClientError>> + Send;
}

impl KlineSource for BinanceClient {
    async fn get_klines(
        &self,
        symbol: &str,
        interval: Interval,
        start_ms: Option<i64>,
        end_ms: Option<i64>,
        limit: u32,
    ) -> Result<Vec<Candle>, ClientError> {
        BinanceClient::get_klines(self, symbol, interval, start_ms, end_ms, limit).await
    }
}
