//! Binance spot klines client.
//!
//! One endpoint, `GET /api/v3/klines`, wrapped in the pacing primitives from
//! [`crate::rate_limit`] and a bounded retry loop. Acquire order per request
//! is gate then bucket; the gate slot is released whatever the outcome,
//! spent tokens are not.

use rand::Rng;
use serde::Deserialize;
use tokio::time::{sleep, Duration};

use cv_core::candle::Candle;
use cv_core::interval::Interval;

use crate::error::ClientError;
use crate::rate_limit::{ConcurrencyGate, TokenBucket};

pub const DEFAULT_BASE_URL: &str = "https://api.binance.com";

/// Hard cap imposed by the exchange on one klines request.
pub const MAX_API_LIMIT: u32 = 1_000;

/// Retry/backoff knobs. Defaults apply when the config omits the block.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryConfig {
    pub base_ms: u64,
    pub max_ms: u64,
    pub max_retries: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_ms: 500,
            max_ms: 60_000,
            max_retries: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitConfig {
    pub requests_per_minute: u32,
    pub max_concurrent: usize,
    #[serde(default)]
    pub retry: RetryConfig,
}

/// Everything the client needs; assembled from the application config.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub rate_limit: RateLimitConfig,
    pub timeout_ms: u64,
    pub base_url: String,
}

impl ClientConfig {
    pub fn new(rate_limit: RateLimitConfig, timeout_ms: u64) -> Self {
        Self {
            rate_limit,
            timeout_ms,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

/// Raw kline tuple as it appears on the wire. Numeric strings are parsed to
/// f64 at this boundary; the trailing field is unused filler.
type RawKline = (
    i64,               // openTime
    String,            // open
    String,            // high
    String,            // low
    String,            // close
    String,            // volume
    i64,               // closeTime
    String,            // quoteAssetVolume
    i64,               // numberOfTrades
    String,            // takerBuyBaseVolume
    String,            // takerBuyQuoteVolume
    serde_json::Value, // ignored
);

pub struct BinanceClient {
    http: reqwest::Client,
    bucket: TokenBucket,
    gate: ConcurrencyGate,
    retry: RetryConfig,
    base_url: String,
}

enum AttemptError {
    /// 418/429; the mandated pause has already been slept.
    RateLimited(String),
    /// Timeout, abort, connection failure, 5xx. Backoff still owed.
    Transient(String),
    Fatal(ClientError),
}

impl BinanceClient {
    pub fn new(cfg: ClientConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()
            .map_err(|e| ClientError::Transient(format!("failed to build http client: {e}")))?;
        Ok(Self {
            http,
            bucket: TokenBucket::new(cfg.rate_limit.requests_per_minute),
            gate: ConcurrencyGate::new(cfg.rate_limit.max_concurrent),
            retry: cfg.rate_limit.retry,
            base_url: cfg.base_url,
        })
    }

    /// Fetch up to `limit` closed klines, ordered by open time ascending.
    ///
    /// Transient failures are retried up to `maxRetries` with jittered
    /// exponential backoff, then escalated to a permanent error.
    pub async fn get_klines(
        &self,
        symbol: &str,
        interval: Interval,
        start_ms: Option<i64>,
        end_ms: Option<i64>,
        limit: u32,
    ) -> Result<Vec<Candle>, ClientError> {
        let limit = limit.min(MAX_API_LIMIT);
        let mut last_transient = String::new();

        for attempt in 0..=self.retry.max_retries {
            match self
                .attempt_klines(symbol, interval, start_ms, end_ms, limit, attempt)
                .await
            {
                Ok(klines) => return Ok(klines),
                Err(AttemptError::Fatal(e)) => return Err(e),
                Err(AttemptError::RateLimited(msg)) => {
                    // Pause already served inside the attempt.
                    tracing::warn!(symbol, %interval, attempt, "rate limited: {msg}");
                    last_transient = msg;
                }
                Err(AttemptError::Transient(msg)) => {
                    tracing::warn!(symbol, %interval, attempt, "transient failure: {msg}");
                    last_transient = msg;
                    if attempt < self.retry.max_retries {
                        sleep(self.backoff_delay(attempt)).await;
                    }
                }
            }
        }

        Err(ClientError::Permanent {
            status: 0,
            body: format!(
                "giving up after {} retries: {last_transient}",
                self.retry.max_retries
            ),
        })
    }

    async fn attempt_klines(
        &self,
        symbol: &str,
        interval: Interval,
        start_ms: Option<i64>,
        end_ms: Option<i64>,
        limit: u32,
        attempt: u32,
    ) -> Result<Vec<Candle>, AttemptError> {
        // Gate first, then a token; the permit drops at the end of the
        // attempt regardless of outcome.
        let _permit = self.gate.acquire().await;
        self.bucket.take().await;

        let mut query: Vec<(&str, String)> = vec![
            ("symbol", symbol.to_string()),
            ("interval", interval.code().to_string()),
            ("limit", limit.to_string()),
        ];
        if let Some(start) = start_ms {
            query.push(("startTime", start.to_string()));
        }
        if let Some(end) = end_ms {
            query.push(("endTime", end.to_string()));
        }

        let url = format!("{}/api/v3/klines", self.base_url);
        let resp = match self.http.get(&url).query(&query).send().await {
            Ok(resp) => resp,
            Err(e) if e.is_timeout() => {
                return Err(AttemptError::Transient(format!("request timed out: {e}")))
            }
            Err(e) => return Err(AttemptError::Transient(format!("request failed: {e}"))),
        };

        let status = resp.status();
        if status.as_u16() == 418 || status.as_u16() == 429 {
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            let pause = match retry_after {
                Some(secs) => Duration::from_secs(secs),
                None => self.backoff_delay(attempt),
            };
            sleep(pause).await;
            return Err(AttemptError::RateLimited(format!(
                "status {status}, paused {pause:?}"
            )));
        }

        if status.is_server_error() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AttemptError::Transient(format!("status {status}: {body}")));
        }

        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AttemptError::Fatal(ClientError::Permanent {
                status: status.as_u16(),
                body,
            }));
        }

        let raw: Vec<serde_json::Value> = resp
            .json()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AttemptError::Transient(format!("response body timed out: {e}"))
                } else {
                    AttemptError::Fatal(ClientError::Decode(e.to_string()))
                }
            })?;

        parse_klines(raw).map_err(AttemptError::Fatal)
    }

    /// `clamp(base · 2^attempt · (0.75 + U(0, 0.5)), base, max)`.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.retry.base_ms as f64;
        let jitter = rand::thread_rng().gen_range(0.75..1.25);
        let raw = base * 2f64.powi(attempt as i32) * jitter;
        let clamped = raw.clamp(self.retry.base_ms as f64, self.retry.max_ms as f64);
        Duration::from_millis(clamped as u64)
    }
}

/// Decode an array of positional kline tuples. Any malformed element
/// rejects the whole response.
pub fn parse_klines(raw: Vec<serde_json::Value>) -> Result<Vec<Candle>, ClientError> {
    let mut out = Vec::with_capacity(raw.len());
    for (idx, value) in raw.into_iter().enumerate() {
        let tuple: RawKline = serde_json::from_value(value)
            .map_err(|e| ClientError::Decode(format!("kline[{idx}]: {e}")))?;
        out.push(Candle {
            open_time: tuple.0,
            open: parse_price(&tuple.1, idx, "open")?,
            high: parse_price(&tuple.2, idx, "high")?,
            low: parse_price(&tuple.3, idx, "low")?,
            close: parse_price(&tuple.4, idx, "close")?,
            volume: parse_price(&tuple.5, idx, "volume")?,
            close_time: tuple.6,
            quote_asset_volume: parse_price(&tuple.7, idx, "quoteAssetVolume")?,
            trades: tuple.8,
            taker_buy_base_volume: parse_price(&tuple.9, idx, "takerBuyBaseVolume")?,
            taker_buy_quote_volume: parse_price(&tuple.10, idx, "takerBuyQuoteVolume")?,
        });
    }
    Ok(out)
}

fn parse_price(s: &str, idx: usize, field: &str) -> Result<f64, ClientError> {
    s.trim()
        .parse::<f64>()
        .map_err(|e| ClientError::Decode(format!("kline[{idx}].{field} {s:?}: {e}")))
}
