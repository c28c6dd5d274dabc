//! Ingest, verify and repair engines.
//!
//! Everything here is sequential per (symbol, interval): the only
//! concurrency axis is inside the HTTP client. Each chunk of work is one
//! storage transaction, so a crash never leaves partial writes.

pub mod ingest;
pub mod repair;
pub mod source;
pub mod verify;

use std::fmt;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use cv_client::ClientError;
use cv_core::interval::Interval;
use cv_store::StoreError;

/// Cooperative stop signal, flipped by the SIGINT handler and consulted at
/// chunk boundaries.
pub type ShutdownFlag = Arc<AtomicBool>;

/// One (symbol, interval) pair to process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesSpec {
    pub symbol: String,
    pub interval: Interval,
}

#[derive(Debug)]
pub enum EngineError {
    Http(ClientError),
    Storage(StoreError),
    /// Stopped at a chunk boundary by the shutdown flag.
    Interrupted,
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Http(e) => write!(f, "http: {e}"),
            EngineError::Storage(e) => write!(f, "storage: {e}"),
            EngineError::Interrupted => write!(f, "interrupted"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<ClientError> for EngineError {
    fn from(e: ClientError) -> Self {
        EngineError::Http(e)
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        EngineError::Storage(e)
    }
}

/// Quote assets recognised when splitting a pair symbol into legs.
const QUOTE_ASSETS: [&str; 11] = [
    "USDT", "USDC", "BUSD", "TUSD", "FDUSD", "BTC", "ETH", "BNB", "EUR", "TRY", "DAI",
];

/// Split `BTCUSDT` into `("BTC", "USDT")`. Unrecognised quotes leave the
/// whole string in the base leg.
pub fn split_symbol(symbol: &str) -> (String, String) {
    for quote in QUOTE_ASSETS {
        if let Some(base) = symbol.strip_suffix(quote) {
            if !base.is_empty() {
                return (base.to_string(), quote.to_string());
            }
        }
    }
    (symbol.to_string(), String::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_common_quotes() {
        assert_eq!(split_symbol("BTCUSDT"), ("BTC".into(), "USDT".into()));
        assert_eq!(split_symbol("ETHBTC"), ("ETH".into(), "BTC".into()));
        assert_eq!(split_symbol("SOLEUR"), ("SOL".into(), "EUR".into()));
    }

    #[test]
    fn unknown_quote_keeps_the_symbol_whole() {
        assert_eq!(split_symbol("WEIRDPAIR"), ("WEIRDPAIR".into(), "".into()));
    }

    #[test]
    fn quote_only_symbol_is_not_split_to_an_empty_base() {
        assert_eq!(split_symbol("USDT"), ("USDT".into(), "".into()));
    }
}
