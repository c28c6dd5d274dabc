pub mod binance;
pub mod error;
pub mod rate_limit;

pub use binance::{BinanceClient, ClientConfig, RateLimitConfig, RetryConfig, MAX_API_LIMIT};
pub use error::ClientError;
pub use rate_limit::{ConcurrencyGate, TokenBucket};
