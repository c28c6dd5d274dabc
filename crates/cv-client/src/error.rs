use std::fmt;

/// Errors surfaced by the klines client.
///
/// Transient errors (rate limits, timeouts, 5xx, connection failures) are
/// retried internally; what escapes `get_klines` is either a permanent
/// refusal from the exchange or a transient failure that exhausted its
/// retry budget.
#[derive(Debug)]
pub enum ClientError {
    /// Retryable failure: 418/429, network timeout or abort, 5xx.
    Transient(String),
    /// Non-retryable HTTP refusal, carrying the response body.
    Permanent { status: u16, body: String },
    /// Response did not decode as an array of kline tuples.
    Decode(String),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Transient(msg) => write!(f, "transient http error: {msg}"),
            ClientError::Permanent { status, body } => {
                write!(f, "permanent http error ({status}): {body}")
            }
            ClientError::Decode(msg) => write!(f, "kline decode error: {msg}"),
        }
    }
}

impl std::error::Error for ClientError {}
