// =============================================================================
// Typed error kinds shared across the fetch fabric, backfill engine and
// stream manager.
// =============================================================================

use std::collections::HashMap;

use thiserror::Error;

/// Errors an individual `Exchange` adapter can return from `fetch`.
///
/// `EmptyResult` is deliberately not a variant here: spec §4.1 treats "no
/// data for range" as a normal `Ok(vec![])`, not an error.
#[derive(Debug, Clone, Error)]
pub enum AdapterError {
    #[error("{exchange} does not support interval {interval}")]
    UnsupportedInterval { exchange: String, interval: String },

    #[error("{exchange} rate limited the request")]
    RateLimited { exchange: String },

    #[error("{exchange} transport error: {message}")]
    TransportError { exchange: String, message: String },

    #[error("{exchange} returned a malformed payload: {message}")]
    ParseError { exchange: String, message: String },
}

impl AdapterError {
    /// Whether this error is worth retrying with backoff (rate limit or
    /// transient transport failure), per spec §4.3 step 3.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AdapterError::RateLimited { .. } | AdapterError::TransportError { .. }
        )
    }

    pub fn exchange(&self) -> &str {
        match self {
            AdapterError::UnsupportedInterval { exchange, .. }
            | AdapterError::RateLimited { exchange }
            | AdapterError::TransportError { exchange, .. }
            | AdapterError::ParseError { exchange, .. } => exchange,
        }
    }
}

/// Raised by the race fetcher (C2) when every adapter failed or returned
/// empty.
#[derive(Debug, Error)]
#[error("all exchanges failed: {0:?}")]
pub struct AllExchangesFailed(pub HashMap<String, String>);

/// One `(symbol, interval)` cell that the backfill orchestrator could not
/// fill, with the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedKey {
    pub symbol: String,
    pub interval: String,
    pub reason: String,
}

/// Raised by `backfill_all`/`backfill_one` when any cell ends with zero rows
/// or an error. Strict mode per spec §4.3 step 6: this is raised only after
/// every cell has been attempted.
#[derive(Debug)]
pub struct BackfillFailed {
    pub failed: Vec<FailedKey>,
}

impl std::fmt::Display for BackfillFailed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys: Vec<String> = self
            .failed
            .iter()
            .map(|k| format!("{}/{}", k.symbol, k.interval))
            .collect();
        write!(
            f,
            "backfill failed for {} key(s): {}",
            self.failed.len(),
            keys.join(", ")
        )
    }
}

impl std::error::Error for BackfillFailed {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limited_and_transport_are_retryable() {
        assert!(AdapterError::RateLimited {
            exchange: "binance".into()
        }
        .is_retryable());
        assert!(AdapterError::TransportError {
            exchange: "binance".into(),
            message: "timeout".into()
        }
        .is_retryable());
    }

    #[test]
    fn unsupported_and_parse_are_not_retryable() {
        assert!(!AdapterError::UnsupportedInterval {
            exchange: "binance".into(),
            interval: "3d".into()
        }
        .is_retryable());
        assert!(!AdapterError::ParseError {
            exchange: "binance".into(),
            message: "bad json".into()
        }
        .is_retryable());
    }

    #[test]
    fn backfill_failed_message_lists_keys() {
        let err = BackfillFailed {
            failed: vec![FailedKey {
                symbol: "BTC/USDT".into(),
                interval: "1h".into(),
                reason: "zero rows".into(),
            }],
        };
        assert!(err.to_string().contains("BTC/USDT/1h"));
    }
}
