// =============================================================================
// Coinbase adapter — GET /products/{product_id}/candles (public)
// =============================================================================

use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::{debug, instrument, warn};

use crate::candle::{sort_and_dedup, Candle, Interval, Symbol};
use crate::error::AdapterError;

use super::{Exchange, FetchWindow};

const NAME: &str = "coinbase";
const BASE_URL: &str = "https://api.exchange.coinbase.com";
const MAX_LIMIT: u32 = 300;

pub struct CoinbaseAdapter {
    client: reqwest::Client,
}

impl CoinbaseAdapter {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn product_id(symbol: &Symbol) -> String {
        symbol.as_str().replace('/', "-")
    }

    /// Coinbase candles take a plain granularity in seconds, restricted to a
    /// fixed set of buckets.
    fn granularity_secs(interval: Interval) -> Option<i64> {
        Some(match interval {
            Interval::M1 => 60,
            Interval::M5 => 300,
            Interval::M15 => 900,
            Interval::H1 => 3_600,
            Interval::H6 => 21_600,
            Interval::D1 => 86_400,
            _ => return None,
        })
    }
}

#[async_trait]
impl Exchange for CoinbaseAdapter {
    fn name(&self) -> &'static str {
        NAME
    }

    #[instrument(skip(self), name = "coinbase::fetch")]
    async fn fetch(
        &self,
        symbol: &Symbol,
        interval: Interval,
        limit: u32,
        window: FetchWindow,
    ) -> Result<Vec<Candle>, AdapterError> {
        let granularity =
            Self::granularity_secs(interval).ok_or_else(|| AdapterError::UnsupportedInterval {
                exchange: NAME.to_string(),
                interval: interval.to_string(),
            })?;

        let _ = limit.min(MAX_LIMIT);
        let mut url = format!(
            "{BASE_URL}/products/{}/candles?granularity={}",
            Self::product_id(symbol),
            granularity
        );
        if let Some(start) = window.start {
            let start_iso = chrono::DateTime::from_timestamp(start / 1000, 0)
                .map(|dt| dt.to_rfc3339())
                .unwrap_or_default();
            url.push_str(&format!("&start={start_iso}"));
        }
        if let Some(end) = window.end {
            let end_iso = chrono::DateTime::from_timestamp(end / 1000, 0)
                .map(|dt| dt.to_rfc3339())
                .unwrap_or_default();
            url.push_str(&format!("&end={end_iso}"));
        }

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AdapterError::TransportError {
                exchange: NAME.to_string(),
                message: e.to_string(),
            })?;

        let status = resp.status();
        if status.as_u16() == 429 {
            return Err(AdapterError::RateLimited {
                exchange: NAME.to_string(),
            });
        }
        if status.as_u16() == 400 {
            return Err(AdapterError::UnsupportedInterval {
                exchange: NAME.to_string(),
                interval: interval.to_string(),
            });
        }
        if status.is_server_error() {
            return Err(AdapterError::TransportError {
                exchange: NAME.to_string(),
                message: format!("HTTP {status}"),
            });
        }

        let body: serde_json::Value = resp.json().await.map_err(|e| AdapterError::ParseError {
            exchange: NAME.to_string(),
            message: e.to_string(),
        })?;

        let raw = body.as_array().ok_or_else(|| AdapterError::ParseError {
            exchange: NAME.to_string(),
            message: "candles response is not an array".to_string(),
        })?;

        let mut candles = Vec::with_capacity(raw.len());
        for entry in raw {
            let arr = entry.as_array().ok_or_else(|| AdapterError::ParseError {
                exchange: NAME.to_string(),
                message: "candle entry is not an array".to_string(),
            })?;
            if arr.len() < 6 {
                warn!(exchange = NAME, len = arr.len(), "skipping malformed candle entry");
                continue;
            }

            // [time, low, high, open, close, volume], time in seconds.
            let ts_sec = arr[0].as_i64().unwrap_or(0);
            let low = Decimal::try_from(arr[1].as_f64().unwrap_or(0.0)).unwrap_or_default();
            let high = Decimal::try_from(arr[2].as_f64().unwrap_or(0.0)).unwrap_or_default();
            let open = Decimal::try_from(arr[3].as_f64().unwrap_or(0.0)).unwrap_or_default();
            let close = Decimal::try_from(arr[4].as_f64().unwrap_or(0.0)).unwrap_or_default();
            let volume = Decimal::try_from(arr[5].as_f64().unwrap_or(0.0)).unwrap_or_default();

            match Candle::new(ts_sec * 1000, open, high, low, close, volume, None, None) {
                Ok(c) => candles.push(c),
                Err(e) => warn!(exchange = NAME, %e, "dropping invalid candle"),
            }
        }

        // Coinbase returns candles newest-first; sort_and_dedup fixes ordering.
        debug!(exchange = NAME, symbol = %symbol, count = candles.len(), "candles fetched");
        Ok(sort_and_dedup(candles))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_id_uses_dash_separator() {
        assert_eq!(CoinbaseAdapter::product_id(&Symbol::new("BTC/USD")), "BTC-USD");
    }

    #[test]
    fn granularity_rejects_unsupported_interval() {
        assert_eq!(CoinbaseAdapter::granularity_secs(Interval::M3), None);
    }
}
