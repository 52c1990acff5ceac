// =============================================================================
// Kraken adapter — GET /0/public/OHLC (public)
// =============================================================================

use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use crate::candle::{sort_and_dedup, Candle, Interval, Symbol};
use crate::error::AdapterError;

use super::{parse_decimal, Exchange, FetchWindow};

const NAME: &str = "kraken";
const BASE_URL: &str = "https://api.kraken.com";

pub struct KrakenAdapter {
    client: reqwest::Client,
}

impl KrakenAdapter {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn pair(symbol: &Symbol) -> String {
        symbol.as_str().replace('/', "")
    }

    /// Kraken encodes intervals as minute counts from a fixed set.
    fn interval_minutes(interval: Interval) -> Option<i64> {
        Some(match interval {
            Interval::M1 => 1,
            Interval::M5 => 5,
            Interval::M15 => 15,
            Interval::M30 => 30,
            Interval::H1 => 60,
            Interval::H4 => 240,
            Interval::D1 => 1_440,
            Interval::W1 => 10_080,
            _ => return None,
        })
    }
}

#[async_trait]
impl Exchange for KrakenAdapter {
    fn name(&self) -> &'static str {
        NAME
    }

    #[instrument(skip(self), name = "kraken::fetch")]
    async fn fetch(
        &self,
        symbol: &Symbol,
        interval: Interval,
        limit: u32,
        window: FetchWindow,
    ) -> Result<Vec<Candle>, AdapterError> {
        let minutes =
            Self::interval_minutes(interval).ok_or_else(|| AdapterError::UnsupportedInterval {
                exchange: NAME.to_string(),
                interval: interval.to_string(),
            })?;

        let _ = limit;
        let mut url = format!(
            "{BASE_URL}/0/public/OHLC?pair={}&interval={}",
            Self::pair(symbol),
            minutes
        );
        if let Some(start) = window.start {
            url.push_str(&format!("&since={}", start / 1000));
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

        if let Some(errors) = body["error"].as_array() {
            if !errors.is_empty() {
                let msg = errors
                    .iter()
                    .filter_map(|v| v.as_str())
                    .collect::<Vec<_>>()
                    .join("; ");
                return Err(AdapterError::ParseError {
                    exchange: NAME.to_string(),
                    message: msg,
                });
            }
        }

        let result = body["result"]
            .as_object()
            .ok_or_else(|| AdapterError::ParseError {
                exchange: NAME.to_string(),
                message: "OHLC response missing 'result' object".to_string(),
            })?;

        // `result` keys the pair name and also a "last" cursor; pick the
        // first non-"last" entry.
        let raw = result
            .iter()
            .find(|(k, _)| k.as_str() != "last")
            .map(|(_, v)| v)
            .and_then(|v| v.as_array())
            .ok_or_else(|| AdapterError::ParseError {
                exchange: NAME.to_string(),
                message: "OHLC response missing pair array".to_string(),
            })?;

        let mut candles = Vec::with_capacity(raw.len());
        for entry in raw {
            let arr = entry.as_array().ok_or_else(|| AdapterError::ParseError {
                exchange: NAME.to_string(),
                message: "OHLC entry is not an array".to_string(),
            })?;
            if arr.len() < 7 {
                warn!(exchange = NAME, len = arr.len(), "skipping malformed OHLC entry");
                continue;
            }

            // [time, open, high, low, close, vwap, volume, count], time in seconds.
            let ts_sec = arr[0].as_i64().unwrap_or(0);
            let open = parse_decimal(NAME, &arr[1])?;
            let high = parse_decimal(NAME, &arr[2])?;
            let low = parse_decimal(NAME, &arr[3])?;
            let close = parse_decimal(NAME, &arr[4])?;
            let volume = parse_decimal(NAME, &arr[6])?;
            let trades_count = arr.get(7).and_then(|v| v.as_u64());

            match Candle::new(
                ts_sec * 1000,
                open,
                high,
                low,
                close,
                volume,
                None,
                trades_count,
            ) {
                Ok(c) => candles.push(c),
                Err(e) => warn!(exchange = NAME, %e, "dropping invalid candle"),
            }
        }

        debug!(exchange = NAME, symbol = %symbol, count = candles.len(), "OHLC fetched");
        Ok(sort_and_dedup(candles))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_minutes_maps_known_buckets() {
        assert_eq!(KrakenAdapter::interval_minutes(Interval::H4), Some(240));
        assert_eq!(KrakenAdapter::interval_minutes(Interval::D1), Some(1_440));
    }

    #[test]
    fn interval_minutes_rejects_unsupported() {
        assert_eq!(KrakenAdapter::interval_minutes(Interval::H8), None);
    }
}
