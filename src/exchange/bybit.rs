// =============================================================================
// Bybit adapter — GET /v5/market/kline (public, spot category)
// =============================================================================

use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use crate::candle::{sort_and_dedup, Candle, Interval, Symbol};
use crate::error::AdapterError;

use super::{parse_decimal, Exchange, FetchWindow};

const NAME: &str = "bybit";
const BASE_URL: &str = "https://api.bybit.com";
const MAX_LIMIT: u32 = 1000;

pub struct BybitAdapter {
    client: reqwest::Client,
}

impl BybitAdapter {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn symbol_param(symbol: &Symbol) -> String {
        symbol.as_str().replace('/', "")
    }

    /// Bybit encodes intervals as bare minute counts, or `D`/`W`/`M`.
    fn interval_token(interval: Interval) -> Option<&'static str> {
        Some(match interval {
            Interval::M1 => "1",
            Interval::M3 => "3",
            Interval::M5 => "5",
            Interval::M15 => "15",
            Interval::M30 => "30",
            Interval::H1 => "60",
            Interval::H2 => "120",
            Interval::H4 => "240",
            Interval::H6 => "360",
            Interval::H12 => "720",
            Interval::D1 => "D",
            Interval::W1 => "W",
            Interval::Mo1 => "M",
            Interval::H8 | Interval::D3 => return None,
        })
    }
}

#[async_trait]
impl Exchange for BybitAdapter {
    fn name(&self) -> &'static str {
        NAME
    }

    #[instrument(skip(self), name = "bybit::fetch")]
    async fn fetch(
        &self,
        symbol: &Symbol,
        interval: Interval,
        limit: u32,
        window: FetchWindow,
    ) -> Result<Vec<Candle>, AdapterError> {
        let token = Self::interval_token(interval).ok_or_else(|| AdapterError::UnsupportedInterval {
            exchange: NAME.to_string(),
            interval: interval.to_string(),
        })?;

        let limit = limit.min(MAX_LIMIT);
        let mut url = format!(
            "{BASE_URL}/v5/market/kline?category=spot&symbol={}&interval={}&limit={}",
            Self::symbol_param(symbol),
            token,
            limit
        );
        if let Some(start) = window.start {
            url.push_str(&format!("&start={start}"));
        }
        if let Some(end) = window.end {
            url.push_str(&format!("&end={end}"));
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

        let ret_code = body["retCode"].as_i64().unwrap_or(-1);
        if ret_code != 0 {
            let msg = body["retMsg"].as_str().unwrap_or("unknown error").to_string();
            return Err(AdapterError::ParseError {
                exchange: NAME.to_string(),
                message: msg,
            });
        }

        let raw = body["result"]["list"]
            .as_array()
            .ok_or_else(|| AdapterError::ParseError {
                exchange: NAME.to_string(),
                message: "kline response missing result.list array".to_string(),
            })?;

        let mut candles = Vec::with_capacity(raw.len());
        for entry in raw {
            let arr = entry.as_array().ok_or_else(|| AdapterError::ParseError {
                exchange: NAME.to_string(),
                message: "kline entry is not an array".to_string(),
            })?;
            if arr.len() < 6 {
                warn!(exchange = NAME, len = arr.len(), "skipping malformed kline entry");
                continue;
            }

            let ts = arr[0]
                .as_str()
                .and_then(|s| s.parse::<i64>().ok())
                .unwrap_or(0);
            let open = parse_decimal(NAME, &arr[1])?;
            let high = parse_decimal(NAME, &arr[2])?;
            let low = parse_decimal(NAME, &arr[3])?;
            let close = parse_decimal(NAME, &arr[4])?;
            let volume = parse_decimal(NAME, &arr[5])?;
            let quote_volume = arr.get(6).and_then(|v| parse_decimal(NAME, v).ok());

            match Candle::new(ts, open, high, low, close, volume, quote_volume, None) {
                Ok(c) => candles.push(c),
                Err(e) => warn!(exchange = NAME, %e, "dropping invalid candle"),
            }
        }

        // Bybit returns candles newest-first; sort_and_dedup fixes ordering.
        debug!(exchange = NAME, symbol = %symbol, count = candles.len(), "klines fetched");
        Ok(sort_and_dedup(candles))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_token_maps_hours_to_minutes() {
        assert_eq!(BybitAdapter::interval_token(Interval::H4), Some("240"));
        assert_eq!(BybitAdapter::interval_token(Interval::D1), Some("D"));
    }

    #[test]
    fn interval_token_rejects_unsupported_granularity() {
        assert_eq!(BybitAdapter::interval_token(Interval::H8), None);
        assert_eq!(BybitAdapter::interval_token(Interval::D3), None);
    }
}
