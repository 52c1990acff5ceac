// =============================================================================
// KuCoin adapter — GET /api/v1/market/candles (public)
// =============================================================================

use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use crate::candle::{sort_and_dedup, Candle, Interval, Symbol};
use crate::error::AdapterError;

use super::{parse_decimal, Exchange, FetchWindow};

const NAME: &str = "kucoin";
const BASE_URL: &str = "https://api.kucoin.com";

pub struct KucoinAdapter {
    client: reqwest::Client,
}

impl KucoinAdapter {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn symbol_param(symbol: &Symbol) -> String {
        symbol.as_str().replace('/', "-")
    }

    /// KuCoin encodes intervals as named "type" tokens.
    fn type_token(interval: Interval) -> Option<&'static str> {
        Some(match interval {
            Interval::M1 => "1min",
            Interval::M3 => "3min",
            Interval::M5 => "5min",
            Interval::M15 => "15min",
            Interval::M30 => "30min",
            Interval::H1 => "1hour",
            Interval::H2 => "2hour",
            Interval::H4 => "4hour",
            Interval::H6 => "6hour",
            Interval::H8 => "8hour",
            Interval::H12 => "12hour",
            Interval::D1 => "1day",
            Interval::W1 => "1week",
            Interval::D3 | Interval::Mo1 => return None,
        })
    }
}

#[async_trait]
impl Exchange for KucoinAdapter {
    fn name(&self) -> &'static str {
        NAME
    }

    #[instrument(skip(self), name = "kucoin::fetch")]
    async fn fetch(
        &self,
        symbol: &Symbol,
        interval: Interval,
        limit: u32,
        window: FetchWindow,
    ) -> Result<Vec<Candle>, AdapterError> {
        let token = Self::type_token(interval).ok_or_else(|| AdapterError::UnsupportedInterval {
            exchange: NAME.to_string(),
            interval: interval.to_string(),
        })?;

        let _ = limit;
        let mut url = format!(
            "{BASE_URL}/api/v1/market/candles?symbol={}&type={}",
            Self::symbol_param(symbol),
            token
        );
        if let Some(start) = window.start {
            url.push_str(&format!("&startAt={}", start / 1000));
        }
        if let Some(end) = window.end {
            url.push_str(&format!("&endAt={}", end / 1000));
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

        if body["code"].as_str() != Some("200000") {
            return Err(AdapterError::ParseError {
                exchange: NAME.to_string(),
                message: body["msg"].as_str().unwrap_or("unknown error").to_string(),
            });
        }

        let raw = body["data"].as_array().ok_or_else(|| AdapterError::ParseError {
            exchange: NAME.to_string(),
            message: "candles response missing 'data' array".to_string(),
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

            // [time, open, close, high, low, volume, turnover], time in seconds.
            let ts_sec = arr[0]
                .as_str()
                .and_then(|s| s.parse::<i64>().ok())
                .unwrap_or(0);
            let open = parse_decimal(NAME, &arr[1])?;
            let close = parse_decimal(NAME, &arr[2])?;
            let high = parse_decimal(NAME, &arr[3])?;
            let low = parse_decimal(NAME, &arr[4])?;
            let volume = parse_decimal(NAME, &arr[5])?;
            let quote_volume = arr.get(6).and_then(|v| parse_decimal(NAME, v).ok());

            match Candle::new(
                ts_sec * 1000,
                open,
                high,
                low,
                close,
                volume,
                quote_volume,
                None,
            ) {
                Ok(c) => candles.push(c),
                Err(e) => warn!(exchange = NAME, %e, "dropping invalid candle"),
            }
        }

        // KuCoin returns candles newest-first; sort_and_dedup fixes ordering.
        debug!(exchange = NAME, symbol = %symbol, count = candles.len(), "candles fetched");
        Ok(sort_and_dedup(candles))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_param_uses_dash_separator() {
        assert_eq!(KucoinAdapter::symbol_param(&Symbol::new("BTC/USDT")), "BTC-USDT");
    }

    #[test]
    fn type_token_rejects_unsupported_interval() {
        assert_eq!(KucoinAdapter::type_token(Interval::Mo1), None);
    }
}
