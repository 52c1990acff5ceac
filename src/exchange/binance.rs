// =============================================================================
// Binance adapter — GET /api/v3/klines (public, unsigned)
// =============================================================================

use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use crate::candle::{sort_and_dedup, Candle, Interval, Symbol};
use crate::error::AdapterError;

use super::{parse_decimal, Exchange, FetchWindow};

const NAME: &str = "binance";
const BASE_URL: &str = "https://api.binance.com";
const MAX_LIMIT: u32 = 1000;

pub struct BinanceAdapter {
    client: reqwest::Client,
}

impl BinanceAdapter {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn symbol_param(symbol: &Symbol) -> String {
        symbol.as_str().replace('/', "")
    }
}

#[async_trait]
impl Exchange for BinanceAdapter {
    fn name(&self) -> &'static str {
        NAME
    }

    #[instrument(skip(self), name = "binance::fetch")]
    async fn fetch(
        &self,
        symbol: &Symbol,
        interval: Interval,
        limit: u32,
        window: FetchWindow,
    ) -> Result<Vec<Candle>, AdapterError> {
        let limit = limit.min(MAX_LIMIT);
        let mut url = format!(
            "{BASE_URL}/api/v3/klines?symbol={}&interval={}&limit={}",
            Self::symbol_param(symbol),
            interval.wire_token(NAME),
            limit
        );
        if let Some(start) = window.start {
            url.push_str(&format!("&startTime={start}"));
        }
        if let Some(end) = window.end {
            url.push_str(&format!("&endTime={end}"));
        }

        let resp = self.client.get(&url).send().await.map_err(|e| {
            AdapterError::TransportError {
                exchange: NAME.to_string(),
                message: e.to_string(),
            }
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
            message: "klines response is not an array".to_string(),
        })?;

        let mut candles = Vec::with_capacity(raw.len());
        for entry in raw {
            let arr = entry.as_array().ok_or_else(|| AdapterError::ParseError {
                exchange: NAME.to_string(),
                message: "kline entry is not an array".to_string(),
            })?;
            if arr.len() < 8 {
                warn!(exchange = NAME, len = arr.len(), "skipping malformed kline entry");
                continue;
            }

            let open_time = arr[0].as_i64().unwrap_or(0);
            let open = parse_decimal(NAME, &arr[1])?;
            let high = parse_decimal(NAME, &arr[2])?;
            let low = parse_decimal(NAME, &arr[3])?;
            let close = parse_decimal(NAME, &arr[4])?;
            let volume = parse_decimal(NAME, &arr[5])?;
            let quote_volume = parse_decimal(NAME, &arr[7]).ok();
            let trades_count = arr.get(8).and_then(|v| v.as_u64());

            match Candle::new(
                open_time,
                open,
                high,
                low,
                close,
                volume,
                quote_volume,
                trades_count,
            ) {
                Ok(c) => candles.push(c),
                Err(e) => warn!(exchange = NAME, %e, "dropping invalid candle"),
            }
        }

        debug!(exchange = NAME, symbol = %symbol, count = candles.len(), "klines fetched");
        Ok(sort_and_dedup(candles))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_param_strips_separator() {
        assert_eq!(BinanceAdapter::symbol_param(&Symbol::new("BTC/USDT")), "BTCUSDT");
    }
}
