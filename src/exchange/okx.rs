// =============================================================================
// OKX adapter — GET /api/v5/market/candles (public)
// =============================================================================

use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use crate::candle::{sort_and_dedup, Candle, Interval, Symbol};
use crate::error::AdapterError;

use super::{parse_decimal, Exchange, FetchWindow};

const NAME: &str = "okx";
const BASE_URL: &str = "https://www.okx.com";
const MAX_LIMIT: u32 = 300;

pub struct OkxAdapter {
    client: reqwest::Client,
}

impl OkxAdapter {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn inst_id(symbol: &Symbol) -> String {
        symbol.as_str().replace('/', "-")
    }
}

#[async_trait]
impl Exchange for OkxAdapter {
    fn name(&self) -> &'static str {
        NAME
    }

    #[instrument(skip(self), name = "okx::fetch")]
    async fn fetch(
        &self,
        symbol: &Symbol,
        interval: Interval,
        limit: u32,
        window: FetchWindow,
    ) -> Result<Vec<Candle>, AdapterError> {
        let limit = limit.min(MAX_LIMIT);
        let mut url = format!(
            "{BASE_URL}/api/v5/market/candles?instId={}&bar={}&limit={}",
            Self::inst_id(symbol),
            interval.wire_token(NAME),
            limit
        );
        if let Some(start) = window.start {
            url.push_str(&format!("&before={}", start.saturating_sub(1)));
        }
        if let Some(end) = window.end {
            url.push_str(&format!("&after={end}"));
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

        if body["code"].as_str() != Some("0") {
            let msg = body["msg"].as_str().unwrap_or("unknown error").to_string();
            if msg.to_ascii_lowercase().contains("bar") {
                return Err(AdapterError::UnsupportedInterval {
                    exchange: NAME.to_string(),
                    interval: interval.to_string(),
                });
            }
            return Err(AdapterError::ParseError {
                exchange: NAME.to_string(),
                message: msg,
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

            let ts = arr[0]
                .as_str()
                .and_then(|s| s.parse::<i64>().ok())
                .unwrap_or(0);
            let open = parse_decimal(NAME, &arr[1])?;
            let high = parse_decimal(NAME, &arr[2])?;
            let low = parse_decimal(NAME, &arr[3])?;
            let close = parse_decimal(NAME, &arr[4])?;
            let volume = parse_decimal(NAME, &arr[5])?;
            let quote_volume = arr.get(7).and_then(|v| parse_decimal(NAME, v).ok());

            match Candle::new(ts, open, high, low, close, volume, quote_volume, None) {
                Ok(c) => candles.push(c),
                Err(e) => warn!(exchange = NAME, %e, "dropping invalid candle"),
            }
        }

        // OKX returns candles newest-first; sort_and_dedup fixes ordering.
        debug!(exchange = NAME, symbol = %symbol, count = candles.len(), "candles fetched");
        Ok(sort_and_dedup(candles))
    }
}
