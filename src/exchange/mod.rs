// =============================================================================
// Exchange Adapter fabric — one uniform trait, six per-provider translators.
// =============================================================================

pub mod binance;
pub mod bybit;
pub mod coinbase;
pub mod kraken;
pub mod kucoin;
pub mod okx;

use async_trait::async_trait;

use crate::candle::{Candle, Interval, Symbol};
use crate::error::AdapterError;

/// Optional half-open `[start, end)` window, milliseconds since epoch.
#[derive(Debug, Clone, Copy, Default)]
pub struct FetchWindow {
    pub start: Option<i64>,
    pub end: Option<i64>,
}

/// Uniform per-provider translator (spec §4.1).
///
/// Implementations MUST return candles sorted ascending with no duplicate
/// timestamps, and MUST release network resources on `close`.
#[async_trait]
pub trait Exchange: Send + Sync {
    /// Stable identifier, e.g. `"binance"`.
    fn name(&self) -> &'static str;

    /// Fetch up to `limit` candles for `symbol`/`interval` inside `window`.
    /// An empty result is not an error: it means "no data for range".
    async fn fetch(
        &self,
        symbol: &Symbol,
        interval: Interval,
        limit: u32,
        window: FetchWindow,
    ) -> Result<Vec<Candle>, AdapterError>;

    /// Release any network resources held by this adapter. Adapters backed
    /// by a shared `reqwest::Client` (which is cheaply cloneable and needs
    /// no explicit teardown) can leave this a no-op.
    async fn close(&self) {}
}

/// Build the default six-provider registry (spec §4.1's named exchanges),
/// each sharing one `reqwest::Client` with the configured fetch timeout.
pub fn default_adapters(fetch_timeout: std::time::Duration) -> Vec<Box<dyn Exchange>> {
    let client = reqwest::Client::builder()
        .timeout(fetch_timeout)
        .build()
        .expect("failed to build reqwest client");

    vec![
        Box::new(binance::BinanceAdapter::new(client.clone())),
        Box::new(okx::OkxAdapter::new(client.clone())),
        Box::new(bybit::BybitAdapter::new(client.clone())),
        Box::new(coinbase::CoinbaseAdapter::new(client.clone())),
        Box::new(kraken::KrakenAdapter::new(client.clone())),
        Box::new(kucoin::KucoinAdapter::new(client)),
    ]
}

/// Shared helper: parse a JSON value that may be a string or number into a
/// `Decimal`, the way the teacher's `parse_str_f64` parses Binance's
/// string-or-number kline fields.
pub(crate) fn parse_decimal(
    exchange: &str,
    val: &serde_json::Value,
) -> Result<rust_decimal::Decimal, AdapterError> {
    use std::str::FromStr;
    let as_str = if let Some(s) = val.as_str() {
        s.to_string()
    } else if let Some(n) = val.as_f64() {
        n.to_string()
    } else {
        return Err(AdapterError::ParseError {
            exchange: exchange.to_string(),
            message: format!("expected string or number, got: {val}"),
        });
    };
    rust_decimal::Decimal::from_str(&as_str).map_err(|e| AdapterError::ParseError {
        exchange: exchange.to_string(),
        message: format!("failed to parse '{as_str}' as decimal: {e}"),
    })
}
