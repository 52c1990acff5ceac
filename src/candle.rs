// =============================================================================
// Core data model: Candle, Interval, Symbol, FetchResult
// =============================================================================
//
// Prices and volumes cross every component boundary as exact decimals (spec
// §3/§6) — binary floats are only acceptable inside the indicator math
// (§4.5.1), where the analytics module converts explicitly.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single immutable OHLCV bar, aligned to an interval boundary.
///
/// Invariants (spec §3, enforced by [`Candle::new`]):
/// `low <= open <= high`, `low <= close <= high`, `volume >= 0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Bar open time, milliseconds since epoch, UTC.
    pub timestamp: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub quote_volume: Option<Decimal>,
    pub trades_count: Option<u64>,
}

/// A candle failed one of the OHLCV invariants in spec §3.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid candle at ts={timestamp}: {reason}")]
pub struct InvalidCandle {
    pub timestamp: i64,
    pub reason: String,
}

impl Candle {
    /// Construct a candle, validating the OHLCV invariants from spec §3.
    pub fn new(
        timestamp: i64,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: Decimal,
        quote_volume: Option<Decimal>,
        trades_count: Option<u64>,
    ) -> Result<Self, InvalidCandle> {
        if low > open || open > high {
            return Err(InvalidCandle {
                timestamp,
                reason: "low <= open <= high violated".into(),
            });
        }
        if low > close || close > high {
            return Err(InvalidCandle {
                timestamp,
                reason: "low <= close <= high violated".into(),
            });
        }
        if volume.is_sign_negative() {
            return Err(InvalidCandle {
                timestamp,
                reason: "volume < 0".into(),
            });
        }
        Ok(Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
            quote_volume,
            trades_count,
        })
    }

    /// `close` as `f64`, the boundary into the indicator math (spec §6).
    pub fn close_f64(&self) -> f64 {
        self.close.try_into().unwrap_or(f64::NAN)
    }

    pub fn high_f64(&self) -> f64 {
        self.high.try_into().unwrap_or(f64::NAN)
    }

    pub fn low_f64(&self) -> f64 {
        self.low.try_into().unwrap_or(f64::NAN)
    }
}

/// Sort a candle sequence ascending by timestamp and drop duplicate keys,
/// keeping the last occurrence (spec §4.1: "the adapter normalizes").
pub fn sort_and_dedup(mut candles: Vec<Candle>) -> Vec<Candle> {
    candles.sort_by_key(|c| c.timestamp);
    candles.dedup_by_key(|c| c.timestamp);
    candles
}

/// Closed enumeration of bar granularities (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Interval {
    M1,
    M3,
    M5,
    M15,
    M30,
    H1,
    H2,
    H4,
    H6,
    H8,
    H12,
    D1,
    D3,
    W1,
    Mo1,
}

impl Interval {
    /// Duration of one bar, in milliseconds.
    pub fn duration_ms(self) -> i64 {
        const MIN: i64 = 60_000;
        const HOUR: i64 = 60 * MIN;
        const DAY: i64 = 24 * HOUR;
        match self {
            Interval::M1 => MIN,
            Interval::M3 => 3 * MIN,
            Interval::M5 => 5 * MIN,
            Interval::M15 => 15 * MIN,
            Interval::M30 => 30 * MIN,
            Interval::H1 => HOUR,
            Interval::H2 => 2 * HOUR,
            Interval::H4 => 4 * HOUR,
            Interval::H6 => 6 * HOUR,
            Interval::H8 => 8 * HOUR,
            Interval::H12 => 12 * HOUR,
            Interval::D1 => DAY,
            Interval::D3 => 3 * DAY,
            Interval::W1 => 7 * DAY,
            Interval::Mo1 => 30 * DAY,
        }
    }

    /// Per-provider wire token (e.g. Binance's `"1h"`, OKX's `"1H"`).
    /// Every adapter in this crate uses Binance-style lowercase tokens
    /// except OKX, which uses uppercase for hour/day/week/month.
    pub fn wire_token(self, exchange: &str) -> &'static str {
        let okx_style = exchange.eq_ignore_ascii_case("okx");
        match (self, okx_style) {
            (Interval::M1, _) => "1m",
            (Interval::M3, _) => "3m",
            (Interval::M5, _) => "5m",
            (Interval::M15, _) => "15m",
            (Interval::M30, _) => "30m",
            (Interval::H1, false) => "1h",
            (Interval::H1, true) => "1H",
            (Interval::H2, false) => "2h",
            (Interval::H2, true) => "2H",
            (Interval::H4, false) => "4h",
            (Interval::H4, true) => "4H",
            (Interval::H6, false) => "6h",
            (Interval::H6, true) => "6H",
            (Interval::H8, false) => "8h",
            (Interval::H8, true) => "8H",
            (Interval::H12, false) => "12h",
            (Interval::H12, true) => "12H",
            (Interval::D1, false) => "1d",
            (Interval::D1, true) => "1D",
            (Interval::D3, false) => "3d",
            (Interval::D3, true) => "3D",
            (Interval::W1, false) => "1w",
            (Interval::W1, true) => "1W",
            (Interval::Mo1, false) => "1M",
            (Interval::Mo1, true) => "1M",
        }
    }

    pub fn parse(token: &str) -> Option<Self> {
        Some(match token.trim().to_ascii_lowercase().as_str() {
            "1m" => Interval::M1,
            "3m" => Interval::M3,
            "5m" => Interval::M5,
            "15m" => Interval::M15,
            "30m" => Interval::M30,
            "1h" => Interval::H1,
            "2h" => Interval::H2,
            "4h" => Interval::H4,
            "6h" => Interval::H6,
            "8h" => Interval::H8,
            "12h" => Interval::H12,
            "1d" => Interval::D1,
            "3d" => Interval::D3,
            "1w" => Interval::W1,
            "1mo" | "1m_" | "1mth" => Interval::Mo1,
            _ => return None,
        })
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.wire_token("binance"))
    }
}

/// Canonical "BASE/QUOTE" symbol. Uppercase is canonical; mixed case is
/// normalized on construction (spec §3).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Symbol(String);

impl Symbol {
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split into `(base, quote)`, if the symbol contains the canonical
    /// separator.
    pub fn parts(&self) -> Option<(&str, &str)> {
        self.0.split_once('/')
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Symbol {
    fn from(value: &str) -> Self {
        Symbol::new(value)
    }
}

impl From<String> for Symbol {
    fn from(value: String) -> Self {
        Symbol::new(value)
    }
}

/// Result of a single race-fetch, per spec §3.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub candles: Vec<Candle>,
    pub winning_exchange: String,
    pub symbol: Symbol,
    pub interval: Interval,
    pub elapsed_ms: f64,
}

impl FetchResult {
    /// `candles` is sorted strictly ascending with no duplicate timestamps,
    /// per spec §3/§8.
    pub fn is_well_formed(&self) -> bool {
        self.candles
            .windows(2)
            .all(|w| w[0].timestamp < w[1].timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn candle(ts: i64, o: i64, h: i64, l: i64, c: i64) -> Candle {
        Candle::new(
            ts,
            Decimal::from(o),
            Decimal::from(h),
            Decimal::from(l),
            Decimal::from(c),
            dec!(1),
            None,
            None,
        )
        .unwrap()
    }

    #[test]
    fn rejects_low_above_open() {
        let err = Candle::new(
            0,
            dec!(5),
            dec!(10),
            dec!(6),
            dec!(7),
            dec!(1),
            None,
            None,
        )
        .unwrap_err();
        assert!(err.reason.contains("low <= open"));
    }

    #[test]
    fn rejects_negative_volume() {
        let err = Candle::new(
            0,
            dec!(5),
            dec!(10),
            dec!(1),
            dec!(7),
            dec!(-1),
            None,
            None,
        )
        .unwrap_err();
        assert!(err.reason.contains("volume"));
    }

    #[test]
    fn sort_and_dedup_keeps_last_and_sorts() {
        let a = candle(100, 1, 2, 1, 1);
        let mut a2 = candle(100, 9, 10, 9, 9);
        a2.timestamp = 100;
        let b = candle(50, 1, 2, 1, 1);
        let out = sort_and_dedup(vec![a, b.clone(), a2.clone()]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].timestamp, 50);
        assert_eq!(out[1].timestamp, 100);
    }

    #[test]
    fn interval_duration_ms() {
        assert_eq!(Interval::M1.duration_ms(), 60_000);
        assert_eq!(Interval::H1.duration_ms(), 3_600_000);
        assert_eq!(Interval::D1.duration_ms(), 86_400_000);
    }

    #[test]
    fn interval_wire_token_okx_uppercases_hours() {
        assert_eq!(Interval::H4.wire_token("binance"), "4h");
        assert_eq!(Interval::H4.wire_token("okx"), "4H");
        assert_eq!(Interval::M1.wire_token("okx"), "1m");
    }

    #[test]
    fn interval_parse_roundtrip() {
        for iv in [
            Interval::M1,
            Interval::H1,
            Interval::H4,
            Interval::D1,
            Interval::W1,
        ] {
            let token = iv.wire_token("binance");
            assert_eq!(Interval::parse(token), Some(iv));
        }
    }

    #[test]
    fn symbol_normalizes_case() {
        let s = Symbol::new("btc/usdt");
        assert_eq!(s.as_str(), "BTC/USDT");
        assert_eq!(s.parts(), Some(("BTC", "USDT")));
    }

    #[test]
    fn fetch_result_well_formed() {
        let r = FetchResult {
            candles: vec![candle(1, 1, 2, 1, 1), candle(2, 1, 2, 1, 1)],
            winning_exchange: "binance".into(),
            symbol: Symbol::new("BTC/USDT"),
            interval: Interval::H1,
            elapsed_ms: 12.0,
        };
        assert!(r.is_well_formed());
    }

    #[test]
    fn fetch_result_rejects_duplicate_timestamps() {
        let r = FetchResult {
            candles: vec![candle(1, 1, 2, 1, 1), candle(1, 1, 2, 1, 1)],
            winning_exchange: "binance".into(),
            symbol: Symbol::new("BTC/USDT"),
            interval: Interval::H1,
            elapsed_ms: 12.0,
        };
        assert!(!r.is_well_formed());
    }
}
