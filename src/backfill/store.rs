// =============================================================================
// CandleStore — the persistence contract the backfill engine upserts into.
// =============================================================================

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;

use crate::candle::{Candle, Interval, Symbol};

/// Minimal persistence contract the backfill orchestrator needs (spec §6).
/// No production implementation ships in this crate — a real store (SQL,
/// time-series DB, etc.) is an external collaborator.
#[async_trait]
pub trait CandleStore: Send + Sync {
    /// Idempotent upsert: re-inserting a `(symbol, interval, timestamp)` key
    /// overwrites the row rather than duplicating it (spec §4.3 step 4).
    async fn upsert(&self, symbol: &Symbol, interval: Interval, candles: &[Candle]) -> usize;

    /// Rows already stored for `symbol`/`interval`, ascending by timestamp.
    async fn get_range(
        &self,
        symbol: &Symbol,
        interval: Interval,
        start: i64,
        end: i64,
    ) -> Vec<Candle>;

    /// Count of rows stored for `symbol`/`interval` across all time.
    async fn count(&self, symbol: &Symbol, interval: Interval) -> usize;
}

type Key = (Symbol, Interval);

/// In-memory reference [`CandleStore`], sufficient to exercise the backfill
/// engine's contract in tests without a real database.
#[derive(Default)]
pub struct InMemoryCandleStore {
    rows: RwLock<BTreeMap<Key, BTreeMap<i64, Candle>>>,
}

impl InMemoryCandleStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CandleStore for InMemoryCandleStore {
    async fn upsert(&self, symbol: &Symbol, interval: Interval, candles: &[Candle]) -> usize {
        let mut rows = self.rows.write();
        let bucket = rows.entry((symbol.clone(), interval)).or_default();
        let mut inserted = 0;
        for candle in candles {
            if bucket.insert(candle.timestamp, candle.clone()).is_none() {
                inserted += 1;
            }
        }
        inserted
    }

    async fn get_range(
        &self,
        symbol: &Symbol,
        interval: Interval,
        start: i64,
        end: i64,
    ) -> Vec<Candle> {
        let rows = self.rows.read();
        rows.get(&(symbol.clone(), interval))
            .map(|bucket| {
                bucket
                    .range(start..end)
                    .map(|(_, c)| c.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    async fn count(&self, symbol: &Symbol, interval: Interval) -> usize {
        self.rows
            .read()
            .get(&(symbol.clone(), interval))
            .map(|bucket| bucket.len())
            .unwrap_or(0)
    }
}
