// =============================================================================
// Sensor publisher (external collaborator, spec §6) — no implementation
// ships here; a real publisher (MQTT, Home Assistant, etc.) is out of scope.
// =============================================================================

use async_trait::async_trait;

use crate::analytics::cycle::CycleInfo;
use crate::analytics::scoring::{CompositeScore, TechnicalIndicators};
use crate::backfill::BackfillProgress;
use crate::candle::{Candle, Interval, Symbol};
use crate::stream::StreamSource;

/// Sink for every analytics result this crate produces. No particular
/// transport is assumed (spec §6).
#[async_trait]
pub trait SensorPublisher: Send + Sync {
    async fn publish_composite(&self, symbol: &Symbol, score: &CompositeScore);

    async fn publish_indicator_bundle(
        &self,
        symbol: &Symbol,
        timeframe: Interval,
        indicators: &TechnicalIndicators,
    );

    async fn publish_cycle(&self, cycle: &CycleInfo);

    async fn publish_live_candle(
        &self,
        symbol: &Symbol,
        candle: &Candle,
        is_closed: bool,
        source: StreamSource,
    );

    async fn publish_backfill_progress(&self, progress: &BackfillProgress);
}
