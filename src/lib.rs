// =============================================================================
// cryptointel-core — exchange adapters, race fetcher, backfill orchestrator,
// stream manager and the pure analytics core.
// =============================================================================

pub mod analytics;
pub mod backfill;
pub mod candle;
pub mod config;
pub mod error;
pub mod exchange;
pub mod fetch;
pub mod sensors;
pub mod stream;
