// =============================================================================
// cryptointel-core — Main Entry Point
// =============================================================================
//
// Wires the exchange adapters, race fetcher, backfill orchestrator and
// stream manager together into a runnable demo process. Analytics results
// are logged rather than published anywhere; a real `SensorPublisher` is an
// external collaborator this crate does not implement.
// =============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use cryptointel_core::analytics::cycle;
use cryptointel_core::analytics::indicators;
use cryptointel_core::backfill::{BackfillOrchestrator, BackfillPolicy, InMemoryCandleStore};
use cryptointel_core::candle::{Interval, Symbol};
use cryptointel_core::config::Config;
use cryptointel_core::exchange;
use cryptointel_core::fetch::RaceFetcher;
use cryptointel_core::stream::{
    CandleEvent, CandleStream, StreamFactory, StreamManager, StreamManagerConfig, StreamSource,
};

/// `StreamFactory` that never has a live WebSocket tier to offer. The
/// stream manager demotes straight to `REST` for every symbol, which is
/// enough to exercise the fallback chain without a real exchange socket.
struct RestOnlyFactory;

#[async_trait]
impl StreamFactory for RestOnlyFactory {
    async fn connect(
        &self,
        _source: StreamSource,
        _symbol: &Symbol,
        _interval: Interval,
    ) -> Option<Box<dyn CandleStream>> {
        None
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("cryptointel-core starting up");

    let config = Config::from_env();
    info!(
        symbols = ?config.symbols,
        backfill_years = config.backfill_years,
        intervals = ?config.backfill_intervals,
        "configuration loaded"
    );

    // ── Backfill orchestrator ────────────────────────────────────────────
    let backfill_adapters = exchange::default_adapters(config.fetch_timeout);
    let backfill_fetcher = RaceFetcher::new(backfill_adapters);
    let store = InMemoryCandleStore::new();
    let policy = BackfillPolicy {
        base_delay: config.rate_limit_base_delay,
        max_delay: config.rate_limit_max_delay,
        max_retries: config.rate_limit_max_retries,
        page_limit: 1000,
        marker_path: config.backfill_marker_path.clone().into(),
    };
    let orchestrator = Arc::new(BackfillOrchestrator::new(backfill_fetcher, store, policy));

    {
        let orchestrator = orchestrator.clone();
        let symbols = config.symbols.clone();
        let intervals = config.backfill_intervals.clone();
        let years = config.backfill_years;
        tokio::spawn(async move {
            info!(count = symbols.len(), "starting initial backfill");
            match orchestrator
                .backfill_all(years, &intervals, &symbols)
                .await
            {
                Ok(filled) => {
                    let total: usize = filled.values().sum();
                    info!(candles = total, "backfill completed");
                }
                Err(e) => error!(error = %e, "backfill failed"),
            }
        });
    }

    // ── Stream manager ───────────────────────────────────────────────────
    let stream_adapters = exchange::default_adapters(config.fetch_timeout);
    let stream_fetcher = RaceFetcher::new(stream_adapters);
    let stream_config = StreamManagerConfig {
        fallback_timeout: config.stream_fallback_timeout,
        max_errors_before_fallback: config.stream_max_errors_before_fallback,
        rest_poll_interval: config.stream_rest_poll_interval,
        ..StreamManagerConfig::default()
    };
    let manager = StreamManager::new(RestOnlyFactory, stream_fetcher, stream_config);

    let watch_list: Vec<(Symbol, Interval)> = config
        .symbols
        .iter()
        .cloned()
        .map(|s| (s, Interval::H1))
        .collect();

    let mut events = manager.start(watch_list);

    tokio::spawn(async move {
        let mut closes: Vec<f64> = Vec::new();
        while let Some(event) = events.recv().await {
            match event {
                CandleEvent::Candle {
                    symbol,
                    candle,
                    source,
                } => {
                    closes.push(candle.close_f64());
                    if closes.len() > 200 {
                        closes.remove(0);
                    }
                    if let Some(rsi) = indicators::rsi(&closes, 14) {
                        info!(symbol = %symbol, source, close = candle.close_f64(), rsi, "candle received");
                    } else {
                        info!(symbol = %symbol, source, close = candle.close_f64(), "candle received");
                    }
                }
                CandleEvent::SourceChanged { symbol, from, to } => {
                    warn!(symbol = %symbol, from, to, "stream source changed");
                }
            }
        }
    });

    let today = chrono::Utc::now().date_naive();
    let (halving, _next, days_since, _days_until) = cycle::halving_info(today);
    info!(
        last_halving = %halving,
        days_since_halving = days_since,
        "cycle reference points computed"
    );

    info!("all subsystems running. press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;
    warn!("shutdown signal received");

    manager.stop().await;
    info!("cryptointel-core shut down complete");

    Ok(())
}
