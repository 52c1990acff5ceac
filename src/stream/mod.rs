// =============================================================================
// Stream Manager (C4) — per-symbol live candle stream with automatic
// degradation across PRIMARY_WS -> SECONDARY_WS -> REST.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::candle::{Candle, Interval, Symbol};
use crate::exchange::FetchWindow;
use crate::fetch::RaceFetcher;

/// Preference-ordered source chain (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamSource {
    PrimaryWs,
    SecondaryWs,
    Rest,
}

impl StreamSource {
    /// Next source in the fallback chain, or `None` if already at `Rest`
    /// (the chain's terminal state).
    fn demote(self) -> Self {
        match self {
            StreamSource::PrimaryWs => StreamSource::SecondaryWs,
            StreamSource::SecondaryWs => StreamSource::Rest,
            StreamSource::Rest => StreamSource::Rest,
        }
    }
}

/// One event a connected stream can yield.
pub enum StreamEvent {
    Candle(Candle),
    Disconnected,
    Failed,
}

/// A single WebSocket-style connection for one `(symbol, interval)` pair.
#[async_trait]
pub trait CandleStream: Send {
    async fn next_event(&mut self) -> StreamEvent;
}

/// Creates [`CandleStream`] connections for a given source tier. Production
/// implementations wrap `tokio-tungstenite`; this crate ships none (the live
/// WS endpoints are an external collaborator, spec §1).
#[async_trait]
pub trait StreamFactory: Send + Sync {
    async fn connect(
        &self,
        source: StreamSource,
        symbol: &Symbol,
        interval: Interval,
    ) -> Option<Box<dyn CandleStream>>;
}

/// Event delivered to the stream manager's caller.
#[derive(Debug, Clone)]
pub enum CandleEvent {
    Candle {
        symbol: Symbol,
        candle: Candle,
        source: &'static str,
    },
    SourceChanged {
        symbol: Symbol,
        from: &'static str,
        to: &'static str,
    },
}

impl StreamSource {
    fn label(self) -> &'static str {
        match self {
            StreamSource::PrimaryWs => "PRIMARY_WS",
            StreamSource::SecondaryWs => "SECONDARY_WS",
            StreamSource::Rest => "REST",
        }
    }
}

#[derive(Debug, Clone)]
pub struct StreamManagerConfig {
    pub fallback_timeout: Duration,
    pub max_errors_before_fallback: u32,
    pub rest_poll_interval: Duration,
    pub monitor_interval: Duration,
}

impl Default for StreamManagerConfig {
    fn default() -> Self {
        Self {
            fallback_timeout: Duration::from_secs(30),
            max_errors_before_fallback: 3,
            rest_poll_interval: Duration::from_secs(60),
            monitor_interval: Duration::from_secs(10),
        }
    }
}

struct RuntimeState {
    interval: Interval,
    current_source: StreamSource,
    last_candle_time: Option<Instant>,
    last_delivered_ts: Option<i64>,
    error_count: u32,
}

struct SharedSymbol {
    state: Mutex<RuntimeState>,
    force_demote: Notify,
    retry_primary: Notify,
}

/// Owns every per-symbol task, the health monitor, and the REST polling
/// loop; tears them all down together on `stop` (spec §4.4 cancellation).
pub struct StreamManager<F: StreamFactory + 'static> {
    factory: Arc<F>,
    fetcher: Arc<RaceFetcher>,
    config: StreamManagerConfig,
    token: CancellationToken,
    symbols: Arc<Mutex<HashMap<Symbol, Arc<SharedSymbol>>>>,
    tasks: Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

const DRAIN_DEADLINE: Duration = Duration::from_secs(2);

impl<F: StreamFactory + 'static> StreamManager<F> {
    pub fn new(factory: F, fetcher: RaceFetcher, config: StreamManagerConfig) -> Self {
        Self {
            factory: Arc::new(factory),
            fetcher: Arc::new(fetcher),
            config,
            token: CancellationToken::new(),
            symbols: Arc::new(Mutex::new(HashMap::new())),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Start streaming `symbols`, returning a channel of [`CandleEvent`].
    pub fn start(&self, symbols: Vec<(Symbol, Interval)>) -> mpsc::UnboundedReceiver<CandleEvent> {
        let (tx, rx) = mpsc::unbounded_channel();

        {
            let mut map = self.symbols.lock();
            for (symbol, interval) in &symbols {
                map.insert(
                    symbol.clone(),
                    Arc::new(SharedSymbol {
                        state: Mutex::new(RuntimeState {
                            interval: *interval,
                            current_source: StreamSource::PrimaryWs,
                            last_candle_time: None,
                            last_delivered_ts: None,
                            error_count: 0,
                        }),
                        force_demote: Notify::new(),
                        retry_primary: Notify::new(),
                    }),
                );
            }
        }

        let mut tasks = self.tasks.lock();
        for (symbol, _interval) in symbols {
            let shared = self.symbols.lock().get(&symbol).cloned().unwrap();
            tasks.push(tokio::spawn(Self::run_symbol(
                self.factory.clone(),
                symbol,
                shared,
                self.config.clone(),
                self.token.clone(),
                tx.clone(),
            )));
        }

        tasks.push(tokio::spawn(Self::run_monitor(
            self.symbols.clone(),
            self.config.clone(),
            self.token.clone(),
            tx.clone(),
        )));

        tasks.push(tokio::spawn(Self::run_rest_loop(
            self.fetcher.clone(),
            self.symbols.clone(),
            self.config.clone(),
            self.token.clone(),
            tx,
        )));

        rx
    }

    /// Ask a downgraded symbol to attempt `PRIMARY_WS` again (spec §4.4
    /// "retry-primary").
    pub fn retry_primary(&self, symbol: &Symbol) {
        if let Some(shared) = self.symbols.lock().get(symbol).cloned() {
            shared.retry_primary.notify_one();
        }
    }

    /// Tear down the monitor, REST loop, and every per-symbol stream.
    pub async fn stop(self) {
        self.token.cancel();
        let tasks = self.tasks.into_inner();
        let _ = tokio::time::timeout(DRAIN_DEADLINE, futures_util::future::join_all(tasks)).await;
    }

    async fn run_symbol(
        factory: Arc<F>,
        symbol: Symbol,
        shared: Arc<SharedSymbol>,
        config: StreamManagerConfig,
        token: CancellationToken,
        tx: mpsc::UnboundedSender<CandleEvent>,
    ) {
        loop {
            if token.is_cancelled() {
                return;
            }

            let source = shared.state.lock().current_source;

            if source == StreamSource::Rest {
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = shared.retry_primary.notified() => {
                        let mut st = shared.state.lock();
                        let from = st.current_source;
                        st.current_source = StreamSource::PrimaryWs;
                        st.error_count = 0;
                        drop(st);
                        let _ = tx.send(CandleEvent::SourceChanged {
                            symbol: symbol.clone(),
                            from: from.label(),
                            to: StreamSource::PrimaryWs.label(),
                        });
                        continue;
                    }
                }
            }

            let interval = shared.state.lock().interval;
            let Some(mut stream) = factory.connect(source, &symbol, interval).await else {
                Self::note_failure(&shared, &symbol, &config, &tx);
                continue;
            };

            loop {
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = shared.force_demote.notified() => {
                        Self::demote(&shared, &symbol, &config, &tx);
                        break;
                    }
                    _ = shared.retry_primary.notified(), if source != StreamSource::PrimaryWs => {
                        let mut st = shared.state.lock();
                        st.current_source = StreamSource::PrimaryWs;
                        st.error_count = 0;
                        drop(st);
                        let _ = tx.send(CandleEvent::SourceChanged {
                            symbol: symbol.clone(),
                            from: source.label(),
                            to: StreamSource::PrimaryWs.label(),
                        });
                        break;
                    }
                    event = stream.next_event() => {
                        match event {
                            StreamEvent::Candle(candle) => {
                                let mut st = shared.state.lock();
                                let should_deliver = st
                                    .last_delivered_ts
                                    .map(|last| candle.timestamp >= last)
                                    .unwrap_or(true);
                                st.last_candle_time = Some(Instant::now());
                                st.error_count = 0;
                                if should_deliver {
                                    st.last_delivered_ts = Some(candle.timestamp);
                                }
                                drop(st);
                                if should_deliver {
                                    let _ = tx.send(CandleEvent::Candle {
                                        symbol: symbol.clone(),
                                        candle,
                                        source: source.label(),
                                    });
                                } else {
                                    debug!(symbol = %symbol, "suppressed out-of-order candle on source change");
                                }
                            }
                            StreamEvent::Disconnected => {
                                if Self::note_failure(&shared, &symbol, &config, &tx) {
                                    break;
                                }
                            }
                            StreamEvent::Failed => {
                                // FAILED is terminal: demote immediately,
                                // independent of the error-count threshold
                                // that governs transient disconnects.
                                Self::demote(&shared, &symbol, &config, &tx);
                                break;
                            }
                        }
                    }
                }
            }
        }
    }

    /// Increment the error count and demote if the threshold is reached.
    /// Returns `true` if a demotion occurred (the caller should reconnect).
    fn note_failure(
        shared: &Arc<SharedSymbol>,
        symbol: &Symbol,
        config: &StreamManagerConfig,
        tx: &mpsc::UnboundedSender<CandleEvent>,
    ) -> bool {
        let threshold = {
            let mut st = shared.state.lock();
            st.error_count += 1;
            st.error_count >= config.max_errors_before_fallback
        };
        if threshold {
            Self::demote(shared, symbol, config, tx);
        }
        threshold
    }

    fn demote(
        shared: &Arc<SharedSymbol>,
        symbol: &Symbol,
        _config: &StreamManagerConfig,
        tx: &mpsc::UnboundedSender<CandleEvent>,
    ) {
        let mut st = shared.state.lock();
        let from = st.current_source;
        let to = from.demote();
        if to == from {
            return;
        }
        st.current_source = to;
        st.error_count = 0;
        drop(st);
        warn!(symbol = %symbol, from = from.label(), to = to.label(), "stream demoted");
        let _ = tx.send(CandleEvent::SourceChanged {
            symbol: symbol.clone(),
            from: from.label(),
            to: to.label(),
        });
    }

    async fn run_monitor(
        symbols: Arc<Mutex<HashMap<Symbol, Arc<SharedSymbol>>>>,
        config: StreamManagerConfig,
        token: CancellationToken,
        tx: mpsc::UnboundedSender<CandleEvent>,
    ) {
        loop {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(config.monitor_interval) => {}
            }

            let snapshot: Vec<(Symbol, Arc<SharedSymbol>)> = symbols
                .lock()
                .iter()
                .map(|(s, shared)| (s.clone(), shared.clone()))
                .collect();

            for (symbol, shared) in snapshot {
                let needs_demotion = {
                    let st = shared.state.lock();
                    st.current_source != StreamSource::Rest
                        && st
                            .last_candle_time
                            .map(|t| t.elapsed() > config.fallback_timeout)
                            .unwrap_or(false)
                };
                if needs_demotion {
                    info!(symbol = %symbol, "health monitor forcing demotion on quiet stream");
                    Self::demote(&shared, &symbol, &config, &tx);
                    shared.force_demote.notify_one();
                }
            }
        }
    }

    async fn run_rest_loop(
        fetcher: Arc<RaceFetcher>,
        symbols: Arc<Mutex<HashMap<Symbol, Arc<SharedSymbol>>>>,
        config: StreamManagerConfig,
        token: CancellationToken,
        tx: mpsc::UnboundedSender<CandleEvent>,
    ) {
        loop {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(config.rest_poll_interval) => {}
            }

            let rest_symbols: Vec<(Symbol, Interval)> = symbols
                .lock()
                .iter()
                .filter_map(|(s, shared)| {
                    let st = shared.state.lock();
                    (st.current_source == StreamSource::Rest).then(|| (s.clone(), st.interval))
                })
                .collect();

            for (symbol, interval) in rest_symbols {
                let shared = match symbols.lock().get(&symbol).cloned() {
                    Some(s) => s,
                    None => continue,
                };
                match fetcher
                    .fetch(&symbol, interval, 2, FetchWindow::default())
                    .await
                {
                    Ok(result) => {
                        // Most recent fully closed bar: the second-to-last
                        // row when two are returned, else the only row.
                        let closed = if result.candles.len() >= 2 {
                            result.candles.get(result.candles.len() - 2)
                        } else {
                            result.candles.last()
                        };
                        if let Some(candle) = closed {
                            let mut st = shared.state.lock();
                            let should_deliver = st
                                .last_delivered_ts
                                .map(|last| candle.timestamp >= last)
                                .unwrap_or(true);
                            if should_deliver {
                                st.last_delivered_ts = Some(candle.timestamp);
                            }
                            drop(st);
                            if should_deliver {
                                let _ = tx.send(CandleEvent::Candle {
                                    symbol: symbol.clone(),
                                    candle: candle.clone(),
                                    source: StreamSource::Rest.label(),
                                });
                            }
                        }
                    }
                    Err(_) => {
                        // REST is terminal: errors increment the count but
                        // never trigger a further demotion (spec §4.4).
                        let mut st = shared.state.lock();
                        st.error_count += 1;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn candle(ts: i64) -> Candle {
        Candle::new(ts, dec!(1), dec!(2), dec!(1), dec!(1), dec!(1), None, None).unwrap()
    }

    struct FlakyStream {
        remaining_failures: u32,
    }

    #[async_trait]
    impl CandleStream for FlakyStream {
        async fn next_event(&mut self) -> StreamEvent {
            if self.remaining_failures > 0 {
                self.remaining_failures -= 1;
                StreamEvent::Disconnected
            } else {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                StreamEvent::Failed
            }
        }
    }

    struct AlwaysFailFactory {
        connect_calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl StreamFactory for AlwaysFailFactory {
        async fn connect(
            &self,
            _source: StreamSource,
            _symbol: &Symbol,
            _interval: Interval,
        ) -> Option<Box<dyn CandleStream>> {
            self.connect_calls.fetch_add(1, Ordering::SeqCst);
            Some(Box::new(FlakyStream {
                remaining_failures: 10,
            }))
        }
    }

    #[test]
    fn demote_chain_terminates_at_rest() {
        assert_eq!(StreamSource::PrimaryWs.demote(), StreamSource::SecondaryWs);
        assert_eq!(StreamSource::SecondaryWs.demote(), StreamSource::Rest);
        assert_eq!(StreamSource::Rest.demote(), StreamSource::Rest);
    }

    #[tokio::test]
    async fn repeated_disconnects_demote_through_the_chain() {
        let factory = AlwaysFailFactory {
            connect_calls: Arc::new(AtomicU32::new(0)),
        };
        let fetcher = RaceFetcher::new(vec![]);
        let mut config = StreamManagerConfig::default();
        config.max_errors_before_fallback = 2;
        config.monitor_interval = Duration::from_secs(3600);
        config.rest_poll_interval = Duration::from_secs(3600);

        let manager = StreamManager::new(factory, fetcher, config);
        let mut rx = manager.start(vec![(Symbol::new("BTC/USDT"), Interval::H1)]);

        let mut saw_secondary = false;
        let mut saw_rest = false;
        for _ in 0..20 {
            match tokio::time::timeout(Duration::from_secs(2), rx.recv()).await {
                Ok(Some(CandleEvent::SourceChanged { to, .. })) => {
                    if to == "SECONDARY_WS" {
                        saw_secondary = true;
                    }
                    if to == "REST" {
                        saw_rest = true;
                        break;
                    }
                }
                _ => break,
            }
        }

        assert!(saw_secondary);
        assert!(saw_rest);
        manager.stop().await;
    }

    #[test]
    fn candle_ordering_suppresses_stale_delivery() {
        let older = candle(100);
        let newer = candle(200);
        assert!(newer.timestamp >= older.timestamp);
    }

    struct ImmediateFailStream;

    #[async_trait]
    impl CandleStream for ImmediateFailStream {
        async fn next_event(&mut self) -> StreamEvent {
            StreamEvent::Failed
        }
    }

    struct ImmediateFailFactory;

    #[async_trait]
    impl StreamFactory for ImmediateFailFactory {
        async fn connect(
            &self,
            _source: StreamSource,
            _symbol: &Symbol,
            _interval: Interval,
        ) -> Option<Box<dyn CandleStream>> {
            Some(Box::new(ImmediateFailStream))
        }
    }

    #[tokio::test]
    async fn a_single_failed_event_demotes_regardless_of_threshold() {
        let mut config = StreamManagerConfig::default();
        // A high threshold would never be reached by a single event; FAILED
        // must demote anyway, independent of the error-count path.
        config.max_errors_before_fallback = 100;
        config.monitor_interval = Duration::from_secs(3600);
        config.rest_poll_interval = Duration::from_secs(3600);

        let fetcher = RaceFetcher::new(vec![]);
        let manager = StreamManager::new(ImmediateFailFactory, fetcher, config);
        let mut rx = manager.start(vec![(Symbol::new("BTC/USDT"), Interval::H1)]);

        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        match event {
            CandleEvent::SourceChanged { to, .. } => assert_eq!(to, "SECONDARY_WS"),
            _ => panic!("expected an immediate demotion"),
        }

        manager.stop().await;
    }
}
