// =============================================================================
// Race Fetcher (C2) — fan one request out across every adapter, first
// sufficient result wins, losers are cancelled.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::stream::FuturesUnordered;
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::candle::{Candle, FetchResult, Interval, Symbol};
use crate::error::AllExchangesFailed;
use crate::exchange::{Exchange, FetchWindow};

/// Short grace period given to losing tasks to notice cancellation before
/// the race fetcher gives up on them and returns anyway.
const DRAIN_DEADLINE: Duration = Duration::from_millis(500);

/// Fans one fetch request out across every configured [`Exchange`] and
/// returns as soon as a winner is decided, per spec §4.2.
pub struct RaceFetcher {
    adapters: Vec<Arc<dyn Exchange>>,
}

enum AdapterOutcome {
    Ok(String, Vec<Candle>),
    Err(String, String),
    Cancelled,
}

impl RaceFetcher {
    pub fn new(adapters: Vec<Box<dyn Exchange>>) -> Self {
        Self {
            adapters: adapters.into_iter().map(Arc::from).collect(),
        }
    }

    async fn run_one(
        adapter: Arc<dyn Exchange>,
        symbol: Symbol,
        interval: Interval,
        limit: u32,
        window: FetchWindow,
        token: CancellationToken,
    ) -> AdapterOutcome {
        tokio::select! {
            biased;
            _ = token.cancelled() => AdapterOutcome::Cancelled,
            result = adapter.fetch(&symbol, interval, limit, window) => {
                match result {
                    Ok(candles) => AdapterOutcome::Ok(adapter.name().to_string(), candles),
                    Err(e) => AdapterOutcome::Err(adapter.name().to_string(), e.to_string()),
                }
            }
        }
    }

    fn spawn_all(
        &self,
        symbol: &Symbol,
        interval: Interval,
        limit: u32,
        window: FetchWindow,
        token: &CancellationToken,
    ) -> FuturesUnordered<tokio::task::JoinHandle<AdapterOutcome>> {
        let tasks = FuturesUnordered::new();
        for adapter in &self.adapters {
            let adapter = Arc::clone(adapter);
            let symbol = symbol.clone();
            let token = token.clone();
            tasks.push(tokio::spawn(Self::run_one(
                adapter, symbol, interval, limit, window, token,
            )));
        }
        tasks
    }

    async fn close_all(&self) {
        for adapter in &self.adapters {
            adapter.close().await;
        }
    }

    /// First-non-empty-wins race (spec §4.2 `fetch`).
    pub async fn fetch(
        &self,
        symbol: &Symbol,
        interval: Interval,
        limit: u32,
        window: FetchWindow,
    ) -> Result<FetchResult, AllExchangesFailed> {
        let started = Instant::now();
        let token = CancellationToken::new();
        let mut tasks = self.spawn_all(symbol, interval, limit, window, &token);
        let mut errors: HashMap<String, String> = HashMap::new();
        let mut winner: Option<(String, Vec<Candle>)> = None;

        while let Some(joined) = tasks.next().await {
            match joined {
                Ok(AdapterOutcome::Ok(name, candles)) if !candles.is_empty() => {
                    winner = Some((name, candles));
                    token.cancel();
                    break;
                }
                Ok(AdapterOutcome::Ok(name, _)) => {
                    errors.insert(name, "empty result".to_string());
                }
                Ok(AdapterOutcome::Err(name, message)) => {
                    errors.insert(name, message);
                }
                Ok(AdapterOutcome::Cancelled) => {}
                Err(join_err) => {
                    warn!(%join_err, "adapter task panicked");
                }
            }
        }

        // Drain any still-outstanding tasks up to the grace deadline, then
        // stop waiting on them regardless.
        let _ = tokio::time::timeout(DRAIN_DEADLINE, async {
            while tasks.next().await.is_some() {}
        })
        .await;

        self.close_all().await;

        match winner {
            Some((name, candles)) => {
                debug!(winner = %name, count = candles.len(), "race fetch decided");
                Ok(FetchResult {
                    candles,
                    winning_exchange: name,
                    symbol: symbol.clone(),
                    interval,
                    elapsed_ms: started.elapsed().as_secs_f64() * 1000.0,
                })
            }
            None => Err(AllExchangesFailed(errors)),
        }
    }

    /// Sufficiency race (spec §4.2 `fetch_with_minimum`): keeps collecting
    /// until an adapter reaches `min_required`, otherwise returns the
    /// largest-count result seen.
    pub async fn fetch_with_minimum(
        &self,
        symbol: &Symbol,
        interval: Interval,
        limit: u32,
        window: FetchWindow,
        min_required: usize,
    ) -> Result<FetchResult, AllExchangesFailed> {
        let started = Instant::now();
        let token = CancellationToken::new();
        let mut tasks = self.spawn_all(symbol, interval, limit, window, &token);
        let mut errors: HashMap<String, String> = HashMap::new();
        let mut best: Option<(String, Vec<Candle>)> = None;
        let mut sufficient: Option<(String, Vec<Candle>)> = None;

        while let Some(joined) = tasks.next().await {
            match joined {
                Ok(AdapterOutcome::Ok(name, candles)) => {
                    if candles.len() >= min_required {
                        sufficient = Some((name, candles));
                        token.cancel();
                        break;
                    }
                    let is_better = best
                        .as_ref()
                        .map(|(_, b)| candles.len() > b.len())
                        .unwrap_or(true);
                    if is_better && !candles.is_empty() {
                        best = Some((name, candles));
                    } else if candles.is_empty() {
                        errors.insert(name, "empty result".to_string());
                    }
                }
                Ok(AdapterOutcome::Err(name, message)) => {
                    errors.insert(name, message);
                }
                Ok(AdapterOutcome::Cancelled) => {}
                Err(join_err) => {
                    warn!(%join_err, "adapter task panicked");
                }
            }
        }

        let _ = tokio::time::timeout(DRAIN_DEADLINE, async {
            while tasks.next().await.is_some() {}
        })
        .await;

        self.close_all().await;

        let (name, candles) = sufficient.or(best).ok_or(()).map_err(|_| AllExchangesFailed(errors))?;

        debug!(winner = %name, count = candles.len(), "sufficiency race decided");
        Ok(FetchResult {
            candles,
            winning_exchange: name,
            symbol: symbol.clone(),
            interval,
            elapsed_ms: started.elapsed().as_secs_f64() * 1000.0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration as StdDuration;

    use crate::error::AdapterError;

    fn candle(ts: i64) -> Candle {
        Candle::new(ts, dec!(1), dec!(2), dec!(1), dec!(1), dec!(1), None, None).unwrap()
    }

    struct ScriptedAdapter {
        name: &'static str,
        delay: StdDuration,
        outcome: Result<Vec<Candle>, AdapterError>,
        closed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Exchange for ScriptedAdapter {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn fetch(
            &self,
            _symbol: &Symbol,
            _interval: Interval,
            _limit: u32,
            _window: FetchWindow,
        ) -> Result<Vec<Candle>, AdapterError> {
            tokio::time::sleep(self.delay).await;
            self.outcome.clone()
        }

        async fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn fastest_non_empty_wins() {
        let fast_closed = Arc::new(AtomicBool::new(false));
        let slow_closed = Arc::new(AtomicBool::new(false));

        let fast = Box::new(ScriptedAdapter {
            name: "fast",
            delay: StdDuration::from_millis(5),
            outcome: Ok(vec![candle(1), candle(2)]),
            closed: fast_closed.clone(),
        });
        let slow = Box::new(ScriptedAdapter {
            name: "slow",
            delay: StdDuration::from_millis(200),
            outcome: Ok(vec![candle(1)]),
            closed: slow_closed.clone(),
        });

        let fetcher = RaceFetcher::new(vec![fast, slow]);
        let result = fetcher
            .fetch(&Symbol::new("BTC/USDT"), Interval::H1, 100, FetchWindow::default())
            .await
            .unwrap();

        assert_eq!(result.winning_exchange, "fast");
        assert_eq!(result.candles.len(), 2);
        assert!(fast_closed.load(Ordering::SeqCst));
        assert!(slow_closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn empty_result_does_not_win() {
        let empty = Box::new(ScriptedAdapter {
            name: "empty",
            delay: StdDuration::from_millis(1),
            outcome: Ok(vec![]),
            closed: Arc::new(AtomicBool::new(false)),
        });
        let real = Box::new(ScriptedAdapter {
            name: "real",
            delay: StdDuration::from_millis(30),
            outcome: Ok(vec![candle(1)]),
            closed: Arc::new(AtomicBool::new(false)),
        });

        let fetcher = RaceFetcher::new(vec![empty, real]);
        let result = fetcher
            .fetch(&Symbol::new("BTC/USDT"), Interval::H1, 100, FetchWindow::default())
            .await
            .unwrap();

        assert_eq!(result.winning_exchange, "real");
    }

    #[tokio::test]
    async fn all_failures_report_all_exchanges_failed() {
        let a = Box::new(ScriptedAdapter {
            name: "a",
            delay: StdDuration::from_millis(1),
            outcome: Err(AdapterError::RateLimited {
                exchange: "a".into(),
            }),
            closed: Arc::new(AtomicBool::new(false)),
        });
        let b = Box::new(ScriptedAdapter {
            name: "b",
            delay: StdDuration::from_millis(1),
            outcome: Ok(vec![]),
            closed: Arc::new(AtomicBool::new(false)),
        });

        let fetcher = RaceFetcher::new(vec![a, b]);
        let err = fetcher
            .fetch(&Symbol::new("BTC/USDT"), Interval::H1, 100, FetchWindow::default())
            .await
            .unwrap_err();

        assert_eq!(err.0.len(), 2);
    }

    #[tokio::test]
    async fn fetch_with_minimum_falls_back_to_best_when_none_sufficient() {
        let small = Box::new(ScriptedAdapter {
            name: "small",
            delay: StdDuration::from_millis(1),
            outcome: Ok(vec![candle(1)]),
            closed: Arc::new(AtomicBool::new(false)),
        });
        let bigger = Box::new(ScriptedAdapter {
            name: "bigger",
            delay: StdDuration::from_millis(10),
            outcome: Ok(vec![candle(1), candle(2), candle(3)]),
            closed: Arc::new(AtomicBool::new(false)),
        });

        let fetcher = RaceFetcher::new(vec![small, bigger]);
        let result = fetcher
            .fetch_with_minimum(
                &Symbol::new("BTC/USDT"),
                Interval::H1,
                100,
                FetchWindow::default(),
                100,
            )
            .await
            .unwrap();

        assert_eq!(result.winning_exchange, "bigger");
        assert_eq!(result.candles.len(), 3);
    }

    #[tokio::test]
    async fn fetch_with_minimum_stops_as_soon_as_threshold_met() {
        let sufficient = Box::new(ScriptedAdapter {
            name: "sufficient",
            delay: StdDuration::from_millis(1),
            outcome: Ok(vec![candle(1), candle(2)]),
            closed: Arc::new(AtomicBool::new(false)),
        });

        let fetcher = RaceFetcher::new(vec![sufficient]);
        let result = fetcher
            .fetch_with_minimum(
                &Symbol::new("BTC/USDT"),
                Interval::H1,
                100,
                FetchWindow::default(),
                2,
            )
            .await
            .unwrap();

        assert_eq!(result.winning_exchange, "sufficient");
    }
}
