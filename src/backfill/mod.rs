// =============================================================================
// Backfill Orchestrator (C3) — multi-year OHLCV backfill with paging,
// exponential-backoff retry, gap detection and strict all-or-fail completion.
// =============================================================================

pub mod store;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rand::Rng;
use tracing::{debug, info, warn};

use crate::candle::{Interval, Symbol};
use crate::error::{AdapterError, BackfillFailed, FailedKey};
use crate::exchange::FetchWindow;
use crate::fetch::RaceFetcher;

pub use store::{CandleStore, InMemoryCandleStore};

/// Lifecycle status of a backfill run (spec §3 `BackfillProgress`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackfillStatus {
    Idle,
    Running,
    Completed,
    Error,
}

/// Snapshot of backfill progress, the only process-wide mutable state in C3
/// besides the completion marker (spec §5).
#[derive(Debug, Clone, PartialEq)]
pub struct BackfillProgress {
    pub status: BackfillStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub symbols_total: usize,
    pub symbols_done: usize,
    pub symbols_failed: usize,
    pub candles_total: usize,
    pub failed_keys: Vec<FailedKey>,
    pub current_task: Option<String>,
    pub error_message: Option<String>,
}

impl Default for BackfillProgress {
    fn default() -> Self {
        Self {
            status: BackfillStatus::Idle,
            started_at: None,
            completed_at: None,
            symbols_total: 0,
            symbols_done: 0,
            symbols_failed: 0,
            candles_total: 0,
            failed_keys: Vec::new(),
            current_task: None,
            error_message: None,
        }
    }
}

/// Tunables for paging and retry, mirroring spec §4.3 step 3's defaults.
#[derive(Debug, Clone)]
pub struct BackfillPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_retries: u32,
    pub page_limit: u32,
    pub marker_path: PathBuf,
}

impl Default for BackfillPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(60),
            max_retries: 3,
            page_limit: 1000,
            marker_path: PathBuf::from("./backfill.marker"),
        }
    }
}

pub struct BackfillOrchestrator<S: CandleStore> {
    fetcher: RaceFetcher,
    store: S,
    policy: BackfillPolicy,
    progress: RwLock<BackfillProgress>,
}

/// A contiguous timestamp range, in milliseconds, with no stored candles.
pub type Gap = (i64, i64);

impl<S: CandleStore> BackfillOrchestrator<S> {
    pub fn new(fetcher: RaceFetcher, store: S, policy: BackfillPolicy) -> Self {
        Self {
            fetcher,
            store,
            policy,
            progress: RwLock::new(BackfillProgress::default()),
        }
    }

    /// Immutable snapshot of the current run's progress (spec §6
    /// `publish_backfill_progress`); safe to poll from another task.
    pub fn progress(&self) -> BackfillProgress {
        self.progress.read().clone()
    }

    /// Expected `[start, end)` window for `years` of history, rounded
    /// outward to whole `interval` boundaries (spec §4.3 step 1).
    fn expected_range(&self, years: u32, interval: Interval) -> (i64, i64) {
        let now_ms = Utc::now().timestamp_millis();
        let step = interval.duration_ms();
        let span_ms = i64::from(years) * 365 * 24 * 60 * 60 * 1000;
        let raw_start = now_ms - span_ms;
        let start = (raw_start / step) * step;
        let end = ((now_ms + step - 1) / step) * step;
        (start, end)
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.policy.base_delay.as_secs_f64();
        let jitter: f64 = rand::thread_rng().gen_range(0.0..1.0);
        let computed = base * 2f64.powi(attempt as i32) + jitter;
        Duration::from_secs_f64(computed.min(self.policy.max_delay.as_secs_f64()))
    }

    /// Fetch one page with retry/backoff on retryable adapter-style errors
    /// surfaced through `AllExchangesFailed` (spec §4.3 step 3).
    async fn fetch_page_with_retry(
        &self,
        symbol: &Symbol,
        interval: Interval,
        window: FetchWindow,
    ) -> Result<Vec<crate::candle::Candle>, String> {
        let mut attempt = 0;
        loop {
            match self
                .fetcher
                .fetch(symbol, interval, self.policy.page_limit, window)
                .await
            {
                Ok(result) => return Ok(result.candles),
                Err(all_failed) => {
                    let retryable = all_failed.0.values().any(|msg| {
                        msg.contains("rate limited") || msg.contains("transport error")
                    });
                    if !retryable || attempt >= self.policy.max_retries {
                        return Err(format!("{all_failed}"));
                    }
                    let delay = self.backoff_delay(attempt);
                    warn!(symbol = %symbol, attempt, ?delay, "backfill page failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Fill a single `(symbol, interval)` cell over `years` of history
    /// (spec §4.3 `backfill_one`). Returns the count of candles newly
    /// persisted.
    pub async fn backfill_one(
        &self,
        symbol: &Symbol,
        interval: Interval,
        years: u32,
    ) -> Result<usize, FailedKey> {
        let (start, end) = self.expected_range(years, interval);
        let step_span = i64::from(self.policy.page_limit) * interval.duration_ms();

        let mut cursor = start;
        let mut total_inserted = 0usize;
        let mut any_rows_seen = false;

        while cursor < end {
            let window = FetchWindow {
                start: Some(cursor),
                end: Some((cursor + step_span).min(end)),
            };

            let page = self
                .fetch_page_with_retry(symbol, interval, window)
                .await
                .map_err(|reason| FailedKey {
                    symbol: symbol.to_string(),
                    interval: interval.to_string(),
                    reason,
                })?;

            if page.is_empty() {
                break;
            }
            any_rows_seen = true;

            let inserted = self.store.upsert(symbol, interval, &page).await;
            total_inserted += inserted;

            let last_ts = page.last().map(|c| c.timestamp).unwrap_or(cursor);
            cursor = last_ts + interval.duration_ms();
        }

        // A re-run over an already-filled cell sees every page but inserts
        // zero new rows (idempotent upsert) — that's success, not failure
        // (spec §4.3 scenario 6). Only "the provider gave us nothing" fails.
        if !any_rows_seen {
            return Err(FailedKey {
                symbol: symbol.to_string(),
                interval: interval.to_string(),
                reason: "zero rows persisted".to_string(),
            });
        }

        debug!(symbol = %symbol, %interval, total_inserted, "cell backfilled");
        Ok(total_inserted)
    }

    /// Fill the full configured grid (spec §4.3 `backfill_all`). Strict
    /// mode: every cell is attempted before any failure is raised.
    pub async fn backfill_all(
        &self,
        years: u32,
        intervals: &[Interval],
        symbols: &[Symbol],
    ) -> Result<HashMap<(Symbol, Interval), usize>, BackfillFailed> {
        {
            let mut progress = self.progress.write();
            *progress = BackfillProgress {
                status: BackfillStatus::Running,
                started_at: Some(Utc::now()),
                symbols_total: symbols.len() * intervals.len(),
                ..BackfillProgress::default()
            };
        }

        let mut counts = HashMap::new();
        let mut failed = Vec::new();

        for symbol in symbols {
            for &interval in intervals {
                self.progress.write().current_task = Some(format!("{symbol}/{interval}"));
                match self.backfill_one(symbol, interval, years).await {
                    Ok(count) => {
                        counts.insert((symbol.clone(), interval), count);
                        let mut progress = self.progress.write();
                        progress.symbols_done += 1;
                        progress.candles_total += count;
                    }
                    Err(failure) => {
                        let mut progress = self.progress.write();
                        progress.symbols_failed += 1;
                        progress.failed_keys.push(failure.clone());
                        failed.push(failure);
                    }
                }
            }
        }

        let mut progress = self.progress.write();
        progress.current_task = None;
        progress.completed_at = Some(Utc::now());
        if !failed.is_empty() {
            progress.status = BackfillStatus::Error;
            progress.error_message = Some(format!(
                "{} of {} cells failed",
                failed.len(),
                progress.symbols_total
            ));
            return Err(BackfillFailed { failed });
        }
        progress.status = BackfillStatus::Completed;
        drop(progress);

        info!(cells = counts.len(), "backfill_all completed");
        Ok(counts)
    }

    /// Find ranges inside the expected window that have no stored candles
    /// (spec §4.3 step 5).
    pub async fn detect_gaps(&self, symbol: &Symbol, interval: Interval, years: u32) -> Vec<Gap> {
        let (start, end) = self.expected_range(years, interval);
        let rows = self.store.get_range(symbol, interval, start, end).await;
        let step = interval.duration_ms();

        if rows.is_empty() {
            return vec![(start, end)];
        }

        let mut gaps = Vec::new();
        if rows[0].timestamp > start {
            gaps.push((start, rows[0].timestamp));
        }

        for pair in rows.windows(2) {
            let (prev_ts, next_ts) = (pair[0].timestamp, pair[1].timestamp);
            if next_ts - prev_ts > step {
                gaps.push((prev_ts + step, next_ts));
            }
        }

        if let Some(last) = rows.last() {
            if end - last.timestamp > step {
                gaps.push((last.timestamp + step, end));
            }
        }

        gaps
    }

    /// Fetch and persist every gap, returning the total candles inserted
    /// (spec §4.3 `fill_gaps`).
    pub async fn fill_gaps(&self, symbol: &Symbol, interval: Interval, gaps: &[Gap]) -> usize {
        let mut total = 0;
        for &(start, end) in gaps {
            let window = FetchWindow {
                start: Some(start),
                end: Some(end),
            };
            if let Ok(page) = self.fetch_page_with_retry(symbol, interval, window).await {
                total += self.store.upsert(symbol, interval, &page).await;
            }
        }
        total
    }

    fn marker_exists(&self) -> bool {
        self.policy.marker_path.exists()
    }

    fn write_marker(&self) {
        if let Some(parent) = self.policy.marker_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Err(e) = std::fs::write(&self.policy.marker_path, Utc::now().to_rfc3339()) {
            warn!(error = %e, "failed to write backfill completion marker");
        }
    }

    /// Idempotent first-run guard (spec §4.3 `check_and_backfill`).
    pub async fn check_and_backfill(
        &self,
        years: u32,
        intervals: &[Interval],
        symbols: &[Symbol],
        force: bool,
    ) -> Result<Option<HashMap<(Symbol, Interval), usize>>, BackfillFailed> {
        if self.marker_exists() && !force {
            info!("backfill already completed, marker present");
            return Ok(None);
        }

        let result = self.backfill_all(years, intervals, symbols).await?;
        self.write_marker();
        Ok(Some(result))
    }

    pub fn marker_path(&self) -> &Path {
        &self.policy.marker_path
    }
}
