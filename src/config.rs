// =============================================================================
// Process configuration — single struct assembled once from the environment.
// =============================================================================

use std::time::Duration;

use crate::candle::{Interval, Symbol};

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    env_var(key)
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

fn default_symbols() -> Vec<Symbol> {
    vec![Symbol::new("BTC/USDT"), Symbol::new("ETH/USDT")]
}

fn default_intervals() -> Vec<Interval> {
    vec![Interval::D1, Interval::H4, Interval::H1]
}

/// Process-wide configuration, loaded once from the environment (spec §6).
#[derive(Debug, Clone)]
pub struct Config {
    pub symbols: Vec<Symbol>,
    pub backfill_years: u32,
    pub backfill_intervals: Vec<Interval>,
    pub fetch_timeout: Duration,
    pub rate_limit_base_delay: Duration,
    pub rate_limit_max_delay: Duration,
    pub rate_limit_max_retries: u32,
    pub stream_fallback_timeout: Duration,
    pub stream_max_errors_before_fallback: u32,
    pub stream_rest_poll_interval: Duration,
    pub backfill_marker_path: String,
}

impl Config {
    /// Assemble configuration from environment variables, falling back to
    /// the documented defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let symbols = env_var("SYMBOLS")
            .map(|raw| raw.split(',').map(Symbol::new).collect::<Vec<_>>())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_symbols);

        let backfill_intervals = env_var("BACKFILL_INTERVALS")
            .map(|raw| {
                raw.split(',')
                    .filter_map(|tok| Interval::parse(tok.trim()))
                    .collect::<Vec<_>>()
            })
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_intervals);

        Self {
            symbols,
            backfill_years: parse_env("BACKFILL_CRYPTO_YEARS", 10),
            backfill_intervals,
            fetch_timeout: Duration::from_secs(parse_env("FETCH_TIMEOUT_SEC", 10)),
            rate_limit_base_delay: Duration::from_secs(parse_env(
                "RATE_LIMIT_BASE_DELAY_SEC",
                5,
            )),
            rate_limit_max_delay: Duration::from_secs(parse_env("RATE_LIMIT_MAX_DELAY_SEC", 60)),
            rate_limit_max_retries: parse_env("RATE_LIMIT_MAX_RETRIES", 3),
            stream_fallback_timeout: Duration::from_secs(parse_env(
                "STREAM_FALLBACK_TIMEOUT_SEC",
                30,
            )),
            stream_max_errors_before_fallback: parse_env(
                "STREAM_MAX_ERRORS_BEFORE_FALLBACK",
                3,
            ),
            stream_rest_poll_interval: Duration::from_secs(parse_env(
                "STREAM_REST_POLL_INTERVAL_SEC",
                60,
            )),
            backfill_marker_path: env_var("BACKFILL_MARKER_PATH")
                .unwrap_or_else(|| "./backfill.marker".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment variables are process-global; serialize the tests that
    // touch them so they don't race each other.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_all() {
        for key in [
            "SYMBOLS",
            "BACKFILL_CRYPTO_YEARS",
            "BACKFILL_INTERVALS",
            "FETCH_TIMEOUT_SEC",
            "RATE_LIMIT_BASE_DELAY_SEC",
            "RATE_LIMIT_MAX_DELAY_SEC",
            "RATE_LIMIT_MAX_RETRIES",
            "STREAM_FALLBACK_TIMEOUT_SEC",
            "STREAM_MAX_ERRORS_BEFORE_FALLBACK",
            "STREAM_REST_POLL_INTERVAL_SEC",
            "BACKFILL_MARKER_PATH",
        ] {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn defaults_match_spec_table() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_all();
        let cfg = Config::from_env();
        assert_eq!(cfg.backfill_years, 10);
        assert_eq!(cfg.backfill_intervals, vec![Interval::D1, Interval::H4, Interval::H1]);
        assert_eq!(cfg.fetch_timeout, Duration::from_secs(10));
        assert_eq!(cfg.rate_limit_base_delay, Duration::from_secs(5));
        assert_eq!(cfg.rate_limit_max_delay, Duration::from_secs(60));
        assert_eq!(cfg.rate_limit_max_retries, 3);
        assert_eq!(cfg.stream_fallback_timeout, Duration::from_secs(30));
        assert_eq!(cfg.stream_max_errors_before_fallback, 3);
        assert_eq!(cfg.stream_rest_poll_interval, Duration::from_secs(60));
    }

    #[test]
    fn symbols_parsed_from_csv() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_all();
        std::env::set_var("SYMBOLS", "btc/usdt, eth/usdt,sol/usdt");
        let cfg = Config::from_env();
        assert_eq!(
            cfg.symbols,
            vec![
                Symbol::new("BTC/USDT"),
                Symbol::new("ETH/USDT"),
                Symbol::new("SOL/USDT")
            ]
        );
        clear_all();
    }

    #[test]
    fn malformed_numeric_env_falls_back_to_default() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_all();
        std::env::set_var("RATE_LIMIT_MAX_RETRIES", "not-a-number");
        let cfg = Config::from_env();
        assert_eq!(cfg.rate_limit_max_retries, 3);
        clear_all();
    }
}
