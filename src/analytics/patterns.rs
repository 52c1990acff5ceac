// =============================================================================
// Pattern detection (spec 4.5.2) — golden/death cross, RSI extremes, Bollinger
// breakouts, streaks, higher-highs/lower-lows, double top/bottom.
// =============================================================================

use crate::candle::Candle;

use super::indicators::{bollinger, rsi, sma};

const MIN_CANDLES: usize = 50;
const RECENT_WINDOW: usize = 10;
const DOUBLE_PATTERN_WINDOW: usize = 30;
const DOUBLE_PATTERN_MIN_SEPARATION: usize = 5;
const DOUBLE_PATTERN_TOLERANCE: f64 = 0.02;

/// Scaling constant applied to the bullish/bearish strength gap when folding
/// it into the 0..100 pattern score.
const ALPHA: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Bullish,
    Bearish,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectedPattern {
    pub name: &'static str,
    pub direction: Direction,
    pub strength: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PatternSummary {
    pub bullish_count: usize,
    pub bearish_count: usize,
    pub total: usize,
    pub score: f64,
    pub bullish_patterns: Vec<&'static str>,
    pub bearish_patterns: Vec<&'static str>,
}

impl PatternSummary {
    pub fn empty() -> Self {
        Self {
            bullish_count: 0,
            bearish_count: 0,
            total: 0,
            score: 50.0,
            bullish_patterns: Vec::new(),
            bearish_patterns: Vec::new(),
        }
    }

    /// `bullish` if more bullish patterns fired than bearish, `bearish` if
    /// the reverse, `neutral` otherwise (spec 4.5.2).
    pub fn signal(&self) -> Direction {
        if self.bullish_count > self.bearish_count {
            Direction::Bullish
        } else if self.bearish_count > self.bullish_count {
            Direction::Bearish
        } else {
            Direction::Neutral
        }
    }
}

/// Detect all patterns over the most recent window. Fewer than
/// [`MIN_CANDLES`] candles yields the neutral default summary.
pub fn detect(candles: &[Candle]) -> PatternSummary {
    if candles.len() < MIN_CANDLES {
        return PatternSummary::empty();
    }

    let closes: Vec<f64> = candles.iter().map(Candle::close_f64).collect();
    let current_price = *closes.last().unwrap();

    let mut found: Vec<DetectedPattern> = Vec::new();

    detect_cross(&closes, &mut found);
    detect_rsi_extreme(&closes, &mut found);
    detect_bollinger_breakout(&closes, current_price, &mut found);
    detect_streak(&closes, &mut found);
    detect_higher_highs_lower_lows(candles, &mut found);
    detect_double_pattern(candles, &mut found);

    summarize(found)
}

fn detect_cross(closes: &[f64], out: &mut Vec<DetectedPattern>) {
    let prev = &closes[..closes.len() - 1];
    let (Some(sma50), Some(sma200), Some(prev50), Some(prev200)) = (
        sma(closes, 50),
        sma(closes, 200),
        sma(prev, 50),
        sma(prev, 200),
    ) else {
        return;
    };

    if prev50 <= prev200 && sma50 > sma200 {
        out.push(DetectedPattern {
            name: "Golden Cross",
            direction: Direction::Bullish,
            strength: 80.0,
        });
    } else if prev50 >= prev200 && sma50 < sma200 {
        out.push(DetectedPattern {
            name: "Death Cross",
            direction: Direction::Bearish,
            strength: 80.0,
        });
    }
}

fn detect_rsi_extreme(closes: &[f64], out: &mut Vec<DetectedPattern>) {
    let Some(value) = rsi(closes, 14) else {
        return;
    };
    if value < 30.0 {
        out.push(DetectedPattern {
            name: "RSI Oversold",
            direction: Direction::Bullish,
            strength: 100.0 - (value / 30.0 * 100.0),
        });
    } else if value > 70.0 {
        out.push(DetectedPattern {
            name: "RSI Overbought",
            direction: Direction::Bearish,
            strength: (value - 70.0) / 30.0 * 100.0,
        });
    }
}

fn detect_bollinger_breakout(closes: &[f64], price: f64, out: &mut Vec<DetectedPattern>) {
    let Some(bb) = bollinger(closes, 20, 2.0, price) else {
        return;
    };
    if price > bb.upper {
        out.push(DetectedPattern {
            name: "BB Breakout Up",
            direction: Direction::Bullish,
            strength: 60.0,
        });
    } else if price < bb.lower {
        out.push(DetectedPattern {
            name: "BB Breakout Down",
            direction: Direction::Bearish,
            strength: 60.0,
        });
    }
}

/// Consecutive up/down run over the trailing window. Positive runs count
/// up-bars, negative runs count down-bars; an equal close leaves the streak
/// unchanged, and a reversal resets the counter to +-1.
fn count_streak(prices: &[f64]) -> i64 {
    if prices.len() < 2 {
        return 0;
    }
    let mut streak: i64 = 0;
    for w in prices.windows(2) {
        if w[1] > w[0] {
            streak = if streak >= 0 { streak + 1 } else { 1 };
        } else if w[1] < w[0] {
            streak = if streak <= 0 { streak - 1 } else { -1 };
        }
    }
    streak
}

fn detect_streak(closes: &[f64], out: &mut Vec<DetectedPattern>) {
    let window = &closes[closes.len().saturating_sub(RECENT_WINDOW)..];
    let streak = count_streak(window);
    if streak >= 5 {
        out.push(DetectedPattern {
            name: "Bullish Trend",
            direction: Direction::Bullish,
            strength: (streak as f64 * 15.0).min(100.0),
        });
    } else if streak <= -5 {
        out.push(DetectedPattern {
            name: "Bearish Trend",
            direction: Direction::Bearish,
            strength: (streak.unsigned_abs() as f64 * 15.0).min(100.0),
        });
    }
}

/// Length of the trailing run of strictly-increasing (or strictly-decreasing,
/// for lows) values, resetting to zero on every break.
fn trailing_run<F: Fn(f64, f64) -> bool>(values: &[f64], holds: F) -> usize {
    let mut count = 0usize;
    for w in values.windows(2) {
        if holds(w[0], w[1]) {
            count += 1;
        } else {
            count = 0;
        }
    }
    count
}

fn detect_higher_highs_lower_lows(candles: &[Candle], out: &mut Vec<DetectedPattern>) {
    let window = &candles[candles.len().saturating_sub(RECENT_WINDOW)..];
    let highs: Vec<f64> = window.iter().map(Candle::high_f64).collect();
    let lows: Vec<f64> = window.iter().map(Candle::low_f64).collect();

    let hh = trailing_run(&highs, |a, b| b > a);
    let ll = trailing_run(&lows, |a, b| b < a);

    if hh >= 3 {
        out.push(DetectedPattern {
            name: "Higher Highs",
            direction: Direction::Bullish,
            strength: (hh as f64 * 20.0).min(100.0),
        });
    }
    if ll >= 3 {
        out.push(DetectedPattern {
            name: "Lower Lows",
            direction: Direction::Bearish,
            strength: (ll as f64 * 20.0).min(100.0),
        });
    }
}

/// Indices of local maxima (or minima) in `values`, requiring two
/// lower/higher neighbors on each side.
fn local_extrema<F: Fn(f64, f64) -> bool>(values: &[f64], beats: F) -> Vec<(usize, f64)> {
    let mut out = Vec::new();
    if values.len() < 5 {
        return out;
    }
    for i in 2..values.len() - 2 {
        let v = values[i];
        if beats(v, values[i - 1])
            && beats(v, values[i - 2])
            && beats(v, values[i + 1])
            && beats(v, values[i + 2])
        {
            out.push((i, v));
        }
    }
    out
}

fn paired_within_tolerance(points: &[(usize, f64)]) -> bool {
    for i in 0..points.len() {
        for j in i + 1..points.len() {
            let (idx_a, val_a) = points[i];
            let (idx_b, _) = points[j];
            if (val_a - points[j].1).abs() / val_a < DOUBLE_PATTERN_TOLERANCE
                && idx_b - idx_a >= DOUBLE_PATTERN_MIN_SEPARATION
            {
                return true;
            }
        }
    }
    false
}

fn detect_double_pattern(candles: &[Candle], out: &mut Vec<DetectedPattern>) {
    let window = &candles[candles.len().saturating_sub(DOUBLE_PATTERN_WINDOW)..];
    if window.len() < 10 {
        return;
    }
    let highs: Vec<f64> = window.iter().map(Candle::high_f64).collect();
    let lows: Vec<f64> = window.iter().map(Candle::low_f64).collect();

    let peaks = local_extrema(&highs, |v, other| v > other);
    if paired_within_tolerance(&peaks) {
        out.push(DetectedPattern {
            name: "Double Top",
            direction: Direction::Bearish,
            strength: 70.0,
        });
        return;
    }

    let troughs = local_extrema(&lows, |v, other| v < other);
    if paired_within_tolerance(&troughs) {
        out.push(DetectedPattern {
            name: "Double Bottom",
            direction: Direction::Bullish,
            strength: 70.0,
        });
    }
}

fn summarize(found: Vec<DetectedPattern>) -> PatternSummary {
    let mut bullish_patterns = Vec::new();
    let mut bearish_patterns = Vec::new();
    let mut bullish_strength = 0.0;
    let mut bearish_strength = 0.0;

    for pattern in &found {
        match pattern.direction {
            Direction::Bullish => {
                bullish_patterns.push(pattern.name);
                bullish_strength += pattern.strength;
            }
            Direction::Bearish => {
                bearish_patterns.push(pattern.name);
                bearish_strength += pattern.strength;
            }
            // No detector ever emits a neutral-direction pattern; kept for
            // exhaustiveness with `PatternSummary::signal`'s tie case.
            Direction::Neutral => {}
        }
    }

    let score = (50.0 + ALPHA * (bullish_strength - bearish_strength)).clamp(0.0, 100.0);

    PatternSummary {
        bullish_count: bullish_patterns.len(),
        bearish_count: bearish_patterns.len(),
        total: found.len(),
        score,
        bullish_patterns,
        bearish_patterns,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn flat_candle(ts: i64, price: i64) -> Candle {
        let d = Decimal::from(price);
        Candle::new(ts, d, d, d, d, Decimal::from(1), None, None).unwrap()
    }

    #[test]
    fn fewer_than_minimum_candles_is_neutral() {
        let candles: Vec<Candle> = (0..10).map(|i| flat_candle(i, 100)).collect();
        let summary = detect(&candles);
        assert_eq!(summary.total, 0);
        assert_eq!(summary.score, 50.0);
    }

    #[test]
    fn count_streak_resets_on_reversal() {
        assert_eq!(count_streak(&[1.0, 2.0, 3.0, 4.0]), 3);
        assert_eq!(count_streak(&[4.0, 3.0, 2.0]), -2);
        assert_eq!(count_streak(&[1.0, 2.0, 1.0]), -1);
        assert_eq!(count_streak(&[1.0, 1.0, 1.0]), 0);
    }

    #[test]
    fn trailing_run_counts_consecutive_higher_highs() {
        let highs = vec![10.0, 11.0, 12.0, 13.0, 9.0, 14.0];
        assert_eq!(trailing_run(&highs, |a, b| b > a), 1);
        let all_up = vec![1.0, 2.0, 3.0, 4.0];
        assert_eq!(trailing_run(&all_up, |a, b| b > a), 3);
    }

    #[test]
    fn golden_cross_detected_on_sma_crossover() {
        let mut candles: Vec<Candle> = (0..200).map(|i| flat_candle(i, 100)).collect();
        candles.push(flat_candle(200, 10_000));
        let summary = detect(&candles);
        assert!(summary.bullish_patterns.contains(&"Golden Cross"));
    }

    #[test]
    fn death_cross_detected_on_sma_crossunder() {
        let mut candles: Vec<Candle> = (0..200).map(|i| flat_candle(i, 100)).collect();
        candles.push(flat_candle(200, 1));
        let summary = detect(&candles);
        assert!(summary.bearish_patterns.contains(&"Death Cross"));
    }

    #[test]
    fn sustained_downtrend_yields_bearish_patterns() {
        let candles: Vec<Candle> = (0..60)
            .map(|i| flat_candle(i, 200 - i))
            .collect();
        let summary = detect(&candles);
        assert!(summary.bearish_count > 0);
        assert!(summary.bullish_patterns.contains(&"RSI Oversold"));
        assert!(summary.score <= 50.0);
    }

    #[test]
    fn sustained_uptrend_yields_bullish_patterns() {
        let candles: Vec<Candle> = (0..60).map(|i| flat_candle(i, 100 + i)).collect();
        let summary = detect(&candles);
        assert!(summary.bullish_count > 0);
        assert!(summary.score >= 50.0);
    }

    #[test]
    fn score_is_clamped_to_0_100() {
        let found = vec![DetectedPattern {
            name: "Golden Cross",
            direction: Direction::Bullish,
            strength: 100_000.0,
        }];
        let summary = summarize(found);
        assert_eq!(summary.score, 100.0);
    }

    #[test]
    fn signal_reflects_pattern_counts() {
        let mut summary = PatternSummary::empty();
        summary.bullish_count = 2;
        summary.bearish_count = 1;
        assert_eq!(summary.signal(), Direction::Bullish);
        summary.bearish_count = 3;
        assert_eq!(summary.signal(), Direction::Bearish);
    }

    #[test]
    fn signal_is_neutral_on_a_tie() {
        let mut summary = PatternSummary::empty();
        assert_eq!(summary.signal(), Direction::Neutral);
        summary.bullish_count = 2;
        summary.bearish_count = 2;
        assert_eq!(summary.signal(), Direction::Neutral);
    }
}
