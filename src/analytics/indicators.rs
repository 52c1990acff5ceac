// =============================================================================
// Technical indicators — SMA, EMA, Wilder's RSI, MACD, Bollinger Bands.
// =============================================================================
//
// Indicator math runs in `f64`; callers convert from the exact `Decimal`
// candle boundary with `Candle::close_f64` before calling in here.

/// Arithmetic mean of the last `n` closes. `None` if fewer than `n` closes.
pub fn sma(closes: &[f64], n: usize) -> Option<f64> {
    if n == 0 || closes.len() < n {
        return None;
    }
    let window = &closes[closes.len() - n..];
    Some(window.iter().sum::<f64>() / n as f64)
}

/// Full SMA series: one value per window ending at each index `>= n - 1`.
pub fn sma_series(closes: &[f64], n: usize) -> Vec<f64> {
    if n == 0 || closes.len() < n {
        return Vec::new();
    }
    closes
        .windows(n)
        .map(|w| w.iter().sum::<f64>() / n as f64)
        .collect()
}

/// EMA series with smoothing `2/(n+1)`, seeded with SMA(n) at position
/// `n - 1` (spec §4.5.1).
pub fn ema_series(closes: &[f64], n: usize) -> Vec<f64> {
    if n == 0 || closes.len() < n {
        return Vec::new();
    }

    let multiplier = 2.0 / (n + 1) as f64;
    let seed = closes[..n].iter().sum::<f64>() / n as f64;

    let mut result = Vec::with_capacity(closes.len() - n + 1);
    result.push(seed);

    let mut prev = seed;
    for &close in &closes[n..] {
        let value = close * multiplier + prev * (1.0 - multiplier);
        if !value.is_finite() {
            break;
        }
        result.push(value);
        prev = value;
    }
    result
}

/// Most recent EMA(n) value, if enough data is present.
pub fn ema(closes: &[f64], n: usize) -> Option<f64> {
    ema_series(closes, n).last().copied()
}

/// Wilder's RSI(period), seeded with simple averages of the first `period`
/// gains/losses and recursively smoothed with factor `1/period` thereafter.
pub fn rsi_series(closes: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || closes.len() < period + 1 {
        return Vec::new();
    }

    let deltas: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();

    let (sum_gain, sum_loss) = deltas[..period]
        .iter()
        .fold((0.0_f64, 0.0_f64), |(g, l), &d| {
            if d > 0.0 {
                (g + d, l)
            } else {
                (g, l + d.abs())
            }
        });

    let period_f = period as f64;
    let mut avg_gain = sum_gain / period_f;
    let mut avg_loss = sum_loss / period_f;

    let Some(first) = rsi_from_averages(avg_gain, avg_loss) else {
        return Vec::new();
    };

    let mut result = Vec::with_capacity(deltas.len() - period + 1);
    result.push(first);

    for &delta in &deltas[period..] {
        let gain = delta.max(0.0);
        let loss = (-delta).max(0.0);
        avg_gain = (avg_gain * (period_f - 1.0) + gain) / period_f;
        avg_loss = (avg_loss * (period_f - 1.0) + loss) / period_f;

        match rsi_from_averages(avg_gain, avg_loss) {
            Some(value) => result.push(value),
            None => break,
        }
    }

    result
}

pub fn rsi(closes: &[f64], period: usize) -> Option<f64> {
    rsi_series(closes, period).last().copied()
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> Option<f64> {
    let value = if avg_gain == 0.0 && avg_loss == 0.0 {
        50.0
    } else if avg_loss == 0.0 {
        100.0
    } else {
        let rs = avg_gain / avg_loss;
        100.0 - 100.0 / (1.0 + rs)
    };
    value.is_finite().then_some(value)
}

/// MACD line/signal/histogram (spec §4.5.1): `line = EMA12 - EMA26`,
/// `signal = EMA9 of line`, `histogram = line - signal`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Macd {
    pub line: f64,
    pub signal: f64,
    pub histogram: f64,
}

pub fn macd(closes: &[f64]) -> Option<Macd> {
    let ema12 = ema_series(closes, 12);
    let ema26 = ema_series(closes, 26);
    if ema12.is_empty() || ema26.is_empty() {
        return None;
    }

    // Align the two series on their tail: EMA26 starts later than EMA12,
    // so the overlapping line values correspond to EMA12's last `ema26.len()`
    // entries.
    let offset = ema12.len().checked_sub(ema26.len())?;
    let line_series: Vec<f64> = ema26
        .iter()
        .enumerate()
        .map(|(i, &e26)| ema12[offset + i] - e26)
        .collect();

    let signal_series = ema_series(&line_series, 9);
    let signal = *signal_series.last()?;
    let line = *line_series.last()?;

    Some(Macd {
        line,
        signal,
        histogram: line - signal,
    })
}

/// Bollinger Bands(period, num_std): `middle = SMA`, `std` is the **sample**
/// standard deviation (divisor `n - 1`) of the window, and `position` is the
/// price's location between the bands, clamped to `[0, 100]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bollinger {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
    pub position: f64,
}

pub fn bollinger(closes: &[f64], period: usize, num_std: f64, price: f64) -> Option<Bollinger> {
    if period < 2 || closes.len() < period {
        return None;
    }

    let window = &closes[closes.len() - period..];
    let middle = window.iter().sum::<f64>() / period as f64;

    let variance =
        window.iter().map(|x| (x - middle).powi(2)).sum::<f64>() / (period as f64 - 1.0);
    let std_dev = variance.sqrt();

    let upper = middle + num_std * std_dev;
    let lower = middle - num_std * std_dev;

    if !upper.is_finite() || !lower.is_finite() {
        return None;
    }

    let position = if (upper - lower).abs() < f64::EPSILON {
        50.0
    } else {
        (((price - lower) / (upper - lower)) * 100.0).clamp(0.0, 100.0)
    };

    Some(Bollinger {
        upper,
        middle,
        lower,
        position,
    })
}
