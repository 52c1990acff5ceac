// =============================================================================
// Market-cycle phase classifier (spec 4.5.3) — ordered decision table over
// distance-from-ATH/ATL, halving timing, and optional RSI.
// =============================================================================

use chrono::NaiveDate;

/// Known Bitcoin halving dates, used only to derive `days_since_halving` for
/// callers that don't already track it themselves.
const HALVING_DATES: &[(i32, u32, u32)] = &[
    (2012, 11, 28),
    (2016, 7, 9),
    (2020, 5, 11),
    (2024, 4, 20),
    (2028, 4, 15),
];

const CYCLE_LENGTH_DAYS: f64 = 1460.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CyclePhase {
    Euphoria,
    BullRun,
    Distribution,
    Capitulation,
    EarlyBull,
    BearMarket,
    EarlyBear,
    Accumulation,
    Unknown,
}

impl CyclePhase {
    pub fn label(self) -> &'static str {
        match self {
            Self::Euphoria => "euphoria",
            Self::BullRun => "bull_run",
            Self::Distribution => "distribution",
            Self::Capitulation => "capitulation",
            Self::EarlyBull => "early_bull",
            Self::BearMarket => "bear_market",
            Self::EarlyBear => "early_bear",
            Self::Accumulation => "accumulation",
            Self::Unknown => "unknown",
        }
    }

    /// Static per-phase risk table (spec 4.5.3). `Unknown` falls back to
    /// medium, matching the neutral default used everywhere else a phase is
    /// ambiguous.
    pub fn risk_level(self) -> RiskLevel {
        match self {
            Self::Accumulation | Self::EarlyBull | Self::Capitulation => RiskLevel::Low,
            Self::BullRun | Self::Distribution | Self::EarlyBear | Self::BearMarket => {
                RiskLevel::Medium
            }
            Self::Euphoria => RiskLevel::High,
            Self::Unknown => RiskLevel::Medium,
        }
    }

    /// Composite-scoring table lookup (spec 4.5.4).
    pub fn score(self) -> f64 {
        match self {
            Self::Capitulation => 85.0,
            Self::Accumulation => 75.0,
            Self::EarlyBull => 70.0,
            Self::BullRun => 60.0,
            Self::Unknown => 50.0,
            Self::EarlyBear => 40.0,
            Self::Distribution => 35.0,
            Self::BearMarket => 45.0,
            Self::Euphoria => 30.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CycleInfo {
    pub phase: CyclePhase,
    pub distance_from_ath_pct: f64,
    pub distance_from_atl_pct: f64,
    pub days_since_halving: i64,
    pub cycle_position: f64,
    pub confidence: f64,
    pub risk_level: RiskLevel,
}

/// Ordered decision table, first match wins (spec 4.5.3). `ath`/`atl` must
/// be positive; callers are expected to hold a live running max/min.
pub fn classify_phase(
    distance_from_ath_pct: f64,
    days_since_halving: i64,
    rsi: Option<f64>,
) -> CyclePhase {
    if distance_from_ath_pct <= 3.0 {
        return CyclePhase::Euphoria;
    }
    if distance_from_ath_pct <= 20.0 && days_since_halving <= 730 {
        return CyclePhase::BullRun;
    }
    if distance_from_ath_pct <= 20.0 {
        return CyclePhase::Distribution;
    }
    if let Some(rsi) = rsi {
        if rsi < 30.0 && distance_from_ath_pct >= 60.0 && days_since_halving >= 540 {
            return CyclePhase::Capitulation;
        }
    }
    if (180..=365).contains(&days_since_halving) && distance_from_ath_pct >= 30.0 {
        return CyclePhase::EarlyBull;
    }
    if days_since_halving >= 720 && distance_from_ath_pct >= 50.0 {
        return CyclePhase::BearMarket;
    }
    if (540..=730).contains(&days_since_halving) && distance_from_ath_pct >= 40.0 {
        return CyclePhase::EarlyBear;
    }
    if distance_from_ath_pct >= 50.0 {
        return CyclePhase::Accumulation;
    }
    CyclePhase::Unknown
}

/// `(days_since_halving mod 1460) / 1460 * 100`.
pub fn cycle_position(days_since_halving: i64) -> f64 {
    let wrapped = days_since_halving.rem_euclid(CYCLE_LENGTH_DAYS as i64);
    wrapped as f64 / CYCLE_LENGTH_DAYS * 100.0
}

/// Full classification over `current_price`/`ath`/`atl`/`days_since_halving`
/// and optional `rsi` (spec 4.5.3).
pub fn classify(current_price: f64, ath: f64, atl: f64, days_since_halving: i64, rsi: Option<f64>) -> CycleInfo {
    let distance_from_ath_pct = (ath - current_price) / ath * 100.0;
    let distance_from_atl_pct = (current_price - atl) / atl * 100.0;

    let phase = classify_phase(distance_from_ath_pct, days_since_halving, rsi);
    let confidence = if rsi.is_some() { 70.0 } else { 50.0 };

    CycleInfo {
        phase,
        distance_from_ath_pct,
        distance_from_atl_pct,
        days_since_halving,
        cycle_position: cycle_position(days_since_halving),
        confidence,
        risk_level: phase.risk_level(),
    }
}

/// `(last_halving, next_halving, days_since, days_to_next)` relative to
/// `today`, derived from the known halving calendar. A pure convenience for
/// callers that only have wall-clock time, not a pre-tracked halving date.
pub fn halving_info(today: NaiveDate) -> (NaiveDate, NaiveDate, i64, i64) {
    let dates: Vec<NaiveDate> = HALVING_DATES
        .iter()
        .map(|&(y, m, d)| NaiveDate::from_ymd_opt(y, m, d).expect("static halving date is valid"))
        .collect();

    let last = dates
        .iter()
        .rev()
        .find(|d| **d <= today)
        .copied()
        .unwrap_or(dates[0]);
    let next = dates
        .iter()
        .find(|d| **d > today)
        .copied()
        .unwrap_or(*dates.last().unwrap());

    let days_since = (today - last).num_days();
    let days_to_next = (next - today).num_days();
    (last, next, days_since, days_to_next)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pct_from_ath(ath: f64, price: f64) -> f64 {
        (ath - price) / ath * 100.0
    }

    #[test]
    fn euphoria_near_ath() {
        let dist = pct_from_ath(109_000.0, 109_000.0 * 0.97);
        assert_eq!(classify_phase(dist, 500, None), CyclePhase::Euphoria);
    }

    #[test]
    fn bull_run_within_20_pct_early_cycle() {
        let dist = pct_from_ath(109_000.0, 109_000.0 * 0.85);
        assert_eq!(classify_phase(dist, 400, None), CyclePhase::BullRun);
    }

    #[test]
    fn distribution_within_20_pct_late_cycle() {
        let dist = pct_from_ath(109_000.0, 109_000.0 * 0.85);
        assert_eq!(classify_phase(dist, 800, None), CyclePhase::Distribution);
    }

    #[test]
    fn accumulation_far_from_ath() {
        let dist = pct_from_ath(109_000.0, 109_000.0 * 0.15);
        assert_eq!(classify_phase(dist, 100, None), CyclePhase::Accumulation);
    }

    #[test]
    fn capitulation_with_low_rsi() {
        let dist = pct_from_ath(109_000.0, 109_000.0 * 0.15);
        assert_eq!(
            classify_phase(dist, 900, Some(25.0)),
            CyclePhase::Capitulation
        );
    }

    #[test]
    fn early_bull_after_halving() {
        let dist = pct_from_ath(109_000.0, 109_000.0 * 0.6);
        assert_eq!(classify_phase(dist, 250, None), CyclePhase::EarlyBull);
    }

    #[test]
    fn bear_market_late_cycle() {
        let dist = pct_from_ath(109_000.0, 109_000.0 * 0.35);
        assert_eq!(classify_phase(dist, 900, None), CyclePhase::BearMarket);
    }

    #[test]
    fn early_bear_mid_cycle() {
        let dist = pct_from_ath(109_000.0, 109_000.0 * 0.45);
        assert_eq!(classify_phase(dist, 700, None), CyclePhase::EarlyBear);
    }

    #[test]
    fn cycle_position_at_halving_is_zero() {
        assert_eq!(cycle_position(0), 0.0);
    }

    #[test]
    fn cycle_position_mid_cycle_is_near_50() {
        let pos = cycle_position(730);
        assert!((45.0..55.0).contains(&pos));
    }

    #[test]
    fn cycle_position_wraps_past_full_cycle() {
        let pos = cycle_position(1500);
        assert!(pos < 10.0);
    }

    #[test]
    fn confidence_is_higher_with_rsi() {
        let without = classify(50_000.0, 109_000.0, 15_500.0, 400, None);
        let with = classify(50_000.0, 109_000.0, 15_500.0, 400, Some(50.0));
        assert_eq!(without.confidence, 50.0);
        assert_eq!(with.confidence, 70.0);
    }

    #[test]
    fn price_exactly_at_ath_is_euphoria() {
        let info = classify(100_000.0, 100_000.0, 15_000.0, 500, None);
        assert_eq!(info.distance_from_ath_pct, 0.0);
        assert_eq!(info.phase, CyclePhase::Euphoria);
    }

    #[test]
    fn price_above_recorded_ath_is_still_euphoria() {
        let info = classify(120_000.0, 100_000.0, 15_000.0, 500, None);
        assert!(info.distance_from_ath_pct < 0.0);
        assert_eq!(info.phase, CyclePhase::Euphoria);
    }

    #[test]
    fn halving_info_for_early_2025_matches_known_calendar() {
        let today = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let (last, next, _, _) = halving_info(today);
        assert_eq!(last, NaiveDate::from_ymd_opt(2024, 4, 20).unwrap());
        assert_eq!(next, NaiveDate::from_ymd_opt(2028, 4, 15).unwrap());
    }

    #[test]
    fn unknown_phase_risk_defaults_to_medium() {
        assert_eq!(CyclePhase::Unknown.risk_level(), RiskLevel::Medium);
    }
}
