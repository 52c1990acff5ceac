// =============================================================================
// Composite scoring engine (spec 4.5.4) — weighted fusion of six signal
// components into a single bounded score, signal class, action, and risk.
// =============================================================================

use super::cycle::{CycleInfo, RiskLevel};
use super::patterns::PatternSummary;

const WEIGHT_TECHNICAL: f64 = 0.30;
const WEIGHT_PATTERNS: f64 = 0.20;
const WEIGHT_CYCLE: f64 = 0.15;
const WEIGHT_DERIVATIVES: f64 = 0.15;
const WEIGHT_FEAR_GREED: f64 = 0.10;
const WEIGHT_ONCHAIN: f64 = 0.10;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TechnicalIndicators {
    pub price: f64,
    pub rsi: Option<f64>,
    pub sma_50: Option<f64>,
    pub sma_200: Option<f64>,
    pub macd_histogram: Option<f64>,
    pub bb_position: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DerivativesInputs {
    pub funding_rate: Option<f64>,
    pub long_short_ratio: Option<f64>,
    pub oi_change_24h: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct OnchainInputs {
    pub mvrv: Option<f64>,
    pub exchange_reserves_change_pct: Option<f64>,
}

/// The six scoring components, each optional so a caller missing a whole
/// upstream feed (e.g. no on-chain provider configured) can omit it; the
/// weighted average renormalizes over whatever is present (spec 4.5.4).
#[derive(Debug, Clone, Default)]
pub struct CompositeInputs {
    pub technical: Option<TechnicalIndicators>,
    pub patterns: Option<PatternSummary>,
    pub cycle: Option<CycleInfo>,
    pub derivatives: Option<DerivativesInputs>,
    pub fear_greed: Option<u8>,
    pub onchain: Option<OnchainInputs>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentSignal {
    Bullish,
    Bearish,
    Neutral,
}

impl ComponentSignal {
    fn from_score(score: f64) -> Self {
        if score >= 60.0 {
            Self::Bullish
        } else if score <= 40.0 {
            Self::Bearish
        } else {
            Self::Neutral
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComponentScore {
    pub name: &'static str,
    pub weight: f64,
    pub score: f64,
    pub weighted_score: f64,
    pub signal: ComponentSignal,
    pub details: String,
}

impl ComponentScore {
    fn new(name: &'static str, weight: f64, score: f64, details: String) -> Self {
        let score = score.clamp(0.0, 100.0);
        Self {
            name,
            weight,
            score,
            weighted_score: score * weight,
            signal: ComponentSignal::from_score(score),
            details,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    StrongBullish,
    Bullish,
    SlightlyBullish,
    Neutral,
    SlightlyBearish,
    Bearish,
    StrongBearish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    StrongBuy,
    Buy,
    Hold,
    Sell,
    StrongSell,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompositeScore {
    pub total_score: f64,
    pub signal: Signal,
    pub action: Action,
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    pub confidence: f64,
    pub components: Vec<ComponentScore>,
}

fn score_technical(ind: &TechnicalIndicators) -> f64 {
    let mut score = 50.0;

    if let Some(rsi) = ind.rsi {
        if rsi < 30.0 {
            score += 12.5;
        } else if rsi < 45.0 {
            score += 6.0;
        } else if rsi > 70.0 {
            score -= 12.5;
        } else if rsi > 55.0 {
            score -= 6.0;
        }
    }

    if let Some(sma_200) = ind.sma_200 {
        score += if ind.price > sma_200 { 12.5 } else { -12.5 };
    }

    if let (Some(sma_50), Some(sma_200)) = (ind.sma_50, ind.sma_200) {
        score += if sma_50 > sma_200 { 10.0 } else { -10.0 };
    }

    if let Some(histogram) = ind.macd_histogram {
        score += if histogram > 0.0 { 7.5 } else { -7.5 };
    }

    if let Some(bb_position) = ind.bb_position {
        if bb_position < 20.0 {
            score += 7.5;
        } else if bb_position > 80.0 {
            score -= 7.5;
        }
    }

    score
}

fn score_derivatives(d: &DerivativesInputs) -> f64 {
    let mut score = 50.0;

    if let Some(funding) = d.funding_rate {
        if funding > 0.0005 {
            score -= 15.0;
        } else if funding < -0.0002 {
            score += 15.0;
        }
    }

    if let Some(ratio) = d.long_short_ratio {
        if ratio > 1.5 {
            score -= 10.0;
        } else if ratio < 0.67 {
            score += 10.0;
        }
    }

    score
}

fn score_fear_greed(value: u8) -> f64 {
    let value = value as f64;
    if value < 25.0 {
        80.0
    } else if value < 45.0 {
        65.0
    } else if value > 75.0 {
        20.0
    } else if value > 55.0 {
        35.0
    } else {
        50.0
    }
}

fn score_onchain(o: &OnchainInputs) -> f64 {
    let mut score = 50.0;

    if let Some(mvrv) = o.mvrv {
        if mvrv < 1.0 {
            score += 15.0;
        } else if mvrv > 3.5 {
            score -= 15.0;
        }
    }

    if let Some(change) = o.exchange_reserves_change_pct {
        if change < -5.0 {
            score += 10.0;
        } else if change > 5.0 {
            score -= 10.0;
        }
    }

    score
}

/// Ordered decision table over the aggregated score (spec 4.5.4). A score in
/// the narrow gap just outside the named neutral band (45, 46) falls back to
/// neutral/hold rather than being left unclassified.
fn classify_total(total: f64) -> (Signal, Action) {
    if total >= 75.0 {
        (Signal::StrongBullish, Action::StrongBuy)
    } else if total >= 60.0 {
        (Signal::Bullish, Action::Buy)
    } else if total >= 55.0 {
        (Signal::SlightlyBullish, Action::Buy)
    } else if total >= 46.0 {
        (Signal::Neutral, Action::Hold)
    } else if total <= 25.0 {
        (Signal::StrongBearish, Action::StrongSell)
    } else if total <= 40.0 {
        (Signal::Bearish, Action::Sell)
    } else if total <= 45.0 {
        (Signal::SlightlyBearish, Action::Sell)
    } else {
        (Signal::Neutral, Action::Hold)
    }
}

fn risk_level_for(risk_score: f64) -> RiskLevel {
    if risk_score > 70.0 {
        RiskLevel::High
    } else if risk_score > 40.0 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

/// Fuse the six components into a single [`CompositeScore`] (spec 4.5.4).
/// Components missing from `inputs` are dropped from both the numerator and
/// the weight denominator, so the weighted average always reflects only the
/// signals actually supplied.
pub fn compute_composite(inputs: &CompositeInputs) -> CompositeScore {
    let mut components = Vec::with_capacity(6);

    if let Some(technical) = &inputs.technical {
        components.push(ComponentScore::new(
            "technical",
            WEIGHT_TECHNICAL,
            score_technical(technical),
            format!(
                "rsi={:?} sma50={:?} sma200={:?} macd_hist={:?} bb_pos={:?}",
                technical.rsi,
                technical.sma_50,
                technical.sma_200,
                technical.macd_histogram,
                technical.bb_position
            ),
        ));
    }
    if let Some(patterns) = &inputs.patterns {
        components.push(ComponentScore::new(
            "patterns",
            WEIGHT_PATTERNS,
            patterns.score,
            format!(
                "{} bullish / {} bearish pattern(s) of {}",
                patterns.bullish_count, patterns.bearish_count, patterns.total
            ),
        ));
    }
    if let Some(cycle) = &inputs.cycle {
        components.push(ComponentScore::new(
            "cycle",
            WEIGHT_CYCLE,
            cycle.phase.score(),
            format!("phase={}", cycle.phase.label()),
        ));
    }
    if let Some(derivatives) = &inputs.derivatives {
        components.push(ComponentScore::new(
            "derivatives",
            WEIGHT_DERIVATIVES,
            score_derivatives(derivatives),
            format!(
                "funding_rate={:?} long_short_ratio={:?} oi_change_24h={:?}",
                derivatives.funding_rate, derivatives.long_short_ratio, derivatives.oi_change_24h
            ),
        ));
    }
    if let Some(fear_greed) = inputs.fear_greed {
        components.push(ComponentScore::new(
            "fear_greed",
            WEIGHT_FEAR_GREED,
            score_fear_greed(fear_greed),
            format!("index={fear_greed}"),
        ));
    }
    if let Some(onchain) = &inputs.onchain {
        components.push(ComponentScore::new(
            "onchain",
            WEIGHT_ONCHAIN,
            score_onchain(onchain),
            format!(
                "mvrv={:?} exchange_reserves_change_pct={:?}",
                onchain.mvrv, onchain.exchange_reserves_change_pct
            ),
        ));
    }

    let weight_total: f64 = components.iter().map(|c| c.weight).sum();
    let total_score = if weight_total > 0.0 {
        components.iter().map(|c| c.weighted_score).sum::<f64>() / weight_total
    } else {
        50.0
    };

    let (signal, action) = classify_total(total_score);
    let risk_score = 100.0 - total_score;
    let risk_level = risk_level_for(risk_score);

    let bullish_count = components
        .iter()
        .filter(|c| c.signal == ComponentSignal::Bullish)
        .count();
    let bearish_count = components
        .iter()
        .filter(|c| c.signal == ComponentSignal::Bearish)
        .count();
    let non_neutral = bullish_count + bearish_count;
    let confidence = if non_neutral == 0 {
        50.0
    } else {
        (bullish_count.max(bearish_count) as f64 / non_neutral as f64) * 100.0
    };

    CompositeScore {
        total_score,
        signal,
        action,
        risk_score,
        risk_level,
        confidence,
        components,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::cycle::CyclePhase;

    fn bullish_technical() -> TechnicalIndicators {
        TechnicalIndicators {
            price: 110.0,
            rsi: Some(25.0),
            sma_50: Some(105.0),
            sma_200: Some(100.0),
            macd_histogram: Some(1.0),
            bb_position: Some(10.0),
        }
    }

    fn bearish_technical() -> TechnicalIndicators {
        TechnicalIndicators {
            price: 90.0,
            rsi: Some(75.0),
            sma_50: Some(95.0),
            sma_200: Some(100.0),
            macd_histogram: Some(-1.0),
            bb_position: Some(90.0),
        }
    }

    fn cycle_info(phase: CyclePhase) -> CycleInfo {
        CycleInfo {
            phase,
            distance_from_ath_pct: 10.0,
            distance_from_atl_pct: 200.0,
            days_since_halving: 400,
            cycle_position: 27.0,
            confidence: 70.0,
            risk_level: phase.risk_level(),
        }
    }

    #[test]
    fn technical_all_bullish_signals_clamp_to_100() {
        assert_eq!(score_technical(&bullish_technical()), 100.0);
    }

    #[test]
    fn technical_all_bearish_signals_clamp_to_0() {
        assert_eq!(score_technical(&bearish_technical()), 0.0);
    }

    #[test]
    fn technical_missing_fields_stay_neutral() {
        assert_eq!(score_technical(&TechnicalIndicators::default()), 50.0);
    }

    #[test]
    fn fear_greed_buckets_match_table() {
        assert_eq!(score_fear_greed(10), 80.0);
        assert_eq!(score_fear_greed(40), 65.0);
        assert_eq!(score_fear_greed(50), 50.0);
        assert_eq!(score_fear_greed(60), 35.0);
        assert_eq!(score_fear_greed(90), 20.0);
    }

    #[test]
    fn missing_component_is_excluded_from_denominator() {
        let inputs = CompositeInputs {
            technical: Some(bullish_technical()),
            ..Default::default()
        };
        let result = compute_composite(&inputs);
        assert_eq!(result.components.len(), 1);
        assert_eq!(result.total_score, 100.0);
    }

    #[test]
    fn all_components_pruned_yields_neutral_default() {
        let result = compute_composite(&CompositeInputs::default());
        assert_eq!(result.total_score, 50.0);
        assert_eq!(result.signal, Signal::Neutral);
        assert_eq!(result.action, Action::Hold);
        assert_eq!(result.confidence, 50.0);
    }

    #[test]
    fn strong_bullish_classification_at_high_total() {
        let inputs = CompositeInputs {
            technical: Some(bullish_technical()),
            cycle: Some(cycle_info(CyclePhase::Capitulation)),
            fear_greed: Some(5),
            ..Default::default()
        };
        let result = compute_composite(&inputs);
        assert!(result.total_score >= 75.0);
        assert_eq!(result.signal, Signal::StrongBullish);
        assert_eq!(result.action, Action::StrongBuy);
        assert_eq!(result.risk_level, RiskLevel::Low);
    }

    #[test]
    fn strong_bearish_classification_at_low_total() {
        let inputs = CompositeInputs {
            technical: Some(bearish_technical()),
            cycle: Some(cycle_info(CyclePhase::Euphoria)),
            fear_greed: Some(95),
            ..Default::default()
        };
        let result = compute_composite(&inputs);
        assert!(result.total_score <= 25.0);
        assert_eq!(result.signal, Signal::StrongBearish);
        assert_eq!(result.action, Action::StrongSell);
        assert_eq!(result.risk_level, RiskLevel::High);
    }

    #[test]
    fn confidence_reflects_majority_direction() {
        let inputs = CompositeInputs {
            technical: Some(bullish_technical()),
            derivatives: Some(DerivativesInputs {
                funding_rate: Some(0.001),
                long_short_ratio: None,
                oi_change_24h: None,
            }),
            ..Default::default()
        };
        let result = compute_composite(&inputs);
        assert_eq!(result.confidence, 100.0);
    }

    #[test]
    fn weighted_score_invariant_holds_for_every_component() {
        let inputs = CompositeInputs {
            technical: Some(bullish_technical()),
            patterns: Some(PatternSummary::empty()),
            cycle: Some(cycle_info(CyclePhase::BullRun)),
            derivatives: Some(DerivativesInputs::default()),
            fear_greed: Some(50),
            onchain: Some(OnchainInputs::default()),
        };
        let result = compute_composite(&inputs);
        assert_eq!(result.components.len(), 6);
        for c in &result.components {
            assert!((c.weighted_score - c.score * c.weight).abs() < 1e-9);
        }
    }
}
