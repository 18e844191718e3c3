//! Confluence scoring
//!
//! Ranks competing simultaneous signals with a weighted agreement score in
//! [0, 100]. A direction whose trend driver disagrees scores zero outright.

use tracing::debug;

use crate::config::{ConfluenceConfig, OscillatorFilterConfig};
use crate::filters::MasterTrendFilter;
use crate::snapshot::IndicatorSnapshot;
use crate::types::Direction;

#[derive(Debug, Clone)]
pub struct ConfluenceScorer {
    config: ConfluenceConfig,
    oscillator: OscillatorFilterConfig,
}

impl ConfluenceScorer {
    pub fn new(config: ConfluenceConfig, oscillator: OscillatorFilterConfig) -> Self {
        Self { config, oscillator }
    }

    pub fn min_score(&self) -> i32 {
        self.config.min_score
    }

    /// Score a proposed direction against the current snapshot.
    ///
    /// Weights: trend agreement +40 (disagreement is a hard veto), momentum
    /// +30/−15, ADX strength +20/+10/−20, oscillator alignment +10/−40
    /// (flat +10 bonus when the filter is disabled). Clamped to [0, 100].
    pub fn score(
        &self,
        direction: Direction,
        snap: &IndicatorSnapshot,
        trend_filter: &MasterTrendFilter,
    ) -> i32 {
        if !direction.is_signal() {
            return 0;
        }

        if !self.trend_agrees(direction, snap, trend_filter) {
            debug!(direction = %direction, "confluence hard veto: trend disagrees");
            return 0;
        }
        let mut score: i32 = 40;

        if self.momentum_agrees(direction, snap) {
            score += 30;
        } else {
            score -= 15;
        }

        match snap.adx.current() {
            Some(adx) if adx > 35.0 => score += 20,
            Some(adx) if adx > self.config.adx_threshold => score += 10,
            Some(adx) if adx < 20.0 => score -= 20,
            _ => {}
        }

        if self.oscillator.enabled {
            if self.oscillator_agrees(direction, snap) {
                score += 10;
            } else {
                score -= 40;
            }
        } else {
            // Neutral bonus when the filter plays no part
            score += 10;
        }

        score.clamp(0, 100)
    }

    /// Trend driver: the master trend filter when one is configured,
    /// otherwise the slope of the trend average stands in.
    fn trend_agrees(
        &self,
        direction: Direction,
        snap: &IndicatorSnapshot,
        trend_filter: &MasterTrendFilter,
    ) -> bool {
        if !trend_filter.is_disabled() {
            return match direction {
                Direction::Long => trend_filter.is_trending_up(snap),
                Direction::Short => trend_filter.is_trending_down(snap),
                Direction::NoSignal => false,
            };
        }
        let slope = match (snap.trend_ma.at(0), snap.trend_ma.at(1)) {
            (Some(now), Some(prev)) => now - prev,
            _ => return false,
        };
        match direction {
            Direction::Long => slope > 0.0,
            Direction::Short => slope < 0.0,
            Direction::NoSignal => false,
        }
    }

    fn momentum_agrees(&self, direction: Direction, snap: &IndicatorSnapshot) -> bool {
        let momentum = match snap.momentum.current() {
            Some(v) => v,
            None => return false,
        };
        match direction {
            Direction::Long => momentum > self.config.momentum_threshold,
            Direction::Short => momentum < -self.config.momentum_threshold,
            Direction::NoSignal => false,
        }
    }

    fn oscillator_agrees(&self, direction: Direction, snap: &IndicatorSnapshot) -> bool {
        let rsi = match snap.rsi.current() {
            Some(v) => v,
            None => return false,
        };
        match direction {
            Direction::Long => rsi <= self.oscillator.overbought,
            Direction::Short => rsi >= self.oscillator.oversold,
            Direction::NoSignal => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{TrendFilterConfig, TrendFilterMode};
    use crate::snapshot::Series;

    fn scorer(obos_enabled: bool) -> ConfluenceScorer {
        ConfluenceScorer::new(
            ConfluenceConfig {
                min_score: 60,
                adx_threshold: 25.0,
                momentum_threshold: 0.0,
            },
            OscillatorFilterConfig {
                enabled: obos_enabled,
                overbought: 70.0,
                oversold: 30.0,
            },
        )
    }

    fn trend_filter() -> MasterTrendFilter {
        MasterTrendFilter::new(TrendFilterConfig {
            mode: TrendFilterMode::VolatilityAverage,
            min_slope: 0.0,
            ..Default::default()
        })
    }

    /// Rising trend average with price above it, plus the given extras.
    fn bullish_snap(momentum: f64, adx: f64, rsi: f64) -> IndicatorSnapshot {
        IndicatorSnapshot {
            close: Series::from_values(vec![105.0]),
            trend_ma: Series::from_values(vec![99.0, 100.0]),
            momentum: Series::from_values(vec![momentum]),
            adx: Series::from_values(vec![adx]),
            rsi: Series::from_values(vec![rsi]),
            ..Default::default()
        }
    }

    #[test]
    fn test_trend_disagreement_is_hard_veto() {
        let s = scorer(false);
        let snap = bullish_snap(10.0, 40.0, 50.0);
        // Everything aligns long; a short must score zero regardless
        assert_eq!(s.score(Direction::Short, &snap, &trend_filter()), 0);
    }

    #[test]
    fn test_full_agreement_scores_maximum() {
        let s = scorer(true);
        let snap = bullish_snap(5.0, 40.0, 55.0);
        // 40 + 30 + 20 + 10 = 100
        assert_eq!(s.score(Direction::Long, &snap, &trend_filter()), 100);
    }

    #[test]
    fn test_neutral_bonus_when_oscillator_disabled() {
        let s = scorer(false);
        let snap = bullish_snap(5.0, 40.0, 95.0);
        // RSI is ignored entirely: 40 + 30 + 20 + 10
        assert_eq!(s.score(Direction::Long, &snap, &trend_filter()), 100);
    }

    #[test]
    fn test_oscillator_disagreement_penalty() {
        let s = scorer(true);
        let snap = bullish_snap(5.0, 40.0, 85.0);
        // 40 + 30 + 20 - 40 = 50
        assert_eq!(s.score(Direction::Long, &snap, &trend_filter()), 50);
    }

    #[test]
    fn test_momentum_disagreement_and_weak_adx() {
        let s = scorer(false);
        let snap = bullish_snap(-5.0, 15.0, 50.0);
        // 40 - 15 - 20 + 10 = 15
        assert_eq!(s.score(Direction::Long, &snap, &trend_filter()), 15);
    }

    #[test]
    fn test_mid_tier_adx_bonus() {
        let s = scorer(false);
        let snap = bullish_snap(5.0, 28.0, 50.0);
        // 40 + 30 + 10 + 10 = 90
        assert_eq!(s.score(Direction::Long, &snap, &trend_filter()), 90);
    }

    #[test]
    fn test_score_floor_is_zero() {
        let s = scorer(true);
        let snap = bullish_snap(-5.0, 15.0, 95.0);
        // 40 - 15 - 20 - 40 = -35 -> clamped to 0
        assert_eq!(s.score(Direction::Long, &snap, &trend_filter()), 0);
    }

    #[test]
    fn test_disabled_trend_filter_uses_average_slope() {
        let s = scorer(false);
        let disabled = MasterTrendFilter::new(TrendFilterConfig {
            mode: TrendFilterMode::Disabled,
            ..Default::default()
        });
        let snap = bullish_snap(5.0, 40.0, 50.0);
        // Slope of trend_ma is +1.0: long agrees, short vetoed
        assert_eq!(s.score(Direction::Long, &snap, &disabled), 100);
        assert_eq!(s.score(Direction::Short, &snap, &disabled), 0);
    }
}
