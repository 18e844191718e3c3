//! Trend-affinity signal bots

use crate::bots::{closed_bar_only, SignalBot};
use crate::snapshot::BarContext;
use crate::types::{Direction, RegimeAffinity};

/// Pullback continuation: price holds one side of the trend average while
/// the oscillator dips and turns back in the trend direction.
pub struct TrendPullbackBot {
    pullback_level: f64,
}

impl TrendPullbackBot {
    pub fn new(pullback_level: f64) -> Self {
        Self { pullback_level }
    }
}

impl SignalBot for TrendPullbackBot {
    fn name(&self) -> &'static str {
        "trend_pullback"
    }

    fn affinity(&self) -> RegimeAffinity {
        RegimeAffinity::Trending
    }

    fn check_signal(&self, ctx: &BarContext, bars_ago: usize) -> Direction {
        if !closed_bar_only(ctx, bars_ago) {
            return Direction::NoSignal;
        }
        let snap = &ctx.snapshot;
        let (close, ma, rsi_now, rsi_prev) = match (
            snap.close.at(bars_ago),
            snap.trend_ma.at(bars_ago),
            snap.rsi.at(bars_ago),
            snap.rsi.at(bars_ago + 1),
        ) {
            (Some(c), Some(m), Some(r0), Some(r1)) => (c, m, r0, r1),
            _ => return Direction::NoSignal,
        };

        // Long: uptrend intact, oscillator dipped below the pullback level
        // and is turning back up.
        if close > ma && rsi_prev < self.pullback_level && rsi_now > rsi_prev {
            return Direction::Long;
        }
        // Short mirror around the 50 axis.
        let mirror = 100.0 - self.pullback_level;
        if close < ma && rsi_prev > mirror && rsi_now < rsi_prev {
            return Direction::Short;
        }
        Direction::NoSignal
    }
}

/// Strength continuation: ADX rising across three bars with a directional
/// close confirming which side is pressing.
pub struct AdxRisingBot {
    min_adx: f64,
}

impl AdxRisingBot {
    pub fn new(min_adx: f64) -> Self {
        Self { min_adx }
    }
}

impl SignalBot for AdxRisingBot {
    fn name(&self) -> &'static str {
        "adx_rising"
    }

    fn affinity(&self) -> RegimeAffinity {
        RegimeAffinity::Trending
    }

    fn check_signal(&self, ctx: &BarContext, bars_ago: usize) -> Direction {
        if !closed_bar_only(ctx, bars_ago) {
            return Direction::NoSignal;
        }
        let snap = &ctx.snapshot;
        let (a0, a1, a2) = match (
            snap.adx.at(bars_ago),
            snap.adx.at(bars_ago + 1),
            snap.adx.at(bars_ago + 2),
        ) {
            (Some(a), Some(b), Some(c)) => (a, b, c),
            _ => return Direction::NoSignal,
        };
        if a0 <= a1 || a1 <= a2 || a0 < self.min_adx {
            return Direction::NoSignal;
        }
        let (open, close) = match (snap.open.at(bars_ago), snap.close.at(bars_ago)) {
            (Some(o), Some(c)) => (o, c),
            _ => return Direction::NoSignal,
        };
        if close > open {
            Direction::Long
        } else if close < open {
            Direction::Short
        } else {
            Direction::NoSignal
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{IndicatorSnapshot, Series};
    use crate::types::PositionSnapshot;
    use chrono::Utc;

    fn ctx_with(snap: IndicatorSnapshot) -> BarContext {
        BarContext::new(snap, PositionSnapshot::flat(), Utc::now())
    }

    #[test]
    fn test_pullback_long_fires_on_oscillator_turn() {
        let ctx = ctx_with(IndicatorSnapshot {
            close: Series::from_values(vec![104.0, 105.0]),
            trend_ma: Series::from_values(vec![100.0, 100.0]),
            rsi: Series::from_values(vec![40.0, 44.0]),
            ..Default::default()
        });
        assert_eq!(
            TrendPullbackBot::new(45.0).check_signal(&ctx, 0),
            Direction::Long
        );
    }

    #[test]
    fn test_pullback_requires_trend_side() {
        // Oscillator turn without price above the average
        let ctx = ctx_with(IndicatorSnapshot {
            close: Series::from_values(vec![98.0, 99.0]),
            trend_ma: Series::from_values(vec![100.0, 100.0]),
            rsi: Series::from_values(vec![40.0, 44.0]),
            ..Default::default()
        });
        assert_eq!(
            TrendPullbackBot::new(45.0).check_signal(&ctx, 0),
            Direction::NoSignal
        );
    }

    #[test]
    fn test_pullback_short_mirror() {
        let ctx = ctx_with(IndicatorSnapshot {
            close: Series::from_values(vec![96.0, 95.0]),
            trend_ma: Series::from_values(vec![100.0, 100.0]),
            rsi: Series::from_values(vec![60.0, 56.0]),
            ..Default::default()
        });
        assert_eq!(
            TrendPullbackBot::new(45.0).check_signal(&ctx, 0),
            Direction::Short
        );
    }

    #[test]
    fn test_adx_rising_long_on_bullish_close() {
        let ctx = ctx_with(IndicatorSnapshot {
            adx: Series::from_values(vec![20.0, 23.0, 26.0]),
            open: Series::from_values(vec![100.0, 100.0, 100.0]),
            close: Series::from_values(vec![100.0, 101.0, 102.0]),
            ..Default::default()
        });
        assert_eq!(AdxRisingBot::new(22.0).check_signal(&ctx, 0), Direction::Long);
    }

    #[test]
    fn test_adx_falling_no_signal() {
        let ctx = ctx_with(IndicatorSnapshot {
            adx: Series::from_values(vec![26.0, 25.0, 24.0]),
            open: Series::from_values(vec![100.0; 3]),
            close: Series::from_values(vec![102.0; 3]),
            ..Default::default()
        });
        assert_eq!(
            AdxRisingBot::new(22.0).check_signal(&ctx, 0),
            Direction::NoSignal
        );
    }

    #[test]
    fn test_adx_below_floor_no_signal() {
        let ctx = ctx_with(IndicatorSnapshot {
            adx: Series::from_values(vec![10.0, 12.0, 14.0]),
            open: Series::from_values(vec![100.0; 3]),
            close: Series::from_values(vec![102.0; 3]),
            ..Default::default()
        });
        assert_eq!(
            AdxRisingBot::new(22.0).check_signal(&ctx, 0),
            Direction::NoSignal
        );
    }
}
