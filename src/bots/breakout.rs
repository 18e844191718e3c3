//! Breakout-affinity signal bots

use crate::bots::{closed_bar_only, SignalBot};
use crate::snapshot::BarContext;
use crate::types::{Direction, RegimeAffinity};

/// Squeeze release: bandwidth compressed near its lookback minimum on the
/// prior bar, current close escaping the bands.
pub struct SqueezeReleaseBot {
    squeeze_ratio: f64,
    lookback: usize,
}

impl SqueezeReleaseBot {
    pub fn new(squeeze_ratio: f64, lookback: usize) -> Self {
        Self {
            squeeze_ratio,
            lookback,
        }
    }

    fn was_squeezed(&self, ctx: &BarContext, bars_ago: usize) -> bool {
        let snap = &ctx.snapshot;
        let width = match snap.band_width.at(bars_ago + 1) {
            Some(v) => v,
            None => return false,
        };
        let min_width = match snap.band_width.min_over(bars_ago + 1, self.lookback) {
            Some(v) if v > 0.0 => v,
            _ => return false,
        };
        width / min_width < self.squeeze_ratio
    }
}

impl SignalBot for SqueezeReleaseBot {
    fn name(&self) -> &'static str {
        "squeeze_release"
    }

    fn affinity(&self) -> RegimeAffinity {
        RegimeAffinity::Breakout
    }

    fn check_signal(&self, ctx: &BarContext, bars_ago: usize) -> Direction {
        if !closed_bar_only(ctx, bars_ago) {
            return Direction::NoSignal;
        }
        if !self.was_squeezed(ctx, bars_ago) {
            return Direction::NoSignal;
        }
        let snap = &ctx.snapshot;
        let (close, upper, lower) = match (
            snap.close.at(bars_ago),
            snap.upper_band.at(bars_ago),
            snap.lower_band.at(bars_ago),
        ) {
            (Some(c), Some(u), Some(l)) => (c, u, l),
            _ => return Direction::NoSignal,
        };

        if close > upper {
            Direction::Long
        } else if close < lower {
            Direction::Short
        } else {
            Direction::NoSignal
        }
    }
}

/// Close through the N-bar extremes envelope of the prior bar
pub struct RangeBreakBot {
    lookback: usize,
}

impl RangeBreakBot {
    pub fn new(lookback: usize) -> Self {
        Self { lookback }
    }
}

impl SignalBot for RangeBreakBot {
    fn name(&self) -> &'static str {
        "range_break"
    }

    fn affinity(&self) -> RegimeAffinity {
        RegimeAffinity::Breakout
    }

    fn check_signal(&self, ctx: &BarContext, bars_ago: usize) -> Direction {
        if !closed_bar_only(ctx, bars_ago) {
            return Direction::NoSignal;
        }
        let snap = &ctx.snapshot;
        let close = match snap.close.at(bars_ago) {
            Some(c) => c,
            None => return Direction::NoSignal,
        };
        // Envelope excludes the current bar so the bar that breaks it can
        // actually trigger.
        let range_high = snap.high.max_over(bars_ago + 1, self.lookback);
        let range_low = snap.low.min_over(bars_ago + 1, self.lookback);

        match (range_high, range_low) {
            (Some(hi), _) if close > hi => Direction::Long,
            (_, Some(lo)) if close < lo => Direction::Short,
            _ => Direction::NoSignal,
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
    fn test_squeeze_release_long() {
        let ctx = ctx_with(IndicatorSnapshot {
            // Prior bar bandwidth 1.0 against lookback min 1.0: squeezed
            band_width: Series::from_values(vec![3.0, 2.0, 1.0, 1.0, 1.4]),
            close: Series::from_values(vec![100.0; 4].into_iter().chain([112.0]).collect()),
            upper_band: Series::from_values(vec![110.0; 5]),
            lower_band: Series::from_values(vec![90.0; 5]),
            ..Default::default()
        });
        assert_eq!(
            SqueezeReleaseBot::new(1.1, 3).check_signal(&ctx, 0),
            Direction::Long
        );
    }

    #[test]
    fn test_no_release_without_squeeze() {
        let ctx = ctx_with(IndicatorSnapshot {
            band_width: Series::from_values(vec![1.0, 1.5, 2.0, 2.5, 3.0]),
            close: Series::from_values(vec![100.0, 100.0, 100.0, 100.0, 112.0]),
            upper_band: Series::from_values(vec![110.0; 5]),
            lower_band: Series::from_values(vec![90.0; 5]),
            ..Default::default()
        });
        assert_eq!(
            SqueezeReleaseBot::new(1.1, 3).check_signal(&ctx, 0),
            Direction::NoSignal
        );
    }

    #[test]
    fn test_range_break_long_through_prior_high() {
        let ctx = ctx_with(IndicatorSnapshot {
            close: Series::from_values(vec![100.0, 101.0, 100.5, 106.0]),
            high: Series::from_values(vec![102.0, 103.0, 105.0, 106.5]),
            low: Series::from_values(vec![98.0, 99.0, 99.5, 103.0]),
            ..Default::default()
        });
        assert_eq!(RangeBreakBot::new(3).check_signal(&ctx, 0), Direction::Long);
    }

    #[test]
    fn test_range_break_short_through_prior_low() {
        let ctx = ctx_with(IndicatorSnapshot {
            close: Series::from_values(vec![100.0, 101.0, 100.5, 96.0]),
            high: Series::from_values(vec![102.0, 103.0, 105.0, 100.0]),
            low: Series::from_values(vec![98.0, 99.0, 99.5, 95.5]),
            ..Default::default()
        });
        assert_eq!(RangeBreakBot::new(3).check_signal(&ctx, 0), Direction::Short);
    }

    #[test]
    fn test_inside_range_no_signal() {
        let ctx = ctx_with(IndicatorSnapshot {
            close: Series::from_values(vec![100.0, 101.0, 100.5, 101.5]),
            high: Series::from_values(vec![102.0, 103.0, 105.0, 102.0]),
            low: Series::from_values(vec![98.0, 99.0, 99.5, 100.0]),
            ..Default::default()
        });
        assert_eq!(
            RangeBreakBot::new(3).check_signal(&ctx, 0),
            Direction::NoSignal
        );
    }
}
