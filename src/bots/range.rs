//! Range-affinity signal bots

use crate::bots::{closed_bar_only, SignalBot};
use crate::snapshot::BarContext;
use crate::types::{Direction, RegimeAffinity};

/// Mean reversion: RSI exits the oversold/overbought band back toward the
/// middle of the range.
pub struct RsiReversionBot {
    overbought: f64,
    oversold: f64,
}

impl RsiReversionBot {
    pub fn new(overbought: f64, oversold: f64) -> Self {
        Self {
            overbought,
            oversold,
        }
    }
}

impl SignalBot for RsiReversionBot {
    fn name(&self) -> &'static str {
        "rsi_reversion"
    }

    fn affinity(&self) -> RegimeAffinity {
        RegimeAffinity::Ranging
    }

    fn check_signal(&self, ctx: &BarContext, bars_ago: usize) -> Direction {
        if !closed_bar_only(ctx, bars_ago) {
            return Direction::NoSignal;
        }
        let snap = &ctx.snapshot;
        let (now, prev) = match (snap.rsi.at(bars_ago), snap.rsi.at(bars_ago + 1)) {
            (Some(a), Some(b)) => (a, b),
            _ => return Direction::NoSignal,
        };

        if prev < self.oversold && now >= self.oversold {
            Direction::Long
        } else if prev > self.overbought && now <= self.overbought {
            Direction::Short
        } else {
            Direction::NoSignal
        }
    }
}

/// Band fade: a close that pierced a channel band and came back inside
/// fades the excursion toward the middle of the range.
pub struct BandFadeBot;

impl BandFadeBot {
    pub fn new() -> Self {
        Self
    }
}

impl Default for BandFadeBot {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalBot for BandFadeBot {
    fn name(&self) -> &'static str {
        "band_fade"
    }

    fn affinity(&self) -> RegimeAffinity {
        RegimeAffinity::Ranging
    }

    fn check_signal(&self, ctx: &BarContext, bars_ago: usize) -> Direction {
        if !closed_bar_only(ctx, bars_ago) {
            return Direction::NoSignal;
        }
        let snap = &ctx.snapshot;
        let (close_now, close_prev) = match (snap.close.at(bars_ago), snap.close.at(bars_ago + 1))
        {
            (Some(a), Some(b)) => (a, b),
            _ => return Direction::NoSignal,
        };
        let (upper_now, upper_prev) = match (
            snap.upper_band.at(bars_ago),
            snap.upper_band.at(bars_ago + 1),
        ) {
            (Some(a), Some(b)) => (a, b),
            _ => return Direction::NoSignal,
        };
        let (lower_now, lower_prev) = match (
            snap.lower_band.at(bars_ago),
            snap.lower_band.at(bars_ago + 1),
        ) {
            (Some(a), Some(b)) => (a, b),
            _ => return Direction::NoSignal,
        };

        if close_prev < lower_prev && close_now > lower_now {
            Direction::Long
        } else if close_prev > upper_prev && close_now < upper_now {
            Direction::Short
        } else {
            Direction::NoSignal
        }
    }
}
