//! Universal signal bots, consulted in every regime

use crate::bots::{closed_bar_only, SignalBot};
use crate::snapshot::BarContext;
use crate::types::{Direction, RegimeAffinity};

/// Fast/slow moving-average crossover
pub struct MaCrossBot;

impl MaCrossBot {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MaCrossBot {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalBot for MaCrossBot {
    fn name(&self) -> &'static str {
        "ma_cross"
    }

    fn affinity(&self) -> RegimeAffinity {
        RegimeAffinity::Universal
    }

    fn check_signal(&self, ctx: &BarContext, bars_ago: usize) -> Direction {
        if !closed_bar_only(ctx, bars_ago) {
            return Direction::NoSignal;
        }
        let snap = &ctx.snapshot;
        let (fast_now, slow_now, fast_prev, slow_prev) = match (
            snap.fast_ma.at(bars_ago),
            snap.slow_ma.at(bars_ago),
            snap.fast_ma.at(bars_ago + 1),
            snap.slow_ma.at(bars_ago + 1),
        ) {
            (Some(a), Some(b), Some(c), Some(d)) => (a, b, c, d),
            _ => return Direction::NoSignal,
        };

        if fast_prev <= slow_prev && fast_now > slow_now {
            Direction::Long
        } else if fast_prev >= slow_prev && fast_now < slow_now {
            Direction::Short
        } else {
            Direction::NoSignal
        }
    }
}

/// Momentum crossing out of its neutral zone
pub struct MomentumThrustBot {
    threshold: f64,
}

impl MomentumThrustBot {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl SignalBot for MomentumThrustBot {
    fn name(&self) -> &'static str {
        "momentum_thrust"
    }

    fn affinity(&self) -> RegimeAffinity {
        RegimeAffinity::Universal
    }

    fn check_signal(&self, ctx: &BarContext, bars_ago: usize) -> Direction {
        if !closed_bar_only(ctx, bars_ago) {
            return Direction::NoSignal;
        }
        let snap = &ctx.snapshot;
        let (now, prev) = match (snap.momentum.at(bars_ago), snap.momentum.at(bars_ago + 1)) {
            (Some(a), Some(b)) => (a, b),
            _ => return Direction::NoSignal,
        };

        if prev <= self.threshold && now > self.threshold {
            Direction::Long
        } else if prev >= -self.threshold && now < -self.threshold {
            Direction::Short
        } else {
            Direction::NoSignal
        }
    }
}
