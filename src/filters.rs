//! Veto filter layer
//!
//! Independent gates that may suppress an otherwise-valid signal: the chop
//! detector (suspends trading entirely), the master trend filter (vetoes
//! direction), and the optional market-structure and overbought/oversold
//! filters. Chop is checked before the trend filter; the two gate entries
//! independently and carry no priority contract beyond that order.

use tracing::{debug, info, warn};

use crate::config::{ChopConfig, OscillatorFilterConfig, TrendFilterConfig, TrendFilterMode};
use crate::snapshot::IndicatorSnapshot;
use crate::types::Direction;

/// Who initiated the current trading suspension, if any
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suspension {
    None,
    /// Set by the chop detector; auto-lifts once chop clears.
    System,
    /// Set by the operator; never silently overridden.
    User,
}

/// Chop detector with a system/user suspension state machine
#[derive(Debug, Clone)]
pub struct ChopDetector {
    config: ChopConfig,
    suspension: Suspension,
}

impl ChopDetector {
    pub fn new(config: ChopConfig) -> Self {
        Self {
            config,
            suspension: Suspension::None,
        }
    }

    /// Market is choppy iff the regression slope is flat AND ADX is weak AND
    /// volume is thin. Any missing input reads as not-choppy: an idle veto is
    /// preferable to suspending trading on warm-up data.
    pub fn is_choppy(&self, snap: &IndicatorSnapshot) -> bool {
        if !self.config.enabled {
            return false;
        }
        let (slope, adx, vol_ma) = match (
            snap.regression_slope.current(),
            snap.adx.current(),
            snap.volume_ma.current(),
        ) {
            (Some(s), Some(a), Some(v)) => (s, a, v),
            _ => return false,
        };
        slope.abs() < self.config.flat_slope_threshold
            && adx < self.config.chop_adx_threshold
            && vol_ma < self.config.volume_threshold
    }

    /// Run the suspension state machine for this cycle.
    ///
    /// A choppy market suspends auto-trading (system-initiated). The
    /// suspension auto-lifts once chop clears, but only when it was
    /// system-initiated: a user disable stays until the user re-enables.
    pub fn update(&mut self, snap: &IndicatorSnapshot) {
        let choppy = self.is_choppy(snap);
        match (self.suspension, choppy) {
            (Suspension::None, true) => {
                warn!("chop detected, suspending auto-trading");
                self.suspension = Suspension::System;
            }
            (Suspension::System, false) => {
                info!("chop cleared, resuming auto-trading");
                self.suspension = Suspension::None;
            }
            _ => {}
        }
    }

    pub fn user_disable(&mut self) {
        info!("auto-trading disabled by user");
        self.suspension = Suspension::User;
    }

    pub fn user_enable(&mut self) {
        info!("auto-trading enabled by user");
        self.suspension = Suspension::None;
    }

    pub fn suspension(&self) -> Suspension {
        self.suspension
    }

    pub fn trading_allowed(&self) -> bool {
        self.suspension == Suspension::None
    }
}

/// Master trend filter, evaluated unconditionally for every entry attempt in
/// every regime. Long entries require `is_trending_up`; shorts
/// `is_trending_down`. Warm-up data fails closed (veto).
#[derive(Debug, Clone)]
pub struct MasterTrendFilter {
    config: TrendFilterConfig,
}

impl MasterTrendFilter {
    pub fn new(config: TrendFilterConfig) -> Self {
        Self { config }
    }

    pub fn is_disabled(&self) -> bool {
        self.config.mode == TrendFilterMode::Disabled
    }

    pub fn is_trending_up(&self, snap: &IndicatorSnapshot) -> bool {
        match self.config.mode {
            TrendFilterMode::Disabled => true,
            TrendFilterMode::MomentumExtreme => self.extreme_envelope_up(snap).unwrap_or(false),
            TrendFilterMode::VolatilityAverage => self.average_up(snap).unwrap_or(false),
        }
    }

    pub fn is_trending_down(&self, snap: &IndicatorSnapshot) -> bool {
        match self.config.mode {
            TrendFilterMode::Disabled => true,
            TrendFilterMode::MomentumExtreme => {
                self.extreme_envelope_up(snap).map(|up| !up).unwrap_or(false)
            }
            TrendFilterMode::VolatilityAverage => {
                self.average_down(snap).unwrap_or(false)
            }
        }
    }

    /// Direction-aware veto check used by both dispatch policies.
    pub fn allows(&self, direction: Direction, snap: &IndicatorSnapshot) -> bool {
        let allowed = match direction {
            Direction::Long => self.is_trending_up(snap),
            Direction::Short => self.is_trending_down(snap),
            Direction::NoSignal => false,
        };
        if !allowed {
            debug!(direction = %direction, "master trend filter veto");
        }
        allowed
    }

    /// Close relative to the midpoint of the long-horizon extremes envelope.
    fn extreme_envelope_up(&self, snap: &IndicatorSnapshot) -> Option<bool> {
        let close = snap.close.current()?;
        let hi = snap.high.max_over(0, self.config.envelope_lookback)?;
        let lo = snap.low.min_over(0, self.config.envelope_lookback)?;
        Some(close > (hi + lo) / 2.0)
    }

    fn average_slope(&self, snap: &IndicatorSnapshot) -> Option<f64> {
        let now = snap.trend_ma.at(0)?;
        let prev = snap.trend_ma.at(1)?;
        Some(now - prev)
    }

    fn average_up(&self, snap: &IndicatorSnapshot) -> Option<bool> {
        let close = snap.close.current()?;
        let ma = snap.trend_ma.current()?;
        let slope = self.average_slope(snap)?;
        Some(slope > self.config.min_slope && close > ma)
    }

    fn average_down(&self, snap: &IndicatorSnapshot) -> Option<bool> {
        let close = snap.close.current()?;
        let ma = snap.trend_ma.current()?;
        let slope = self.average_slope(snap)?;
        Some(slope < -self.config.min_slope && close < ma)
    }
}

/// Optional market-structure filter: vetoes longs once price trades through
/// the most recent confirmed swing high without a new higher low having
/// formed; symmetric for shorts against swing lows.
#[derive(Debug, Clone)]
pub struct MarketStructureFilter {
    enabled: bool,
}

impl MarketStructureFilter {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn allows(&self, direction: Direction, snap: &IndicatorSnapshot) -> bool {
        if !self.enabled {
            return true;
        }
        let allowed = match direction {
            Direction::Long => self.allows_long(snap),
            Direction::Short => self.allows_short(snap),
            Direction::NoSignal => false,
        };
        if !allowed {
            debug!(direction = %direction, "market structure veto");
        }
        allowed
    }

    fn allows_long(&self, snap: &IndicatorSnapshot) -> bool {
        let (close, swing_high) = match (snap.close.current(), snap.swing_high.current()) {
            (Some(c), Some(h)) => (c, h),
            // Enabled filter without structure data fails closed
            _ => return false,
        };
        if close <= swing_high {
            return true;
        }
        // Price broke the swing high; only allow if a higher low confirmed
        // the new structure.
        higher_low_formed(snap).unwrap_or(false)
    }

    fn allows_short(&self, snap: &IndicatorSnapshot) -> bool {
        let (close, swing_low) = match (snap.close.current(), snap.swing_low.current()) {
            (Some(c), Some(l)) => (c, l),
            _ => return false,
        };
        if close >= swing_low {
            return true;
        }
        lower_high_formed(snap).unwrap_or(false)
    }
}

/// The swing series hold the last confirmed pivot price per bar; a new pivot
/// shows up as a change in value. A higher low formed when the latest
/// distinct swing-low value exceeds the one before it.
fn higher_low_formed(snap: &IndicatorSnapshot) -> Option<bool> {
    let (latest, previous) = last_two_distinct(&snap.swing_low)?;
    Some(latest > previous)
}

fn lower_high_formed(snap: &IndicatorSnapshot) -> Option<bool> {
    let (latest, previous) = last_two_distinct(&snap.swing_high)?;
    Some(latest < previous)
}

fn last_two_distinct(series: &crate::snapshot::Series) -> Option<(f64, f64)> {
    let latest = series.current()?;
    for bars_ago in 1..series.len() {
        let v = series.at(bars_ago)?;
        if (v - latest).abs() > f64::EPSILON {
            return Some((latest, v));
        }
    }
    None
}

/// Optional overbought/oversold veto: blocks longs above the overbought
/// level and shorts below the oversold level.
#[derive(Debug, Clone)]
pub struct OverboughtOversoldFilter {
    config: OscillatorFilterConfig,
}

impl OverboughtOversoldFilter {
    pub fn new(config: OscillatorFilterConfig) -> Self {
        Self { config }
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn overbought(&self) -> f64 {
        self.config.overbought
    }

    pub fn oversold(&self) -> f64 {
        self.config.oversold
    }

    /// Veto check. `force_active` lets the regime classifier engage the
    /// exhaustion filter while Ranging even when the config toggle is off.
    pub fn allows(&self, direction: Direction, snap: &IndicatorSnapshot, force_active: bool) -> bool {
        if !self.config.enabled && !force_active {
            return true;
        }
        let rsi = match snap.rsi.current() {
            Some(v) => v,
            // Enabled veto without data fails closed
            None => return false,
        };
        let allowed = match direction {
            Direction::Long => rsi <= self.config.overbought,
            Direction::Short => rsi >= self.config.oversold,
            Direction::NoSignal => false,
        };
        if !allowed {
            debug!(direction = %direction, rsi, "overbought/oversold veto");
        }
        allowed
    }
}
