//! Indicator snapshot boundary
//!
//! The engine never computes indicator math itself. The host supplies each
//! indicator as an opaque, read-only, time-indexed series; values that are
//! still warming up are simply absent and every consumer degrades to a safe
//! default instead of erroring.

use crate::types::PositionSnapshot;
use chrono::{DateTime, Utc};

/// Read-only time-indexed series of indicator values.
///
/// Index convention follows charting platforms: `at(0)` is the value on the
/// current bar, `at(1)` the bar before, and so on. Out-of-range lookups and
/// NaN values both read as `None`.
#[derive(Debug, Clone, Default)]
pub struct Series {
    values: Vec<f64>,
}

impl Series {
    /// Build a series from oldest-first values.
    pub fn from_values(values: Vec<f64>) -> Self {
        Self { values }
    }

    pub fn empty() -> Self {
        Self { values: Vec::new() }
    }

    /// Value `bars_ago` bars back from the current bar.
    pub fn at(&self, bars_ago: usize) -> Option<f64> {
        if bars_ago >= self.values.len() {
            return None;
        }
        let v = self.values[self.values.len() - 1 - bars_ago];
        if v.is_nan() {
            None
        } else {
            Some(v)
        }
    }

    /// Current-bar value.
    pub fn current(&self) -> Option<f64> {
        self.at(0)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Minimum over the `count` bars ending `bars_ago` bars back.
    /// `None` if any bar in the window is missing.
    pub fn min_over(&self, bars_ago: usize, count: usize) -> Option<f64> {
        self.window_fold(bars_ago, count, f64::min)
    }

    /// Maximum over the `count` bars ending `bars_ago` bars back.
    pub fn max_over(&self, bars_ago: usize, count: usize) -> Option<f64> {
        self.window_fold(bars_ago, count, f64::max)
    }

    fn window_fold(
        &self,
        bars_ago: usize,
        count: usize,
        f: impl Fn(f64, f64) -> f64,
    ) -> Option<f64> {
        if count == 0 {
            return None;
        }
        let mut acc: Option<f64> = None;
        for i in bars_ago..bars_ago + count {
            let v = self.at(i)?;
            acc = Some(match acc {
                Some(a) => f(a, v),
                None => v,
            });
        }
        acc
    }
}

/// Every indicator series the decision pipeline consumes.
///
/// All fields default to empty series so hosts (and tests) populate only
/// what the configured components actually read.
#[derive(Debug, Clone, Default)]
pub struct IndicatorSnapshot {
    // Primary bar series
    pub open: Series,
    pub high: Series,
    pub low: Series,
    pub close: Series,
    pub volume: Series,

    // Trend / strength
    pub adx: Series,
    pub atr: Series,
    pub momentum: Series,
    pub trend_ma: Series,
    pub fast_ma: Series,
    pub slow_ma: Series,
    pub regression_slope: Series,
    pub volume_ma: Series,

    // Oscillators / bands
    pub rsi: Series,
    pub band_width: Series,
    pub upper_band: Series,
    pub lower_band: Series,
    pub regression_band: Series,

    // Structure
    pub swing_high: Series,
    pub swing_low: Series,
    pub channel_high: Series,
    pub channel_low: Series,
    pub parabolic: Series,
}

/// Read-only snapshot of one evaluation cycle: current bar data, position
/// state, and indicator outputs. Regenerated every cycle, never mutated.
#[derive(Debug, Clone)]
pub struct BarContext {
    pub snapshot: IndicatorSnapshot,
    pub position: PositionSnapshot,
    /// True only on the first evaluation of a newly closed bar. Bar-close
    /// bots use this to suppress duplicate signals across repeated
    /// intra-bar evaluations.
    pub first_tick_of_bar: bool,
    pub now: DateTime<Utc>,
    pub account_equity: f64,
}

impl BarContext {
    pub fn new(snapshot: IndicatorSnapshot, position: PositionSnapshot, now: DateTime<Utc>) -> Self {
        Self {
            snapshot,
            position,
            first_tick_of_bar: true,
            now,
            account_equity: 0.0,
        }
    }

    pub fn with_equity(mut self, equity: f64) -> Self {
        self.account_equity = equity;
        self
    }

    pub fn with_first_tick(mut self, first: bool) -> Self {
        self.first_tick_of_bar = first;
        self
    }

    pub fn close(&self) -> Option<f64> {
        self.snapshot.close.current()
    }
}
