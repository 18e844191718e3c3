//! Trade-outcome learning window
//!
//! Bounded FIFO of closed-trade MFE/MAE observations feeding the dynamic
//! stop/target recomputation. Single writer (the flat-transition handler),
//! read-only during trade entry.

use std::collections::VecDeque;

use itertools::Itertools;
use tracing::debug;

use crate::config::StatMethod;
use crate::types::TradeExcursion;

/// Bounded FIFO of recent closed-trade excursions
#[derive(Debug, Clone)]
pub struct TradeHistoryWindow {
    window: VecDeque<TradeExcursion>,
    capacity: usize,
}

impl TradeHistoryWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            window: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
        }
    }

    /// Append an observation, evicting the oldest beyond capacity.
    pub fn push(&mut self, excursion: TradeExcursion) {
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(excursion);
        debug!(
            mfe = excursion.mfe_ticks,
            mae = excursion.mae_ticks,
            trades = self.window.len(),
            "excursion recorded"
        );
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// Learned values are trusted only once this many trades accumulated.
    pub fn is_warmed_up(&self, burn_in: usize) -> bool {
        self.window.len() >= burn_in
    }

    /// Statistic over the MFE observations, `None` when the window is empty.
    pub fn mfe_stat(&self, method: StatMethod) -> Option<f64> {
        let values: Vec<f64> = self.window.iter().map(|t| t.mfe_ticks).collect();
        compute_stat(&values, method)
    }

    /// Statistic over the MAE observations, `None` when the window is empty.
    pub fn mae_stat(&self, method: StatMethod) -> Option<f64> {
        let values: Vec<f64> = self.window.iter().map(|t| t.mae_ticks).collect();
        compute_stat(&values, method)
    }
}

fn compute_stat(values: &[f64], method: StatMethod) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    match method {
        StatMethod::Average => Some(values.iter().sum::<f64>() / values.len() as f64),
        StatMethod::Median => Some(percentile(values, 50.0)),
        StatMethod::Percentile(p) => Some(percentile(values, p)),
    }
}

/// Percentile with linear interpolation between closest ranks:
/// rank = (p / 100) * (n - 1), interpolated at the fractional index.
fn percentile(values: &[f64], p: f64) -> f64 {
    let sorted: Vec<f64> = values
        .iter()
        .copied()
        .sorted_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .collect();

    let p = p.clamp(0.0, 100.0);
    let rank = (p / 100.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        return sorted[lower];
    }
    let fraction = rank - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
}
