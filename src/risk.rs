//! Risk and stop/target management
//!
//! Computes the initial stop-loss/profit-target for an entry, runs the
//! per-trade trailing state machine (six trailing algorithms plus fixed and
//! risk/reward-derived stops), automates breakeven, and optionally learns
//! stop/target distances from recent trade outcomes.
//!
//! All stop arithmetic is in ticks; prices cross the boundary only where the
//! broker needs an absolute stop/target level. Monetary position sizing uses
//! decimal arithmetic so account-currency math never drifts.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{debug, info};

use crate::config::{BreakevenTrigger, RiskConfig, StopMode, TargetMode};
use crate::history::TradeHistoryWindow;
use crate::snapshot::IndicatorSnapshot;
use crate::types::{Direction, MarketRegime, TradeExcursion};
use chrono::{DateTime, Utc};

/// State for the one live trade of the net-position model.
///
/// Created on entry-order fill, reset to `None` on the engine when the
/// position returns to flat.
#[derive(Debug, Clone)]
pub struct ActiveTrade {
    pub direction: Direction,
    pub entry_price: f64,
    pub quantity: i64,
    pub signal_source: String,
    pub regime_at_entry: MarketRegime,
    pub confluence_score: Option<i32>,
    pub entry_time: DateTime<Utc>,

    pub stop_mode: StopMode,
    pub target_mode: TargetMode,
    pub initial_stop_ticks: f64,
    pub initial_target_ticks: f64,
    pub stop_price: f64,
    pub target_price: f64,

    /// One-way latch: set when breakeven fires, never re-arms within a trade
    pub breakeven_realized: bool,
    pub highest_price: f64,
    pub lowest_price: f64,
    pub mfe_ticks: f64,
    pub mae_ticks: f64,
    pub bars_in_trade: u32,
    /// HighLowTrail lookback; shrinks monotonically within the trade
    pub trail_lookback: usize,
}

impl ActiveTrade {
    fn sign(&self) -> f64 {
        match self.direction {
            Direction::Short => -1.0,
            _ => 1.0,
        }
    }

    /// Unrealized profit in ticks at the given price.
    pub fn profit_ticks(&self, price: f64, tick_size: f64) -> f64 {
        (price - self.entry_price) / tick_size * self.sign()
    }

    /// Fraction of the initial profit target currently captured.
    pub fn profit_ratio(&self, price: f64, tick_size: f64) -> f64 {
        if self.initial_target_ticks <= 0.0 {
            return 0.0;
        }
        self.profit_ticks(price, tick_size) / self.initial_target_ticks
    }

    /// Track price extremes and the MFE/MAE they imply.
    pub fn update_extremes(&mut self, high: f64, low: f64, tick_size: f64) {
        self.highest_price = self.highest_price.max(high);
        self.lowest_price = self.lowest_price.min(low);
        let (favorable, adverse) = match self.direction {
            Direction::Short => (self.lowest_price, self.highest_price),
            _ => (self.highest_price, self.lowest_price),
        };
        self.mfe_ticks = self.profit_ticks(favorable, tick_size).max(self.mfe_ticks);
        self.mae_ticks = (-self.profit_ticks(adverse, tick_size)).max(self.mae_ticks);
    }

    pub fn excursion(&self) -> TradeExcursion {
        TradeExcursion {
            mfe_ticks: self.mfe_ticks,
            mae_ticks: self.mae_ticks,
        }
    }
}

/// Adjustments produced by one management cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TradeAdjustments {
    /// New stop level to place with the broker, already ratcheted
    pub new_stop: Option<f64>,
    /// Breakeven fired this cycle (at most once per trade)
    pub breakeven_fired: bool,
}

/// Stop/target distances learned from recent closed trades
#[derive(Debug, Clone)]
pub struct DynamicRiskModel {
    history: TradeHistoryWindow,
    config: RiskConfig,
}

impl DynamicRiskModel {
    pub fn new(config: RiskConfig) -> Self {
        Self {
            history: TradeHistoryWindow::new(config.history_lookback),
            config,
        }
    }

    pub fn record(&mut self, excursion: TradeExcursion) {
        self.history.push(excursion);
    }

    pub fn trade_count(&self) -> usize {
        self.history.len()
    }

    pub fn is_trusted(&self) -> bool {
        self.history.is_warmed_up(self.config.burn_in_trades)
    }

    /// Learned stop distance: the MAE statistic, widened (never tightened)
    /// by the structural swing floor when one is available.
    pub fn learned_stop_ticks(
        &self,
        direction: Direction,
        entry_price: f64,
        tick_size: f64,
        snap: &IndicatorSnapshot,
    ) -> Option<f64> {
        if !self.is_trusted() {
            return None;
        }
        let learned = self.history.mae_stat(self.config.stat_method)?;
        let floor = self.structural_floor_ticks(direction, entry_price, tick_size, snap);
        Some(match floor {
            Some(f) if f > learned => {
                debug!(learned, floor = f, "structural floor widened learned stop");
                f
            }
            _ => learned,
        })
    }

    /// Learned target distance: the MFE statistic.
    pub fn learned_target_ticks(&self) -> Option<f64> {
        if !self.is_trusted() {
            return None;
        }
        self.history.mfe_stat(self.config.stat_method)
    }

    /// Distance from entry to the recent swing extreme on the stop side.
    fn structural_floor_ticks(
        &self,
        direction: Direction,
        entry_price: f64,
        tick_size: f64,
        snap: &IndicatorSnapshot,
    ) -> Option<f64> {
        let lookback = self.config.structural_lookback;
        let extreme = match direction {
            Direction::Long => snap.low.min_over(0, lookback)?,
            Direction::Short => snap.high.max_over(0, lookback)?,
            Direction::NoSignal => return None,
        };
        let ticks = (entry_price - extreme).abs() / tick_size;
        if ticks > 0.0 {
            Some(ticks)
        } else {
            None
        }
    }
}

/// Per-trade risk manager
#[derive(Debug, Clone)]
pub struct RiskManager {
    config: RiskConfig,
    tick_size: f64,
    tick_value: f64,
    dynamic: DynamicRiskModel,
}

impl RiskManager {
    pub fn new(config: RiskConfig, tick_size: f64, tick_value: f64) -> Self {
        let dynamic = DynamicRiskModel::new(config.clone());
        Self {
            config,
            tick_size,
            tick_value,
            dynamic,
        }
    }

    pub fn dynamic_model(&self) -> &DynamicRiskModel {
        &self.dynamic
    }

    /// Record a closed trade's excursions into the learning window.
    pub fn record_closed_trade(&mut self, excursion: TradeExcursion) {
        self.dynamic.record(excursion);
    }

    /// Stop distance in ticks for a prospective entry.
    pub fn initial_stop_ticks(
        &self,
        direction: Direction,
        entry_price: f64,
        snap: &IndicatorSnapshot,
    ) -> f64 {
        if self.config.dynamic_management {
            if let Some(learned) =
                self.dynamic
                    .learned_stop_ticks(direction, entry_price, self.tick_size, snap)
            {
                return learned;
            }
            // Static fallback until burn-in is reached
        }

        match self.config.stop_mode {
            StopMode::Fixed => self.config.stop_ticks,
            StopMode::HighLowTrail => self
                .swing_stop_ticks(
                    direction,
                    entry_price,
                    snap,
                    self.config.high_low_initial_lookback,
                )
                .unwrap_or(self.config.stop_ticks),
            StopMode::DynamicTrail => self.config.stop_ticks,
            StopMode::ParabolicTrail => snap
                .parabolic
                .current()
                .map(|p| (entry_price - p).abs() / self.tick_size)
                .filter(|t| *t > 0.0)
                .unwrap_or(self.config.stop_ticks),
            StopMode::AtrTrail => snap
                .atr
                .current()
                .map(|atr| atr * self.config.atr_stop_multiplier / self.tick_size)
                .unwrap_or(self.config.stop_ticks),
            StopMode::RegularTrail => self.config.trail_ticks,
            StopMode::RiskReward => {
                let rr = self.config.risk_reward_ratio.max(f64::EPSILON);
                self.config.target_ticks / rr
            }
        }
    }

    /// Target distance in ticks for a prospective entry.
    pub fn initial_target_ticks(
        &self,
        direction: Direction,
        entry_price: f64,
        stop_ticks: f64,
        snap: &IndicatorSnapshot,
    ) -> f64 {
        if self.config.dynamic_management {
            if let Some(learned) = self.dynamic.learned_target_ticks() {
                return learned;
            }
        }

        match self.config.target_mode {
            TargetMode::FixedTicks => self.config.target_ticks,
            TargetMode::AtrMultiple => snap
                .atr
                .current()
                .map(|atr| atr * self.config.atr_target_multiplier / self.tick_size)
                .unwrap_or(self.config.target_ticks),
            TargetMode::RiskRewardRatio => stop_ticks * self.config.risk_reward_ratio,
            TargetMode::RegressionChannel => {
                // Channel band price as the target, fixed value as a floor
                let band_ticks = snap.regression_band.current().map(|band| {
                    let sign = if direction == Direction::Short {
                        -1.0
                    } else {
                        1.0
                    };
                    (band - entry_price) / self.tick_size * sign
                });
                match band_ticks {
                    Some(t) if t > self.config.target_ticks => t,
                    _ => self.config.target_ticks,
                }
            }
        }
    }

    /// Build the trade state on entry fill.
    #[allow(clippy::too_many_arguments)]
    pub fn open_trade(
        &self,
        direction: Direction,
        entry_price: f64,
        quantity: i64,
        signal_source: String,
        regime_at_entry: MarketRegime,
        confluence_score: Option<i32>,
        snap: &IndicatorSnapshot,
        entry_time: DateTime<Utc>,
    ) -> ActiveTrade {
        let stop_ticks = self.initial_stop_ticks(direction, entry_price, snap);
        let target_ticks = self.initial_target_ticks(direction, entry_price, stop_ticks, snap);
        let sign = if direction == Direction::Short {
            -1.0
        } else {
            1.0
        };
        let trade = ActiveTrade {
            direction,
            entry_price,
            quantity,
            signal_source,
            regime_at_entry,
            confluence_score,
            entry_time,
            stop_mode: self.config.stop_mode,
            target_mode: self.config.target_mode,
            initial_stop_ticks: stop_ticks,
            initial_target_ticks: target_ticks,
            stop_price: entry_price - stop_ticks * self.tick_size * sign,
            target_price: entry_price + target_ticks * self.tick_size * sign,
            breakeven_realized: false,
            highest_price: entry_price,
            lowest_price: entry_price,
            mfe_ticks: 0.0,
            mae_ticks: 0.0,
            bars_in_trade: 0,
            trail_lookback: self.config.high_low_initial_lookback,
        };
        info!(
            direction = %direction,
            entry = entry_price,
            stop = trade.stop_price,
            target = trade.target_price,
            stop_ticks,
            target_ticks,
            "trade opened"
        );
        trade
    }

    /// One management cycle: extremes, breakeven, then the trailing
    /// algorithm for the configured stop mode. Trails only ever move the
    /// stop in the trade's favor.
    pub fn manage(&self, trade: &mut ActiveTrade, snap: &IndicatorSnapshot) -> TradeAdjustments {
        let mut adjustments = TradeAdjustments::default();

        let close = match snap.close.current() {
            Some(c) => c,
            None => return adjustments,
        };
        let high = snap.high.current().unwrap_or(close);
        let low = snap.low.current().unwrap_or(close);
        trade.update_extremes(high, low, self.tick_size);

        if self.try_breakeven(trade, close) {
            adjustments.breakeven_fired = true;
            adjustments.new_stop = Some(trade.stop_price);
        }

        if let Some(stop) = self.trail_candidate(trade, close, snap) {
            if self.ratchet(trade, stop) {
                trade.stop_price = stop;
                adjustments.new_stop = Some(stop);
                debug!(stop, "trailing stop advanced");
            }
        }

        adjustments
    }

    /// Auto-breakeven: once unrealized profit reaches the trigger the stop
    /// moves to entry plus the offset and the latch closes for the rest of
    /// the trade.
    fn try_breakeven(&self, trade: &mut ActiveTrade, close: f64) -> bool {
        if !self.config.breakeven_enabled || trade.breakeven_realized {
            return false;
        }
        let trigger_ticks = match self.config.breakeven_trigger {
            BreakevenTrigger::Ticks(t) => t,
            BreakevenTrigger::TargetFraction(f) => f * trade.initial_target_ticks,
        };
        if trade.profit_ticks(close, self.tick_size) < trigger_ticks {
            return false;
        }
        let sign = trade.sign();
        let breakeven_stop =
            trade.entry_price + self.config.breakeven_offset_ticks * self.tick_size * sign;
        if self.ratchet(trade, breakeven_stop) {
            trade.stop_price = breakeven_stop;
        }
        trade.breakeven_realized = true;
        info!(stop = trade.stop_price, "breakeven realized");
        true
    }

    /// Candidate stop from the configured trailing algorithm, or `None`
    /// for modes with no post-entry adjustment.
    fn trail_candidate(
        &self,
        trade: &mut ActiveTrade,
        close: f64,
        snap: &IndicatorSnapshot,
    ) -> Option<f64> {
        let ratio = trade.profit_ratio(close, self.tick_size);
        let sign = trade.sign();

        match trade.stop_mode {
            StopMode::Fixed | StopMode::RiskReward => None,

            StopMode::HighLowTrail => {
                let shrunk = self.high_low_lookback_for(ratio);
                // Monotonic shrink only; never re-widens within a trade
                trade.trail_lookback = trade.trail_lookback.min(shrunk);
                let count = trade.trail_lookback.max(1);
                match trade.direction {
                    Direction::Long => snap.low.min_over(0, count),
                    Direction::Short => snap.high.max_over(0, count),
                    Direction::NoSignal => None,
                }
            }

            StopMode::DynamicTrail => {
                // Trail updates are suppressed until breakeven is realized
                if !trade.breakeven_realized {
                    return None;
                }
                let ticks = if ratio >= self.config.dynamic_tighten_trigger {
                    self.config.dynamic_tight_ticks
                } else {
                    self.config.dynamic_wide_ticks
                };
                Some(close - ticks * self.tick_size * sign)
            }

            StopMode::ParabolicTrail => {
                let offset = if ratio >= 0.5 {
                    self.config.parabolic_offset
                } else {
                    0
                };
                snap.parabolic.at(offset)
            }

            StopMode::AtrTrail => {
                let atr = snap.atr.current()?;
                let mult = if ratio >= self.config.atr_tighten_trigger {
                    self.config.atr_tight_multiplier
                } else {
                    self.config.atr_stop_multiplier
                };
                Some(close - atr * mult * sign)
            }

            StopMode::RegularTrail => {
                Some(close - self.config.trail_ticks * self.tick_size * sign)
            }
        }
    }

    /// Lookback schedule: 4 -> 2 -> 1 -> 0 as the profit ratio crosses
    /// 60/70/80% of target.
    fn high_low_lookback_for(&self, ratio: f64) -> usize {
        if ratio >= 0.8 {
            0
        } else if ratio >= 0.7 {
            1
        } else if ratio >= 0.6 {
            2
        } else {
            self.config.high_low_initial_lookback
        }
    }

    /// A candidate stop is accepted only if it tightens the trade.
    fn ratchet(&self, trade: &ActiveTrade, candidate: f64) -> bool {
        match trade.direction {
            Direction::Long => candidate > trade.stop_price,
            Direction::Short => candidate < trade.stop_price,
            Direction::NoSignal => false,
        }
    }

    fn swing_stop_ticks(
        &self,
        direction: Direction,
        entry_price: f64,
        snap: &IndicatorSnapshot,
        lookback: usize,
    ) -> Option<f64> {
        let extreme = match direction {
            Direction::Long => snap.low.min_over(0, lookback.max(1))?,
            Direction::Short => snap.high.max_over(0, lookback.max(1))?,
            Direction::NoSignal => return None,
        };
        let ticks = (entry_price - extreme).abs() / self.tick_size;
        if ticks > 0.0 {
            Some(ticks)
        } else {
            None
        }
    }

    /// Contracts to trade: floor((equity × risk%/100) / (stop ticks × tick
    /// value)), floored at one contract. Fixed count when sizing disabled.
    pub fn position_size(&self, account_equity: f64, stop_ticks: f64) -> i64 {
        if !self.config.sizing_enabled {
            return self.config.fixed_contracts.max(1);
        }
        let equity = Decimal::try_from(account_equity).unwrap_or(Decimal::ZERO);
        let risk_pct = Decimal::try_from(self.config.risk_percent).unwrap_or(Decimal::ZERO);
        let stop = Decimal::try_from(stop_ticks).unwrap_or(Decimal::ZERO);
        let tick_value = Decimal::try_from(self.tick_value).unwrap_or(Decimal::ZERO);

        let risk_amount = equity * risk_pct / dec!(100);
        let per_contract = stop * tick_value;
        if per_contract <= Decimal::ZERO {
            return self.config.fixed_contracts.max(1);
        }
        let contracts = (risk_amount / per_contract).floor().to_i64().unwrap_or(0);
        contracts.max(1)
    }
}
