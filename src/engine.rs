//! Per-bar decision engine
//!
//! Owns one evaluation cycle end to end: drain manual actions, classify the
//! regime, run the chop suspension, manage the open trade or hunt for an
//! entry through the filter stack, and keep broker state reconciled. The
//! host calls [`Engine::on_bar`] once per completed bar (or per intra-bar
//! tick with `first_tick_of_bar` cleared) and forwards broker callbacks to
//! [`Engine::on_order_update`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::bots::{BotRegistry, DispatchPolicy, SelectedSignal};
use crate::config::EngineConfig;
use crate::confluence::ConfluenceScorer;
use crate::filters::{
    ChopDetector, MarketStructureFilter, MasterTrendFilter, OverboughtOversoldFilter, Suspension,
};
use crate::oms::{
    BrokerAdapter, EntryOrder, HealthMonitor, OrderTracker, ScaledEntryAction, ScaledEntryPlan,
};
use crate::regime::RegimeClassifier;
use crate::risk::{ActiveTrade, RiskManager};
use crate::snapshot::BarContext;
use crate::telemetry::{ClosedTrade, LogSink, TradeRecordSink};
use crate::types::{Direction, EngineError, MarketRegime, OrderStatus};

/// Operator intents set from outside the evaluation cycle (UI thread,
/// command channel). Plain boolean mailbox, drained once per cycle; no
/// queueing, a repeated press before the next cycle collapses into one.
#[derive(Debug, Default)]
pub struct ManualActions {
    buy: AtomicBool,
    sell: AtomicBool,
    close: AtomicBool,
    move_stop_to_breakeven: AtomicBool,
    toggle_auto: AtomicBool,
}

impl ManualActions {
    pub fn request_buy(&self) {
        self.buy.store(true, Ordering::SeqCst);
    }

    pub fn request_sell(&self) {
        self.sell.store(true, Ordering::SeqCst);
    }

    pub fn request_close(&self) {
        self.close.store(true, Ordering::SeqCst);
    }

    pub fn request_move_stop_to_breakeven(&self) {
        self.move_stop_to_breakeven.store(true, Ordering::SeqCst);
    }

    pub fn request_toggle_auto(&self) {
        self.toggle_auto.store(true, Ordering::SeqCst);
    }

    fn take(&self) -> DrainedActions {
        DrainedActions {
            buy: self.buy.swap(false, Ordering::SeqCst),
            sell: self.sell.swap(false, Ordering::SeqCst),
            close: self.close.swap(false, Ordering::SeqCst),
            move_stop_to_breakeven: self.move_stop_to_breakeven.swap(false, Ordering::SeqCst),
            toggle_auto: self.toggle_auto.swap(false, Ordering::SeqCst),
        }
    }
}

#[derive(Debug, Default)]
struct DrainedActions {
    buy: bool,
    sell: bool,
    close: bool,
    move_stop_to_breakeven: bool,
    toggle_auto: bool,
}

/// Entry submitted but not yet filled. The trade state proper is only
/// created once the broker confirms the fill. A scaled entry keeps one of
/// these per in-flight chunk.
#[derive(Debug, Clone)]
struct PendingEntry {
    label: String,
    direction: Direction,
    quantity: i64,
    signal_source: String,
    regime: MarketRegime,
    confluence_score: Option<i32>,
}

/// In-flight scaled entry: the chunk plan plus the signal metadata every
/// chunk's pending entry carries.
struct ScaledEntryState {
    plan: ScaledEntryPlan,
    source: String,
    score: Option<i32>,
}

/// What one evaluation cycle did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleOutcome {
    pub regime: MarketRegime,
    pub trading_suspended: bool,
    pub trade_closed: bool,
    pub stop_amended: bool,
    /// Label of the entry order submitted this cycle, if any
    pub entry_submitted: Option<String>,
}

pub struct Engine<B: BrokerAdapter> {
    config: EngineConfig,
    broker: B,
    registry: BotRegistry,
    classifier: RegimeClassifier,
    chop: ChopDetector,
    trend_filter: MasterTrendFilter,
    structure_filter: MarketStructureFilter,
    obos_filter: OverboughtOversoldFilter,
    scorer: ConfluenceScorer,
    risk: RiskManager,
    tracker: OrderTracker,
    health: HealthMonitor,
    actions: Arc<ManualActions>,
    sink: Box<dyn TradeRecordSink + Send>,

    active_trade: Option<ActiveTrade>,
    pending_entries: Vec<PendingEntry>,
    scaled: Option<ScaledEntryState>,
    entry_counter: u64,
}

impl<B: BrokerAdapter> Engine<B> {
    pub fn new(config: EngineConfig, broker: B) -> Result<Self, EngineError> {
        config
            .validate()
            .map_err(|e| EngineError::InvalidConfig(e.to_string()))?;

        let registry = BotRegistry::with_default_bots(config.registry.regime_routing);
        Self::with_registry(config, broker, registry)
    }

    /// Engine with a caller-assembled bot registry.
    pub fn with_registry(
        config: EngineConfig,
        broker: B,
        registry: BotRegistry,
    ) -> Result<Self, EngineError> {
        config
            .validate()
            .map_err(|e| EngineError::InvalidConfig(e.to_string()))?;

        Ok(Self {
            classifier: RegimeClassifier::new(config.regime.clone()),
            chop: ChopDetector::new(config.chop.clone()),
            trend_filter: MasterTrendFilter::new(config.trend_filter.clone()),
            structure_filter: MarketStructureFilter::new(config.structure_filter.enabled),
            obos_filter: OverboughtOversoldFilter::new(config.oscillator_filter.clone()),
            scorer: ConfluenceScorer::new(
                config.confluence.clone(),
                config.oscillator_filter.clone(),
            ),
            risk: RiskManager::new(
                config.risk.clone(),
                config.instrument.tick_size,
                config.instrument.tick_value,
            ),
            tracker: OrderTracker::new(&config.orders),
            health: HealthMonitor::new(&config.orders),
            actions: Arc::new(ManualActions::default()),
            sink: Box::new(LogSink),
            registry,
            broker,
            config,
            active_trade: None,
            pending_entries: Vec::new(),
            scaled: None,
            entry_counter: 0,
        })
    }

    /// Replace the closed-trade sink (defaults to structured logging).
    pub fn with_sink(mut self, sink: Box<dyn TradeRecordSink + Send>) -> Self {
        self.sink = sink;
        self
    }

    /// Handle shared with the operator surface for manual intents.
    pub fn manual_actions(&self) -> Arc<ManualActions> {
        Arc::clone(&self.actions)
    }

    pub fn broker_ref(&self) -> &B {
        &self.broker
    }

    pub fn broker_mut(&mut self) -> &mut B {
        &mut self.broker
    }

    pub fn active_trade(&self) -> Option<&ActiveTrade> {
        self.active_trade.as_ref()
    }

    pub fn regime(&self) -> MarketRegime {
        self.classifier.current()
    }

    pub fn is_health_tripped(&self) -> bool {
        self.health.is_tripped()
    }

    /// Manual re-arm after a health trip.
    pub fn reset_health(&mut self) {
        self.health.reset();
    }

    pub fn has_submission_error(&self) -> bool {
        self.tracker.has_submission_error()
    }

    /// Manual acknowledgment of a latched submission failure.
    pub fn clear_submission_error(&mut self) {
        self.tracker.clear_submission_error();
    }

    pub fn set_regime_override(&mut self, regime: MarketRegime) {
        self.classifier.set_override(regime);
    }

    /// Probe data-feed staleness against the wall clock. Hosts call this
    /// from their idle/timer path between bars.
    pub fn check_data_health(&mut self, now: DateTime<Utc>) -> bool {
        self.health.check_staleness(now)
    }

    /// One full evaluation cycle.
    pub fn on_bar(&mut self, ctx: &BarContext) -> CycleOutcome {
        let mut outcome = CycleOutcome::default();

        self.health.record_tick(ctx.now);
        outcome.entry_submitted = self.drain_manual_actions(ctx);

        outcome.regime = self.classifier.classify(&ctx.snapshot);
        self.chop.update(&ctx.snapshot);
        outcome.trading_suspended = !self.chop.trading_allowed();

        // Position returned to flat: close out the trade state before
        // anything else looks at it.
        if self.active_trade.is_some() && ctx.position.is_flat() {
            self.handle_flat_transition(ctx);
            outcome.trade_closed = true;
        }

        // Scaled entry in flight: keep feeding chunks. This runs before the
        // in-trade branch because the earlier chunks may already be filled
        // and under management while later chunks are still due.
        if self.scaled.is_some() {
            if let Some(label) = self.continue_scaled_entry(ctx) {
                outcome.entry_submitted = Some(label);
            }
        }

        if let Some(mut trade) = self.active_trade.take() {
            if ctx.first_tick_of_bar {
                trade.bars_in_trade += 1;
            }
            let adjustments = self.risk.manage(&mut trade, &ctx.snapshot);
            if let Some(stop) = adjustments.new_stop {
                // Protective amendments bypass the submission throttle
                match self.broker.amend_stop(stop) {
                    Ok(()) => outcome.stop_amended = true,
                    Err(err) => error!(%err, stop, "stop amendment failed"),
                }
            }
            self.active_trade = Some(trade);
            return outcome;
        }

        if self.scaled.is_some() || !self.pending_entries.is_empty() || !ctx.position.is_flat() {
            return outcome;
        }

        if !self.entry_allowed() {
            return outcome;
        }

        if let Some(signal) = self.find_entry_signal(ctx) {
            outcome.entry_submitted = self.try_enter(ctx, signal);
        }

        outcome
    }

    /// Broker order-state callback.
    pub fn on_order_update(
        &mut self,
        label: &str,
        status: OrderStatus,
        fill_price: Option<f64>,
        ctx: &BarContext,
    ) {
        self.tracker.on_order_update(label, status);

        let pending_idx = self.pending_entries.iter().position(|p| p.label == label);

        match status {
            OrderStatus::Filled => {
                let pending = match pending_idx {
                    Some(i) => self.pending_entries.remove(i),
                    None => return,
                };
                self.health.record_acceptance();
                match self.active_trade.as_mut() {
                    // Later chunk of a scaled entry: fold into the open trade
                    Some(trade) if trade.direction == pending.direction => {
                        trade.quantity += pending.quantity;
                        debug!(
                            label,
                            quantity = trade.quantity,
                            "scaled chunk filled into open trade"
                        );
                    }
                    _ => {
                        let entry_price = fill_price
                            .or_else(|| ctx.close())
                            .unwrap_or(ctx.position.average_price);
                        let trade = self.risk.open_trade(
                            pending.direction,
                            entry_price,
                            pending.quantity,
                            pending.signal_source,
                            pending.regime,
                            pending.confluence_score,
                            &ctx.snapshot,
                            ctx.now,
                        );
                        if let Err(err) = self.broker.amend_stop(trade.stop_price) {
                            error!(%err, "failed to place protective stop");
                        }
                        if let Err(err) = self.broker.amend_target(trade.target_price) {
                            error!(%err, "failed to place profit target");
                        }
                        self.active_trade = Some(trade);
                    }
                }
            }
            OrderStatus::Rejected => {
                warn!(label, "order rejected by broker");
                if let Some(i) = pending_idx {
                    self.pending_entries.remove(i);
                    self.scaled = None;
                }
                self.health.record_rejection();
            }
            OrderStatus::Cancelled => {
                if let Some(i) = pending_idx {
                    self.pending_entries.remove(i);
                }
            }
            OrderStatus::Working => {}
        }
    }

    /// Advance an in-flight scaled entry by one poll. Every chunk passes
    /// the same gates as a fresh entry: a health trip, a suspension, or a
    /// latched submission failure aborts the remainder of the sequence
    /// instead of retrying it.
    fn continue_scaled_entry(&mut self, ctx: &BarContext) -> Option<String> {
        let mut state = self.scaled.take()?;
        if !self.entry_allowed() {
            warn!("scaled entry aborted: entries gated off mid-sequence");
            return None;
        }
        match state.plan.poll(ctx.now, &ctx.position) {
            ScaledEntryAction::Submit(quantity) => {
                let label = self.next_label();
                let submitted = self.submit_entry(
                    ctx,
                    state.plan.direction,
                    quantity,
                    label,
                    state.source.clone(),
                    state.score,
                );
                // A failed chunk submission drops the rest of the plan;
                // the sticky latch already blocks fresh entries.
                if submitted.is_some() {
                    self.scaled = Some(state);
                }
                submitted
            }
            ScaledEntryAction::Wait => {
                self.scaled = Some(state);
                None
            }
            ScaledEntryAction::Done | ScaledEntryAction::Aborted => None,
        }
    }

    fn drain_manual_actions(&mut self, ctx: &BarContext) -> Option<String> {
        let drained = self.actions.take();

        if drained.toggle_auto {
            match self.chop.suspension() {
                Suspension::User => self.chop.user_enable(),
                _ => self.chop.user_disable(),
            }
        }

        if drained.close {
            info!("manual close requested");
            if let Err(err) = self.broker.close_position() {
                error!(%err, "manual close failed");
            }
            self.scaled = None;
            self.pending_entries.clear();
        }

        if drained.move_stop_to_breakeven {
            if let Some(trade) = self.active_trade.as_mut() {
                trade.breakeven_realized = true;
                trade.stop_price = trade.entry_price;
                if let Err(err) = self.broker.amend_stop(trade.entry_price) {
                    error!(%err, "manual breakeven amendment failed");
                }
            }
        }

        let manual_direction = match (drained.buy, drained.sell) {
            (true, false) => Some(Direction::Long),
            (false, true) => Some(Direction::Short),
            _ => None,
        };
        if let Some(direction) = manual_direction {
            // Manual entries skip the signal and filter stack but still
            // respect the health kill-switch and flat-position requirement.
            if self.health.is_tripped() {
                warn!("manual entry ignored: health monitor tripped");
            } else if !ctx.position.is_flat() || self.active_trade.is_some() {
                warn!("manual entry ignored: position not flat");
            } else {
                let close = ctx.close().unwrap_or(ctx.position.average_price);
                let stop_ticks = self.risk.initial_stop_ticks(direction, close, &ctx.snapshot);
                let quantity = self.risk.position_size(ctx.account_equity, stop_ticks);
                let label = self.next_label();
                return self.submit_entry(
                    ctx,
                    direction,
                    quantity,
                    label,
                    "manual".to_string(),
                    None,
                );
            }
        }
        None
    }

    fn entry_allowed(&self) -> bool {
        if self.health.is_tripped() {
            return false;
        }
        if !self.chop.trading_allowed() {
            debug!("entries suspended");
            return false;
        }
        if self.tracker.has_submission_error() {
            debug!("entries latched off after submission failure");
            return false;
        }
        true
    }

    /// Registry dispatch plus the full veto-filter stack.
    fn find_entry_signal(&self, ctx: &BarContext) -> Option<SelectedSignal> {
        let policy = if self.config.registry.use_confluence {
            DispatchPolicy::Confluence
        } else {
            DispatchPolicy::FirstMatch
        };
        let signal = self.registry.select(
            ctx,
            self.classifier.current(),
            policy,
            &self.scorer,
            &self.trend_filter,
        )?;

        if !self.trend_filter.allows(signal.direction, &ctx.snapshot) {
            return None;
        }
        if !self.structure_filter.allows(signal.direction, &ctx.snapshot) {
            return None;
        }
        // While Ranging, the exhaustion filter engages even if the config
        // toggle is off.
        let force_obos = self.classifier.exhaustion_filter_active();
        if !self
            .obos_filter
            .allows(signal.direction, &ctx.snapshot, force_obos)
        {
            return None;
        }
        Some(signal)
    }

    fn try_enter(&mut self, ctx: &BarContext, signal: SelectedSignal) -> Option<String> {
        let close = ctx.close()?;
        let stop_ticks = self
            .risk
            .initial_stop_ticks(signal.direction, close, &ctx.snapshot);
        let quantity = self.risk.position_size(ctx.account_equity, stop_ticks);

        if !self.tracker.can_submit(ctx.now, false) {
            debug!("entry throttled");
            return None;
        }

        if self.config.orders.scale_chunks > 1 {
            let mut state = ScaledEntryState {
                plan: ScaledEntryPlan::new(signal.direction, quantity, &self.config.orders),
                source: signal.source,
                score: signal.score,
            };
            let label = self.next_label();
            let submitted = match state.plan.poll(ctx.now, &ctx.position) {
                ScaledEntryAction::Submit(chunk) => self.submit_entry(
                    ctx,
                    signal.direction,
                    chunk,
                    label,
                    state.source.clone(),
                    state.score,
                ),
                _ => None,
            };
            if submitted.is_some() {
                self.scaled = Some(state);
            }
            return submitted;
        }

        let label = self.next_label();
        self.submit_entry(
            ctx,
            signal.direction,
            quantity,
            label,
            signal.source,
            signal.score,
        )
    }

    fn submit_entry(
        &mut self,
        ctx: &BarContext,
        direction: Direction,
        quantity: i64,
        label: String,
        source: String,
        score: Option<i32>,
    ) -> Option<String> {
        let order = EntryOrder {
            direction,
            quantity,
            label: label.clone(),
        };
        match self.broker.submit_entry(&order) {
            Ok(handle) => {
                info!(
                    label = %label,
                    direction = %direction,
                    quantity,
                    source = %source,
                    "entry submitted"
                );
                self.tracker.record_submission(ctx.now, handle);
                self.pending_entries.push(PendingEntry {
                    label: label.clone(),
                    direction,
                    quantity,
                    signal_source: source,
                    regime: self.classifier.current(),
                    confluence_score: score,
                });
                Some(label)
            }
            Err(err) => {
                self.tracker.record_submission_failure(&label, &err);
                self.health.record_rejection();
                None
            }
        }
    }

    /// Position went flat: record the trade, feed the learning window, and
    /// sweep any orders the broker still holds.
    fn handle_flat_transition(&mut self, ctx: &BarContext) {
        let trade = match self.active_trade.take() {
            Some(t) => t,
            None => return,
        };
        let exit_price = ctx.close().unwrap_or(trade.entry_price);
        let record =
            ClosedTrade::from_trade(&trade, exit_price, ctx.now, self.config.instrument.tick_size);
        self.sink.record(&record);
        self.risk.record_closed_trade(trade.excursion());

        self.scaled = None;
        self.pending_entries.clear();
        self.tracker.reconcile(&mut self.broker);
        if !self.tracker.is_empty() {
            warn!(
                tracked = self.tracker.tracked_count(),
                "labels still tracked after flat transition"
            );
        }
    }

    fn next_label(&mut self) -> String {
        self.entry_counter += 1;
        format!("entry_{}", self.entry_counter)
    }
}
