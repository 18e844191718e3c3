//! Order lifecycle and account health
//!
//! Tracks every working order the engine owns under a stable label,
//! throttles submissions, reconciles broker state against the tracker,
//! paces scaled entries, and trips a kill-switch when the data feed or the
//! broker misbehaves.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, error, info, warn};

use crate::config::OrderConfig;
use crate::types::{BrokerError, Direction, OrderHandle, OrderStatus, PositionSnapshot};

/// Entry order as handed to the broker adapter
#[derive(Debug, Clone, PartialEq)]
pub struct EntryOrder {
    pub direction: Direction,
    pub quantity: i64,
    pub label: String,
}

/// Seam between the decision engine and the execution venue.
///
/// Implementations wrap a live brokerage session; tests substitute a mock.
pub trait BrokerAdapter {
    fn submit_entry(&mut self, order: &EntryOrder) -> Result<OrderHandle, BrokerError>;
    /// Market order that flattens the current position.
    fn close_position(&mut self) -> Result<(), BrokerError>;
    fn amend_stop(&mut self, price: f64) -> Result<(), BrokerError>;
    fn amend_target(&mut self, price: f64) -> Result<(), BrokerError>;
    fn cancel(&mut self, handle: &OrderHandle) -> Result<(), BrokerError>;
    /// Orders the venue currently reports as live for this account.
    fn live_orders(&self) -> Vec<OrderHandle>;
}

/// Label-keyed registry of working orders plus the submission throttle.
///
/// The map lives behind a mutex because broker callbacks and the bar cycle
/// arrive on different threads in a live host.
#[derive(Debug)]
pub struct OrderTracker {
    orders: Mutex<HashMap<String, OrderHandle>>,
    throttle: Duration,
    last_submission: Option<DateTime<Utc>>,
    /// Sticky: set on any submission failure, cleared only explicitly
    submission_error: bool,
}

impl OrderTracker {
    pub fn new(config: &OrderConfig) -> Self {
        Self {
            orders: Mutex::new(HashMap::new()),
            throttle: Duration::seconds(config.throttle_secs),
            last_submission: None,
            submission_error: false,
        }
    }

    /// Whether a submission is allowed at `now`. Protective-stop amendments
    /// pass `bypass_throttle` so risk management is never rate-limited.
    pub fn can_submit(&self, now: DateTime<Utc>, bypass_throttle: bool) -> bool {
        if self.submission_error {
            return false;
        }
        if bypass_throttle {
            return true;
        }
        match self.last_submission {
            Some(last) => now - last >= self.throttle,
            None => true,
        }
    }

    pub fn record_submission(&mut self, now: DateTime<Utc>, handle: OrderHandle) {
        self.last_submission = Some(now);
        debug!(label = %handle.label, id = handle.id, "order tracked");
        if let Ok(mut orders) = self.orders.lock() {
            orders.insert(handle.label.clone(), handle);
        }
    }

    pub fn record_submission_failure(&mut self, label: &str, err: &BrokerError) {
        error!(label, %err, "order submission failed; entries latched off");
        self.submission_error = true;
    }

    pub fn has_submission_error(&self) -> bool {
        self.submission_error
    }

    /// Manual acknowledgment of a submission failure.
    pub fn clear_submission_error(&mut self) {
        self.submission_error = false;
    }

    /// Broker callback: terminal statuses drop the label from the registry.
    pub fn on_order_update(&self, label: &str, status: OrderStatus) -> Option<OrderHandle> {
        if !status.is_terminal() {
            return None;
        }
        let removed = match self.orders.lock() {
            Ok(mut orders) => orders.remove(label),
            Err(_) => None,
        };
        if removed.is_some() {
            debug!(label, ?status, "order reached terminal state");
        }
        removed
    }

    pub fn contains(&self, label: &str) -> bool {
        self.orders
            .lock()
            .map(|orders| orders.contains_key(label))
            .unwrap_or(false)
    }

    pub fn tracked_count(&self) -> usize {
        self.orders.lock().map(|orders| orders.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.tracked_count() == 0
    }

    /// Cancel every live broker order the tracker does not know about.
    /// Cancel failures are logged and skipped so one bad order cannot stall
    /// the sweep. Returns the number of cancels issued.
    pub fn reconcile<B: BrokerAdapter>(&self, broker: &mut B) -> usize {
        let live = broker.live_orders();
        let mut cancelled = 0;
        for handle in live {
            if self.contains(&handle.label) {
                continue;
            }
            warn!(label = %handle.label, id = handle.id, "cancelling untracked order");
            match broker.cancel(&handle) {
                Ok(()) => cancelled += 1,
                Err(err) => error!(label = %handle.label, %err, "cancel failed during reconciliation"),
            }
        }
        cancelled
    }
}

/// Data-feed and broker health kill-switch.
///
/// Trips exactly once; only a manual reset re-arms trading.
#[derive(Debug)]
pub struct HealthMonitor {
    stale_after: Duration,
    max_rejections: u32,
    last_tick: Option<DateTime<Utc>>,
    staleness_strikes: u32,
    consecutive_rejections: u32,
    tripped: bool,
}

const STALENESS_STRIKES_TO_TRIP: u32 = 3;

impl HealthMonitor {
    pub fn new(config: &OrderConfig) -> Self {
        Self {
            stale_after: Duration::seconds(config.stale_data_secs),
            max_rejections: config.max_rejections,
            last_tick: None,
            staleness_strikes: 0,
            consecutive_rejections: 0,
            tripped: false,
        }
    }

    /// Fresh price update: clears any accumulated staleness strikes.
    pub fn record_tick(&mut self, now: DateTime<Utc>) {
        self.last_tick = Some(now);
        self.staleness_strikes = 0;
    }

    /// Periodic staleness probe. Returns true only on the transition into
    /// the tripped state.
    pub fn check_staleness(&mut self, now: DateTime<Utc>) -> bool {
        if self.tripped {
            return false;
        }
        let stale = match self.last_tick {
            Some(last) => now - last > self.stale_after,
            None => false,
        };
        if !stale {
            return false;
        }
        self.staleness_strikes += 1;
        warn!(
            strikes = self.staleness_strikes,
            "no fresh data within staleness window"
        );
        if self.staleness_strikes >= STALENESS_STRIKES_TO_TRIP {
            self.trip("data feed stale");
            return true;
        }
        false
    }

    /// Broker rejection. Returns true only on the transition into the
    /// tripped state.
    pub fn record_rejection(&mut self) -> bool {
        if self.tripped {
            return false;
        }
        self.consecutive_rejections += 1;
        if self.consecutive_rejections >= self.max_rejections {
            self.trip("consecutive order rejections");
            return true;
        }
        false
    }

    /// Any accepted order resets the rejection streak.
    pub fn record_acceptance(&mut self) {
        self.consecutive_rejections = 0;
    }

    pub fn is_tripped(&self) -> bool {
        self.tripped
    }

    /// Manual re-arm after an operator has inspected the session.
    pub fn reset(&mut self) {
        info!("health monitor manually reset");
        self.tripped = false;
        self.staleness_strikes = 0;
        self.consecutive_rejections = 0;
    }

    fn trip(&mut self, reason: &str) {
        error!(reason, "health monitor tripped; auto-trading disabled");
        self.tripped = true;
    }
}

/// Instruction produced by polling a scaled-entry plan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaledEntryAction {
    /// Submit the next chunk of this many contracts
    Submit(i64),
    /// Delay between chunks has not elapsed yet
    Wait,
    /// All chunks submitted
    Done,
    /// Position went flat mid-sequence; remaining chunks dropped
    Aborted,
}

/// Splits a large entry into timed chunks, polled from the bar/tick cycle.
/// Pure wall-clock comparisons; no timers or background threads.
#[derive(Debug, Clone)]
pub struct ScaledEntryPlan {
    pub direction: Direction,
    total_quantity: i64,
    chunks: usize,
    delay: Duration,
    submitted_chunks: usize,
    next_chunk_at: Option<DateTime<Utc>>,
    saw_position: bool,
    aborted: bool,
}

impl ScaledEntryPlan {
    pub fn new(direction: Direction, total_quantity: i64, config: &OrderConfig) -> Self {
        Self {
            direction,
            total_quantity,
            chunks: config.scale_chunks.max(1),
            delay: Duration::seconds(config.scale_delay_secs),
            submitted_chunks: 0,
            next_chunk_at: None,
            saw_position: false,
            aborted: false,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.aborted || self.submitted_chunks >= self.chunks
    }

    /// Advance the plan against the clock and the live position.
    pub fn poll(&mut self, now: DateTime<Utc>, position: &PositionSnapshot) -> ScaledEntryAction {
        if self.aborted {
            return ScaledEntryAction::Aborted;
        }
        if self.submitted_chunks >= self.chunks {
            return ScaledEntryAction::Done;
        }

        if !position.is_flat() {
            self.saw_position = true;
        } else if self.saw_position {
            // Filled and then flattened before the sequence finished: the
            // position was stopped out or closed manually. Stop scaling in.
            warn!(
                submitted = self.submitted_chunks,
                of = self.chunks,
                "scaled entry aborted on unexpected flat"
            );
            self.aborted = true;
            return ScaledEntryAction::Aborted;
        }

        if let Some(at) = self.next_chunk_at {
            if now < at {
                return ScaledEntryAction::Wait;
            }
        }

        self.submitted_chunks += 1;
        self.next_chunk_at = Some(now + self.delay);
        ScaledEntryAction::Submit(self.chunk_quantity())
    }

    /// Even split with the remainder loaded onto the final chunk.
    fn chunk_quantity(&self) -> i64 {
        let base = self.total_quantity / self.chunks as i64;
        if self.submitted_chunks == self.chunks {
            self.total_quantity - base * (self.chunks as i64 - 1)
        } else {
            base.max(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    struct MockBroker {
        live: Vec<OrderHandle>,
        cancelled: Vec<String>,
        fail_cancel_for: Option<String>,
        next_id: u64,
    }

    impl MockBroker {
        fn new(live: Vec<OrderHandle>) -> Self {
            Self {
                live,
                cancelled: Vec::new(),
                fail_cancel_for: None,
                next_id: 100,
            }
        }
    }

    impl BrokerAdapter for MockBroker {
        fn submit_entry(&mut self, order: &EntryOrder) -> Result<OrderHandle, BrokerError> {
            self.next_id += 1;
            Ok(OrderHandle {
                id: self.next_id,
                label: order.label.clone(),
            })
        }

        fn close_position(&mut self) -> Result<(), BrokerError> {
            Ok(())
        }

        fn amend_stop(&mut self, _price: f64) -> Result<(), BrokerError> {
            Ok(())
        }

        fn amend_target(&mut self, _price: f64) -> Result<(), BrokerError> {
            Ok(())
        }

        fn cancel(&mut self, handle: &OrderHandle) -> Result<(), BrokerError> {
            if self.fail_cancel_for.as_deref() == Some(handle.label.as_str()) {
                return Err(BrokerError::Unavailable("session closed".into()));
            }
            self.cancelled.push(handle.label.clone());
            Ok(())
        }

        fn live_orders(&self) -> Vec<OrderHandle> {
            self.live.clone()
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).single().unwrap()
    }

    fn handle(id: u64, label: &str) -> OrderHandle {
        OrderHandle {
            id,
            label: label.to_string(),
        }
    }

    #[test]
    fn test_throttle_blocks_rapid_submissions() {
        let mut tracker = OrderTracker::new(&OrderConfig {
            throttle_secs: 2,
            ..Default::default()
        });
        assert!(tracker.can_submit(at(0), false));
        tracker.record_submission(at(0), handle(1, "entry"));

        assert!(!tracker.can_submit(at(1), false));
        assert!(tracker.can_submit(at(2), false));
        // Protective amendments bypass the throttle
        assert!(tracker.can_submit(at(1), true));
    }

    #[test]
    fn test_submission_error_is_sticky() {
        let mut tracker = OrderTracker::new(&OrderConfig::default());
        tracker
            .record_submission_failure("entry", &BrokerError::Rejected("margin".into()));

        assert!(!tracker.can_submit(at(60), false));
        // Even the throttle bypass does not override the latch
        assert!(!tracker.can_submit(at(60), true));

        tracker.clear_submission_error();
        assert!(tracker.can_submit(at(60), false));
    }

    #[test]
    fn test_terminal_status_removes_label() {
        let mut tracker = OrderTracker::new(&OrderConfig::default());
        tracker.record_submission(at(0), handle(1, "entry"));
        assert!(tracker.contains("entry"));

        assert!(tracker.on_order_update("entry", OrderStatus::Working).is_none());
        assert!(tracker.contains("entry"));

        let removed = tracker.on_order_update("entry", OrderStatus::Filled);
        assert_eq!(removed, Some(handle(1, "entry")));
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_reconcile_cancels_only_untracked_orders() {
        let mut tracker = OrderTracker::new(&OrderConfig::default());
        tracker.record_submission(at(0), handle(1, "stop"));

        let mut broker = MockBroker::new(vec![handle(1, "stop"), handle(2, "rogue")]);
        let cancelled = tracker.reconcile(&mut broker);

        assert_eq!(cancelled, 1);
        assert_eq!(broker.cancelled, vec!["rogue".to_string()]);
    }

    #[test]
    fn test_reconcile_survives_cancel_failure() {
        let tracker = OrderTracker::new(&OrderConfig::default());
        let mut broker = MockBroker::new(vec![handle(1, "rogue_a"), handle(2, "rogue_b")]);
        broker.fail_cancel_for = Some("rogue_a".to_string());

        // The failing cancel is logged and skipped; the sweep continues
        let cancelled = tracker.reconcile(&mut broker);
        assert_eq!(cancelled, 1);
        assert_eq!(broker.cancelled, vec!["rogue_b".to_string()]);
    }

    #[test]
    fn test_staleness_trips_after_three_strikes_exactly_once() {
        let mut monitor = HealthMonitor::new(&OrderConfig {
            stale_data_secs: 30,
            ..Default::default()
        });
        monitor.record_tick(at(0));

        assert!(!monitor.check_staleness(at(31)));
        assert!(!monitor.check_staleness(at(62)));
        // Third strike: the one and only trip transition
        assert!(monitor.check_staleness(at(93)));
        assert!(monitor.is_tripped());
        assert!(!monitor.check_staleness(at(124)));

        monitor.reset();
        assert!(!monitor.is_tripped());
    }

    #[test]
    fn test_fresh_tick_clears_staleness_strikes() {
        let mut monitor = HealthMonitor::new(&OrderConfig {
            stale_data_secs: 30,
            ..Default::default()
        });
        monitor.record_tick(at(0));
        assert!(!monitor.check_staleness(at(31)));
        assert!(!monitor.check_staleness(at(62)));

        monitor.record_tick(at(63));
        // Strike count restarted; two more stale probes do not trip
        assert!(!monitor.check_staleness(at(94)));
        assert!(!monitor.check_staleness(at(125)));
        assert!(!monitor.is_tripped());
    }

    #[test]
    fn test_rejection_streak_trips_once() {
        let mut monitor = HealthMonitor::new(&OrderConfig {
            max_rejections: 3,
            ..Default::default()
        });
        assert!(!monitor.record_rejection());
        assert!(!monitor.record_rejection());
        assert!(monitor.record_rejection());
        assert!(!monitor.record_rejection());
        assert!(monitor.is_tripped());
    }

    #[test]
    fn test_acceptance_resets_rejection_streak() {
        let mut monitor = HealthMonitor::new(&OrderConfig {
            max_rejections: 3,
            ..Default::default()
        });
        monitor.record_rejection();
        monitor.record_rejection();
        monitor.record_acceptance();
        assert!(!monitor.record_rejection());
        assert!(!monitor.is_tripped());
    }

    #[test]
    fn test_scaled_entry_paces_chunks_by_clock() {
        let config = OrderConfig {
            scale_chunks: 3,
            scale_delay_secs: 5,
            ..Default::default()
        };
        let mut plan = ScaledEntryPlan::new(Direction::Long, 6, &config);

        assert_eq!(
            plan.poll(at(0), &PositionSnapshot::flat()),
            ScaledEntryAction::Submit(2)
        );
        // Delay not yet elapsed
        assert_eq!(
            plan.poll(at(3), &PositionSnapshot::long(2, 100.0)),
            ScaledEntryAction::Wait
        );
        assert_eq!(
            plan.poll(at(5), &PositionSnapshot::long(2, 100.0)),
            ScaledEntryAction::Submit(2)
        );
        assert_eq!(
            plan.poll(at(10), &PositionSnapshot::long(4, 100.0)),
            ScaledEntryAction::Submit(2)
        );
        assert!(plan.is_complete());
        assert_eq!(
            plan.poll(at(15), &PositionSnapshot::long(6, 100.0)),
            ScaledEntryAction::Done
        );
    }

    #[test]
    fn test_scaled_entry_aborts_on_unexpected_flat() {
        let config = OrderConfig {
            scale_chunks: 3,
            scale_delay_secs: 5,
            ..Default::default()
        };
        let mut plan = ScaledEntryPlan::new(Direction::Long, 6, &config);

        assert_eq!(
            plan.poll(at(0), &PositionSnapshot::flat()),
            ScaledEntryAction::Submit(2)
        );
        assert_eq!(
            plan.poll(at(5), &PositionSnapshot::long(2, 100.0)),
            ScaledEntryAction::Submit(2)
        );
        // Position vanished before the final chunk: stopped out already
        assert_eq!(
            plan.poll(at(10), &PositionSnapshot::flat()),
            ScaledEntryAction::Aborted
        );
        assert!(plan.is_complete());
        assert_eq!(
            plan.poll(at(15), &PositionSnapshot::flat()),
            ScaledEntryAction::Aborted
        );
    }

    #[test]
    fn test_scaled_entry_remainder_on_final_chunk() {
        let config = OrderConfig {
            scale_chunks: 3,
            scale_delay_secs: 0,
            ..Default::default()
        };
        let mut plan = ScaledEntryPlan::new(Direction::Long, 7, &config);
        assert_eq!(
            plan.poll(at(0), &PositionSnapshot::flat()),
            ScaledEntryAction::Submit(2)
        );
        assert_eq!(
            plan.poll(at(1), &PositionSnapshot::long(2, 100.0)),
            ScaledEntryAction::Submit(2)
        );
        // 7 contracts over 3 chunks: remainder lands on the last
        assert_eq!(
            plan.poll(at(2), &PositionSnapshot::long(4, 100.0)),
            ScaledEntryAction::Submit(3)
        );
    }
}
