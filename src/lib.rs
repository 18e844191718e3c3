//! tickpilot: a per-bar decision engine for single-instrument,
//! single-net-position automated trading.
//!
//! The host platform owns market data, indicator math, and order routing;
//! this crate owns the decisions. Each bar the engine classifies the market
//! regime, consults a registry of signal bots routed by that regime, runs
//! every candidate entry through a layered veto-filter stack, sizes the
//! position, and manages the resulting trade with a configurable
//! stop-loss/profit-target state machine that can learn its distances from
//! recent trade outcomes.
//!
//! Integration surface:
//! - [`snapshot::BarContext`] is the read-only per-cycle input the host
//!   builds from its data feed.
//! - [`oms::BrokerAdapter`] is the seam the host implements over its
//!   execution venue.
//! - [`engine::Engine::on_bar`] runs one evaluation cycle;
//!   [`engine::Engine::on_order_update`] consumes broker callbacks.

pub mod bots;
pub mod config;
pub mod confluence;
pub mod engine;
pub mod filters;
pub mod history;
pub mod oms;
pub mod regime;
pub mod risk;
pub mod snapshot;
pub mod telemetry;
pub mod types;

pub use bots::{BotRegistry, DispatchPolicy, SelectedSignal, SignalBot};
pub use config::EngineConfig;
pub use engine::{CycleOutcome, Engine, ManualActions};
pub use oms::{BrokerAdapter, EntryOrder, HealthMonitor, OrderTracker};
pub use regime::RegimeClassifier;
pub use risk::{ActiveTrade, RiskManager};
pub use snapshot::{BarContext, IndicatorSnapshot, Series};
pub use telemetry::{ClosedTrade, TradeRecordSink};
pub use types::{
    BrokerError, Direction, EngineError, MarketPosition, MarketRegime, OrderHandle, OrderStatus,
    PositionSnapshot, RegimeAffinity, TradeExcursion,
};
