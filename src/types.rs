//! Core data types used across the decision engine

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Outcome of a signal-bot evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    NoSignal,
    Long,
    Short,
}

impl Direction {
    pub fn is_signal(self) -> bool {
        !matches!(self, Direction::NoSignal)
    }

    /// The opposite trade direction. NoSignal maps to itself.
    pub fn opposite(self) -> Direction {
        match self {
            Direction::Long => Direction::Short,
            Direction::Short => Direction::Long,
            Direction::NoSignal => Direction::NoSignal,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Direction::NoSignal => "no-signal",
            Direction::Long => "long",
            Direction::Short => "short",
        };
        write!(f, "{}", s)
    }
}

/// Classification of current market behavior, written once per cycle
/// by the regime classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketRegime {
    #[default]
    Undefined,
    Trending,
    Ranging,
    Breakout,
}

impl std::fmt::Display for MarketRegime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MarketRegime::Undefined => "undefined",
            MarketRegime::Trending => "trending",
            MarketRegime::Ranging => "ranging",
            MarketRegime::Breakout => "breakout",
        };
        write!(f, "{}", s)
    }
}

/// Which regime bucket a signal bot belongs to. Universal bots are
/// consulted in every regime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegimeAffinity {
    Universal,
    Trending,
    Ranging,
    Breakout,
}

/// Net position as reported by the broker snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketPosition {
    Flat,
    Long,
    Short,
}

/// Read-only position state for one evaluation cycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionSnapshot {
    /// Signed contract count: positive long, negative short, zero flat
    pub quantity: i64,
    pub average_price: f64,
}

impl PositionSnapshot {
    pub fn flat() -> Self {
        Self {
            quantity: 0,
            average_price: 0.0,
        }
    }

    pub fn long(quantity: i64, average_price: f64) -> Self {
        Self {
            quantity: quantity.abs(),
            average_price,
        }
    }

    pub fn short(quantity: i64, average_price: f64) -> Self {
        Self {
            quantity: -quantity.abs(),
            average_price,
        }
    }

    pub fn market_position(&self) -> MarketPosition {
        match self.quantity.cmp(&0) {
            std::cmp::Ordering::Greater => MarketPosition::Long,
            std::cmp::Ordering::Less => MarketPosition::Short,
            std::cmp::Ordering::Equal => MarketPosition::Flat,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.quantity == 0
    }
}

/// Handle returned by the broker adapter for a submitted order
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OrderHandle {
    pub id: u64,
    pub label: String,
}

/// Broker-reported order state. Terminal states remove the label from
/// the lifecycle tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    Working,
    Filled,
    Cancelled,
    Rejected,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, OrderStatus::Working)
    }
}

/// MFE/MAE observation for one closed trade, in ticks
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TradeExcursion {
    pub mfe_ticks: f64,
    pub mae_ticks: f64,
}

/// Errors surfaced by the broker adapter
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("order rejected: {0}")]
    Rejected(String),

    #[error("broker unavailable: {0}")]
    Unavailable(String),

    #[error("unknown order label: {0}")]
    UnknownLabel(String),
}

/// Errors surfaced by the decision engine
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("order submission failed for label '{label}': {source}")]
    SubmissionFailed {
        label: String,
        #[source]
        source: BrokerError,
    },

    #[error("auto-trading is disabled ({0}); manual reset required")]
    TradingDisabled(&'static str),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
