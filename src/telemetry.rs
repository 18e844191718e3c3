//! Closed-trade telemetry
//!
//! Every completed trade is summarized into a serializable record and
//! handed to a sink. The default sink writes structured log lines; hosts
//! can substitute their own persistence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{StopMode, TargetMode};
use crate::risk::ActiveTrade;
use crate::types::{Direction, MarketRegime};

/// Summary of one completed trade
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub direction: Direction,
    pub entry_price: f64,
    pub exit_price: f64,
    pub quantity: i64,
    pub profit_ticks: f64,
    pub mfe_ticks: f64,
    pub mae_ticks: f64,
    pub regime_at_entry: MarketRegime,
    pub signal_source: String,
    pub stop_mode: StopMode,
    pub target_mode: TargetMode,
    pub confluence_score: Option<i32>,
    pub bars_in_trade: u32,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
}

impl ClosedTrade {
    /// Build the record from the trade state at the moment the position
    /// returned to flat.
    pub fn from_trade(
        trade: &ActiveTrade,
        exit_price: f64,
        exit_time: DateTime<Utc>,
        tick_size: f64,
    ) -> Self {
        ClosedTrade {
            direction: trade.direction,
            entry_price: trade.entry_price,
            exit_price,
            quantity: trade.quantity,
            profit_ticks: trade.profit_ticks(exit_price, tick_size),
            mfe_ticks: trade.mfe_ticks,
            mae_ticks: trade.mae_ticks,
            regime_at_entry: trade.regime_at_entry,
            signal_source: trade.signal_source.clone(),
            stop_mode: trade.stop_mode,
            target_mode: trade.target_mode,
            confluence_score: trade.confluence_score,
            bars_in_trade: trade.bars_in_trade,
            entry_time: trade.entry_time,
            exit_time,
        }
    }
}

/// Destination for closed-trade records
pub trait TradeRecordSink {
    fn record(&mut self, trade: &ClosedTrade);
}

/// Sink that emits each record as a structured log event
#[derive(Debug, Default)]
pub struct LogSink;

impl TradeRecordSink for LogSink {
    fn record(&mut self, trade: &ClosedTrade) {
        info!(
            direction = %trade.direction,
            entry = trade.entry_price,
            exit = trade.exit_price,
            profit_ticks = trade.profit_ticks,
            mfe = trade.mfe_ticks,
            mae = trade.mae_ticks,
            regime = %trade.regime_at_entry,
            source = %trade.signal_source,
            score = ?trade.confluence_score,
            bars = trade.bars_in_trade,
            "trade closed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RiskConfig;
    use crate::risk::RiskManager;
    use crate::snapshot::{IndicatorSnapshot, Series};
    use approx::assert_relative_eq;

    fn sample_trade() -> ActiveTrade {
        let rm = RiskManager::new(RiskConfig::default(), 0.25, 12.50);
        let snap = IndicatorSnapshot {
            close: Series::from_values(vec![100.0]),
            ..Default::default()
        };
        rm.open_trade(
            Direction::Long,
            100.0,
            2,
            "ma_cross".to_string(),
            MarketRegime::Trending,
            Some(80),
            &snap,
            Utc::now(),
        )
    }

    #[test]
    fn test_closed_trade_profit_from_exit() {
        let trade = sample_trade();
        let record = ClosedTrade::from_trade(&trade, 102.5, Utc::now(), 0.25);
        assert_relative_eq!(record.profit_ticks, 10.0);
        assert_eq!(record.signal_source, "ma_cross");
        assert_eq!(record.confluence_score, Some(80));
    }

    #[test]
    fn test_closed_trade_serializes() {
        let trade = sample_trade();
        let record = ClosedTrade::from_trade(&trade, 99.0, Utc::now(), 0.25);
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"signal_source\":\"ma_cross\""));
        let parsed: ClosedTrade = serde_json::from_str(&json).unwrap();
        assert_relative_eq!(parsed.profit_ticks, -4.0);
    }
}
