//! Configuration surface
//!
//! Named toggles and thresholds for every component, loaded from JSON with
//! serde defaults so a host can specify only what it overrides.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::types::MarketRegime;

/// Top-level engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub instrument: InstrumentConfig,
    pub registry: RegistryConfig,
    pub regime: RegimeConfig,
    pub chop: ChopConfig,
    pub trend_filter: TrendFilterConfig,
    pub structure_filter: StructureFilterConfig,
    pub oscillator_filter: OscillatorFilterConfig,
    pub confluence: ConfluenceConfig,
    pub risk: RiskConfig,
    pub orders: OrderConfig,
}

impl EngineConfig {
    /// Load configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).context("Failed to read config file")?;
        let config: EngineConfig =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;
        config.validate()?;
        Ok(config)
    }

    /// Basic sanity checks on threshold relationships
    pub fn validate(&self) -> Result<()> {
        if self.instrument.tick_size <= 0.0 {
            anyhow::bail!("instrument.tick_size must be positive");
        }
        if self.regime.range_adx_threshold > self.regime.trend_adx_threshold {
            anyhow::bail!("regime.range_adx_threshold must not exceed trend_adx_threshold");
        }
        if self.risk.history_lookback == 0 {
            anyhow::bail!("risk.history_lookback must be at least 1");
        }
        Ok(())
    }
}

/// Instrument tick geometry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentConfig {
    /// Minimum price increment
    pub tick_size: f64,
    /// Currency value of one tick per contract
    pub tick_value: f64,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        InstrumentConfig {
            tick_size: 0.25,
            tick_value: 12.50,
        }
    }
}

/// Signal-bot registry dispatch settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Route signals through regime buckets. When false every bucket is
    /// eligible each cycle.
    pub regime_routing: bool,
    /// Select by confluence score instead of first match.
    pub use_confluence: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        RegistryConfig {
            regime_routing: true,
            use_confluence: false,
        }
    }
}

/// Market-regime classifier thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegimeConfig {
    pub trend_adx_threshold: f64,
    pub range_adx_threshold: f64,
    /// Bars of bandwidth history scanned for the squeeze minimum
    pub squeeze_lookback: usize,
    /// Squeeze fires when bandwidth / min-bandwidth is below this ratio
    pub squeeze_ratio: f64,
    /// Manual override; any value other than Undefined short-circuits
    /// auto-classification.
    pub manual_override: MarketRegime,
}

impl Default for RegimeConfig {
    fn default() -> Self {
        RegimeConfig {
            trend_adx_threshold: 25.0,
            range_adx_threshold: 20.0,
            squeeze_lookback: 50,
            squeeze_ratio: 1.1,
            manual_override: MarketRegime::Undefined,
        }
    }
}

/// Chop-detector thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChopConfig {
    pub enabled: bool,
    /// |linear-regression slope| below this counts as flat
    pub flat_slope_threshold: f64,
    pub chop_adx_threshold: f64,
    pub volume_threshold: f64,
}

impl Default for ChopConfig {
    fn default() -> Self {
        ChopConfig {
            enabled: true,
            flat_slope_threshold: 0.05,
            chop_adx_threshold: 18.0,
            volume_threshold: 500.0,
        }
    }
}

/// Master trend filter mode selection
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendFilterMode {
    Disabled,
    /// Price compared against a long-horizon extremes envelope
    MomentumExtreme,
    /// Volatility-average slope and price-vs-average
    VolatilityAverage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendFilterConfig {
    pub mode: TrendFilterMode,
    /// Envelope lookback for MomentumExtreme mode
    pub envelope_lookback: usize,
    /// Minimum per-bar average slope for VolatilityAverage mode
    pub min_slope: f64,
}

impl Default for TrendFilterConfig {
    fn default() -> Self {
        TrendFilterConfig {
            mode: TrendFilterMode::VolatilityAverage,
            envelope_lookback: 100,
            min_slope: 0.0,
        }
    }
}

/// Market-structure filter toggle
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StructureFilterConfig {
    pub enabled: bool,
}

/// Overbought/oversold veto filter
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OscillatorFilterConfig {
    pub enabled: bool,
    pub overbought: f64,
    pub oversold: f64,
}

impl Default for OscillatorFilterConfig {
    fn default() -> Self {
        OscillatorFilterConfig {
            enabled: false,
            overbought: 70.0,
            oversold: 30.0,
        }
    }
}

/// Confluence scorer thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfluenceConfig {
    /// Minimum score an entry must reach under the confluence policy
    pub min_score: i32,
    /// ADX level granting the mid-tier strength bonus
    pub adx_threshold: f64,
    /// Momentum agreement threshold (signed series compared to zero plus
    /// this margin)
    pub momentum_threshold: f64,
}

impl Default for ConfluenceConfig {
    fn default() -> Self {
        ConfluenceConfig {
            min_score: 60,
            adx_threshold: 25.0,
            momentum_threshold: 0.0,
        }
    }
}

/// Stop-loss management mode, mutually exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopMode {
    /// No post-entry adjustment
    Fixed,
    /// Stop at an N-bar swing low/high; N shrinks as profit accrues
    HighLowTrail,
    /// Two-stage trail gated on breakeven realization
    DynamicTrail,
    /// Trail against a parabolic acceleration curve
    ParabolicTrail,
    /// ATR multiple, tightening past a profit trigger
    AtrTrail,
    /// Constant tick distance
    RegularTrail,
    /// Fixed stop derived from target / risk-reward ratio
    RiskReward,
}

/// Profit-target mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetMode {
    FixedTicks,
    AtrMultiple,
    RiskRewardRatio,
    /// Regression-channel band price with the fixed value as a floor
    RegressionChannel,
}

/// Statistic applied to the MFE/MAE learning window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatMethod {
    Average,
    Median,
    Percentile(f64),
}

/// Auto-breakeven trigger basis
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakevenTrigger {
    /// Fixed unrealized-profit tick count
    Ticks(f64),
    /// Fraction of the trade's initial profit target (0..1]
    TargetFraction(f64),
}

/// Risk / stop-target configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub stop_mode: StopMode,
    pub target_mode: TargetMode,

    /// Static stop distance in ticks (Fixed / fallback)
    pub stop_ticks: f64,
    /// Static target distance in ticks (FixedTicks / fallback / floor)
    pub target_ticks: f64,

    // HighLowTrail
    pub high_low_initial_lookback: usize,

    // DynamicTrail
    pub dynamic_wide_ticks: f64,
    pub dynamic_tight_ticks: f64,
    /// Fraction of target profit at which the tight trail engages
    pub dynamic_tighten_trigger: f64,

    // ParabolicTrail
    pub parabolic_offset: usize,

    // AtrTrail
    pub atr_stop_multiplier: f64,
    pub atr_tight_multiplier: f64,
    pub atr_tighten_trigger: f64,

    // RegularTrail
    pub trail_ticks: f64,

    // Risk/Reward
    pub risk_reward_ratio: f64,

    // Target
    pub atr_target_multiplier: f64,

    // Auto-breakeven
    pub breakeven_enabled: bool,
    pub breakeven_trigger: BreakevenTrigger,
    /// Offset from entry, in ticks, where the breakeven stop is parked
    pub breakeven_offset_ticks: f64,

    // Dynamic management (learned stop/target)
    pub dynamic_management: bool,
    pub stat_method: StatMethod,
    pub history_lookback: usize,
    /// Closed trades required before learned values are trusted
    pub burn_in_trades: usize,
    /// Bars scanned for the structural swing floor
    pub structural_lookback: usize,

    // Position sizing
    pub sizing_enabled: bool,
    /// Percent of account equity risked per trade
    pub risk_percent: f64,
    pub fixed_contracts: i64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        RiskConfig {
            stop_mode: StopMode::Fixed,
            target_mode: TargetMode::FixedTicks,
            stop_ticks: 40.0,
            target_ticks: 80.0,
            high_low_initial_lookback: 4,
            dynamic_wide_ticks: 30.0,
            dynamic_tight_ticks: 12.0,
            dynamic_tighten_trigger: 0.70,
            parabolic_offset: 2,
            atr_stop_multiplier: 2.0,
            atr_tight_multiplier: 1.0,
            atr_tighten_trigger: 0.60,
            trail_ticks: 20.0,
            risk_reward_ratio: 2.0,
            atr_target_multiplier: 3.0,
            breakeven_enabled: true,
            breakeven_trigger: BreakevenTrigger::TargetFraction(0.5),
            breakeven_offset_ticks: 2.0,
            dynamic_management: false,
            stat_method: StatMethod::Median,
            history_lookback: 20,
            burn_in_trades: 5,
            structural_lookback: 20,
            sizing_enabled: false,
            risk_percent: 2.0,
            fixed_contracts: 1,
        }
    }
}

/// Order lifecycle / health settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderConfig {
    /// Minimum seconds between order submissions
    pub throttle_secs: i64,
    /// Seconds without a fresh price update before a staleness strike
    pub stale_data_secs: i64,
    /// Consecutive rejections that trip the health monitor
    pub max_rejections: u32,
    /// Chunks a scaled entry is split into (1 = no scaling)
    pub scale_chunks: usize,
    /// Seconds between scaled-entry chunks
    pub scale_delay_secs: i64,
}

impl Default for OrderConfig {
    fn default() -> Self {
        OrderConfig {
            throttle_secs: 2,
            stale_data_secs: 30,
            max_rejections: 3,
            scale_chunks: 1,
            scale_delay_secs: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let cfg = EngineConfig::default();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_config_round_trip() {
        let cfg = EngineConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let parsed: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.risk.stop_mode, StopMode::Fixed);
        assert_eq!(parsed.regime.trend_adx_threshold, 25.0);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let parsed: EngineConfig =
            serde_json::from_str(r#"{"regime": {"trend_adx_threshold": 30.0}}"#).unwrap();
        assert_eq!(parsed.regime.trend_adx_threshold, 30.0);
        assert_eq!(parsed.regime.range_adx_threshold, 20.0);
        assert_eq!(parsed.instrument.tick_value, 12.50);
    }

    #[test]
    fn test_invalid_threshold_ordering_rejected() {
        let parsed: EngineConfig = serde_json::from_str(
            r#"{"regime": {"trend_adx_threshold": 10.0, "range_adx_threshold": 20.0}}"#,
        )
        .unwrap();
        assert!(parsed.validate().is_err());
    }
}
