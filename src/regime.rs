//! Market regime classification
//!
//! Labels the current bar Trending / Ranging / Breakout / Undefined from ADX
//! strength and Bollinger-bandwidth squeeze detection. A manual override set
//! to anything other than Undefined wins unconditionally.

use tracing::{debug, info};

use crate::config::RegimeConfig;
use crate::snapshot::IndicatorSnapshot;
use crate::types::MarketRegime;

#[derive(Debug, Clone)]
pub struct RegimeClassifier {
    config: RegimeConfig,
    manual_override: MarketRegime,
    current: MarketRegime,
}

impl RegimeClassifier {
    pub fn new(config: RegimeConfig) -> Self {
        let manual_override = config.manual_override;
        Self {
            config,
            manual_override,
            current: MarketRegime::Undefined,
        }
    }

    /// Set or clear (with Undefined) the manual regime override.
    pub fn set_override(&mut self, regime: MarketRegime) {
        if regime != self.manual_override {
            info!(regime = %regime, "manual regime override set");
        }
        self.manual_override = regime;
    }

    /// Regime written by the most recent classification.
    pub fn current(&self) -> MarketRegime {
        self.current
    }

    /// The exhaustion (overbought/oversold) filter is active only while the
    /// market is classified as Ranging.
    pub fn exhaustion_filter_active(&self) -> bool {
        self.current == MarketRegime::Ranging
    }

    /// Classify the current bar and store the result for this cycle.
    ///
    /// Missing ADX or bandwidth values (indicator warm-up) yield Undefined
    /// rather than an error.
    pub fn classify(&mut self, snap: &IndicatorSnapshot) -> MarketRegime {
        let regime = self.classify_inner(snap);
        if regime != self.current {
            info!(from = %self.current, to = %regime, "market regime changed");
        }
        self.current = regime;
        regime
    }

    fn classify_inner(&self, snap: &IndicatorSnapshot) -> MarketRegime {
        if self.manual_override != MarketRegime::Undefined {
            return self.manual_override;
        }

        let adx = match snap.adx.current() {
            Some(v) => v,
            None => return MarketRegime::Undefined,
        };

        if adx > self.config.trend_adx_threshold {
            return MarketRegime::Trending;
        }

        if self.is_squeeze(snap) {
            return MarketRegime::Breakout;
        }

        if adx < self.config.range_adx_threshold {
            return MarketRegime::Ranging;
        }

        MarketRegime::Undefined
    }

    /// Bandwidth compressed near its lookback minimum: the squeeze is about
    /// to release.
    fn is_squeeze(&self, snap: &IndicatorSnapshot) -> bool {
        let width = match snap.band_width.current() {
            Some(v) => v,
            None => return false,
        };
        let min_width = match snap.band_width.min_over(0, self.config.squeeze_lookback) {
            Some(v) if v > 0.0 => v,
            _ => return false,
        };
        let ratio = width / min_width;
        debug!(ratio, "bandwidth squeeze ratio");
        ratio < self.config.squeeze_ratio
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::Series;

    fn snap_with(adx: f64, widths: Vec<f64>) -> IndicatorSnapshot {
        IndicatorSnapshot {
            adx: Series::from_values(vec![adx]),
            band_width: Series::from_values(widths),
            ..Default::default()
        }
    }

    fn classifier() -> RegimeClassifier {
        RegimeClassifier::new(RegimeConfig {
            trend_adx_threshold: 25.0,
            range_adx_threshold: 20.0,
            squeeze_lookback: 5,
            squeeze_ratio: 1.1,
            ..Default::default()
        })
    }

    #[test]
    fn test_high_adx_is_trending() {
        let mut c = classifier();
        let snap = snap_with(30.0, vec![2.0, 2.0, 2.0, 2.0, 2.0]);
        assert_eq!(c.classify(&snap), MarketRegime::Trending);
    }

    #[test]
    fn test_low_adx_no_squeeze_is_ranging() {
        let mut c = classifier();
        let snap = snap_with(15.0, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(c.classify(&snap), MarketRegime::Ranging);
        assert!(c.exhaustion_filter_active());
    }

    #[test]
    fn test_threshold_gap_is_undefined() {
        let mut c = classifier();
        let snap = snap_with(22.0, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(c.classify(&snap), MarketRegime::Undefined);
        assert!(!c.exhaustion_filter_active());
    }

    #[test]
    fn test_squeeze_is_breakout() {
        // Current width 1.05 against a lookback minimum of 1.0
        let mut c = classifier();
        let snap = snap_with(15.0, vec![3.0, 2.0, 1.5, 1.0, 1.05]);
        assert_eq!(c.classify(&snap), MarketRegime::Breakout);
    }

    #[test]
    fn test_trend_wins_over_squeeze() {
        let mut c = classifier();
        let snap = snap_with(40.0, vec![3.0, 2.0, 1.5, 1.0, 1.05]);
        assert_eq!(c.classify(&snap), MarketRegime::Trending);
    }

    #[test]
    fn test_manual_override_short_circuits() {
        let mut c = classifier();
        c.set_override(MarketRegime::Ranging);
        let snap = snap_with(40.0, vec![2.0; 5]);
        assert_eq!(c.classify(&snap), MarketRegime::Ranging);

        c.set_override(MarketRegime::Undefined);
        assert_eq!(c.classify(&snap), MarketRegime::Trending);
    }

    #[test]
    fn test_missing_adx_is_undefined() {
        let mut c = classifier();
        let snap = IndicatorSnapshot::default();
        assert_eq!(c.classify(&snap), MarketRegime::Undefined);
    }
}
