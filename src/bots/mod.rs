//! Signal-bot registry
//!
//! Independent signal evaluators behind one behavioral contract, partitioned
//! into regime buckets and dispatched through either a first-match scan or
//! the confluence-scoring selector.

pub mod breakout;
pub mod range;
pub mod trend;
pub mod universal;

use tracing::{debug, info};

use crate::confluence::ConfluenceScorer;
use crate::filters::MasterTrendFilter;
use crate::snapshot::BarContext;
use crate::types::{Direction, MarketRegime, RegimeAffinity};

pub use breakout::{RangeBreakBot, SqueezeReleaseBot};
pub use range::{BandFadeBot, RsiReversionBot};
pub use trend::{AdxRisingBot, TrendPullbackBot};
pub use universal::{MaCrossBot, MomentumThrustBot};

/// One signal evaluator: a pure function of the indicator snapshot to a
/// direction, created once at strategy start and owned by the registry.
pub trait SignalBot: Send + Sync {
    fn name(&self) -> &'static str;
    fn affinity(&self) -> RegimeAffinity;
    fn check_signal(&self, ctx: &BarContext, bars_ago: usize) -> Direction;
}

/// Gate shared by bar-close bots: fire only on the first evaluation of a
/// newly closed bar, suppressing duplicates across intra-bar evaluations.
pub(crate) fn closed_bar_only(ctx: &BarContext, bars_ago: usize) -> bool {
    bars_ago == 0 && ctx.first_tick_of_bar
}

/// Signal chosen by the registry for this cycle
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedSignal {
    pub direction: Direction,
    pub source: String,
    /// Present only under the confluence policy
    pub score: Option<i32>,
}

/// How the registry resolves competing bots
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DispatchPolicy {
    /// Universal bucket first, then the regime bucket, fixed order,
    /// first firing signal wins.
    FirstMatch,
    /// Score every firing bot; highest eligible score wins.
    Confluence,
}

/// Registry of signal bots partitioned by regime affinity
pub struct BotRegistry {
    universal: Vec<Box<dyn SignalBot>>,
    trending: Vec<Box<dyn SignalBot>>,
    ranging: Vec<Box<dyn SignalBot>>,
    breakout: Vec<Box<dyn SignalBot>>,
    regime_routing: bool,
}

impl BotRegistry {
    pub fn new(regime_routing: bool) -> Self {
        Self {
            universal: Vec::new(),
            trending: Vec::new(),
            ranging: Vec::new(),
            breakout: Vec::new(),
            regime_routing,
        }
    }

    /// Registry preloaded with the stock bots.
    pub fn with_default_bots(regime_routing: bool) -> Self {
        let mut registry = Self::new(regime_routing);
        registry.register(Box::new(MaCrossBot::new()));
        registry.register(Box::new(MomentumThrustBot::new(0.0)));
        registry.register(Box::new(TrendPullbackBot::new(45.0)));
        registry.register(Box::new(AdxRisingBot::new(22.0)));
        registry.register(Box::new(RsiReversionBot::new(70.0, 30.0)));
        registry.register(Box::new(BandFadeBot::new()));
        registry.register(Box::new(SqueezeReleaseBot::new(1.1, 50)));
        registry.register(Box::new(RangeBreakBot::new(20)));
        registry
    }

    pub fn register(&mut self, bot: Box<dyn SignalBot>) {
        info!(bot = bot.name(), affinity = ?bot.affinity(), "signal bot registered");
        match bot.affinity() {
            RegimeAffinity::Universal => self.universal.push(bot),
            RegimeAffinity::Trending => self.trending.push(bot),
            RegimeAffinity::Ranging => self.ranging.push(bot),
            RegimeAffinity::Breakout => self.breakout.push(bot),
        }
    }

    pub fn len(&self) -> usize {
        self.universal.len() + self.trending.len() + self.ranging.len() + self.breakout.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Buckets eligible this cycle: universal always, then the current
    /// regime's bucket, or every bucket when routing is disabled or the
    /// regime is undefined.
    fn eligible_buckets(&self, regime: MarketRegime) -> Vec<&[Box<dyn SignalBot>]> {
        let mut buckets: Vec<&[Box<dyn SignalBot>]> = vec![&self.universal];
        if !self.regime_routing || regime == MarketRegime::Undefined {
            buckets.push(&self.trending);
            buckets.push(&self.ranging);
            buckets.push(&self.breakout);
            return buckets;
        }
        match regime {
            MarketRegime::Trending => buckets.push(&self.trending),
            MarketRegime::Ranging => buckets.push(&self.ranging),
            MarketRegime::Breakout => buckets.push(&self.breakout),
            MarketRegime::Undefined => unreachable!(),
        }
        buckets
    }

    /// Dispatch under the given policy. The scorer and trend filter are
    /// consulted only for the confluence policy.
    pub fn select(
        &self,
        ctx: &BarContext,
        regime: MarketRegime,
        policy: DispatchPolicy,
        scorer: &ConfluenceScorer,
        trend_filter: &MasterTrendFilter,
    ) -> Option<SelectedSignal> {
        match policy {
            DispatchPolicy::FirstMatch => self.first_match(ctx, regime),
            DispatchPolicy::Confluence => self.confluence(ctx, regime, scorer, trend_filter),
        }
    }

    fn first_match(&self, ctx: &BarContext, regime: MarketRegime) -> Option<SelectedSignal> {
        for bucket in self.eligible_buckets(regime) {
            for bot in bucket {
                let direction = bot.check_signal(ctx, 0);
                if direction.is_signal() {
                    debug!(bot = bot.name(), direction = %direction, "first-match signal");
                    return Some(SelectedSignal {
                        direction,
                        source: bot.name().to_string(),
                        score: None,
                    });
                }
            }
        }
        None
    }

    fn confluence(
        &self,
        ctx: &BarContext,
        regime: MarketRegime,
        scorer: &ConfluenceScorer,
        trend_filter: &MasterTrendFilter,
    ) -> Option<SelectedSignal> {
        let mut best: Option<SelectedSignal> = None;
        for bucket in self.eligible_buckets(regime) {
            for bot in bucket {
                let direction = bot.check_signal(ctx, 0);
                if !direction.is_signal() {
                    continue;
                }
                let score = scorer.score(direction, &ctx.snapshot, trend_filter);
                debug!(bot = bot.name(), direction = %direction, score, "confluence candidate");
                // Ties resolve to evaluation order: first maximum found wins
                if best.as_ref().map_or(true, |b| score > b.score.unwrap_or(0)) {
                    best = Some(SelectedSignal {
                        direction,
                        source: bot.name().to_string(),
                        score: Some(score),
                    });
                }
            }
        }
        let best = best?;
        if best.score.unwrap_or(0) >= scorer.min_score() {
            Some(best)
        } else {
            debug!(
                source = %best.source,
                score = best.score.unwrap_or(0),
                min = scorer.min_score(),
                "best confluence score below minimum"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        ConfluenceConfig, OscillatorFilterConfig, TrendFilterConfig, TrendFilterMode,
    };
    use crate::snapshot::{IndicatorSnapshot, Series};
    use crate::types::PositionSnapshot;
    use chrono::Utc;

    /// Bot that always fires a fixed direction
    struct StaticBot {
        name: &'static str,
        affinity: RegimeAffinity,
        direction: Direction,
    }

    impl SignalBot for StaticBot {
        fn name(&self) -> &'static str {
            self.name
        }
        fn affinity(&self) -> RegimeAffinity {
            self.affinity
        }
        fn check_signal(&self, _ctx: &BarContext, _bars_ago: usize) -> Direction {
            self.direction
        }
    }

    fn ctx() -> BarContext {
        BarContext::new(
            IndicatorSnapshot::default(),
            PositionSnapshot::flat(),
            Utc::now(),
        )
    }

    fn scorer() -> ConfluenceScorer {
        ConfluenceScorer::new(
            ConfluenceConfig {
                min_score: 40,
                ..Default::default()
            },
            OscillatorFilterConfig::default(),
        )
    }

    fn no_trend_filter() -> MasterTrendFilter {
        MasterTrendFilter::new(TrendFilterConfig {
            mode: TrendFilterMode::Disabled,
            ..Default::default()
        })
    }

    #[test]
    fn test_universal_bucket_scanned_first() {
        let mut reg = BotRegistry::new(true);
        reg.register(Box::new(StaticBot {
            name: "trend-bot",
            affinity: RegimeAffinity::Trending,
            direction: Direction::Short,
        }));
        reg.register(Box::new(StaticBot {
            name: "universal-bot",
            affinity: RegimeAffinity::Universal,
            direction: Direction::Long,
        }));

        let selected = reg
            .select(
                &ctx(),
                MarketRegime::Trending,
                DispatchPolicy::FirstMatch,
                &scorer(),
                &no_trend_filter(),
            )
            .unwrap();
        assert_eq!(selected.source, "universal-bot");
        assert_eq!(selected.direction, Direction::Long);
    }

    #[test]
    fn test_regime_routing_excludes_other_buckets() {
        let mut reg = BotRegistry::new(true);
        reg.register(Box::new(StaticBot {
            name: "range-bot",
            affinity: RegimeAffinity::Ranging,
            direction: Direction::Long,
        }));

        let selected = reg.select(
            &ctx(),
            MarketRegime::Trending,
            DispatchPolicy::FirstMatch,
            &scorer(),
            &no_trend_filter(),
        );
        assert!(selected.is_none());
    }

    #[test]
    fn test_routing_disabled_scans_all_buckets() {
        let mut reg = BotRegistry::new(false);
        reg.register(Box::new(StaticBot {
            name: "range-bot",
            affinity: RegimeAffinity::Ranging,
            direction: Direction::Long,
        }));

        let selected = reg.select(
            &ctx(),
            MarketRegime::Trending,
            DispatchPolicy::FirstMatch,
            &scorer(),
            &no_trend_filter(),
        );
        assert!(selected.is_some());
    }

    #[test]
    fn test_undefined_regime_scans_all_buckets() {
        let mut reg = BotRegistry::new(true);
        reg.register(Box::new(StaticBot {
            name: "breakout-bot",
            affinity: RegimeAffinity::Breakout,
            direction: Direction::Short,
        }));

        let selected = reg.select(
            &ctx(),
            MarketRegime::Undefined,
            DispatchPolicy::FirstMatch,
            &scorer(),
            &no_trend_filter(),
        );
        assert!(selected.is_some());
    }

    #[test]
    fn test_confluence_picks_highest_score_first_on_tie() {
        // With trend filter disabled and an empty snapshot, the trend driver
        // has no slope data, so every candidate hard-vetoes to zero and the
        // minimum keeps all of them out.
        let mut reg = BotRegistry::new(false);
        reg.register(Box::new(StaticBot {
            name: "a",
            affinity: RegimeAffinity::Universal,
            direction: Direction::Long,
        }));
        reg.register(Box::new(StaticBot {
            name: "b",
            affinity: RegimeAffinity::Universal,
            direction: Direction::Long,
        }));

        let selected = reg.select(
            &ctx(),
            MarketRegime::Undefined,
            DispatchPolicy::Confluence,
            &scorer(),
            &no_trend_filter(),
        );
        assert!(selected.is_none());

        // With a rising trend average both score equally; the first
        // registered bot wins the tie.
        let mut c = ctx();
        c.snapshot.trend_ma = Series::from_values(vec![99.0, 100.0]);
        c.snapshot.momentum = Series::from_values(vec![1.0]);
        let selected = reg
            .select(
                &c,
                MarketRegime::Undefined,
                DispatchPolicy::Confluence,
                &scorer(),
                &no_trend_filter(),
            )
            .unwrap();
        assert_eq!(selected.source, "a");
        assert!(selected.score.unwrap() >= 40);
    }

    #[test]
    fn test_default_registry_has_all_buckets() {
        let reg = BotRegistry::with_default_bots(true);
        assert_eq!(reg.len(), 8);
    }
}
