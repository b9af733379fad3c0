//! ATR trailing stop.
//!
//! Candidate level: `close − ATR × multiplier` for a long, mirrored for a
//! short. The stop only tightens: a long stop never moves down and a short
//! stop never moves up, even when ATR expands.

use crate::domain::{Bar, PositionSide};
use crate::indicators::{Atr, Indicator, IndicatorValues};
use crate::strategy::StopRule;

/// ATR stop inputs captured on the signal bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StopSeed {
    pub reference: f64,
    pub distance: f64,
}

impl StopSeed {
    pub fn level(&self, side: PositionSide) -> Option<f64> {
        match side {
            PositionSide::Long => Some(self.reference - self.distance),
            PositionSide::Short => Some(self.reference + self.distance),
            PositionSide::Flat => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrailingStop {
    rule: StopRule,
    atr_key: String,
}

impl TrailingStop {
    pub fn new(rule: StopRule) -> Self {
        Self {
            rule,
            atr_key: Atr::key(rule.atr_period),
        }
    }

    pub fn rule(&self) -> StopRule {
        self.rule
    }

    pub fn indicator(&self) -> Box<dyn Indicator> {
        Box::new(Atr::new(self.rule.atr_period))
    }

    /// Close and ATR distance of `bar`, once ATR has warmed up.
    pub fn seed(&self, bar: &Bar, indicators: &IndicatorValues) -> Option<StopSeed> {
        let atr = indicators.get(&self.atr_key, bar.index)?;
        Some(StopSeed {
            reference: bar.close,
            distance: atr * self.rule.multiplier,
        })
    }

    /// Proposed stop for `side` from the close and ATR of `bar`.
    pub fn candidate(&self, side: PositionSide, bar: &Bar, indicators: &IndicatorValues) -> Option<f64> {
        self.seed(bar, indicators)?.level(side)
    }

    /// Tighten `current` toward `proposed`; never loosen.
    pub fn ratchet(side: PositionSide, current: Option<f64>, proposed: Option<f64>) -> Option<f64> {
        match (current, proposed) {
            (Some(c), Some(p)) => match side {
                PositionSide::Long => Some(c.max(p)),
                PositionSide::Short => Some(c.min(p)),
                PositionSide::Flat => None,
            },
            (None, p) => p,
            (c, None) => c,
        }
    }

    /// Next stop level for an open position after `bar`.
    pub fn advance(
        &self,
        side: PositionSide,
        current: Option<f64>,
        bar: &Bar,
        indicators: &IndicatorValues,
    ) -> Option<f64> {
        if side == PositionSide::Flat {
            return None;
        }
        Self::ratchet(side, current, self.candidate(side, bar, indicators))
    }

    /// Close beyond the stop: below for a long, above for a short.
    pub fn breached(side: PositionSide, stop: Option<f64>, close: f64) -> bool {
        match (side, stop) {
            (PositionSide::Long, Some(s)) => close < s,
            (PositionSide::Short, Some(s)) => close > s,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::bar::make_bars;

    fn tracker() -> TrailingStop {
        TrailingStop::new(StopRule {
            atr_period: 3,
            multiplier: 2.0,
        })
    }

    fn atr(values: Vec<f64>) -> IndicatorValues {
        let mut iv = IndicatorValues::new();
        iv.insert("atr_3", values);
        iv
    }

    #[test]
    fn long_candidate_below_close() {
        let bars = make_bars(&[100.0]);
        let iv = atr(vec![1.5]);
        assert_eq!(tracker().candidate(PositionSide::Long, &bars[0], &iv), Some(97.0));
        assert_eq!(tracker().candidate(PositionSide::Short, &bars[0], &iv), Some(103.0));
    }

    #[test]
    fn long_stop_never_loosens() {
        let bars = make_bars(&[100.0, 95.0, 110.0]);
        let iv = atr(vec![1.0, 1.0, 1.0]);
        let t = tracker();
        let s0 = t.advance(PositionSide::Long, None, &bars[0], &iv);
        assert_eq!(s0, Some(98.0));
        let s1 = t.advance(PositionSide::Long, s0, &bars[1], &iv);
        assert_eq!(s1, Some(98.0));
        let s2 = t.advance(PositionSide::Long, s1, &bars[2], &iv);
        assert_eq!(s2, Some(108.0));
    }

    #[test]
    fn atr_expansion_does_not_widen() {
        let bars = make_bars(&[100.0, 100.0]);
        let iv = atr(vec![1.0, 10.0]);
        let t = tracker();
        let s0 = t.advance(PositionSide::Long, None, &bars[0], &iv);
        assert_eq!(t.advance(PositionSide::Long, s0, &bars[1], &iv), s0);
    }

    #[test]
    fn short_stop_only_falls() {
        let bars = make_bars(&[100.0, 105.0, 90.0]);
        let iv = atr(vec![1.0, 1.0, 1.0]);
        let t = tracker();
        let s0 = t.advance(PositionSide::Short, None, &bars[0], &iv);
        let s1 = t.advance(PositionSide::Short, s0, &bars[1], &iv);
        let s2 = t.advance(PositionSide::Short, s1, &bars[2], &iv);
        assert_eq!((s0, s1, s2), (Some(102.0), Some(102.0), Some(92.0)));
    }

    #[test]
    fn warmup_keeps_existing_level() {
        let bars = make_bars(&[100.0]);
        let iv = atr(vec![f64::NAN]);
        assert_eq!(tracker().advance(PositionSide::Long, Some(90.0), &bars[0], &iv), Some(90.0));
        assert_eq!(tracker().advance(PositionSide::Long, None, &bars[0], &iv), None);
    }

    #[test]
    fn breach_is_strict() {
        assert!(TrailingStop::breached(PositionSide::Long, Some(100.0), 99.9));
        assert!(!TrailingStop::breached(PositionSide::Long, Some(100.0), 100.0));
        assert!(TrailingStop::breached(PositionSide::Short, Some(100.0), 100.1));
        assert!(!TrailingStop::breached(PositionSide::Long, None, 1.0));
        assert!(!TrailingStop::breached(PositionSide::Flat, Some(100.0), 1.0));
    }
}
