//! Dual moving-average crossover with a fixed holding period.
//!
//! Flat: EnterLong when the fast MA crosses above the slow MA on this bar,
//! EnterShort on the downward cross. In a position: Exit once `hold_bars`
//! bars have passed since the entry bar, whatever the averages do.

use super::{crossed_above, crossed_below, PositionContext, Signal, SignalEvaluator, SignalKind};
use crate::domain::Bar;
use crate::indicators::{Ema, Indicator, IndicatorValues, Sma};
use serde::{Deserialize, Serialize};

/// Moving average type selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaType {
    #[default]
    Sma,
    Ema,
}

impl MaType {
    fn indicator(self, period: usize) -> Box<dyn Indicator> {
        match self {
            MaType::Sma => Box::new(Sma::new(period)),
            MaType::Ema => Box::new(Ema::new(period)),
        }
    }

    fn key(self, period: usize) -> String {
        match self {
            MaType::Sma => Sma::key(period),
            MaType::Ema => Ema::key(period),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MaCrossover {
    pub fast_period: usize,
    pub slow_period: usize,
    pub ma_type: MaType,
    pub hold_bars: usize,
    fast_key: String,
    slow_key: String,
}

impl MaCrossover {
    pub fn new(fast_period: usize, slow_period: usize, ma_type: MaType, hold_bars: usize) -> Self {
        assert!(fast_period >= 1, "fast_period must be >= 1");
        assert!(slow_period > fast_period, "slow_period must be > fast_period");
        assert!(hold_bars >= 1, "hold_bars must be >= 1");
        Self {
            fast_period,
            slow_period,
            ma_type,
            hold_bars,
            fast_key: ma_type.key(fast_period),
            slow_key: ma_type.key(slow_period),
        }
    }

    pub fn default_params() -> Self {
        Self::new(10, 30, MaType::Sma, 5)
    }
}

impl SignalEvaluator for MaCrossover {
    fn name(&self) -> &str {
        "ma_crossover"
    }

    fn required_indicators(&self) -> Vec<Box<dyn Indicator>> {
        vec![
            self.ma_type.indicator(self.fast_period),
            self.ma_type.indicator(self.slow_period),
        ]
    }

    fn evaluate(
        &self,
        _bars: &[Bar],
        bar_index: usize,
        indicators: &IndicatorValues,
        position: &PositionContext,
    ) -> Signal {
        if !position.is_flat() {
            if bar_index >= position.entry_bar_index + self.hold_bars {
                return Signal::new(SignalKind::Exit, bar_index);
            }
            return Signal::hold(bar_index);
        }

        let up = crossed_above(indicators, &self.fast_key, &self.slow_key, bar_index);
        let down = crossed_below(indicators, &self.fast_key, &self.slow_key, bar_index);
        match (up, down) {
            (Some(true), _) => Signal::new(SignalKind::EnterLong, bar_index),
            (_, Some(true)) => Signal::new(SignalKind::EnterShort, bar_index),
            _ => Signal::hold(bar_index),
        }
    }
}
