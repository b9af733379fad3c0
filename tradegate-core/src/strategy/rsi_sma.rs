//! RSI band with a dual-SMA trend confirmation, executed at the next open.
//!
//! Flat: EnterLong when RSI is above the lower band and the fast SMA is
//! above the slow SMA. Long: Exit when RSI is below the upper band and the
//! fast SMA has dropped below the slow SMA.

use super::{ExecutionTiming, PositionContext, Signal, SignalEvaluator, SignalKind};
use crate::domain::{Bar, PositionSide};
use crate::indicators::{Indicator, IndicatorValues, Rsi, Sma};

#[derive(Debug, Clone)]
pub struct RsiSma {
    pub rsi_period: usize,
    pub lower: f64,
    pub upper: f64,
    pub fast_period: usize,
    pub slow_period: usize,
    rsi_key: String,
    fast_key: String,
    slow_key: String,
}

impl RsiSma {
    pub fn new(rsi_period: usize, (lower, upper): (f64, f64), fast_period: usize, slow_period: usize) -> Self {
        assert!(lower < upper, "RSI lower band must be below upper band");
        assert!(slow_period > fast_period, "slow_period must be > fast_period");
        Self {
            rsi_period,
            lower,
            upper,
            fast_period,
            slow_period,
            rsi_key: Rsi::key(rsi_period),
            fast_key: Sma::key(fast_period),
            slow_key: Sma::key(slow_period),
        }
    }

    pub fn default_params() -> Self {
        Self::new(21, (30.0, 70.0), 14, 50)
    }
}

impl SignalEvaluator for RsiSma {
    fn name(&self) -> &str {
        "rsi_sma"
    }

    fn required_indicators(&self) -> Vec<Box<dyn Indicator>> {
        vec![
            Box::new(Rsi::new(self.rsi_period)),
            Box::new(Sma::new(self.fast_period)),
            Box::new(Sma::new(self.slow_period)),
        ]
    }

    fn timing(&self) -> ExecutionTiming {
        ExecutionTiming::NextBarOpen
    }

    fn evaluate(
        &self,
        _bars: &[Bar],
        bar_index: usize,
        indicators: &IndicatorValues,
        position: &PositionContext,
    ) -> Signal {
        let (Some(rsi), Some(fast), Some(slow)) = (
            indicators.get(&self.rsi_key, bar_index),
            indicators.get(&self.fast_key, bar_index),
            indicators.get(&self.slow_key, bar_index),
        ) else {
            return Signal::hold(bar_index);
        };

        let kind = match position.side {
            PositionSide::Flat if rsi > self.lower && fast > slow => SignalKind::EnterLong,
            PositionSide::Long if rsi < self.upper && fast < slow => SignalKind::Exit,
            _ => SignalKind::Hold,
        };
        Signal::new(kind, bar_index)
    }
}
