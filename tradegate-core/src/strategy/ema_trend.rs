//! EMA/SMA trend filter, long only.

use super::{PositionContext, Signal, SignalEvaluator, SignalKind};
use crate::domain::{Bar, PositionSide};
use crate::indicators::{Ema, Indicator, IndicatorValues, Sma};

/// Long while the short EMA is above the long SMA.
#[derive(Debug, Clone)]
pub struct EmaTrend {
    pub ema_period: usize,
    pub sma_period: usize,
    ema_key: String,
    sma_key: String,
}

impl EmaTrend {
    pub fn new(ema_period: usize, sma_period: usize) -> Self {
        assert!(ema_period >= 1, "ema_period must be >= 1");
        assert!(sma_period >= 1, "sma_period must be >= 1");
        Self {
            ema_period,
            sma_period,
            ema_key: Ema::key(ema_period),
            sma_key: Sma::key(sma_period),
        }
    }

    pub fn default_params() -> Self {
        Self::new(50, 200)
    }
}

impl SignalEvaluator for EmaTrend {
    fn name(&self) -> &str {
        "ema_trend"
    }

    fn required_indicators(&self) -> Vec<Box<dyn Indicator>> {
        vec![
            Box::new(Ema::new(self.ema_period)),
            Box::new(Sma::new(self.sma_period)),
        ]
    }

    fn evaluate(
        &self,
        _bars: &[Bar],
        bar_index: usize,
        indicators: &IndicatorValues,
        position: &PositionContext,
    ) -> Signal {
        let (Some(ema), Some(sma)) = (
            indicators.get(&self.ema_key, bar_index),
            indicators.get(&self.sma_key, bar_index),
        ) else {
            return Signal::hold(bar_index);
        };

        let kind = match position.side {
            PositionSide::Flat if ema > sma => SignalKind::EnterLong,
            PositionSide::Long if ema < sma => SignalKind::Exit,
            _ => SignalKind::Hold,
        };
        Signal::new(kind, bar_index)
    }
}
