//! MACD cross in a falling trend, protected by an ATR trailing stop.
//!
//! Long only. Enters when the MACD line crosses above its signal line while
//! the slow SMA is lower than it was `dir_period` bars ago. Exits come from
//! the trailing stop; this rule never emits `Exit` itself.

use super::{crossed_above, PositionContext, Signal, SignalEvaluator, SignalKind, StopRule};
use crate::domain::Bar;
use crate::indicators::{Atr, Indicator, IndicatorValues, Macd, MacdLine, Sma};

#[derive(Debug, Clone)]
pub struct MacdTrend {
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub atr_period: usize,
    pub atr_distance: f64,
    pub sma_period: usize,
    pub dir_period: usize,
    macd_key: String,
    signal_key: String,
    sma_key: String,
}

impl MacdTrend {
    pub fn new(
        (macd_fast, macd_slow, macd_signal): (usize, usize, usize),
        atr_period: usize,
        atr_distance: f64,
        sma_period: usize,
        dir_period: usize,
    ) -> Self {
        assert!(dir_period >= 1, "dir_period must be >= 1");
        assert!(atr_distance > 0.0, "atr_distance must be > 0");
        Self {
            macd_fast,
            macd_slow,
            macd_signal,
            atr_period,
            atr_distance,
            sma_period,
            dir_period,
            macd_key: Macd::key(macd_fast, macd_slow, macd_signal, MacdLine::Macd),
            signal_key: Macd::key(macd_fast, macd_slow, macd_signal, MacdLine::Signal),
            sma_key: Sma::key(sma_period),
        }
    }

    pub fn default_params() -> Self {
        Self::new((12, 26, 9), 14, 3.0, 30, 10)
    }

    /// `SMA[t] − SMA[t − dir_period]`.
    fn trend_direction(&self, indicators: &IndicatorValues, bar_index: usize) -> Option<f64> {
        let now = indicators.get(&self.sma_key, bar_index)?;
        let then = indicators.get_back(&self.sma_key, bar_index, self.dir_period)?;
        Some(now - then)
    }
}

impl SignalEvaluator for MacdTrend {
    fn name(&self) -> &str {
        "macd_trend"
    }

    fn required_indicators(&self) -> Vec<Box<dyn Indicator>> {
        vec![
            Box::new(Macd::new(self.macd_fast, self.macd_slow, self.macd_signal, MacdLine::Macd)),
            Box::new(Macd::new(self.macd_fast, self.macd_slow, self.macd_signal, MacdLine::Signal)),
            Box::new(Sma::new(self.sma_period)),
            Box::new(Atr::new(self.atr_period)),
        ]
    }

    fn warmup_bars(&self) -> usize {
        let sma_ready = self.sma_period.saturating_sub(1) + self.dir_period;
        let macd_ready = self.macd_slow + self.macd_signal - 1;
        sma_ready.max(macd_ready).max(self.atr_period)
    }

    fn stop_rule(&self) -> Option<StopRule> {
        Some(StopRule {
            atr_period: self.atr_period,
            multiplier: self.atr_distance,
        })
    }

    fn evaluate(
        &self,
        _bars: &[Bar],
        bar_index: usize,
        indicators: &IndicatorValues,
        position: &PositionContext,
    ) -> Signal {
        if !position.is_flat() {
            return Signal::hold(bar_index);
        }
        let crossed = crossed_above(indicators, &self.macd_key, &self.signal_key, bar_index);
        let falling = self.trend_direction(indicators, bar_index).map(|d| d < 0.0);
        match (crossed, falling) {
            (Some(true), Some(true)) => Signal::new(SignalKind::EnterLong, bar_index),
            _ => Signal::hold(bar_index),
        }
    }
}
