//! MACD momentum with RSI and ADX filters, for live sessions.
//!
//! Emits a level signal on every bar the conditions hold, so a confirmation
//! gate can count how long the momentum has persisted.

use super::{PositionContext, Signal, SignalEvaluator, SignalKind};
use crate::domain::Bar;
use crate::indicators::{Adx, Indicator, IndicatorValues, Macd, MacdLine, Rsi};

#[derive(Debug, Clone)]
pub struct MacdMomentum {
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub rsi_period: usize,
    pub rsi_mid: f64,
    pub adx_period: usize,
    pub adx_threshold: f64,
    macd_key: String,
    signal_key: String,
    rsi_key: String,
    adx_key: String,
}

impl MacdMomentum {
    pub fn new(
        (macd_fast, macd_slow, macd_signal): (usize, usize, usize),
        (rsi_period, rsi_mid): (usize, f64),
        (adx_period, adx_threshold): (usize, f64),
    ) -> Self {
        Self {
            macd_fast,
            macd_slow,
            macd_signal,
            rsi_period,
            rsi_mid,
            adx_period,
            adx_threshold,
            macd_key: Macd::key(macd_fast, macd_slow, macd_signal, MacdLine::Macd),
            signal_key: Macd::key(macd_fast, macd_slow, macd_signal, MacdLine::Signal),
            rsi_key: Rsi::key(rsi_period),
            adx_key: Adx::key(adx_period),
        }
    }

    pub fn default_params() -> Self {
        Self::new((12, 26, 9), (14, 50.0), (14, 25.0))
    }
}

impl SignalEvaluator for MacdMomentum {
    fn name(&self) -> &str {
        "macd_momentum"
    }

    fn required_indicators(&self) -> Vec<Box<dyn Indicator>> {
        vec![
            Box::new(Macd::new(self.macd_fast, self.macd_slow, self.macd_signal, MacdLine::Macd)),
            Box::new(Macd::new(self.macd_fast, self.macd_slow, self.macd_signal, MacdLine::Signal)),
            Box::new(Rsi::new(self.rsi_period)),
            Box::new(Adx::new(self.adx_period)),
        ]
    }

    fn evaluate(
        &self,
        _bars: &[Bar],
        bar_index: usize,
        indicators: &IndicatorValues,
        _position: &PositionContext,
    ) -> Signal {
        let get = |key: &str| indicators.get(key, bar_index);
        let (Some(macd), Some(signal), Some(rsi), Some(adx)) = (
            get(&self.macd_key),
            get(&self.signal_key),
            get(&self.rsi_key),
            get(&self.adx_key),
        ) else {
            return Signal::hold(bar_index);
        };

        if adx <= self.adx_threshold {
            return Signal::hold(bar_index);
        }
        let kind = if macd > signal && rsi > self.rsi_mid {
            SignalKind::EnterLong
        } else if macd < signal && rsi < self.rsi_mid {
            SignalKind::EnterShort
        } else {
            SignalKind::Hold
        };
        Signal::new(kind, bar_index)
    }
}
