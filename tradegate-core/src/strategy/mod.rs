//! Signal evaluation: maps indicator history to a discrete trade action.
//!
//! Evaluators are pure: the same bars, indicators and position context always
//! produce the same `Signal`. They never see the order state machine; the
//! read-only `PositionContext` carries the only position facts a rule may use
//! (side and entry bar). Missing indicator values mean warm-up is not
//! complete and must produce `Hold`.

pub mod ema_trend;
pub mod factory;
pub mod ma_crossover;
pub mod macd_momentum;
pub mod macd_trend;
pub mod rsi_sma;

pub use ema_trend::EmaTrend;
pub use factory::create_evaluator;
pub use ma_crossover::{MaCrossover, MaType};
pub use macd_momentum::MacdMomentum;
pub use macd_trend::MacdTrend;
pub use rsi_sma::RsiSma;

use crate::domain::{Bar, PositionSide};
use crate::indicators::{max_lookback, Indicator, IndicatorValues};
use serde::{Deserialize, Serialize};

/// Discrete trade action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalKind {
    EnterLong,
    EnterShort,
    Exit,
    Hold,
}

impl SignalKind {
    /// Position side an entry signal asks for.
    pub fn entry_side(self) -> Option<PositionSide> {
        match self {
            SignalKind::EnterLong => Some(PositionSide::Long),
            SignalKind::EnterShort => Some(PositionSide::Short),
            SignalKind::Exit | SignalKind::Hold => None,
        }
    }

    pub fn entry_for(side: PositionSide) -> Self {
        match side {
            PositionSide::Long => SignalKind::EnterLong,
            PositionSide::Short => SignalKind::EnterShort,
            PositionSide::Flat => SignalKind::Hold,
        }
    }
}

/// Where a signal came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalSource {
    Evaluator,
    StopBreach,
    Flatten,
}

/// A signal and the bar it was computed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signal {
    pub kind: SignalKind,
    pub bar_index: usize,
    pub source: SignalSource,
}

impl Signal {
    pub fn new(kind: SignalKind, bar_index: usize) -> Self {
        Self {
            kind,
            bar_index,
            source: SignalSource::Evaluator,
        }
    }

    pub fn hold(bar_index: usize) -> Self {
        Self::new(SignalKind::Hold, bar_index)
    }

    pub fn with_source(mut self, source: SignalSource) -> Self {
        self.source = source;
        self
    }

    pub fn is_hold(&self) -> bool {
        self.kind == SignalKind::Hold
    }
}

/// When an order produced by a signal on bar t executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionTiming {
    /// Decide on bar t's close, fill at bar t's close.
    SignalBarClose,
    /// Decide with bar t's indicators at bar t+1's open, fill at that open.
    NextBarOpen,
}

/// ATR trailing-stop parameters an evaluator can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StopRule {
    pub atr_period: usize,
    /// Stop distance in ATRs.
    pub multiplier: f64,
}

/// Read-only position facts an evaluator may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionContext {
    pub side: PositionSide,
    pub entry_bar_index: usize,
}

impl PositionContext {
    pub fn flat() -> Self {
        Self {
            side: PositionSide::Flat,
            entry_bar_index: 0,
        }
    }

    pub fn long(entry_bar_index: usize) -> Self {
        Self {
            side: PositionSide::Long,
            entry_bar_index,
        }
    }

    pub fn short(entry_bar_index: usize) -> Self {
        Self {
            side: PositionSide::Short,
            entry_bar_index,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.side == PositionSide::Flat
    }
}

/// Strategy decision rule.
pub trait SignalEvaluator: Send + Sync {
    /// Human-readable name (e.g., "ma_crossover").
    fn name(&self) -> &str;

    /// Indicators this rule reads, by key.
    fn required_indicators(&self) -> Vec<Box<dyn Indicator>>;

    /// Bars before every required indicator is available.
    fn warmup_bars(&self) -> usize {
        max_lookback(&self.required_indicators())
    }

    fn timing(&self) -> ExecutionTiming {
        ExecutionTiming::SignalBarClose
    }

    /// Protective stop this rule relies on for exits, if any.
    fn stop_rule(&self) -> Option<StopRule> {
        None
    }

    /// Decide on `bar_index` using only `bars[..=bar_index]` and indicator
    /// values up to that bar.
    fn evaluate(
        &self,
        bars: &[Bar],
        bar_index: usize,
        indicators: &IndicatorValues,
        position: &PositionContext,
    ) -> Signal;
}

/// `series[t-1] < other[t-1]` and `series[t] > other[t]`.
///
/// `None` when any of the four values is not available.
pub(crate) fn crossed_above(
    indicators: &IndicatorValues,
    series: &str,
    other: &str,
    bar_index: usize,
) -> Option<bool> {
    let prev = bar_index.checked_sub(1)?;
    let a_prev = indicators.get(series, prev)?;
    let b_prev = indicators.get(other, prev)?;
    let a_cur = indicators.get(series, bar_index)?;
    let b_cur = indicators.get(other, bar_index)?;
    Some(a_prev < b_prev && a_cur > b_cur)
}

/// Mirror of [`crossed_above`].
pub(crate) fn crossed_below(
    indicators: &IndicatorValues,
    series: &str,
    other: &str,
    bar_index: usize,
) -> Option<bool> {
    crossed_above(indicators, other, series, bar_index)
}
