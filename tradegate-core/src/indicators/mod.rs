//! Indicator library.
//!
//! Indicators are pure functions: bar history in, numeric series out. The
//! first `lookback()` values of every series are `NaN` (warm-up). Callers
//! never see that `NaN`: `IndicatorValues::get` maps it to `None`, so
//! "not yet available" cannot be confused with a real `0.0`.

pub mod adx;
pub mod atr;
pub mod ema;
pub mod macd;
pub mod rsi;
pub mod sma;

pub use adx::Adx;
pub use atr::Atr;
pub use ema::Ema;
pub use macd::{Macd, MacdLine};
pub use rsi::Rsi;
pub use sma::Sma;

use crate::domain::Bar;
use std::collections::HashMap;

/// A named indicator computed over a whole bar series.
///
/// # Look-ahead guard
/// The value at bar t may only depend on bars `0..=t`.
pub trait Indicator: Send + Sync {
    /// Series key, e.g. "sma_20", "atr_14".
    fn name(&self) -> &str;

    /// Number of leading `NaN` values.
    fn lookback(&self) -> usize;

    /// Compute the series; same length as `bars`.
    fn compute(&self, bars: &[Bar]) -> Vec<f64>;
}

/// Named indicator series for one instrument.
#[derive(Debug, Clone, Default)]
pub struct IndicatorValues {
    series: HashMap<String, Vec<f64>>,
}

impl IndicatorValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, values: Vec<f64>) {
        self.series.insert(name.into(), values);
    }

    /// Value of `name` at `bar_index`, or `None` while warming up, past the
    /// end of the series, or when the series is unknown.
    pub fn get(&self, name: &str, bar_index: usize) -> Option<f64> {
        self.series
            .get(name)
            .and_then(|v| v.get(bar_index).copied())
            .filter(|v| !v.is_nan())
    }

    /// Value of `name` `back` bars before `bar_index`.
    pub fn get_back(&self, name: &str, bar_index: usize, back: usize) -> Option<f64> {
        bar_index.checked_sub(back).and_then(|i| self.get(name, i))
    }

    /// All indicators as seen on one bar.
    pub fn snapshot(&self, bar_index: usize) -> IndicatorSnapshot {
        let values = self
            .series
            .iter()
            .map(|(name, series)| {
                let v = series.get(bar_index).copied().filter(|v| !v.is_nan());
                (name.clone(), v)
            })
            .collect();
        IndicatorSnapshot { bar_index, values }
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

/// Every indicator's value at a single bar, `None` where not yet available.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSnapshot {
    pub bar_index: usize,
    values: HashMap<String, Option<f64>>,
}

impl IndicatorSnapshot {
    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied().flatten()
    }

    /// True once every series in the snapshot has a value.
    pub fn is_complete(&self) -> bool {
        self.values.values().all(Option::is_some)
    }
}

/// Compute every indicator over `bars`.
pub fn precompute(bars: &[Bar], indicators: &[Box<dyn Indicator>]) -> IndicatorValues {
    let mut iv = IndicatorValues::new();
    for ind in indicators {
        iv.insert(ind.name(), ind.compute(bars));
    }
    iv
}

/// Warm-up length: the largest lookback among `indicators`.
pub fn max_lookback(indicators: &[Box<dyn Indicator>]) -> usize {
    indicators.iter().map(|i| i.lookback()).max().unwrap_or(0)
}

pub(crate) fn closes(bars: &[Bar]) -> Vec<f64> {
    bars.iter().map(|b| b.close).collect()
}

/// Assert two f64 values are approximately equal.
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::bar::make_bars;

    #[test]
    fn warmup_is_distinct_from_zero() {
        let mut iv = IndicatorValues::new();
        iv.insert("x", vec![f64::NAN, 0.0, 1.5]);
        assert_eq!(iv.get("x", 0), None);
        assert_eq!(iv.get("x", 1), Some(0.0));
        assert_eq!(iv.get("x", 2), Some(1.5));
        assert_eq!(iv.get("x", 3), None);
        assert_eq!(iv.get("missing", 0), None);
    }

    #[test]
    fn get_back_guards_underflow() {
        let mut iv = IndicatorValues::new();
        iv.insert("x", vec![1.0, 2.0, 3.0]);
        assert_eq!(iv.get_back("x", 2, 2), Some(1.0));
        assert_eq!(iv.get_back("x", 1, 2), None);
    }

    #[test]
    fn snapshot_reports_incomplete_during_warmup() {
        let bars = make_bars(&[10.0, 11.0, 12.0, 13.0]);
        let inds: Vec<Box<dyn Indicator>> = vec![Box::new(Sma::new(1)), Box::new(Sma::new(3))];
        let iv = precompute(&bars, &inds);
        assert_eq!(iv.len(), 2);

        let early = iv.snapshot(1);
        assert_eq!(early.get("sma_1"), Some(11.0));
        assert_eq!(early.get("sma_3"), None);
        assert!(!early.is_complete());

        let late = iv.snapshot(3);
        assert!(late.is_complete());
        assert_approx(late.get("sma_3").unwrap(), 12.0, DEFAULT_EPSILON);
        assert_eq!(max_lookback(&inds), 2);
    }
}
