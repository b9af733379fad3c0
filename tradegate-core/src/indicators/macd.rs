//! MACD: moving average convergence/divergence.
//!
//! MACD line = EMA(fast) − EMA(slow) of closes; signal line = EMA(signal) of
//! the MACD line. The two lines are exposed as separate named instances,
//! keeping the single-series `Indicator` trait.

use super::ema::ema_of_series;
use super::{closes, Indicator};
use crate::domain::Bar;

/// Which MACD series an instance produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacdLine {
    Macd,
    Signal,
}

#[derive(Debug, Clone)]
pub struct Macd {
    fast: usize,
    slow: usize,
    signal: usize,
    line: MacdLine,
    name: String,
}

impl Macd {
    pub fn new(fast: usize, slow: usize, signal: usize, line: MacdLine) -> Self {
        assert!(fast >= 1, "MACD fast period must be >= 1");
        assert!(slow > fast, "MACD slow period must be > fast period");
        assert!(signal >= 1, "MACD signal period must be >= 1");
        Self {
            fast,
            slow,
            signal,
            line,
            name: Self::key(fast, slow, signal, line),
        }
    }

    pub fn key(fast: usize, slow: usize, signal: usize, line: MacdLine) -> String {
        match line {
            MacdLine::Macd => format!("macd_{fast}_{slow}_{signal}"),
            MacdLine::Signal => format!("macd_signal_{fast}_{slow}_{signal}"),
        }
    }

    fn macd_line(&self, bars: &[Bar]) -> Vec<f64> {
        let closes = closes(bars);
        let fast = ema_of_series(&closes, self.fast);
        let slow = ema_of_series(&closes, self.slow);
        fast.iter().zip(&slow).map(|(f, s)| f - s).collect()
    }
}

impl Indicator for Macd {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        match self.line {
            MacdLine::Macd => self.slow - 1,
            MacdLine::Signal => self.slow + self.signal - 2,
        }
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let line = self.macd_line(bars);
        match self.line {
            MacdLine::Macd => line,
            MacdLine::Signal => ema_of_series(&line, self.signal),
        }
    }
}
