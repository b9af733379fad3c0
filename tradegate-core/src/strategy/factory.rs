//! Factory: converts a `StrategyConfig` into a runtime evaluator.
//!
//! Constructors assert on bad parameters; the factory checks them first so
//! a bad config file surfaces as a `FactoryError` instead of a panic.

use super::{EmaTrend, MaCrossover, MaType, MacdMomentum, MacdTrend, RsiSma, SignalEvaluator};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum FactoryError {
    #[error("{strategy}: {reason}")]
    InvalidParameter {
        strategy: &'static str,
        reason: String,
    },
}

fn invalid(strategy: &'static str, reason: impl Into<String>) -> FactoryError {
    FactoryError::InvalidParameter {
        strategy,
        reason: reason.into(),
    }
}

/// Strategy variant and its parameters, tagged by `type` in TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StrategyConfig {
    MaCrossover {
        #[serde(default = "defaults::fast")]
        fast_period: usize,
        #[serde(default = "defaults::slow")]
        slow_period: usize,
        #[serde(default)]
        ma_type: MaType,
        #[serde(default = "defaults::hold_bars")]
        hold_bars: usize,
    },
    MacdTrend {
        #[serde(default = "defaults::macd")]
        macd: (usize, usize, usize),
        #[serde(default = "defaults::atr_period")]
        atr_period: usize,
        #[serde(default = "defaults::atr_distance")]
        atr_distance: f64,
        #[serde(default = "defaults::trend_sma")]
        sma_period: usize,
        #[serde(default = "defaults::dir_period")]
        dir_period: usize,
    },
    EmaTrend {
        #[serde(default = "defaults::ema_period")]
        ema_period: usize,
        #[serde(default = "defaults::long_sma")]
        sma_period: usize,
    },
    RsiSma {
        #[serde(default = "defaults::rsi_sma_period")]
        rsi_period: usize,
        #[serde(default = "defaults::rsi_lower")]
        lower: f64,
        #[serde(default = "defaults::rsi_upper")]
        upper: f64,
        #[serde(default = "defaults::rsi_fast_sma")]
        fast_period: usize,
        #[serde(default = "defaults::rsi_slow_sma")]
        slow_period: usize,
    },
    MacdMomentum {
        #[serde(default = "defaults::macd")]
        macd: (usize, usize, usize),
        #[serde(default = "defaults::momentum_rsi")]
        rsi_period: usize,
        #[serde(default = "defaults::rsi_mid")]
        rsi_mid: f64,
        #[serde(default = "defaults::adx_period")]
        adx_period: usize,
        #[serde(default = "defaults::adx_threshold")]
        adx_threshold: f64,
    },
}

mod defaults {
    pub fn fast() -> usize {
        10
    }
    pub fn slow() -> usize {
        30
    }
    pub fn hold_bars() -> usize {
        5
    }
    pub fn macd() -> (usize, usize, usize) {
        (12, 26, 9)
    }
    pub fn atr_period() -> usize {
        14
    }
    pub fn atr_distance() -> f64 {
        3.0
    }
    pub fn trend_sma() -> usize {
        30
    }
    pub fn dir_period() -> usize {
        10
    }
    pub fn ema_period() -> usize {
        50
    }
    pub fn long_sma() -> usize {
        200
    }
    pub fn rsi_sma_period() -> usize {
        21
    }
    pub fn rsi_lower() -> f64 {
        30.0
    }
    pub fn rsi_upper() -> f64 {
        70.0
    }
    pub fn rsi_fast_sma() -> usize {
        14
    }
    pub fn rsi_slow_sma() -> usize {
        50
    }
    pub fn momentum_rsi() -> usize {
        14
    }
    pub fn rsi_mid() -> f64 {
        50.0
    }
    pub fn adx_period() -> usize {
        14
    }
    pub fn adx_threshold() -> f64 {
        25.0
    }
}

impl StrategyConfig {
    pub fn ma_crossover() -> Self {
        StrategyConfig::MaCrossover {
            fast_period: defaults::fast(),
            slow_period: defaults::slow(),
            ma_type: MaType::Sma,
            hold_bars: defaults::hold_bars(),
        }
    }

    pub fn macd_trend() -> Self {
        StrategyConfig::MacdTrend {
            macd: defaults::macd(),
            atr_period: defaults::atr_period(),
            atr_distance: defaults::atr_distance(),
            sma_period: defaults::trend_sma(),
            dir_period: defaults::dir_period(),
        }
    }

    pub fn ema_trend() -> Self {
        StrategyConfig::EmaTrend {
            ema_period: defaults::ema_period(),
            sma_period: defaults::long_sma(),
        }
    }

    pub fn rsi_sma() -> Self {
        StrategyConfig::RsiSma {
            rsi_period: defaults::rsi_sma_period(),
            lower: defaults::rsi_lower(),
            upper: defaults::rsi_upper(),
            fast_period: defaults::rsi_fast_sma(),
            slow_period: defaults::rsi_slow_sma(),
        }
    }

    pub fn macd_momentum() -> Self {
        StrategyConfig::MacdMomentum {
            macd: defaults::macd(),
            rsi_period: defaults::momentum_rsi(),
            rsi_mid: defaults::rsi_mid(),
            adx_period: defaults::adx_period(),
            adx_threshold: defaults::adx_threshold(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            StrategyConfig::MaCrossover { .. } => "ma_crossover",
            StrategyConfig::MacdTrend { .. } => "macd_trend",
            StrategyConfig::EmaTrend { .. } => "ema_trend",
            StrategyConfig::RsiSma { .. } => "rsi_sma",
            StrategyConfig::MacdMomentum { .. } => "macd_momentum",
        }
    }
}

fn check_macd(strategy: &'static str, (fast, slow, signal): (usize, usize, usize)) -> Result<(), FactoryError> {
    if fast == 0 || signal == 0 {
        return Err(invalid(strategy, "MACD periods must be >= 1"));
    }
    if slow <= fast {
        return Err(invalid(strategy, format!("MACD slow period {slow} must exceed fast {fast}")));
    }
    Ok(())
}

fn check_period(strategy: &'static str, what: &str, period: usize) -> Result<(), FactoryError> {
    if period == 0 {
        return Err(invalid(strategy, format!("{what} must be >= 1")));
    }
    Ok(())
}

/// Build the evaluator a config describes.
pub fn create_evaluator(config: &StrategyConfig) -> Result<Box<dyn SignalEvaluator>, FactoryError> {
    let name = config.name();
    match *config {
        StrategyConfig::MaCrossover {
            fast_period,
            slow_period,
            ma_type,
            hold_bars,
        } => {
            check_period(name, "fast_period", fast_period)?;
            check_period(name, "hold_bars", hold_bars)?;
            if slow_period <= fast_period {
                return Err(invalid(name, "slow_period must be > fast_period"));
            }
            Ok(Box::new(MaCrossover::new(fast_period, slow_period, ma_type, hold_bars)))
        }
        StrategyConfig::MacdTrend {
            macd,
            atr_period,
            atr_distance,
            sma_period,
            dir_period,
        } => {
            check_macd(name, macd)?;
            check_period(name, "atr_period", atr_period)?;
            check_period(name, "sma_period", sma_period)?;
            check_period(name, "dir_period", dir_period)?;
            if !(atr_distance > 0.0) {
                return Err(invalid(name, "atr_distance must be > 0"));
            }
            Ok(Box::new(MacdTrend::new(macd, atr_period, atr_distance, sma_period, dir_period)))
        }
        StrategyConfig::EmaTrend {
            ema_period,
            sma_period,
        } => {
            check_period(name, "ema_period", ema_period)?;
            check_period(name, "sma_period", sma_period)?;
            Ok(Box::new(EmaTrend::new(ema_period, sma_period)))
        }
        StrategyConfig::RsiSma {
            rsi_period,
            lower,
            upper,
            fast_period,
            slow_period,
        } => {
            check_period(name, "rsi_period", rsi_period)?;
            check_period(name, "fast_period", fast_period)?;
            if !(lower < upper) {
                return Err(invalid(name, format!("lower band {lower} must be below upper {upper}")));
            }
            if slow_period <= fast_period {
                return Err(invalid(name, "slow_period must be > fast_period"));
            }
            Ok(Box::new(RsiSma::new(rsi_period, (lower, upper), fast_period, slow_period)))
        }
        StrategyConfig::MacdMomentum {
            macd,
            rsi_period,
            rsi_mid,
            adx_period,
            adx_threshold,
        } => {
            check_macd(name, macd)?;
            check_period(name, "rsi_period", rsi_period)?;
            check_period(name, "adx_period", adx_period)?;
            Ok(Box::new(MacdMomentum::new(
                macd,
                (rsi_period, rsi_mid),
                (adx_period, adx_threshold),
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_preset_builds() {
        for config in [
            StrategyConfig::ma_crossover(),
            StrategyConfig::macd_trend(),
            StrategyConfig::ema_trend(),
            StrategyConfig::rsi_sma(),
            StrategyConfig::macd_momentum(),
        ] {
            let evaluator = create_evaluator(&config).unwrap();
            assert_eq!(evaluator.name(), config.name());
            assert!(!evaluator.required_indicators().is_empty());
        }
    }

    #[test]
    fn rejects_inverted_periods() {
        let config = StrategyConfig::MaCrossover {
            fast_period: 30,
            slow_period: 10,
            ma_type: MaType::Sma,
            hold_bars: 5,
        };
        let err = create_evaluator(&config).err().unwrap();
        assert_eq!(err, invalid("ma_crossover", "slow_period must be > fast_period"));
    }

    #[test]
    fn rejects_bad_macd() {
        let mut config = StrategyConfig::macd_momentum();
        if let StrategyConfig::MacdMomentum { macd, .. } = &mut config {
            *macd = (26, 12, 9);
        }
        assert!(create_evaluator(&config).is_err());
    }

    #[test]
    fn toml_fills_defaults() {
        let config: StrategyConfig = toml::from_str("type = \"ema_trend\"\nema_period = 20\n").unwrap();
        assert_eq!(
            config,
            StrategyConfig::EmaTrend {
                ema_period: 20,
                sma_period: 200
            }
        );
    }

    #[test]
    fn only_macd_trend_carries_a_stop() {
        let with_stop: Vec<&str> = [
            StrategyConfig::ma_crossover(),
            StrategyConfig::macd_trend(),
            StrategyConfig::ema_trend(),
            StrategyConfig::rsi_sma(),
            StrategyConfig::macd_momentum(),
        ]
        .iter()
        .filter(|c| create_evaluator(c).unwrap().stop_rule().is_some())
        .map(|c| c.name())
        .collect();
        assert_eq!(with_stop, vec!["macd_trend"]);
    }
}
