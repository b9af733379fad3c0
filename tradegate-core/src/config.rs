//! Session configuration, loaded from TOML.
//!
//! ```toml
//! symbol = "BTCUSDT"
//! initial_cash = 10000.0
//! commission_rate = 0.001
//! reverse_on_opposite = true
//!
//! [strategy]
//! type = "macd_momentum"
//!
//! [sizer]
//! type = "all_in"
//!
//! [gate]
//! confirmation_bars = 48
//! cooldown = { seconds = 172800 }
//! ```

use crate::gate::GateConfig;
use crate::sizing::Sizer;
use crate::strategy::factory::{create_evaluator, FactoryError, StrategyConfig};
use crate::strategy::{ExecutionTiming, StopRule};
use crate::venue::BrokerConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error(transparent)]
    Strategy(#[from] FactoryError),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::InvalidConfiguration(msg.into())
}

/// Everything needed to run one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_symbol")]
    pub symbol: String,
    pub initial_cash: f64,
    #[serde(default)]
    pub commission_rate: f64,
    #[serde(default)]
    pub reverse_on_opposite: bool,
    /// Simulated broker rejection probability, for dry runs.
    #[serde(default)]
    pub reject_rate: f64,
    #[serde(default)]
    pub seed: u64,
    /// Overrides the strategy's own execution timing.
    #[serde(default)]
    pub timing: Option<ExecutionTiming>,
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub sizer: Sizer,
    /// Absent means every non-hold signal passes straight through. A present
    /// table fills missing fields from `GateConfig::default`.
    #[serde(default)]
    pub gate: Option<GateConfig>,
    /// Overrides or adds an ATR trailing stop.
    #[serde(default)]
    pub trailing_stop: Option<StopRule>,
}

fn default_symbol() -> String {
    "UNKNOWN".to_string()
}

impl SessionConfig {
    pub fn new(strategy: StrategyConfig) -> Self {
        Self {
            symbol: default_symbol(),
            initial_cash: 10_000.0,
            commission_rate: 0.001,
            strategy,
            sizer: Sizer::default(),
            gate: None,
            timing: None,
            trailing_stop: None,
            reverse_on_opposite: false,
            reject_rate: 0.0,
            seed: 0,
        }
    }

    /// Names accepted by [`SessionConfig::preset`].
    pub const PRESETS: [&'static str; 5] = ["ma_crossover", "macd_trend", "ema_trend", "rsi_sma", "macd_momentum"];

    /// Default session for a strategy variant.
    pub fn preset(name: &str) -> Option<Self> {
        let config = match name {
            "ma_crossover" => Self::new(StrategyConfig::ma_crossover()),
            "macd_trend" => Self {
                sizer: Sizer::AllIn,
                ..Self::new(StrategyConfig::macd_trend())
            },
            "ema_trend" => Self {
                sizer: Sizer::AllIn,
                ..Self::new(StrategyConfig::ema_trend())
            },
            "rsi_sma" => Self {
                sizer: Sizer::AllIn,
                ..Self::new(StrategyConfig::rsi_sma())
            },
            "macd_momentum" => Self {
                sizer: Sizer::AllIn,
                gate: Some(GateConfig::live_momentum()),
                reverse_on_opposite: true,
                ..Self::new(StrategyConfig::macd_momentum())
            },
            _ => return None,
        };
        Some(config)
    }

    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Content hash of the configuration, for tagging reports.
    pub fn config_id(&self) -> String {
        let json = serde_json::to_vec(self).unwrap_or_default();
        blake3::hash(&json).to_hex()[..16].to_string()
    }

    pub fn broker_config(&self) -> BrokerConfig {
        BrokerConfig {
            initial_cash: self.initial_cash,
            commission_rate: self.commission_rate,
            reject_rate: self.reject_rate,
            seed: self.seed,
        }
    }

    pub fn gate_config(&self) -> GateConfig {
        self.gate.clone().unwrap_or_else(GateConfig::pass_through)
    }

    /// Check every field before any bar is processed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.symbol.trim().is_empty() {
            return Err(invalid("symbol must not be empty"));
        }
        if !(self.initial_cash.is_finite() && self.initial_cash > 0.0) {
            return Err(invalid(format!("initial_cash must be > 0, got {}", self.initial_cash)));
        }
        if !(0.0..1.0).contains(&self.commission_rate) {
            return Err(invalid(format!(
                "commission_rate must be in [0, 1), got {}",
                self.commission_rate
            )));
        }
        if !(0.0..=1.0).contains(&self.reject_rate) {
            return Err(invalid(format!("reject_rate must be in [0, 1], got {}", self.reject_rate)));
        }
        self.sizer.validate().map_err(invalid)?;

        if let Some(gate) = &self.gate {
            if gate.confirmation_bars == 0 {
                return Err(invalid("gate.confirmation_bars must be >= 1"));
            }
            if let Some(crate::gate::Cooldown::Seconds(s)) = gate.cooldown {
                if s < 0 {
                    return Err(invalid("gate.cooldown seconds must be >= 0"));
                }
            }
        }
        if let Some(stop) = &self.trailing_stop {
            if stop.atr_period == 0 {
                return Err(invalid("trailing_stop.atr_period must be >= 1"));
            }
            if !(stop.multiplier.is_finite() && stop.multiplier > 0.0) {
                return Err(invalid("trailing_stop.multiplier must be > 0"));
            }
        }

        create_evaluator(&self.strategy)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::Cooldown;

    #[test]
    fn every_preset_validates() {
        for name in SessionConfig::PRESETS {
            let config = SessionConfig::preset(name).unwrap();
            config.validate().unwrap();
            assert_eq!(config.strategy.name(), name);
        }
        assert!(SessionConfig::preset("nope").is_none());
    }

    #[test]
    fn parses_full_toml() {
        let text = r#"
symbol = "BTCUSDT"
initial_cash = 10000.0
commission_rate = 0.001
reverse_on_opposite = true

[strategy]
type = "macd_momentum"
adx_threshold = 20.0

[sizer]
type = "all_in"

[gate]
confirmation_bars = 48
cooldown = { seconds = 172800 }
"#;
        let config = SessionConfig::from_toml_str(text).unwrap();
        assert_eq!(config.symbol, "BTCUSDT");
        assert_eq!(config.sizer, Sizer::AllIn);
        assert!(config.reverse_on_opposite);
        assert_eq!(config.gate_config().cooldown, Some(Cooldown::Seconds(172_800)));
        match config.strategy {
            StrategyConfig::MacdMomentum { adx_threshold, rsi_period, .. } => {
                assert_eq!(adx_threshold, 20.0);
                assert_eq!(rsi_period, 14);
            }
            other => panic!("unexpected strategy {other:?}"),
        }
    }

    #[test]
    fn minimal_toml_uses_defaults() {
        let config = SessionConfig::from_toml_str("initial_cash = 500.0\n[strategy]\ntype = \"ma_crossover\"\n").unwrap();
        assert_eq!(config.commission_rate, 0.0);
        assert_eq!(config.gate, None);
        assert_eq!(config.gate_config(), GateConfig::pass_through());
        assert_eq!(config.sizer, Sizer::Fixed { units: 1.0 });
    }

    #[test]
    fn partial_gate_table_keeps_default_persistence() {
        let text = "initial_cash = 500.0\n[strategy]\ntype = \"ma_crossover\"\n[gate]\ncooldown = { bars = 10 }\n";
        let config = SessionConfig::from_toml_str(text).unwrap();
        let gate = config.gate_config();
        assert_eq!(gate.confirmation_bars, 48);
        assert_eq!(gate.cooldown, Some(Cooldown::Bars(10)));
    }

    #[test]
    fn rejects_bad_values() {
        let mut config = SessionConfig::preset("ma_crossover").unwrap();
        config.initial_cash = 0.0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidConfiguration(_))));

        let mut config = SessionConfig::preset("ma_crossover").unwrap();
        config.gate = Some(GateConfig {
            confirmation_bars: 0,
            cooldown: None,
        });
        assert!(config.validate().is_err());

        let mut config = SessionConfig::preset("ma_crossover").unwrap();
        config.commission_rate = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_bad_strategy_params() {
        let text = "initial_cash = 1.0\n[strategy]\ntype = \"ma_crossover\"\nfast_period = 40\nslow_period = 20\n";
        assert!(matches!(
            SessionConfig::from_toml_str(text),
            Err(ConfigError::Strategy(_))
        ));
    }

    #[test]
    fn unknown_strategy_is_a_parse_error() {
        let text = "initial_cash = 1.0\n[strategy]\ntype = \"martingale\"\n";
        assert!(matches!(SessionConfig::from_toml_str(text), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn toml_round_trip() {
        let config = SessionConfig::preset("macd_momentum").unwrap();
        let text = config.to_toml_string().unwrap();
        assert_eq!(SessionConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn config_id_tracks_content() {
        let a = SessionConfig::preset("ema_trend").unwrap();
        let mut b = a.clone();
        assert_eq!(a.config_id(), b.config_id());
        b.commission_rate = 0.002;
        assert_ne!(a.config_id(), b.config_id());
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.toml");
        std::fs::write(&path, "initial_cash = 100.0\n[strategy]\ntype = \"rsi_sma\"\n").unwrap();
        let config = SessionConfig::load(&path).unwrap();
        assert_eq!(config.strategy, StrategyConfig::rsi_sma());

        let missing = SessionConfig::load(&dir.path().join("missing.toml"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }
}
