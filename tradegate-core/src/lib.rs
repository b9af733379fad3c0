//! Tradegate Core: signal evaluation and the single-position order state
//! machine.
//!
//! - Domain types (bars, orders, notifications, positions, trades)
//! - Indicators with explicit warm-up
//! - Strategy evaluators and their factory
//! - Confirmation gate with cooldown
//! - ATR trailing stop that only tightens
//! - Order state machine with at most one order in flight
//! - Simulated execution venue, per-instrument engine, backtest and live runners

pub mod accounting;
pub mod config;
pub mod domain;
pub mod engine;
pub mod feed;
pub mod gate;
pub mod indicators;
pub mod machine;
pub mod report;
pub mod rng;
pub mod sizing;
pub mod stop;
pub mod strategy;
pub mod venue;

pub use config::{ConfigError, SessionConfig};
pub use engine::{run_backtest, run_batch, BacktestReport, Engine, EngineError};
pub use machine::{MachineError, MachineState, TradeMachine};
