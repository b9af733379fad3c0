//! Backtest runners: one instrument, or many in parallel.

use super::{Engine, EngineError};
use crate::accounting::AccountSummary;
use crate::config::SessionConfig;
use crate::domain::{Bar, TradeRecord};
use crate::report::{max_drawdown, win_rate};
use crate::rng::SeedHierarchy;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Result of one backtest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestReport {
    pub symbol: String,
    pub strategy: String,
    pub config_id: String,
    pub bars: usize,
    pub trades: Vec<TradeRecord>,
    /// Equity at each bar's close.
    pub equity_curve: Vec<f64>,
    /// Orders canceled, rejected or margin called.
    pub rejected_orders: usize,
    pub total_commission: f64,
    pub summary: AccountSummary,
    /// Largest peak-to-trough fall of the equity curve, as a fraction.
    pub max_drawdown: f64,
    pub win_rate: f64,
}

pub fn run_backtest(bars: Vec<Bar>, config: &SessionConfig) -> Result<BacktestReport, EngineError> {
    let mut engine = Engine::new(config)?;
    let n = bars.len();
    engine.run(bars)?;

    let machine = engine.machine();
    let account = machine.account();
    let final_equity = account
        .equity_history()
        .last()
        .copied()
        .unwrap_or(account.initial_cash());
    let summary = account.summary(final_equity);
    let report = BacktestReport {
        symbol: config.symbol.clone(),
        strategy: engine.evaluator().name().to_string(),
        config_id: config.config_id(),
        bars: n,
        trades: machine.trades().to_vec(),
        equity_curve: account.equity_history().to_vec(),
        rejected_orders: machine.failed_orders(),
        total_commission: account.commission_paid(),
        summary,
        max_drawdown: max_drawdown(account.equity_history()),
        win_rate: win_rate(machine.trades()),
    };
    info!(
        symbol = %report.symbol,
        strategy = %report.strategy,
        trades = report.trades.len(),
        final_equity = summary.final_equity,
        pct_return = summary.pct_return,
        "backtest finished"
    );
    Ok(report)
}

/// Run each instrument on its own engine, in parallel. With fault injection
/// enabled every symbol gets its own seed derived from `config.seed`.
pub fn run_batch(
    instruments: Vec<(String, Vec<Bar>)>,
    config: &SessionConfig,
) -> Vec<(String, Result<BacktestReport, EngineError>)> {
    let seeds = SeedHierarchy::new(config.seed);
    instruments
        .into_par_iter()
        .map(|(symbol, bars)| {
            let mut cfg = config.clone();
            cfg.symbol = symbol.clone();
            cfg.seed = seeds.sub_seed(&symbol);
            let result = run_backtest(bars, &cfg);
            (symbol, result)
        })
        .collect()
}
