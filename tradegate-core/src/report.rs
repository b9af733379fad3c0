//! Report metrics and export: trade tape and equity curve as CSV, run
//! summary as JSON.

use crate::domain::TradeRecord;
use crate::engine::BacktestReport;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("csv export failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("json export failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Largest peak-to-trough decline, as a positive fraction of the peak.
pub fn max_drawdown(equity_curve: &[f64]) -> f64 {
    let Some(&first) = equity_curve.first() else {
        return 0.0;
    };
    let mut peak = first;
    let mut max_dd = 0.0_f64;
    for &eq in equity_curve {
        if eq > peak {
            peak = eq;
        }
        if peak > 0.0 {
            max_dd = max_dd.max((peak - eq) / peak);
        }
    }
    max_dd
}

/// Fraction of trades with positive net PnL.
pub fn win_rate(trades: &[TradeRecord]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    let winners = trades.iter().filter(|t| t.is_winner()).count();
    winners as f64 / trades.len() as f64
}

pub fn trades_csv(trades: &[TradeRecord]) -> Result<String, ReportError> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "side",
        "entry_bar",
        "entry_time",
        "entry_price",
        "exit_bar",
        "exit_time",
        "exit_price",
        "size",
        "gross_pnl",
        "commission",
        "net_pnl",
        "exit_reason",
    ])?;
    for t in trades {
        wtr.write_record([
            format!("{:?}", t.side),
            t.entry_bar.to_string(),
            t.entry_time.to_string(),
            format!("{:.6}", t.entry_price),
            t.exit_bar.to_string(),
            t.exit_time.to_string(),
            format!("{:.6}", t.exit_price),
            format!("{:.6}", t.size),
            format!("{:.2}", t.gross_pnl),
            format!("{:.2}", t.commission),
            format!("{:.2}", t.net_pnl),
            format!("{:?}", t.exit_reason),
        ])?;
    }
    into_string(wtr)
}

pub fn equity_csv(equity_curve: &[f64]) -> Result<String, ReportError> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["bar_index", "equity"])?;
    for (i, eq) in equity_curve.iter().enumerate() {
        wtr.write_record([i.to_string(), format!("{eq:.2}")])?;
    }
    into_string(wtr)
}

fn into_string(wtr: csv::Writer<Vec<u8>>) -> Result<String, ReportError> {
    let data = wtr.into_inner().map_err(|e| csv::Error::from(e.into_error()))?;
    Ok(String::from_utf8_lossy(&data).into_owned())
}

/// Headline numbers of a run, without the per-bar and per-trade detail.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary<'a> {
    pub symbol: &'a str,
    pub strategy: &'a str,
    pub config_id: &'a str,
    pub bars: usize,
    pub trades: usize,
    pub rejected_orders: usize,
    pub initial_cash: f64,
    pub final_equity: f64,
    pub pct_return: f64,
    pub max_drawdown: f64,
    pub win_rate: f64,
    pub total_commission: f64,
}

impl<'a> From<&'a BacktestReport> for RunSummary<'a> {
    fn from(r: &'a BacktestReport) -> Self {
        Self {
            symbol: &r.symbol,
            strategy: &r.strategy,
            config_id: &r.config_id,
            bars: r.bars,
            trades: r.trades.len(),
            rejected_orders: r.rejected_orders,
            initial_cash: r.summary.initial_cash,
            final_equity: r.summary.final_equity,
            pct_return: r.summary.pct_return,
            max_drawdown: r.max_drawdown,
            win_rate: r.win_rate,
            total_commission: r.total_commission,
        }
    }
}

pub fn summary_json(report: &BacktestReport) -> Result<String, ReportError> {
    Ok(serde_json::to_string_pretty(&RunSummary::from(report))?)
}

/// Writes `summary.json`, `trades.csv` and `equity.csv` under `dir`.
pub fn save_report(report: &BacktestReport, dir: &Path) -> Result<(), ReportError> {
    std::fs::create_dir_all(dir).map_err(|source| ReportError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let files = [
        ("summary.json", summary_json(report)?),
        ("trades.csv", trades_csv(&report.trades)?),
        ("equity.csv", equity_csv(&report.equity_curve)?),
    ];
    for (name, contents) in files {
        let path = dir.join(name);
        std::fs::write(&path, contents).map_err(|source| ReportError::Io { path, source })?;
    }
    Ok(())
}
