//! Tradegate CLI: backtest, batch, paper and check-config commands.
//!
//! Commands:
//! - `backtest`: run one CSV history through a session config or preset
//! - `batch`: run several CSV histories in parallel, one engine each
//! - `paper`: poll a CSV file on a timer and trade it against the simulated broker
//! - `check-config`: validate a config and print its normalized TOML
//!
//! Log verbosity follows `RUST_LOG` (default `info`).

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tradegate_core::engine::{BacktestReport, CsvBarSource, LiveSession, PeriodicTrigger, SystemClock};
use tradegate_core::feed::load_csv;
use tradegate_core::report::{save_report, summary_json};
use tradegate_core::{run_backtest, run_batch, Engine, SessionConfig};

#[derive(Parser)]
#[command(name = "tradegate", about = "Tradegate: signal gating and single-position order management")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Where the session config comes from.
#[derive(Args)]
struct ConfigSource {
    /// Path to a TOML session config.
    #[arg(long, conflicts_with = "preset")]
    config: Option<PathBuf>,

    /// Named preset: ma_crossover, macd_trend, ema_trend, rsi_sma, macd_momentum.
    #[arg(long)]
    preset: Option<String>,

    /// Overrides the config's symbol.
    #[arg(long)]
    symbol: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Backtest one instrument from a CSV file.
    Backtest {
        #[command(flatten)]
        source: ConfigSource,

        /// CSV with timestamp,open,high,low,close,volume columns.
        #[arg(long)]
        data: PathBuf,

        /// Write summary.json, trades.csv and equity.csv here.
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Print the summary as JSON instead of a table.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Backtest several instruments in parallel. Symbols come from file stems.
    Batch {
        #[command(flatten)]
        source: ConfigSource,

        #[arg(required = true)]
        data: Vec<PathBuf>,

        /// One sub-directory per symbol is written here.
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// Paper-trade a CSV file that is appended to while running.
    Paper {
        #[command(flatten)]
        source: ConfigSource,

        #[arg(long)]
        data: PathBuf,

        /// Seconds between polls of the data file.
        #[arg(long, default_value_t = 60)]
        interval_secs: i64,

        /// Stop after this many polls. Runs until killed when absent.
        #[arg(long)]
        max_ticks: Option<usize>,

        /// Close any open position before exiting.
        #[arg(long, default_value_t = false)]
        flatten_on_exit: bool,
    },
    /// Validate a config and print it back as TOML.
    CheckConfig {
        #[command(flatten)]
        source: ConfigSource,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Backtest {
            source,
            data,
            output_dir,
            json,
        } => run_backtest_cmd(&source, &data, output_dir.as_deref(), json),
        Commands::Batch {
            source,
            data,
            output_dir,
        } => run_batch_cmd(&source, &data, output_dir.as_deref()),
        Commands::Paper {
            source,
            data,
            interval_secs,
            max_ticks,
            flatten_on_exit,
        } => run_paper_cmd(&source, data, interval_secs, max_ticks, flatten_on_exit),
        Commands::CheckConfig { source } => run_check_cmd(&source),
    }
}

fn load_config(source: &ConfigSource) -> Result<SessionConfig> {
    let mut config = match (&source.config, &source.preset) {
        (Some(path), None) => SessionConfig::load(path)?,
        (None, Some(name)) => match SessionConfig::preset(name) {
            Some(config) => config,
            None => bail!(
                "unknown preset '{name}'. Valid: {}",
                SessionConfig::PRESETS.join(", ")
            ),
        },
        (None, None) => bail!("one of --config or --preset is required"),
        (Some(_), Some(_)) => bail!("--config and --preset are mutually exclusive"),
    };
    if let Some(symbol) = &source.symbol {
        config.symbol = symbol.clone();
    }
    config.validate()?;
    Ok(config)
}

fn symbol_from_path(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_uppercase())
        .unwrap_or_else(|| "UNKNOWN".to_string())
}

fn run_backtest_cmd(source: &ConfigSource, data: &Path, output_dir: Option<&Path>, json: bool) -> Result<()> {
    let mut config = load_config(source)?;
    if source.symbol.is_none() && source.config.is_none() {
        config.symbol = symbol_from_path(data);
    }
    let bars = load_csv(data)?;
    let report = run_backtest(bars, &config)?;

    if json {
        println!("{}", summary_json(&report)?);
    } else {
        print_summary(&report);
    }
    if let Some(dir) = output_dir {
        save_report(&report, dir)?;
        println!("Report saved to: {}", dir.display());
    }
    Ok(())
}

fn run_batch_cmd(source: &ConfigSource, data: &[PathBuf], output_dir: Option<&Path>) -> Result<()> {
    let config = load_config(source)?;
    let mut instruments = Vec::with_capacity(data.len());
    for path in data {
        let bars = load_csv(path).with_context(|| format!("loading {}", path.display()))?;
        instruments.push((symbol_from_path(path), bars));
    }

    let mut failures = 0;
    println!(
        "{:<10} {:>7} {:>8} {:>12} {:>9} {:>8}",
        "Symbol", "Trades", "Rejects", "Final", "Return%", "MaxDD%"
    );
    println!("{}", "-".repeat(59));
    for (symbol, result) in run_batch(instruments, &config) {
        match result {
            Ok(report) => {
                println!(
                    "{:<10} {:>7} {:>8} {:>12.2} {:>9.2} {:>8.2}",
                    symbol,
                    report.trades.len(),
                    report.rejected_orders,
                    report.summary.final_equity,
                    report.summary.pct_return,
                    report.max_drawdown * 100.0
                );
                if let Some(dir) = output_dir {
                    save_report(&report, &dir.join(&symbol))?;
                }
            }
            Err(e) => {
                failures += 1;
                eprintln!("{symbol}: {e}");
            }
        }
    }
    if failures > 0 {
        bail!("{failures} instrument(s) failed");
    }
    Ok(())
}

fn run_paper_cmd(
    source: &ConfigSource,
    data: PathBuf,
    interval_secs: i64,
    max_ticks: Option<usize>,
    flatten_on_exit: bool,
) -> Result<()> {
    if interval_secs <= 0 {
        bail!("--interval-secs must be positive");
    }
    let mut config = load_config(source)?;
    if source.symbol.is_none() && source.config.is_none() {
        config.symbol = symbol_from_path(&data);
    }
    let engine = Engine::new(&config)?;
    let mut session = LiveSession::new(engine, Box::new(CsvBarSource::new(data)));
    let trigger = PeriodicTrigger::new(chrono::Duration::seconds(interval_secs));

    let ticks = session.run(&trigger, &SystemClock, max_ticks)?;
    info!(ticks, "paper session stopped");
    if flatten_on_exit {
        session.flatten()?;
    }

    let engine = session.engine();
    let machine = engine.machine();
    println!("Ticks: {ticks}");
    println!("Bars processed: {}", engine.bars().len());
    println!("State: {}", machine.state());
    println!("Closed trades: {}", machine.trades().len());
    println!("Equity: {:.2}", engine.equity());
    Ok(())
}

fn run_check_cmd(source: &ConfigSource) -> Result<()> {
    let config = load_config(source)?;
    println!("# config_id = {}", config.config_id());
    print!("{}", config.to_toml_string()?);
    Ok(())
}

fn print_summary(report: &BacktestReport) {
    println!();
    println!("=== {} / {} ===", report.symbol, report.strategy);
    println!("Config:          {}", report.config_id);
    println!("Bars:            {}", report.bars);
    println!("Trades:          {}", report.trades.len());
    println!("Rejected orders: {}", report.rejected_orders);
    println!("Initial cash:    {:.2}", report.summary.initial_cash);
    println!("Final equity:    {:.2}", report.summary.final_equity);
    println!("Return:          {:.2}%", report.summary.pct_return);
    println!("Max drawdown:    {:.2}%", report.max_drawdown * 100.0);
    println!("Win rate:        {:.1}%", report.win_rate * 100.0);
    println!("Commission:      {:.2}", report.total_commission);

    if !report.trades.is_empty() {
        println!();
        println!(
            "{:<6} {:>6} {:>12} {:>6} {:>12} {:>10} {:>12}",
            "Side", "Entry", "Price", "Exit", "Price", "Net", "Reason"
        );
        for t in &report.trades {
            println!(
                "{:<6} {:>6} {:>12.4} {:>6} {:>12.4} {:>10.2} {:>12}",
                format!("{:?}", t.side),
                t.entry_bar,
                t.entry_price,
                t.exit_bar,
                t.exit_price,
                t.net_pnl,
                format!("{:?}", t.exit_reason)
            );
        }
    }
}
