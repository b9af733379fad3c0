//! Per-instrument engine: one bar at a time, strictly in order.
//!
//! Each bar runs the same steps:
//!
//! 1. next-open evaluation (strategies executing at the next open decide on
//!    the previous bar and fill at this bar's open)
//! 2. poll the venue and apply its notifications
//! 3. issue queued follow-ups (flatten, reversal entry)
//! 4. stop check, then stop ratchet
//! 5. close-of-bar evaluation → gate → state machine → venue
//!
//! and then marks equity at the close.

pub mod backtest;
pub mod live;

pub use backtest::{run_backtest, run_batch, BacktestReport};
pub use live::{BarSource, CancelHandle, Clock, CsvBarSource, LiveSession, ManualClock, PeriodicTrigger, SystemClock};

use crate::config::{ConfigError, SessionConfig};
use crate::domain::{Bar, OrderHandle, OrderType};
use crate::feed::FeedError;
use crate::gate::ConfirmationGate;
use crate::indicators::{precompute, Indicator, IndicatorValues};
use crate::machine::{MachineError, Quote, TradeMachine};
use crate::stop::TrailingStop;
use crate::strategy::{create_evaluator, ExecutionTiming, Signal, SignalEvaluator, SignalKind, SignalSource};
use crate::venue::{ExecutionVenue, SimulatedBroker};
use chrono::NaiveDateTime;
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Machine(#[from] MachineError),
    #[error(transparent)]
    Feed(#[from] FeedError),
    #[error("bar at {timestamp} is not after the last processed bar at {last}")]
    OutOfOrder {
        timestamp: NaiveDateTime,
        last: NaiveDateTime,
    },
}

pub struct Engine {
    symbol: String,
    bars: Vec<Bar>,
    indicators: IndicatorValues,
    indicator_set: Vec<Box<dyn Indicator>>,
    evaluator: Box<dyn SignalEvaluator>,
    timing: ExecutionTiming,
    gate: ConfirmationGate,
    stop: Option<TrailingStop>,
    machine: TradeMachine,
    venue: Box<dyn ExecutionVenue>,
    processed: usize,
}

impl Engine {
    /// Engine with a `SimulatedBroker` built from the config.
    pub fn new(config: &SessionConfig) -> Result<Self, EngineError> {
        let venue = SimulatedBroker::new(&config.broker_config());
        Self::with_venue(config, Box::new(venue))
    }

    pub fn with_venue(config: &SessionConfig, venue: Box<dyn ExecutionVenue>) -> Result<Self, EngineError> {
        config.validate()?;
        let evaluator = create_evaluator(&config.strategy).map_err(ConfigError::from)?;
        let timing = config.timing.unwrap_or_else(|| evaluator.timing());
        let stop = config
            .trailing_stop
            .or_else(|| evaluator.stop_rule())
            .map(TrailingStop::new);

        let mut indicator_set = evaluator.required_indicators();
        if let Some(stop) = &stop {
            let atr = stop.indicator();
            if !indicator_set.iter().any(|i| i.name() == atr.name()) {
                indicator_set.push(atr);
            }
        }

        info!(
            symbol = %config.symbol,
            strategy = evaluator.name(),
            timing = ?timing,
            warmup = evaluator.warmup_bars(),
            trailing_stop = stop.is_some(),
            "engine ready"
        );

        Ok(Self {
            symbol: config.symbol.clone(),
            bars: Vec::new(),
            indicators: IndicatorValues::new(),
            indicator_set,
            evaluator,
            timing,
            gate: ConfirmationGate::new(config.gate_config()),
            stop,
            machine: TradeMachine::new(config.initial_cash, config.sizer, config.reverse_on_opposite),
            venue,
            processed: 0,
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn evaluator(&self) -> &dyn SignalEvaluator {
        self.evaluator.as_ref()
    }

    pub fn timing(&self) -> ExecutionTiming {
        self.timing
    }

    pub fn machine(&self) -> &TradeMachine {
        &self.machine
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn indicators(&self) -> &IndicatorValues {
        &self.indicators
    }

    pub fn last_bar(&self) -> Option<&Bar> {
        self.processed.checked_sub(1).and_then(|i| self.bars.get(i))
    }

    /// Equity at the last processed close.
    pub fn equity(&self) -> f64 {
        let price = self.last_bar().map(|b| b.close).unwrap_or(0.0);
        self.machine.account().equity(self.machine.position(), price)
    }

    /// Process a whole history at once. Indicators are computed a single
    /// time over the full series.
    pub fn run(&mut self, bars: Vec<Bar>) -> Result<(), EngineError> {
        for bar in bars {
            self.append(bar)?;
        }
        self.indicators = precompute(&self.bars, &self.indicator_set);
        while self.processed < self.bars.len() {
            self.process(self.processed)?;
            self.processed += 1;
        }
        Ok(())
    }

    /// Append one new bar, refresh indicators and process it.
    ///
    /// EMA and Wilder-smoothed values depend on every earlier bar, so the
    /// indicators are recomputed over the whole history held. One call costs
    /// O(n) in bars held and a session of n bars costs O(n²) in total.
    pub fn push_bar(&mut self, bar: Bar) -> Result<(), EngineError> {
        self.append(bar)?;
        self.indicators = precompute(&self.bars, &self.indicator_set);
        let k = self.bars.len() - 1;
        self.process(k)?;
        self.processed = k + 1;
        Ok(())
    }

    fn append(&mut self, mut bar: Bar) -> Result<(), EngineError> {
        if let Some(last) = self.bars.last() {
            if bar.timestamp <= last.timestamp {
                return Err(EngineError::OutOfOrder {
                    timestamp: bar.timestamp,
                    last: last.timestamp,
                });
            }
        }
        bar.index = self.bars.len();
        self.bars.push(bar);
        Ok(())
    }

    /// Close the position as soon as no order is in flight.
    pub fn request_flatten(&mut self) -> Result<Option<OrderHandle>, EngineError> {
        let Some(k) = self.processed.checked_sub(1) else {
            return Ok(None);
        };
        let quote = self.follow_up_quote(k);
        Ok(self.machine.request_flatten(&quote, self.venue.as_mut())?)
    }

    fn process(&mut self, k: usize) -> Result<(), EngineError> {
        if self.timing == ExecutionTiming::NextBarOpen && k > 0 {
            let quote = Quote {
                bar_index: k - 1,
                price: self.bars[k].open,
                order_type: OrderType::MarketOnOpen,
                stop_seed: self.stop_seed(k - 1),
            };
            self.evaluate(k - 1, &quote)?;
        }

        self.apply_notifications(k)?;

        let quote = self.follow_up_quote(k);
        self.machine.poll_queued(&quote, self.venue.as_mut())?;

        self.check_stop(k)?;

        if self.timing == ExecutionTiming::SignalBarClose {
            let quote = Quote {
                bar_index: k,
                price: self.bars[k].close,
                order_type: OrderType::MarketOnClose,
                stop_seed: self.stop_seed(k),
            };
            self.evaluate(k, &quote)?;
        }

        let equity = self
            .machine
            .account()
            .equity(self.machine.position(), self.bars[k].close);
        self.machine.account_mut().record_equity(equity);
        Ok(())
    }

    fn apply_notifications(&mut self, k: usize) -> Result<(), EngineError> {
        let bar = &self.bars[k];
        for note in self.venue.poll(bar) {
            let executed_at = self
                .bars
                .get(note.bar_index)
                .map(|b| b.timestamp)
                .unwrap_or(bar.timestamp);
            match self.machine.on_notification(&note, executed_at) {
                Ok(_) => {}
                Err(e) if !e.is_fatal() => warn!(symbol = %self.symbol, error = %e, "notification ignored"),
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn check_stop(&mut self, k: usize) -> Result<(), EngineError> {
        let Some(stop) = &self.stop else {
            return Ok(());
        };
        let bar = &self.bars[k];
        let position = self.machine.position();
        if TrailingStop::breached(position.side, position.stop_price, bar.close) {
            info!(
                symbol = %self.symbol,
                bar = k,
                close = bar.close,
                stop = position.stop_price,
                "stop breached"
            );
            let signal = Signal::new(SignalKind::Exit, k).with_source(SignalSource::StopBreach);
            let quote = self.follow_up_quote(k);
            self.machine.on_signal(signal, &quote, self.venue.as_mut())?;
            return Ok(());
        }
        let next = stop.advance(position.side, position.stop_price, bar, &self.indicators);
        self.machine.set_stop(next);
        Ok(())
    }

    fn evaluate(&mut self, signal_bar: usize, quote: &Quote) -> Result<(), EngineError> {
        let context = self.machine.position_context();
        let raw = self
            .evaluator
            .evaluate(&self.bars[..=signal_bar], signal_bar, &self.indicators, &context);
        let bar = &self.bars[signal_bar];
        let Some(signal) = self.gate.observe(raw, bar) else {
            return Ok(());
        };
        debug!(symbol = %self.symbol, bar = signal_bar, signal = ?signal.kind, "signal forwarded");
        if self
            .machine
            .on_signal(signal, quote, self.venue.as_mut())?
            .is_some()
        {
            self.gate.acknowledge(bar);
        }
        Ok(())
    }

    /// Quote for orders issued outside the strategy's own decision point.
    fn follow_up_quote(&self, k: usize) -> Quote {
        let order_type = match self.timing {
            ExecutionTiming::SignalBarClose => OrderType::MarketOnClose,
            ExecutionTiming::NextBarOpen => OrderType::MarketOnOpen,
        };
        Quote {
            bar_index: k,
            price: self.bars[k].close,
            order_type,
            stop_seed: self.stop_seed(k),
        }
    }

    fn stop_seed(&self, k: usize) -> Option<crate::stop::StopSeed> {
        let stop = self.stop.as_ref()?;
        stop.seed(&self.bars[k], &self.indicators)
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("symbol", &self.symbol)
            .field("strategy", &self.evaluator.name())
            .field("bars", &self.bars.len())
            .field("processed", &self.processed)
            .field("state", &self.machine.state())
            .finish()
    }
}
