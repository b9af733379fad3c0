//! Live (paper) session: poll a bar source on a timer and feed new bars to
//! an engine.
//!
//! Time comes from a [`Clock`], so tests drive the loop with a
//! [`ManualClock`] and never sleep for real.

use super::{Engine, EngineError};
use crate::domain::{Bar, OrderHandle};
use crate::feed::{load_csv, FeedError};
use chrono::{Duration, NaiveDateTime, Utc};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
    fn sleep(&self, duration: Duration);
}

/// Wall-clock time in UTC.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Utc::now().naive_utc()
    }

    fn sleep(&self, duration: Duration) {
        if let Ok(d) = duration.to_std() {
            std::thread::sleep(d);
        }
    }
}

/// A clock that only moves when slept on or advanced.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<NaiveDateTime>,
}

impl ManualClock {
    pub fn new(start: NaiveDateTime) -> Self {
        Self { now: Mutex::new(start) }
    }

    pub fn advance(&self, duration: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += duration;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

/// Stops a [`PeriodicTrigger`] from another thread.
#[derive(Debug, Clone)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Calls a closure every `interval` until cancelled or `max_ticks` is hit.
#[derive(Debug)]
pub struct PeriodicTrigger {
    interval: Duration,
    cancel: Arc<AtomicBool>,
}

impl PeriodicTrigger {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(Arc::clone(&self.cancel))
    }

    /// Runs `on_tick` immediately, then once per interval. Returns the number
    /// of ticks run. An error from `on_tick` ends the loop.
    pub fn run<E, F>(&self, clock: &dyn Clock, max_ticks: Option<usize>, mut on_tick: F) -> Result<usize, E>
    where
        F: FnMut(NaiveDateTime) -> Result<(), E>,
    {
        let mut ticks = 0;
        loop {
            if self.cancel.load(Ordering::SeqCst) || max_ticks.is_some_and(|m| ticks >= m) {
                return Ok(ticks);
            }
            on_tick(clock.now())?;
            ticks += 1;
            if self.cancel.load(Ordering::SeqCst) || max_ticks.is_some_and(|m| ticks >= m) {
                return Ok(ticks);
            }
            clock.sleep(self.interval);
        }
    }
}

/// Where a live session gets its bars. Each fetch may return the whole
/// history seen so far; the session skips what it already processed.
pub trait BarSource: Send {
    fn fetch(&mut self) -> Result<Vec<Bar>, FeedError>;
}

/// Re-reads a CSV file on every fetch.
#[derive(Debug, Clone)]
pub struct CsvBarSource {
    path: PathBuf,
}

impl CsvBarSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl BarSource for CsvBarSource {
    fn fetch(&mut self) -> Result<Vec<Bar>, FeedError> {
        load_csv(&self.path)
    }
}

pub struct LiveSession {
    engine: Engine,
    source: Box<dyn BarSource>,
    last_timestamp: Option<NaiveDateTime>,
}

impl LiveSession {
    pub fn new(engine: Engine, source: Box<dyn BarSource>) -> Self {
        let last_timestamp = engine.last_bar().map(|b| b.timestamp);
        Self {
            engine,
            source,
            last_timestamp,
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn into_engine(self) -> Engine {
        self.engine
    }

    /// Fetch once and push every bar newer than the last one processed.
    /// Returns how many bars were pushed.
    pub fn tick(&mut self) -> Result<usize, EngineError> {
        let bars = self.source.fetch()?;
        let mut pushed = 0;
        for bar in bars {
            if self.last_timestamp.is_some_and(|last| bar.timestamp <= last) {
                continue;
            }
            let timestamp = bar.timestamp;
            self.engine.push_bar(bar)?;
            self.last_timestamp = Some(timestamp);
            pushed += 1;
        }
        if pushed > 0 {
            info!(
                symbol = %self.engine.symbol(),
                pushed,
                state = %self.engine.machine().state(),
                equity = self.engine.equity(),
                "live tick"
            );
        } else {
            debug!(symbol = %self.engine.symbol(), "no new bars");
        }
        Ok(pushed)
    }

    /// Tick on every trigger firing. A failed fetch is logged and retried on
    /// the next firing; engine errors end the session.
    pub fn run(
        &mut self,
        trigger: &PeriodicTrigger,
        clock: &dyn Clock,
        max_ticks: Option<usize>,
    ) -> Result<usize, EngineError> {
        trigger.run(clock, max_ticks, |now| match self.tick() {
            Ok(_) => Ok(()),
            Err(EngineError::Feed(e)) => {
                warn!(symbol = %self.engine.symbol(), %now, error = %e, "bar fetch failed");
                Ok(())
            }
            Err(e) => Err(e),
        })
    }

    /// Close the open position, queued behind any order in flight.
    pub fn flatten(&mut self) -> Result<Option<OrderHandle>, EngineError> {
        info!(symbol = %self.engine.symbol(), "flatten requested");
        self.engine.request_flatten()
    }
}

impl std::fmt::Debug for LiveSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveSession")
            .field("engine", &self.engine)
            .field("last_timestamp", &self.last_timestamp)
            .finish()
    }
}
