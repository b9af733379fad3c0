//! Position and order state machine.
//!
//! Owns the single position, the single in-flight order and the cash
//! ledger. Gated signals and venue notifications are its only inputs; order
//! requests are its only output.
//!
//! ```text
//! FLAT ──entry──▶ PENDING_ENTRY ──fill──▶ LONG/SHORT ──exit──▶ PENDING_EXIT ──fill──▶ FLAT
//!                      │ fail                   ▲                    │ fail
//!                      ▼                        └────────────────────┘
//!                    FLAT
//! ```
//!
//! At most one order is in flight. Signals that arrive while an order is
//! pending are dropped; a flatten request or a reversal entry is queued and
//! issued only after the pending order resolves.

use crate::accounting::Account;
use crate::domain::{
    ExitReason, OrderHandle, OrderIntent, OrderNotification, OrderRequest, OrderSide, OrderType, Position,
    PositionSide, TradeRecord,
};
use crate::sizing::Sizer;
use crate::stop::StopSeed;
use crate::strategy::{PositionContext, Signal, SignalKind, SignalSource};
use crate::venue::{ExecutionVenue, VenueError};
use chrono::NaiveDateTime;
use std::fmt;
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum MachineError {
    /// A second order was about to be issued. Always a bug; never recoverable.
    #[error("order {pending} is still in flight")]
    ConcurrentOrder { pending: OrderHandle },
    /// A notification did not match the pending order.
    #[error("notification for unknown order {0}")]
    UnknownOrder(OrderHandle),
    #[error("no open position to close")]
    NoPosition,
    #[error(transparent)]
    Venue(#[from] VenueError),
}

impl MachineError {
    /// Errors after which the session must stop.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, MachineError::UnknownOrder(_))
    }
}

/// Derived state; never stored separately from position and pending order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineState {
    Flat,
    PendingEntry,
    Long,
    Short,
    PendingExit,
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MachineState::Flat => "FLAT",
            MachineState::PendingEntry => "PENDING_ENTRY",
            MachineState::Long => "LONG",
            MachineState::Short => "SHORT",
            MachineState::PendingExit => "PENDING_EXIT",
        };
        f.write_str(s)
    }
}

/// Price and order type an order issued now would use.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quote {
    /// Bar the decision is made on.
    pub bar_index: usize,
    pub price: f64,
    pub order_type: OrderType,
    pub stop_seed: Option<StopSeed>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingOrder {
    pub request: OrderRequest,
    pub originating_signal: Signal,
    /// Initial stop level to install when an entry fills.
    pub stop_seed: Option<f64>,
}

/// Work deferred until the in-flight order resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowUp {
    Flatten,
    Enter(PositionSide),
}

#[derive(Debug)]
pub struct TradeMachine {
    position: Position,
    entry_time: Option<NaiveDateTime>,
    pending: Option<PendingOrder>,
    queued: Option<FollowUp>,
    sizer: Sizer,
    reverse_on_opposite: bool,
    account: Account,
    trades: Vec<TradeRecord>,
    next_handle: u64,
    failed_orders: usize,
}

impl TradeMachine {
    pub fn new(initial_cash: f64, sizer: Sizer, reverse_on_opposite: bool) -> Self {
        Self {
            position: Position::flat(),
            entry_time: None,
            pending: None,
            queued: None,
            sizer,
            reverse_on_opposite,
            account: Account::new(initial_cash),
            trades: Vec::new(),
            next_handle: 1,
            failed_orders: 0,
        }
    }

    pub fn state(&self) -> MachineState {
        match (&self.pending, self.position.side) {
            (Some(p), _) => match p.request.intent {
                OrderIntent::Entry(_) => MachineState::PendingEntry,
                OrderIntent::Exit => MachineState::PendingExit,
            },
            (None, PositionSide::Flat) => MachineState::Flat,
            (None, PositionSide::Long) => MachineState::Long,
            (None, PositionSide::Short) => MachineState::Short,
        }
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn position_context(&self) -> PositionContext {
        PositionContext {
            side: self.position.side,
            entry_bar_index: self.position.entry_bar_index,
        }
    }

    pub fn pending(&self) -> Option<&PendingOrder> {
        self.pending.as_ref()
    }

    pub fn queued(&self) -> Option<FollowUp> {
        self.queued
    }

    pub fn account(&self) -> &Account {
        &self.account
    }

    pub fn account_mut(&mut self) -> &mut Account {
        &mut self.account
    }

    pub fn trades(&self) -> &[TradeRecord] {
        &self.trades
    }

    /// Orders answered canceled, rejected or margin called.
    pub fn failed_orders(&self) -> usize {
        self.failed_orders
    }

    /// Install a new stop level. Ignored while flat.
    pub fn set_stop(&mut self, stop: Option<f64>) {
        if !self.position.is_flat() {
            self.position.stop_price = stop;
        }
    }

    /// Act on a gated signal. Returns the handle of the order issued, if any.
    pub fn on_signal(
        &mut self,
        signal: Signal,
        quote: &Quote,
        venue: &mut dyn ExecutionVenue,
    ) -> Result<Option<OrderHandle>, MachineError> {
        if signal.is_hold() {
            return Ok(None);
        }
        if let Some(p) = &self.pending {
            debug!(
                bar = signal.bar_index,
                signal = ?signal.kind,
                pending = %p.request.handle,
                "signal dropped: order in flight"
            );
            return Ok(None);
        }

        match (self.position.side, signal.kind) {
            (PositionSide::Flat, kind) => match kind.entry_side() {
                Some(side) => self.open(side, signal, quote, venue),
                None => Ok(None),
            },
            (PositionSide::Long, SignalKind::Exit) | (PositionSide::Short, SignalKind::Exit) => {
                self.close(signal, quote, venue).map(Some)
            }
            (PositionSide::Long, SignalKind::EnterShort) | (PositionSide::Short, SignalKind::EnterLong) => {
                let handle = self.close(signal, quote, venue)?;
                if self.reverse_on_opposite {
                    self.queued = signal.kind.entry_side().map(FollowUp::Enter);
                }
                Ok(Some(handle))
            }
            _ => Ok(None),
        }
    }

    /// Close the position now, or once the in-flight order resolves.
    pub fn request_flatten(
        &mut self,
        quote: &Quote,
        venue: &mut dyn ExecutionVenue,
    ) -> Result<Option<OrderHandle>, MachineError> {
        if self.pending.is_some() {
            info!(state = %self.state(), "flatten queued behind in-flight order");
            self.queued = Some(FollowUp::Flatten);
            return Ok(None);
        }
        if self.position.is_flat() {
            debug!("flatten requested while flat");
            return Ok(None);
        }
        let signal = Signal::new(SignalKind::Exit, quote.bar_index).with_source(SignalSource::Flatten);
        self.close(signal, quote, venue).map(Some)
    }

    /// Issue a queued follow-up once nothing is in flight.
    pub fn poll_queued(
        &mut self,
        quote: &Quote,
        venue: &mut dyn ExecutionVenue,
    ) -> Result<Option<OrderHandle>, MachineError> {
        if self.pending.is_some() {
            return Ok(None);
        }
        match self.queued.take() {
            None => Ok(None),
            Some(FollowUp::Flatten) => self.request_flatten(quote, venue),
            Some(FollowUp::Enter(side)) => {
                if !self.position.is_flat() {
                    return Ok(None);
                }
                let signal = Signal::new(SignalKind::entry_for(side), quote.bar_index);
                self.open(side, signal, quote, venue)
            }
        }
    }

    fn open(
        &mut self,
        side: PositionSide,
        signal: Signal,
        quote: &Quote,
        venue: &mut dyn ExecutionVenue,
    ) -> Result<Option<OrderHandle>, MachineError> {
        let size = self.sizer.size(self.account.cash(), quote.price);
        if size <= 0.0 {
            warn!(
                bar = quote.bar_index,
                price = quote.price,
                cash = self.account.cash(),
                "entry signal dropped: computed size is zero"
            );
            return Ok(None);
        }
        let stop_seed = quote.stop_seed.and_then(|s| s.level(side));
        self.issue(OrderIntent::Entry(side), size, signal, quote, stop_seed, venue)
            .map(Some)
    }

    fn close(
        &mut self,
        signal: Signal,
        quote: &Quote,
        venue: &mut dyn ExecutionVenue,
    ) -> Result<OrderHandle, MachineError> {
        let size = self.position.size;
        self.issue(OrderIntent::Exit, size, signal, quote, None, venue)
    }

    fn issue(
        &mut self,
        intent: OrderIntent,
        size: f64,
        signal: Signal,
        quote: &Quote,
        stop_seed: Option<f64>,
        venue: &mut dyn ExecutionVenue,
    ) -> Result<OrderHandle, MachineError> {
        if let Some(p) = &self.pending {
            return Err(MachineError::ConcurrentOrder {
                pending: p.request.handle,
            });
        }
        let side = match intent {
            OrderIntent::Entry(s) => s.entry_side(),
            OrderIntent::Exit => self.position.side.exit_side(),
        };
        let Some(side) = side else {
            return Err(MachineError::NoPosition);
        };

        let mut request = OrderRequest {
            handle: OrderHandle(self.next_handle),
            side,
            size,
            order_type: quote.order_type,
            reference_price: quote.price,
            bar_index: quote.bar_index,
            intent,
        };
        let handle = venue.submit_order(&request)?;
        self.next_handle += 1;
        // Answers arrive under the venue's numbering.
        request.handle = handle;
        info!(
            handle = %handle,
            bar = quote.bar_index,
            side = ?request.side,
            size,
            price = quote.price,
            order_type = ?quote.order_type,
            intent = ?intent,
            "order created"
        );
        self.pending = Some(PendingOrder {
            request,
            originating_signal: signal,
            stop_seed,
        });
        Ok(handle)
    }

    /// Apply the venue's answer for the pending order. Returns the trade it
    /// closed, if any.
    pub fn on_notification(
        &mut self,
        note: &OrderNotification,
        executed_at: NaiveDateTime,
    ) -> Result<Option<TradeRecord>, MachineError> {
        let pending = match self.pending.take() {
            Some(p) if p.request.handle == note.handle => p,
            other => {
                self.pending = other;
                return Err(MachineError::UnknownOrder(note.handle));
            }
        };
        let req = &pending.request;

        if !note.status.is_filled() {
            self.failed_orders += 1;
            warn!(
                timestamp = %executed_at,
                handle = %note.handle,
                status = %note.status,
                side = ?req.side,
                price = req.reference_price,
                cost = req.reference_price * req.size,
                commission = note.commission,
                "order failed"
            );
            if matches!(self.queued, Some(FollowUp::Enter(_))) {
                self.queued = None;
            }
            return Ok(None);
        }

        self.account
            .apply_fill(req.side, note.fill_price, note.fill_size, note.commission);
        let label = match req.side {
            OrderSide::Buy => "BUY EXECUTED",
            OrderSide::Sell => "SELL EXECUTED",
        };
        info!(
            timestamp = %executed_at,
            handle = %note.handle,
            price = note.fill_price,
            cost = note.cost(),
            commission = note.commission,
            "{label}"
        );

        match req.intent {
            OrderIntent::Entry(side) => {
                let mut position =
                    Position::open(side, note.fill_size, note.fill_price, note.bar_index, note.commission);
                position.stop_price = pending.stop_seed;
                self.position = position;
                self.entry_time = Some(executed_at);
                Ok(None)
            }
            OrderIntent::Exit => {
                let reason = self.exit_reason(&pending.originating_signal);
                Ok(Some(self.book_exit(note, executed_at, reason)))
            }
        }
    }

    fn exit_reason(&self, signal: &Signal) -> ExitReason {
        match signal.source {
            SignalSource::StopBreach => ExitReason::StopBreached,
            SignalSource::Flatten => ExitReason::Flatten,
            SignalSource::Evaluator if signal.kind.entry_side().is_some() && self.reverse_on_opposite => {
                ExitReason::Reversal
            }
            SignalSource::Evaluator => ExitReason::Signal,
        }
    }

    fn book_exit(&mut self, note: &OrderNotification, executed_at: NaiveDateTime, reason: ExitReason) -> TradeRecord {
        let pos = &self.position;
        let size = note.fill_size.min(pos.size);
        let fraction = if pos.size > 0.0 { size / pos.size } else { 1.0 };
        let entry_commission = pos.entry_commission * fraction;

        let gross_pnl = (note.fill_price - pos.entry_price) * size * pos.side.sign();
        let commission = entry_commission + note.commission;
        let net_pnl = gross_pnl - commission;

        let trade = TradeRecord {
            side: pos.side,
            entry_bar: pos.entry_bar_index,
            entry_time: self.entry_time.unwrap_or(executed_at),
            entry_price: pos.entry_price,
            exit_bar: note.bar_index,
            exit_time: executed_at,
            exit_price: note.fill_price,
            size,
            gross_pnl,
            commission,
            net_pnl,
            exit_reason: reason,
        };
        info!(
            timestamp = %executed_at,
            gross = gross_pnl,
            net = net_pnl,
            reason = ?reason,
            "OPERATION RESULT"
        );

        self.account.realize(net_pnl);
        let remaining = pos.size - size;
        if remaining > 0.0 {
            self.position.size = remaining;
            self.position.entry_commission -= entry_commission;
        } else {
            self.position = Position::flat();
            self.entry_time = None;
        }
        self.trades.push(trade.clone());
        trade
    }
}
