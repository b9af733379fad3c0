//! Order requests and execution notifications.
//!
//! An `OrderRequest` is what the state machine hands to the execution venue.
//! An `OrderNotification` is the venue's terminal answer for that request,
//! delivered later and matched back by `OrderHandle`.

use super::position::PositionSide;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque handle identifying one submitted order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderHandle(pub u64);

impl fmt::Display for OrderHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// +1 for buys, -1 for sells.
    pub fn sign(self) -> f64 {
        match self {
            OrderSide::Buy => 1.0,
            OrderSide::Sell => -1.0,
        }
    }
}

/// When the order executes relative to the bar that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    /// Fill at the close of the signal bar.
    MarketOnClose,
    /// Fill at the open of the bar being processed.
    MarketOnOpen,
}

/// What the order is for, from the state machine's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderIntent {
    Entry(PositionSide),
    Exit,
}

/// An order handed to the execution venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub handle: OrderHandle,
    pub side: OrderSide,
    pub size: f64,
    pub order_type: OrderType,
    /// Close of the signal bar for MOC orders, open of the execution bar for MOO.
    pub reference_price: f64,
    /// Bar the decision was made on.
    pub bar_index: usize,
    pub intent: OrderIntent,
}

/// Terminal order states reported by the venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Filled,
    Canceled,
    Rejected,
    MarginCalled,
}

impl OrderStatus {
    pub fn is_filled(self) -> bool {
        matches!(self, OrderStatus::Filled)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderStatus::Filled => "filled",
            OrderStatus::Canceled => "canceled",
            OrderStatus::Rejected => "rejected",
            OrderStatus::MarginCalled => "margin_called",
        };
        f.write_str(s)
    }
}

/// Asynchronous answer from the venue for one order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderNotification {
    pub handle: OrderHandle,
    pub status: OrderStatus,
    pub fill_price: f64,
    pub fill_size: f64,
    pub commission: f64,
    /// Bar whose price the fill used.
    pub bar_index: usize,
}

impl OrderNotification {
    pub fn filled(
        handle: OrderHandle,
        fill_price: f64,
        fill_size: f64,
        commission: f64,
        bar_index: usize,
    ) -> Self {
        Self {
            handle,
            status: OrderStatus::Filled,
            fill_price,
            fill_size,
            commission,
            bar_index,
        }
    }

    /// A non-fill answer (canceled, rejected, margin called).
    pub fn failed(handle: OrderHandle, status: OrderStatus, bar_index: usize) -> Self {
        debug_assert!(!status.is_filled());
        Self {
            handle,
            status,
            fill_price: 0.0,
            fill_size: 0.0,
            commission: 0.0,
            bar_index,
        }
    }

    /// Executed value (price × size).
    pub fn cost(&self) -> f64 {
        self.fill_price * self.fill_size
    }
}
