//! Domain types: bars, orders, notifications, positions, trades.

pub mod bar;
pub mod order;
pub mod position;
pub mod trade;

pub use bar::Bar;
pub use order::{
    OrderHandle, OrderIntent, OrderNotification, OrderRequest, OrderSide, OrderStatus, OrderType,
};
pub use position::{Position, PositionSide};
pub use trade::{ExitReason, TradeRecord};
