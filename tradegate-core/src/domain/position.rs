use serde::{Deserialize, Serialize};

use super::order::OrderSide;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionSide {
    Flat,
    Long,
    Short,
}

impl PositionSide {
    /// +1 long, -1 short, 0 flat.
    pub fn sign(self) -> f64 {
        match self {
            PositionSide::Long => 1.0,
            PositionSide::Short => -1.0,
            PositionSide::Flat => 0.0,
        }
    }

    /// Order side that opens a position on this side.
    pub fn entry_side(self) -> Option<OrderSide> {
        match self {
            PositionSide::Long => Some(OrderSide::Buy),
            PositionSide::Short => Some(OrderSide::Sell),
            PositionSide::Flat => None,
        }
    }

    /// Order side that closes a position on this side.
    pub fn exit_side(self) -> Option<OrderSide> {
        match self {
            PositionSide::Long => Some(OrderSide::Sell),
            PositionSide::Short => Some(OrderSide::Buy),
            PositionSide::Flat => None,
        }
    }
}

/// The single position held by one state machine.
///
/// Mutated only on confirmed fills. A flat position never carries a stop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub side: PositionSide,
    /// Always non-negative; direction lives in `side`.
    pub size: f64,
    pub entry_price: f64,
    pub entry_bar_index: usize,
    /// Commission paid on the entry fill, not yet charged to a closed trade.
    pub entry_commission: f64,
    pub stop_price: Option<f64>,
}

impl Position {
    pub fn flat() -> Self {
        Self {
            side: PositionSide::Flat,
            size: 0.0,
            entry_price: 0.0,
            entry_bar_index: 0,
            entry_commission: 0.0,
            stop_price: None,
        }
    }

    pub fn open(
        side: PositionSide,
        size: f64,
        entry_price: f64,
        entry_bar_index: usize,
        entry_commission: f64,
    ) -> Self {
        debug_assert!(side != PositionSide::Flat);
        Self {
            side,
            size,
            entry_price,
            entry_bar_index,
            entry_commission,
            stop_price: None,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.side == PositionSide::Flat
    }

    /// Signed quantity: positive long, negative short.
    pub fn signed_size(&self) -> f64 {
        self.side.sign() * self.size
    }

    pub fn market_value(&self, price: f64) -> f64 {
        self.signed_size() * price
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.signed_size() * (price - self.entry_price)
    }

    pub fn bars_held(&self, bar_index: usize) -> usize {
        bar_index.saturating_sub(self.entry_bar_index)
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::flat()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_position_has_no_stop() {
        let pos = Position::flat();
        assert!(pos.is_flat());
        assert_eq!(pos.stop_price, None);
        assert_eq!(pos.market_value(100.0), 0.0);
    }

    #[test]
    fn long_pnl() {
        let pos = Position::open(PositionSide::Long, 50.0, 100.0, 3, 5.0);
        assert_eq!(pos.unrealized_pnl(110.0), 500.0);
        assert_eq!(pos.market_value(110.0), 5500.0);
        assert_eq!(pos.bars_held(8), 5);
    }

    #[test]
    fn short_pnl() {
        let pos = Position::open(PositionSide::Short, 10.0, 100.0, 0, 0.0);
        assert_eq!(pos.unrealized_pnl(90.0), 100.0);
        assert_eq!(pos.market_value(90.0), -900.0);
    }

    #[test]
    fn sides() {
        assert_eq!(PositionSide::Long.entry_side(), Some(OrderSide::Buy));
        assert_eq!(PositionSide::Long.exit_side(), Some(OrderSide::Sell));
        assert_eq!(PositionSide::Short.entry_side(), Some(OrderSide::Sell));
        assert_eq!(PositionSide::Flat.exit_side(), None);
    }
}
