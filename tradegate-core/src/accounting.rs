//! Cash, realized P&L and equity history for one instrument.

use crate::domain::{OrderSide, Position};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
pub struct Account {
    initial_cash: f64,
    cash: f64,
    realized_pnl: f64,
    commission_paid: f64,
    equity_history: Vec<f64>,
}

impl Account {
    pub fn new(initial_cash: f64) -> Self {
        Self {
            initial_cash,
            cash: initial_cash,
            realized_pnl: 0.0,
            commission_paid: 0.0,
            equity_history: Vec::new(),
        }
    }

    /// Cash moves by the traded notional and the commission.
    pub fn apply_fill(&mut self, side: OrderSide, price: f64, size: f64, commission: f64) {
        match side {
            OrderSide::Buy => self.cash -= price * size,
            OrderSide::Sell => self.cash += price * size,
        }
        self.cash -= commission;
        self.commission_paid += commission;
    }

    /// Book the net result of a closed trade.
    pub fn realize(&mut self, net_pnl: f64) {
        self.realized_pnl += net_pnl;
    }

    /// Cash plus the mark-to-market value of `position` at `price`.
    pub fn equity(&self, position: &Position, price: f64) -> f64 {
        self.cash + position.market_value(price)
    }

    pub fn record_equity(&mut self, equity: f64) {
        self.equity_history.push(equity);
    }

    pub fn initial_cash(&self) -> f64 {
        self.initial_cash
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn realized_pnl(&self) -> f64 {
        self.realized_pnl
    }

    pub fn commission_paid(&self) -> f64 {
        self.commission_paid
    }

    pub fn equity_history(&self) -> &[f64] {
        &self.equity_history
    }

    pub fn summary(&self, final_equity: f64) -> AccountSummary {
        AccountSummary::new(self.initial_cash, final_equity)
    }
}

/// Start and end of a session's equity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccountSummary {
    pub initial_cash: f64,
    pub final_equity: f64,
    /// Percent, e.g. 4.895 for +4.895%.
    pub pct_return: f64,
}

impl AccountSummary {
    pub fn new(initial_cash: f64, final_equity: f64) -> Self {
        let pct_return = if initial_cash > 0.0 {
            (final_equity - initial_cash) / initial_cash * 100.0
        } else {
            0.0
        };
        Self {
            initial_cash,
            final_equity,
            pct_return,
        }
    }
}
