//! Order sizing.

use serde::{Deserialize, Serialize};

/// How many units an entry order asks for.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Sizer {
    /// Constant unit count.
    Fixed { units: f64 },
    /// Whole units affordable with all available cash.
    AllIn,
    /// Notional value divided by price.
    FixedValue { value: f64 },
}

impl Default for Sizer {
    fn default() -> Self {
        Sizer::Fixed { units: 1.0 }
    }
}

impl Sizer {
    /// Units to request at `price` with `cash` available. Zero when the
    /// price is unusable or nothing is affordable.
    pub fn size(&self, cash: f64, price: f64) -> f64 {
        if !(price.is_finite() && price > 0.0) {
            return 0.0;
        }
        let size = match *self {
            Sizer::Fixed { units } => units,
            Sizer::AllIn => (cash / price).floor(),
            Sizer::FixedValue { value } => value / price,
        };
        if size.is_finite() && size > 0.0 {
            size
        } else {
            0.0
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        match *self {
            Sizer::Fixed { units } if !(units > 0.0) => Err(format!("fixed units must be > 0, got {units}")),
            Sizer::FixedValue { value } if !(value > 0.0) => {
                Err(format!("fixed value must be > 0, got {value}"))
            }
            _ => Ok(()),
        }
    }
}
