//! Execution venue boundary and the simulated broker.
//!
//! Submission never blocks and never fills inline: the venue answers each
//! order with exactly one `OrderNotification`, delivered by a later `poll`.

use crate::domain::{Bar, OrderHandle, OrderIntent, OrderNotification, OrderRequest, OrderSide, OrderStatus, OrderType};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum VenueError {
    #[error("order {pending} is still in flight; refusing {rejected}")]
    OrderInFlight {
        pending: OrderHandle,
        rejected: OrderHandle,
    },
}

/// Where orders go and where their outcomes come from.
pub trait ExecutionVenue: Send {
    /// Accept an order for later execution.
    fn submit_order(&mut self, request: &OrderRequest) -> Result<OrderHandle, VenueError>;

    /// Deliver notifications for orders resolved as of `bar`.
    fn poll(&mut self, bar: &Bar) -> Vec<OrderNotification>;
}

/// Simulated broker settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerConfig {
    pub initial_cash: f64,
    /// Fraction of traded value, e.g. 0.001 for 0.1%.
    pub commission_rate: f64,
    /// Probability in [0, 1] of rejecting an order outright.
    #[serde(default)]
    pub reject_rate: f64,
    #[serde(default)]
    pub seed: u64,
}

impl BrokerConfig {
    pub fn new(initial_cash: f64, commission_rate: f64) -> Self {
        Self {
            initial_cash,
            commission_rate,
            reject_rate: 0.0,
            seed: 0,
        }
    }
}

/// Single-instrument paper broker.
///
/// Market-on-close orders fill at the reference price (the signal bar's
/// close) and report that bar's index. Market-on-open orders fill at the
/// open of the bar being polled.
#[derive(Debug)]
pub struct SimulatedBroker {
    cash: f64,
    commission_rate: f64,
    reject_rate: f64,
    rng: StdRng,
    pending: Option<OrderRequest>,
}

impl SimulatedBroker {
    pub fn new(config: &BrokerConfig) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(config.seed))
    }

    pub fn with_rng(config: &BrokerConfig, rng: StdRng) -> Self {
        Self {
            cash: config.initial_cash,
            commission_rate: config.commission_rate,
            reject_rate: config.reject_rate.clamp(0.0, 1.0),
            rng,
            pending: None,
        }
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn commission(&self, price: f64, size: f64) -> f64 {
        self.commission_rate * price * size
    }

    fn execute(&mut self, req: OrderRequest, bar: &Bar) -> OrderNotification {
        let (price, fill_bar) = match req.order_type {
            OrderType::MarketOnClose => (req.reference_price, req.bar_index),
            OrderType::MarketOnOpen => (bar.open, bar.index),
        };

        if !(req.size.is_finite() && req.size > 0.0) {
            return OrderNotification::failed(req.handle, OrderStatus::Rejected, fill_bar);
        }
        if !(price.is_finite() && price > 0.0) {
            return OrderNotification::failed(req.handle, OrderStatus::Canceled, fill_bar);
        }
        if self.reject_rate > 0.0 && self.rng.gen::<f64>() < self.reject_rate {
            debug!(handle = %req.handle, "fault injection rejected order");
            return OrderNotification::failed(req.handle, OrderStatus::Rejected, fill_bar);
        }

        let cost = price * req.size;
        let commission = self.commission(price, req.size);
        if matches!(req.intent, OrderIntent::Entry(_)) && cost + commission > self.cash {
            warn!(
                handle = %req.handle,
                cost,
                commission,
                cash = self.cash,
                "insufficient cash for entry"
            );
            return OrderNotification::failed(req.handle, OrderStatus::MarginCalled, fill_bar);
        }

        match req.side {
            OrderSide::Buy => self.cash -= cost + commission,
            OrderSide::Sell => self.cash += cost - commission,
        }
        OrderNotification::filled(req.handle, price, req.size, commission, fill_bar)
    }
}

impl ExecutionVenue for SimulatedBroker {
    fn submit_order(&mut self, request: &OrderRequest) -> Result<OrderHandle, VenueError> {
        if let Some(pending) = &self.pending {
            return Err(VenueError::OrderInFlight {
                pending: pending.handle,
                rejected: request.handle,
            });
        }
        self.pending = Some(request.clone());
        Ok(request.handle)
    }

    fn poll(&mut self, bar: &Bar) -> Vec<OrderNotification> {
        match self.pending.take() {
            Some(req) => vec![self.execute(req, bar)],
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::bar::make_bars;
    use crate::domain::PositionSide;

    fn request(handle: u64, side: OrderSide, size: f64, order_type: OrderType, price: f64, intent: OrderIntent) -> OrderRequest {
        OrderRequest {
            handle: OrderHandle(handle),
            side,
            size,
            order_type,
            reference_price: price,
            bar_index: 0,
            intent,
        }
    }

    fn entry(handle: u64, size: f64, order_type: OrderType, price: f64) -> OrderRequest {
        request(handle, OrderSide::Buy, size, order_type, price, OrderIntent::Entry(PositionSide::Long))
    }

    #[test]
    fn moc_fills_at_signal_close_on_next_poll() {
        let bars = make_bars(&[100.0, 105.0]);
        let mut broker = SimulatedBroker::new(&BrokerConfig::new(10_000.0, 0.001));
        broker.submit_order(&entry(1, 50.0, OrderType::MarketOnClose, 100.0)).unwrap();
        let notes = broker.poll(&bars[1]);
        assert_eq!(notes.len(), 1);
        let n = &notes[0];
        assert_eq!(n.status, OrderStatus::Filled);
        assert_eq!(n.fill_price, 100.0);
        assert_eq!(n.bar_index, 0);
        assert!((n.commission - 5.0).abs() < 1e-9);
        assert!((broker.cash() - 4_995.0).abs() < 1e-9);
        assert!(broker.poll(&bars[1]).is_empty());
    }

    #[test]
    fn moo_fills_at_polled_open() {
        let bars = make_bars(&[100.0, 105.0]);
        let mut broker = SimulatedBroker::new(&BrokerConfig::new(10_000.0, 0.0));
        broker.submit_order(&entry(1, 10.0, OrderType::MarketOnOpen, 0.0)).unwrap();
        let n = broker.poll(&bars[1]).remove(0);
        // make_bars opens each bar at the previous close.
        assert_eq!(n.fill_price, 100.0);
        assert_eq!(n.bar_index, 1);
    }

    #[test]
    fn second_order_is_refused() {
        let mut broker = SimulatedBroker::new(&BrokerConfig::new(10_000.0, 0.0));
        broker.submit_order(&entry(1, 1.0, OrderType::MarketOnClose, 100.0)).unwrap();
        let err = broker.submit_order(&entry(2, 1.0, OrderType::MarketOnClose, 100.0)).unwrap_err();
        assert_eq!(
            err,
            VenueError::OrderInFlight {
                pending: OrderHandle(1),
                rejected: OrderHandle(2)
            }
        );
    }

    #[test]
    fn entry_beyond_cash_is_margin_called() {
        let bars = make_bars(&[100.0]);
        let mut broker = SimulatedBroker::new(&BrokerConfig::new(1_000.0, 0.001));
        broker.submit_order(&entry(1, 10.0, OrderType::MarketOnClose, 100.0)).unwrap();
        let n = broker.poll(&bars[0]).remove(0);
        assert_eq!(n.status, OrderStatus::MarginCalled);
        assert_eq!(broker.cash(), 1_000.0);
    }

    #[test]
    fn zero_size_is_rejected() {
        let bars = make_bars(&[100.0]);
        let mut broker = SimulatedBroker::new(&BrokerConfig::new(1_000.0, 0.0));
        broker.submit_order(&entry(1, 0.0, OrderType::MarketOnClose, 100.0)).unwrap();
        assert_eq!(broker.poll(&bars[0])[0].status, OrderStatus::Rejected);
    }

    #[test]
    fn exits_are_not_cash_checked() {
        let bars = make_bars(&[100.0]);
        let mut broker = SimulatedBroker::new(&BrokerConfig::new(0.0, 0.0));
        let req = request(1, OrderSide::Sell, 10.0, OrderType::MarketOnClose, 100.0, OrderIntent::Exit);
        broker.submit_order(&req).unwrap();
        assert!(broker.poll(&bars[0])[0].status.is_filled());
        assert_eq!(broker.cash(), 1_000.0);
    }

    #[test]
    fn full_reject_rate_rejects_everything() {
        let bars = make_bars(&[100.0]);
        let mut config = BrokerConfig::new(10_000.0, 0.0);
        config.reject_rate = 1.0;
        let mut broker = SimulatedBroker::new(&config);
        for h in 0..5 {
            broker.submit_order(&entry(h, 1.0, OrderType::MarketOnClose, 100.0)).unwrap();
            assert_eq!(broker.poll(&bars[0])[0].status, OrderStatus::Rejected);
        }
    }
}
