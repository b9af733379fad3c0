//! State machine driven through the simulated broker, the way the engine
//! drives it: submit, poll on a later bar, apply the notification.

use chrono::{NaiveDate, NaiveDateTime};
use tradegate_core::domain::{Bar, ExitReason, OrderType, PositionSide};
use tradegate_core::machine::{FollowUp, MachineState, Quote, TradeMachine};
use tradegate_core::sizing::Sizer;
use tradegate_core::stop::StopSeed;
use tradegate_core::strategy::{Signal, SignalKind};
use tradegate_core::venue::{BrokerConfig, ExecutionVenue, SimulatedBroker};

fn bar(index: usize, close: f64) -> Bar {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    Bar {
        index,
        timestamp: start + chrono::Duration::days(index as i64),
        open: close,
        high: close + 1.0,
        low: close - 1.0,
        close,
        volume: 1_000.0,
    }
}

fn moc(bar_index: usize, price: f64) -> Quote {
    Quote {
        bar_index,
        price,
        order_type: OrderType::MarketOnClose,
        stop_seed: None,
    }
}

/// Poll the broker on `bar` and apply every notification.
fn settle(machine: &mut TradeMachine, broker: &mut SimulatedBroker, bar: &Bar) {
    for note in broker.poll(bar) {
        let at: NaiveDateTime = bar.timestamp;
        machine.on_notification(&note, at).unwrap();
    }
}

#[test]
fn long_round_trip_with_commission() {
    // 50 units at 100, out at 110, 0.1% commission each way.
    let mut broker = SimulatedBroker::new(&BrokerConfig::new(10_000.0, 0.001));
    let mut m = TradeMachine::new(10_000.0, Sizer::Fixed { units: 50.0 }, false);

    m.on_signal(Signal::new(SignalKind::EnterLong, 4), &moc(4, 100.0), &mut broker)
        .unwrap();
    assert_eq!(m.state(), MachineState::PendingEntry);
    settle(&mut m, &mut broker, &bar(5, 101.0));
    assert_eq!(m.state(), MachineState::Long);
    assert_eq!(m.position().entry_bar_index, 4);

    m.on_signal(Signal::new(SignalKind::Exit, 8), &moc(8, 110.0), &mut broker)
        .unwrap();
    assert_eq!(m.state(), MachineState::PendingExit);
    settle(&mut m, &mut broker, &bar(9, 111.0));

    assert_eq!(m.state(), MachineState::Flat);
    let trade = &m.trades()[0];
    assert_eq!((trade.entry_bar, trade.exit_bar), (4, 8));
    assert!((trade.gross_pnl - 500.0).abs() < 1e-9);
    assert!((trade.commission - 10.5).abs() < 1e-9);
    assert!((trade.net_pnl - 489.5).abs() < 1e-9);

    let summary = m.account().summary(m.account().cash());
    assert!((summary.final_equity - 10_489.5).abs() < 1e-9);
    assert!((summary.pct_return - 4.895).abs() < 1e-9);
    // The machine's ledger and the broker's agree.
    assert!((m.account().cash() - broker.cash()).abs() < 1e-9);
}

#[test]
fn margin_call_returns_to_flat_and_frees_the_slot() {
    let mut broker = SimulatedBroker::new(&BrokerConfig::new(1_000.0, 0.0));
    // Machine believes it has more cash than the broker does.
    let mut m = TradeMachine::new(10_000.0, Sizer::Fixed { units: 50.0 }, false);

    m.on_signal(Signal::new(SignalKind::EnterLong, 0), &moc(0, 100.0), &mut broker)
        .unwrap();
    settle(&mut m, &mut broker, &bar(1, 100.0));
    assert_eq!(m.state(), MachineState::Flat);
    assert_eq!(m.failed_orders(), 1);
    assert!(m.trades().is_empty());

    let next = m
        .on_signal(Signal::new(SignalKind::EnterLong, 1), &moc(1, 10.0), &mut broker)
        .unwrap();
    assert!(next.is_some());
}

#[test]
fn entry_installs_seeded_stop_and_exit_clears_it() {
    let mut broker = SimulatedBroker::new(&BrokerConfig::new(10_000.0, 0.0));
    let mut m = TradeMachine::new(10_000.0, Sizer::Fixed { units: 1.0 }, false);
    let quote = Quote {
        stop_seed: Some(StopSeed {
            reference: 100.0,
            distance: 4.5,
        }),
        ..moc(0, 100.0)
    };

    m.on_signal(Signal::new(SignalKind::EnterLong, 0), &quote, &mut broker)
        .unwrap();
    settle(&mut m, &mut broker, &bar(1, 100.0));
    assert_eq!(m.position().stop_price, Some(95.5));

    m.set_stop(Some(97.0));
    m.on_signal(Signal::new(SignalKind::Exit, 1), &moc(1, 100.0), &mut broker)
        .unwrap();
    settle(&mut m, &mut broker, &bar(2, 100.0));
    assert_eq!(m.state(), MachineState::Flat);
    assert_eq!(m.position().stop_price, None);
}

#[test]
fn short_entry_stop_sits_above_price() {
    let mut broker = SimulatedBroker::new(&BrokerConfig::new(10_000.0, 0.0));
    let mut m = TradeMachine::new(10_000.0, Sizer::Fixed { units: 1.0 }, false);
    let quote = Quote {
        stop_seed: Some(StopSeed {
            reference: 50.0,
            distance: 2.0,
        }),
        ..moc(0, 50.0)
    };
    m.on_signal(Signal::new(SignalKind::EnterShort, 0), &quote, &mut broker)
        .unwrap();
    settle(&mut m, &mut broker, &bar(1, 50.0));
    assert_eq!(m.state(), MachineState::Short);
    assert_eq!(m.position().side, PositionSide::Short);
    assert_eq!(m.position().stop_price, Some(52.0));
}

#[test]
fn reversal_runs_exit_then_entry() {
    let mut broker = SimulatedBroker::new(&BrokerConfig::new(10_000.0, 0.0));
    let mut m = TradeMachine::new(10_000.0, Sizer::Fixed { units: 10.0 }, true);

    m.on_signal(Signal::new(SignalKind::EnterLong, 0), &moc(0, 100.0), &mut broker)
        .unwrap();
    settle(&mut m, &mut broker, &bar(1, 100.0));

    m.on_signal(Signal::new(SignalKind::EnterShort, 1), &moc(1, 90.0), &mut broker)
        .unwrap();
    assert_eq!(m.queued(), Some(FollowUp::Enter(PositionSide::Short)));
    settle(&mut m, &mut broker, &bar(2, 90.0));
    assert_eq!(m.state(), MachineState::Flat);
    assert_eq!(m.trades()[0].exit_reason, ExitReason::Reversal);

    m.poll_queued(&moc(2, 90.0), &mut broker).unwrap();
    assert_eq!(m.state(), MachineState::PendingEntry);
    settle(&mut m, &mut broker, &bar(3, 88.0));
    assert_eq!(m.state(), MachineState::Short);
    assert_eq!(m.queued(), None);
}

#[test]
fn rejected_exit_drops_queued_reversal() {
    let config = BrokerConfig {
        reject_rate: 1.0,
        ..BrokerConfig::new(10_000.0, 0.0)
    };
    let mut good = SimulatedBroker::new(&BrokerConfig::new(10_000.0, 0.0));
    let mut m = TradeMachine::new(10_000.0, Sizer::Fixed { units: 10.0 }, true);
    m.on_signal(Signal::new(SignalKind::EnterLong, 0), &moc(0, 100.0), &mut good)
        .unwrap();
    settle(&mut m, &mut good, &bar(1, 100.0));

    let mut rejecting = SimulatedBroker::new(&config);
    m.on_signal(Signal::new(SignalKind::EnterShort, 1), &moc(1, 90.0), &mut rejecting)
        .unwrap();
    settle(&mut m, &mut rejecting, &bar(2, 90.0));

    assert_eq!(m.state(), MachineState::Long);
    assert_eq!(m.queued(), None);
    assert_eq!(m.failed_orders(), 1);
}

#[test]
fn broker_refuses_a_second_order_in_flight() {
    let mut broker = SimulatedBroker::new(&BrokerConfig::new(10_000.0, 0.0));
    let mut m1 = TradeMachine::new(10_000.0, Sizer::Fixed { units: 1.0 }, false);
    let mut m2 = TradeMachine::new(10_000.0, Sizer::Fixed { units: 1.0 }, false);
    m1.on_signal(Signal::new(SignalKind::EnterLong, 0), &moc(0, 10.0), &mut broker)
        .unwrap();
    // A second machine sharing the venue is refused rather than double-booked.
    let err = m2
        .on_signal(Signal::new(SignalKind::EnterLong, 0), &moc(0, 10.0), &mut broker)
        .unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(m2.state(), MachineState::Flat);
}
