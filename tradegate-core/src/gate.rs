//! Confirmation gate: forwards a raw signal only after it has persisted.
//!
//! The gate counts consecutive bars carrying the same non-hold signal kind.
//! A change of kind restarts the count at one; `Hold` resets it to zero. A
//! signal is forwarded once the count reaches `confirmation_bars`, unless a
//! cooldown started by the last acted-on signal is still running.
//!
//! Each `SignalKind` has its own count: `Exit` and `EnterShort` are
//! separate kinds even though both are bearish while long.

use crate::domain::Bar;
use crate::strategy::{Signal, SignalKind};
use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Quiet period after an order is issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cooldown {
    Bars(usize),
    Seconds(i64),
}

/// Fields missing from a `[gate]` table fall back to 48-bar persistence and
/// a two-day cooldown. Use `cooldown = { bars = 0 }` to disable the cooldown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateConfig {
    #[serde(default = "default_confirmation")]
    pub confirmation_bars: usize,
    #[serde(default = "default_cooldown")]
    pub cooldown: Option<Cooldown>,
}

fn default_confirmation() -> usize {
    48
}

fn default_cooldown() -> Option<Cooldown> {
    Some(Cooldown::Seconds(2 * 24 * 60 * 60))
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            confirmation_bars: default_confirmation(),
            cooldown: default_cooldown(),
        }
    }
}

impl GateConfig {
    /// 48-bar persistence and a two-day cooldown.
    pub fn live_momentum() -> Self {
        Self::default()
    }

    /// Forward every non-hold signal on its first bar, no cooldown.
    pub fn pass_through() -> Self {
        Self {
            confirmation_bars: 1,
            cooldown: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct LastAction {
    bar_index: usize,
    timestamp: NaiveDateTime,
}

#[derive(Debug, Clone)]
pub struct ConfirmationGate {
    config: GateConfig,
    current: Option<SignalKind>,
    count: usize,
    last_action: Option<LastAction>,
}

impl ConfirmationGate {
    pub fn new(config: GateConfig) -> Self {
        Self {
            config,
            current: None,
            count: 0,
            last_action: None,
        }
    }

    /// Gate that forwards every non-hold signal immediately.
    pub fn pass_through() -> Self {
        Self::new(GateConfig::pass_through())
    }

    /// Consecutive bars the current signal kind has held.
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Feed the raw signal of `bar`. Returns it when confirmed and outside
    /// any cooldown.
    pub fn observe(&mut self, signal: Signal, bar: &Bar) -> Option<Signal> {
        if signal.kind == SignalKind::Hold {
            self.current = None;
            self.count = 0;
            return None;
        }

        if self.current == Some(signal.kind) {
            self.count += 1;
        } else {
            self.current = Some(signal.kind);
            self.count = 1;
        }

        if self.count < self.config.confirmation_bars {
            return None;
        }
        if self.in_cooldown(bar) {
            debug!(
                bar = bar.index,
                signal = ?signal.kind,
                "confirmed signal suppressed by cooldown"
            );
            return None;
        }
        Some(signal)
    }

    /// Record that a forwarded signal produced an order on `bar`.
    pub fn acknowledge(&mut self, bar: &Bar) {
        self.last_action = Some(LastAction {
            bar_index: bar.index,
            timestamp: bar.timestamp,
        });
    }

    pub fn in_cooldown(&self, bar: &Bar) -> bool {
        let (Some(cooldown), Some(last)) = (self.config.cooldown, self.last_action) else {
            return false;
        };
        match cooldown {
            Cooldown::Bars(n) => bar.index < last.bar_index + n,
            Cooldown::Seconds(s) => bar.timestamp < last.timestamp + Duration::seconds(s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::bar::make_bars;

    fn kinds(gate: &mut ConfirmationGate, seq: &[SignalKind]) -> Vec<Option<SignalKind>> {
        let bars = make_bars(&vec![100.0; seq.len()]);
        seq.iter()
            .zip(&bars)
            .map(|(&k, bar)| gate.observe(Signal::new(k, bar.index), bar).map(|s| s.kind))
            .collect()
    }

    #[test]
    fn pass_through_forwards_non_hold() {
        let mut gate = ConfirmationGate::pass_through();
        let out = kinds(&mut gate, &[SignalKind::Hold, SignalKind::EnterLong, SignalKind::Exit]);
        assert_eq!(out, vec![None, Some(SignalKind::EnterLong), Some(SignalKind::Exit)]);
    }

    #[test]
    fn forwards_after_persistence() {
        let mut gate = ConfirmationGate::new(GateConfig {
            confirmation_bars: 3,
            cooldown: None,
        });
        let out = kinds(&mut gate, &[SignalKind::EnterLong; 4]);
        assert_eq!(out, vec![None, None, Some(SignalKind::EnterLong), Some(SignalKind::EnterLong)]);
        assert_eq!(gate.count(), 4);
    }

    #[test]
    fn hold_resets_count() {
        let mut gate = ConfirmationGate::new(GateConfig {
            confirmation_bars: 2,
            cooldown: None,
        });
        let out = kinds(
            &mut gate,
            &[SignalKind::EnterLong, SignalKind::Hold, SignalKind::EnterLong, SignalKind::EnterLong],
        );
        assert_eq!(out, vec![None, None, None, Some(SignalKind::EnterLong)]);
    }

    #[test]
    fn flicker_never_confirms() {
        let mut gate = ConfirmationGate::new(GateConfig {
            confirmation_bars: 2,
            cooldown: None,
        });
        let seq: Vec<SignalKind> = (0..50)
            .map(|i| if i % 2 == 0 { SignalKind::EnterLong } else { SignalKind::EnterShort })
            .collect();
        assert!(kinds(&mut gate, &seq).iter().all(Option::is_none));
        assert_eq!(gate.count(), 1);
    }

    #[test]
    fn exit_and_enter_short_count_separately() {
        let mut gate = ConfirmationGate::new(GateConfig {
            confirmation_bars: 2,
            cooldown: None,
        });
        let out = kinds(
            &mut gate,
            &[SignalKind::Exit, SignalKind::EnterShort, SignalKind::EnterShort],
        );
        assert_eq!(out, vec![None, None, Some(SignalKind::EnterShort)]);
        assert_eq!(gate.count(), 2);
    }

    #[test]
    fn bar_cooldown_suppresses_then_releases() {
        let mut gate = ConfirmationGate::new(GateConfig {
            confirmation_bars: 1,
            cooldown: Some(Cooldown::Bars(3)),
        });
        let bars = make_bars(&[1.0; 6]);
        let long = |i: usize| Signal::new(SignalKind::EnterLong, i);
        assert!(gate.observe(long(0), &bars[0]).is_some());
        gate.acknowledge(&bars[0]);
        assert!(gate.observe(long(1), &bars[1]).is_none());
        assert!(gate.observe(long(2), &bars[2]).is_none());
        assert!(gate.observe(long(3), &bars[3]).is_some());
    }

    #[test]
    fn seconds_cooldown_uses_timestamps() {
        // make_bars spaces bars one hour apart.
        let mut gate = ConfirmationGate::new(GateConfig {
            confirmation_bars: 1,
            cooldown: Some(Cooldown::Seconds(2 * 3600)),
        });
        let bars = make_bars(&[1.0; 4]);
        gate.acknowledge(&bars[0]);
        assert!(gate.in_cooldown(&bars[1]));
        assert!(!gate.in_cooldown(&bars[2]));
    }

    #[test]
    fn cooldown_config_from_toml() {
        let cfg: GateConfig = toml::from_str("confirmation_bars = 48\ncooldown = { seconds = 172800 }\n").unwrap();
        assert_eq!(cfg, GateConfig::live_momentum());
    }

    #[test]
    fn partial_toml_keeps_default_persistence() {
        let cfg: GateConfig = toml::from_str("cooldown = { seconds = 3600 }\n").unwrap();
        assert_eq!(cfg.confirmation_bars, 48);
        assert_eq!(cfg.cooldown, Some(Cooldown::Seconds(3600)));

        let cfg: GateConfig = toml::from_str("confirmation_bars = 5\n").unwrap();
        assert_eq!(cfg.cooldown, Some(Cooldown::Seconds(172_800)));
    }

    #[test]
    fn zero_bar_cooldown_never_suppresses() {
        let mut gate = ConfirmationGate::new(GateConfig {
            confirmation_bars: 1,
            cooldown: Some(Cooldown::Bars(0)),
        });
        let bars = make_bars(&[1.0; 2]);
        gate.acknowledge(&bars[0]);
        assert!(!gate.in_cooldown(&bars[0]));
        assert!(gate.observe(Signal::new(SignalKind::EnterLong, 1), &bars[1]).is_some());
    }
}
