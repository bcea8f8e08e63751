//! Shared fixtures for integration tests.
//!
//! Builds a [`FanManager`] on the simulation backend and keeps clones of
//! every simulated device so tests can assert on line levels, ownership
//! and PWM outputs after the manager has taken its own copies.

use rpifan::adapters::sim::{SimGpio, SimPwmBus, SimPwmChip};
use rpifan::app::events::FanEvent;
use rpifan::app::ports::EventSink;
use rpifan::{BoardConfig, FanManager};

// ── Recording sink ────────────────────────────────────────────

/// Event sink that keeps every event in order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub events: Vec<FanEvent>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, event: &FanEvent) -> bool {
        self.events.contains(event)
    }

    pub fn count(&self, pred: impl Fn(&FanEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &FanEvent) {
        self.events.push(event.clone());
    }
}

// ── Rig ───────────────────────────────────────────────────────

pub type SimFan = FanManager<SimGpio, SimPwmBus, RecordingSink>;

/// A manager plus handles on the simulated hardware behind it.
pub struct Rig {
    pub fan: SimFan,
    pub gpio: SimGpio,
    pub bus: SimPwmBus,
    pub chip: SimPwmChip,
}

#[allow(dead_code)]
impl Rig {
    /// Default board, not initialised.
    pub fn new() -> Self {
        Self::with_board(&BoardConfig::default())
    }

    pub fn with_board(board: &BoardConfig) -> Self {
        let gpio = SimGpio::new();
        let bus = SimPwmBus::new();
        let labels: Vec<&str> = board.pwm_channels.iter().map(|c| c.label.as_str()).collect();
        let chip = SimPwmChip::new(&board.device_label, &labels);
        let fan = FanManager::new(board, gpio.clone(), bus.clone(), RecordingSink::new());
        Self { fan, gpio, bus, chip }
    }

    /// Initialised, PWM not probed.
    pub fn started() -> Self {
        let mut rig = Self::new();
        rig.fan.initialize().expect("initialize");
        rig
    }

    /// Initialised with every channel attached.
    pub fn probed() -> Self {
        let mut rig = Self::started();
        rig.probe().expect("probe");
        rig
    }

    pub fn probe(&mut self) -> rpifan::error::Result<usize> {
        self.fan.probe(&mut self.chip)
    }

    pub fn events(&self) -> &[FanEvent] {
        &self.fan.sink().events
    }
}
