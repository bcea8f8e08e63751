//! In-memory simulation backend.
//!
//! Implements [`GpioPort`], [`PwmDevice`] and [`PwmBus`] without touching
//! any hardware.  Every handle shares its state with the adapter it came
//! from (`Rc<RefCell<..>>`), so a test can keep a clone of the adapter,
//! hand the other clone to the manager and still observe line levels,
//! ownership and applied PWM state.  Faults (busy lines, deferred probes,
//! vanished channels) can be injected at any time.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use embedded_hal::digital::{self, ErrorKind, ErrorType, OutputPin};
use log::debug;

use crate::app::ports::{GpioError, GpioPort, PwmBus, PwmChannel, PwmDevice, PwmError, PwmState};
use crate::pins::PinId;

// ── GPIO ──────────────────────────────────────────────────────

/// Recorded GPIO operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpioOp {
    Request(PinId),
    Drive(PinId, bool),
    Free(PinId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Owner {
    #[default]
    Free,
    Us,
    External,
}

#[derive(Default)]
struct GpioState {
    owner: HashMap<PinId, Owner>,
    high: HashSet<PinId>,
    broken: HashSet<PinId>,
    ops: Vec<GpioOp>,
}

impl GpioState {
    fn owner(&self, pin: PinId) -> Owner {
        self.owner.get(&pin).copied().unwrap_or_default()
    }
}

/// Simulated GPIO controller.
#[derive(Clone, Default)]
pub struct SimGpio {
    state: Rc<RefCell<GpioState>>,
}

impl SimGpio {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `pin` as owned by some other consumer.
    pub fn claim_externally(&self, pin: PinId) {
        self.state.borrow_mut().owner.insert(pin, Owner::External);
    }

    /// Undo [`claim_externally`](Self::claim_externally).
    pub fn release_externally(&self, pin: PinId) {
        let mut s = self.state.borrow_mut();
        if s.owner(pin) == Owner::External {
            s.owner.insert(pin, Owner::Free);
        }
    }

    /// Make every drive of `pin` fail from now on.
    pub fn break_line(&self, pin: PinId) {
        self.state.borrow_mut().broken.insert(pin);
    }

    pub fn is_high(&self, pin: PinId) -> bool {
        self.state.borrow().high.contains(&pin)
    }

    /// Pins currently owned through this adapter, ascending.
    pub fn owned_pins(&self) -> Vec<PinId> {
        let s = self.state.borrow();
        let mut pins: Vec<PinId> = s
            .owner
            .iter()
            .filter(|&(_, &o)| o == Owner::Us)
            .map(|(&p, _)| p)
            .collect();
        pins.sort_unstable();
        pins
    }

    pub fn ops(&self) -> Vec<GpioOp> {
        self.state.borrow().ops.clone()
    }

    pub fn clear_ops(&self) {
        self.state.borrow_mut().ops.clear();
    }
}

impl GpioPort for SimGpio {
    type Line = SimLine;

    fn request(&mut self, pin: PinId, label: &str) -> Result<SimLine, GpioError> {
        let mut s = self.state.borrow_mut();
        if pin >= 32 {
            return Err(GpioError::Rejected);
        }
        if s.owner(pin) != Owner::Free {
            return Err(GpioError::Busy);
        }
        s.owner.insert(pin, Owner::Us);
        s.ops.push(GpioOp::Request(pin));
        debug!("sim: GPIO_{} requested by '{}'", pin, label);
        Ok(SimLine {
            pin,
            state: Rc::clone(&self.state),
        })
    }

    fn free(&mut self, line: SimLine) {
        let mut s = self.state.borrow_mut();
        s.owner.insert(line.pin, Owner::Free);
        s.ops.push(GpioOp::Free(line.pin));
    }
}

/// Acquired simulated line.
pub struct SimLine {
    pin: PinId,
    state: Rc<RefCell<GpioState>>,
}

impl SimLine {
    fn drive(&mut self, high: bool) -> Result<(), SimLineError> {
        let mut s = self.state.borrow_mut();
        if s.broken.contains(&self.pin) {
            return Err(SimLineError);
        }
        if high {
            s.high.insert(self.pin);
        } else {
            s.high.remove(&self.pin);
        }
        s.ops.push(GpioOp::Drive(self.pin, high));
        Ok(())
    }
}

/// Injected drive failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimLineError;

impl digital::Error for SimLineError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

impl ErrorType for SimLine {
    type Error = SimLineError;
}

impl OutputPin for SimLine {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.drive(false)
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.drive(true)
    }
}

// ── PWM ───────────────────────────────────────────────────────

#[derive(Default)]
struct ChipState {
    channels: Vec<String>,
    outputs: HashMap<String, PwmState>,
    applies: HashMap<String, usize>,
    deferred: HashSet<String>,
    vanished: HashSet<String>,
}

/// Simulated PWM provider; probe it with [`FanManager::probe`](crate::app::service::FanManager::probe).
#[derive(Clone)]
pub struct SimPwmChip {
    label: Option<String>,
    state: Rc<RefCell<ChipState>>,
}

impl SimPwmChip {
    pub fn new(label: &str, channels: &[&str]) -> Self {
        Self {
            label: Some(label.to_owned()),
            ..Self::unlabelled(channels)
        }
    }

    /// A device without a `label` property.
    pub fn unlabelled(channels: &[&str]) -> Self {
        let state = ChipState {
            channels: channels.iter().map(|&c| c.to_owned()).collect(),
            ..ChipState::default()
        };
        Self {
            label: None,
            state: Rc::new(RefCell::new(state)),
        }
    }

    /// Hand out a handle directly, bypassing probe.
    pub fn handle(&self, channel: &str) -> SimPwmHandle {
        SimPwmHandle {
            channel: channel.to_owned(),
            state: Rc::clone(&self.state),
        }
    }

    /// Requests for `channel` answer "try again later".
    pub fn defer(&self, channel: &str) {
        self.state.borrow_mut().deferred.insert(channel.to_owned());
    }

    /// Undo [`defer`](Self::defer).
    pub fn ready(&self, channel: &str) {
        self.state.borrow_mut().deferred.remove(channel);
    }

    /// Hardware disappears under existing handles: applies start failing.
    pub fn vanish(&self, channel: &str) {
        self.state.borrow_mut().vanished.insert(channel.to_owned());
    }

    /// Last state applied to `channel`.
    pub fn output(&self, channel: &str) -> Option<PwmState> {
        self.state.borrow().outputs.get(channel).copied()
    }

    /// Number of applies seen by `channel`.
    pub fn apply_count(&self, channel: &str) -> usize {
        self.state.borrow().applies.get(channel).copied().unwrap_or(0)
    }
}

impl PwmDevice for SimPwmChip {
    type Channel = SimPwmHandle;

    fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    fn get(&mut self, channel_label: &str) -> Result<SimPwmHandle, PwmError> {
        let s = self.state.borrow();
        if s.deferred.contains(channel_label) {
            return Err(PwmError::Deferred);
        }
        if !s.channels.iter().any(|c| c == channel_label) {
            return Err(PwmError::NotFound);
        }
        drop(s);
        Ok(self.handle(channel_label))
    }
}

/// Handle to one simulated PWM channel.
pub struct SimPwmHandle {
    channel: String,
    state: Rc<RefCell<ChipState>>,
}

impl PwmChannel for SimPwmHandle {
    fn apply(&mut self, state: &PwmState) -> Result<(), PwmError> {
        let mut s = self.state.borrow_mut();
        if s.vanished.contains(&self.channel) {
            return Err(PwmError::Io);
        }
        s.outputs.insert(self.channel.clone(), *state);
        *s.applies.entry(self.channel.clone()).or_default() += 1;
        Ok(())
    }
}

// ── Bus ───────────────────────────────────────────────────────

#[derive(Default)]
struct BusState {
    registered: Option<String>,
    refuse: bool,
}

/// Simulated platform bus.
#[derive(Clone, Default)]
pub struct SimPwmBus {
    state: Rc<RefCell<BusState>>,
}

impl SimPwmBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registration answers "deferred" from now on.
    pub fn refuse_registration(&self) {
        self.state.borrow_mut().refuse = true;
    }

    pub fn registered(&self) -> Option<String> {
        self.state.borrow().registered.clone()
    }
}

impl PwmBus for SimPwmBus {
    type Channel = SimPwmHandle;

    fn register(&mut self, driver: &str) -> Result<(), PwmError> {
        let mut s = self.state.borrow_mut();
        if s.refuse {
            return Err(PwmError::Deferred);
        }
        s.registered = Some(driver.to_owned());
        Ok(())
    }

    fn unregister(&mut self, driver: &str) {
        let mut s = self.state.borrow_mut();
        if s.registered.as_deref() == Some(driver) {
            s.registered = None;
        }
    }
}
