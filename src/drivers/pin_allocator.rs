//! Fan line ownership.
//!
//! Owns the single "active pin" slot.  Every change of line goes through
//! [`PinAllocator::reassign`], which keeps the handoff ordered:
//!
//! ```text
//!  request(new) ──▶ hook ──▶ new HIGH ──▶ old LOW ──▶ free(old)
//!       │             │          │
//!       └─ fail: old untouched   └─ fail: free(new), old untouched
//! ```
//!
//! A new line is always owned before the old one is released, so there is
//! never a moment with zero owned lines, and the old one is only released
//! after the new one is asserted.

use embedded_hal::digital::OutputPin;
use log::{debug, info, warn};

use crate::app::ports::GpioPort;
use crate::error::{FanError, PinError};
use crate::pins::{PinClass, PinId, PinTopology};

/// How the pin slot is affected by a reassignment; handed to the hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handoff {
    /// Same pin, only the modulation level changes.
    InPlace,
    /// The fan moves from `from` to a new pin.
    Switch { from: PinId },
}

struct ActiveLine<L> {
    pin: PinId,
    line: L,
}

pub struct PinAllocator<G: GpioPort> {
    gpio: G,
    topology: PinTopology,
    label: String,
    active: Option<ActiveLine<G::Line>>,
}

impl<G: GpioPort> PinAllocator<G> {
    pub fn new(gpio: G, topology: PinTopology, label: impl Into<String>) -> Self {
        Self {
            gpio,
            topology,
            label: label.into(),
            active: None,
        }
    }

    pub fn classify(&self, pin: PinId) -> PinClass {
        self.topology.classify(pin)
    }

    /// Pin currently owned, if any.
    pub fn active_pin(&self) -> Option<PinId> {
        self.active.as_ref().map(|a| a.pin)
    }

    /// Acquire the lowest free controllable pin and drive it high.
    ///
    /// If a pin is already owned it is kept and returned.
    pub fn acquire_first_available(&mut self) -> Result<PinId, PinError> {
        if let Some(pin) = self.active_pin() {
            return Ok(pin);
        }

        let candidates: Vec<PinId> = self.topology.scan_order().collect();
        for pin in candidates {
            let mut line = match self.gpio.request(pin, &self.label) {
                Ok(line) => line,
                Err(e) => {
                    debug!("GPIO_{} unavailable ({}), trying next", pin, e);
                    continue;
                }
            };
            if line.set_high().is_err() {
                warn!("GPIO_{} acquired but could not be driven, trying next", pin);
                self.gpio.free(line);
                continue;
            }
            info!("GPIO_{} acquired for the fan", pin);
            self.active = Some(ActiveLine { pin, line });
            return Ok(pin);
        }

        Err(PinError::NotFound)
    }

    /// Move the fan to `pin`.
    ///
    /// `hook` runs once the target line is owned but before the switch
    /// commits (for an in-place update it runs without any line change).
    /// A hook error aborts the switch and leaves the old pin untouched.
    pub fn reassign<F>(&mut self, pin: PinId, hook: F) -> Result<Handoff, FanError>
    where
        F: FnOnce(Handoff) -> Result<(), FanError>,
    {
        if self.classify(pin) == PinClass::OutOfRange {
            return Err(PinError::InvalidPin(pin).into());
        }
        let Some(old_pin) = self.active_pin() else {
            return Err(FanError::NotInitialized);
        };

        if pin == old_pin {
            hook(Handoff::InPlace)?;
            return Ok(Handoff::InPlace);
        }

        let mut line = self.gpio.request(pin, &self.label).map_err(|e| {
            warn!("GPIO_{} request failed: {}", pin, e);
            PinError::AcquireFailed(pin)
        })?;

        let handoff = Handoff::Switch { from: old_pin };
        if let Err(e) = hook(handoff) {
            self.gpio.free(line);
            return Err(e);
        }

        if line.set_high().is_err() {
            self.gpio.free(line);
            return Err(PinError::DriveFailed(pin).into());
        }

        if let Some(old) = self.active.replace(ActiveLine { pin, line }) {
            self.retire(old);
        }
        info!("Fan moved from GPIO_{} to GPIO_{}", old_pin, pin);
        Ok(handoff)
    }

    /// Drive the active pin low and give it back to the host.  Idempotent.
    pub fn release(&mut self) -> Option<PinId> {
        let old = self.active.take()?;
        let pin = old.pin;
        self.retire(old);
        info!("GPIO_{} released", pin);
        Some(pin)
    }

    fn retire(&mut self, mut old: ActiveLine<G::Line>) {
        if old.line.set_low().is_err() {
            warn!("GPIO_{} could not be driven low before release", old.pin);
        }
        self.gpio.free(old.line);
    }
}
