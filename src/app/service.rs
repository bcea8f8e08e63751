//! Fan manager: the hexagonal core.
//!
//! [`FanManager`] owns the pin allocator, the modulation controller and the
//! live [`FanConfig`].  Everything outside (GPIO controller, PWM bus, event
//! sink) is injected at construction through port traits, so the whole
//! manager runs against the simulation adapters in tests.
//!
//! ```text
//!  boundary ──▶ ┌───────────────────────────────┐ ──▶ EventSink
//!               │          FanManager           │
//!   GpioPort ◀──│  PinAllocator · Modulation    │──▶ PwmBus
//!               └───────────────────────────────┘
//!                     ▲ probe / remove (host)
//! ```
//!
//! ## Precondition
//!
//! Callers serialise every request: configuration changes and the
//! probe/remove callbacks all go through `&mut self` on one owner.

use log::{info, warn};

use crate::codec::{FanConfig, PwmLevel};
use crate::config::BoardConfig;
use crate::drivers::modulation::ModulationController;
use crate::drivers::pin_allocator::{Handoff, PinAllocator};
use crate::error::{FanError, ModulationError, Result};
use crate::pins::{PinClass, PinId};

use super::events::FanEvent;
use super::ports::{EventSink, GpioPort, PwmBus, PwmDevice};

/// Duty reported when the active pin has no PWM channel.
pub const DEFAULT_RAW_DUTY_NS: u64 = 0;

pub struct FanManager<G: GpioPort, B: PwmBus, S: EventSink> {
    pins: PinAllocator<G>,
    modulation: ModulationController<B::Channel>,
    bus: B,
    sink: S,
    driver_name: String,
    config: FanConfig,
    initialized: bool,
    registered: bool,
}

impl<G: GpioPort, B: PwmBus, S: EventSink> FanManager<G, B, S> {
    /// Wire the manager to its ports.  Touches no hardware; call
    /// [`initialize`](Self::initialize) next.
    pub fn new(board: &BoardConfig, gpio: G, bus: B, sink: S) -> Self {
        let topology = board.topology();
        Self {
            pins: PinAllocator::new(gpio, topology, board.gpio_label.clone()),
            modulation: ModulationController::new(board),
            bus,
            sink,
            driver_name: board.driver_name.clone(),
            config: FanConfig::new(board.gpio_min, PwmLevel::Off),
            initialized: false,
            registered: false,
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Grab the first free pin and register for PWM hardware.
    ///
    /// Only a missing pin is fatal; a PWM registration failure leaves the
    /// fan on plain on/off control.
    pub fn initialize(&mut self) -> Result<()> {
        if self.initialized {
            warn!("FanManager already initialised on GPIO_{}", self.config.pin());
            return Ok(());
        }

        let pin = self.pins.acquire_first_available()?;

        match self.bus.register(&self.driver_name) {
            Ok(()) => self.registered = true,
            Err(e) => {
                warn!("PWM driver '{}' registration failed ({}), PWM unavailable", self.driver_name, e);
                self.sink.emit(&FanEvent::ModulationDeferred);
            }
        }

        self.config = FanConfig::new(pin, PwmLevel::Off);
        self.modulation.retarget(self.config);
        self.initialized = true;
        self.sink.emit(&FanEvent::Initialized(self.config));
        info!("Fan driver initialised for pin GPIO_{}", pin);
        Ok(())
    }

    /// Quiesce PWM, unregister, drive the pin low and release it.
    ///
    /// Never fails and may be called any number of times, including after
    /// a failed [`initialize`](Self::initialize).  Channels attached by an
    /// earlier probe are let go even if no pin was ever acquired.
    pub fn teardown(&mut self) {
        let channel_pins: Vec<PinId> = self
            .modulation
            .channels()
            .iter()
            .map(|ch| ch.pin())
            .collect();
        for pin in channel_pins {
            if let Err(e) = self.modulation.quiesce(pin) {
                warn!("Teardown: {}", e);
            }
        }
        let detached = self.modulation.remove();
        let had_channels = !detached.is_empty();
        for (label, pin) in detached {
            self.sink.emit(&FanEvent::ChannelDetached { label, pin });
        }

        let was_live = self.initialized || self.registered || self.pins.active_pin().is_some();
        if !was_live && !had_channels {
            return;
        }
        if self.registered {
            self.bus.unregister(&self.driver_name);
            self.registered = false;
        }

        let released = self.pins.release();
        self.initialized = false;
        self.sink.emit(&FanEvent::TornDown(released));
        info!("Fan driver closed");
    }

    // ── Configuration ─────────────────────────────────────────

    /// Current configuration in wire form.
    pub fn config_byte(&self) -> u8 {
        self.config.encode()
    }

    pub fn config(&self) -> FanConfig {
        self.config
    }

    pub fn active_pin(&self) -> Option<PinId> {
        self.pins.active_pin()
    }

    /// Decode and apply a new configuration.
    ///
    /// On any error the previous configuration stays live and no caution is
    /// emitted.  A PWM channel that cannot be driven does not block a pin
    /// switch (the fan degrades to on/off), but it does fail an in-place
    /// level change.
    pub fn set_config(&mut self, byte: u8) -> Result<()> {
        if !self.initialized {
            return Err(FanError::NotInitialized);
        }
        let new = FanConfig::decode(byte);
        let old = self.config;
        let pin = new.pin();

        let class = self.pins.classify(pin);
        if class == PinClass::OutOfRange {
            warn!("GPIO_{} is not a proper pin, ignoring", pin);
        }
        let unmodulated = self.modulation.channel_for_pin(pin).is_none();

        let modulation = &mut self.modulation;
        let mut degraded = None;
        let mut driven_early = false;
        let result = self.pins.reassign(pin, |handoff| {
            let switching = handoff != Handoff::InPlace;
            match modulation.reconcile(new) {
                Ok(()) => {
                    driven_early = switching;
                    Ok(())
                }
                Err(cause @ ModulationError::ChannelUnavailable(_)) if switching => {
                    degraded = Some(cause);
                    Ok(())
                }
                Err(e) => Err(e.into()),
            }
        });

        let handoff = match result {
            Ok(handoff) => handoff,
            Err(e) => {
                // The new pin's channel may already be running; the line
                // it belongs to was never taken.
                if driven_early {
                    if let Err(q) = self.modulation.quiesce(pin) {
                        warn!("GPIO_{}: could not quiesce PWM after failed switch: {}", pin, q);
                    }
                }
                return Err(e);
            }
        };

        if let Handoff::Switch { from } = handoff {
            if let Err(e) = self.modulation.quiesce(from) {
                warn!("GPIO_{}: could not quiesce old PWM channel: {}", from, e);
            }
        }

        self.config = new;
        self.modulation.retarget(new);

        if class == PinClass::Reserved {
            warn!("GPIO_{} is reserved for advanced use (ID_EEPROM) and not recommended", pin);
            self.sink.emit(&FanEvent::ReservedPin(pin));
        }
        if unmodulated && new.level() != PwmLevel::Off {
            warn!("GPIO_{} has no PWM channel, PWM configuration ignored", pin);
            self.sink.emit(&FanEvent::ModulationIgnored(pin));
        }
        if let Some(cause) = degraded {
            warn!("GPIO_{}: {}, continuing as plain on/off", pin, cause);
            self.sink.emit(&FanEvent::ModulationDegraded { pin, cause });
        }
        self.sink.emit(&FanEvent::ConfigApplied { from: old, to: new });
        info!("New configuration is provided: {}", new);
        Ok(())
    }

    // ── Raw duty override ─────────────────────────────────────

    /// Put `duty_ns` on the active channel as-is.  Adaptive level only.
    pub fn set_raw_duty(&mut self, duty_ns: u64) -> Result<()> {
        if !self.initialized {
            return Err(FanError::NotInitialized);
        }
        if !self.config.is_adaptive() {
            return Err(FanError::NotInAdaptiveMode);
        }
        self.modulation.apply_raw(self.config.pin(), duty_ns)?;
        info!("GPIO_{}: raw duty {}ns", self.config.pin(), duty_ns);
        Ok(())
    }

    /// Live duty of the active channel, [`DEFAULT_RAW_DUTY_NS`] when it has
    /// no channel or the channel is detached.
    pub fn raw_duty(&self) -> u64 {
        self.modulation
            .duty_ns(self.config.pin())
            .unwrap_or(DEFAULT_RAW_DUTY_NS)
    }

    // ── Host callbacks ────────────────────────────────────────

    /// PWM device probed by the host.
    pub fn probe<D>(&mut self, device: &mut D) -> Result<usize>
    where
        D: PwmDevice<Channel = B::Channel>,
    {
        let count = self.modulation.probe(device)?;
        self.emit_attached();
        Ok(count)
    }

    /// PWM device removed by the host.
    pub fn remove(&mut self) {
        for (label, pin) in self.modulation.remove() {
            self.sink.emit(&FanEvent::ChannelDetached { label, pin });
        }
    }

    /// A single channel appeared.
    pub fn attach_channel(&mut self, label: &str, handle: B::Channel) -> Result<PinId> {
        let pin = self.modulation.attach(label, handle)?;
        self.emit_attached_one(label, pin);
        Ok(pin)
    }

    /// A single channel went away.
    pub fn detach_channel(&mut self, label: &str) -> Option<PinId> {
        let pin = self.modulation.detach(label)?;
        if let Ok(label) = label.try_into() {
            self.sink.emit(&FanEvent::ChannelDetached { label, pin });
        }
        Some(pin)
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn modulation(&self) -> &ModulationController<B::Channel> {
        &self.modulation
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    // ── Internal ──────────────────────────────────────────────

    fn emit_attached(&mut self) {
        let attached: Vec<_> = self
            .modulation
            .channels()
            .iter()
            .filter(|ch| ch.state() != crate::drivers::modulation::ChannelState::Detached)
            .map(|ch| (ch.label().to_owned(), ch.pin()))
            .collect();
        for (label, pin) in attached {
            self.emit_attached_one(&label, pin);
        }
    }

    fn emit_attached_one(&mut self, label: &str, pin: PinId) {
        if let Ok(label) = label.try_into() {
            self.sink.emit(&FanEvent::ChannelAttached { label, pin });
        }
    }
}

impl<G: GpioPort, B: PwmBus, S: EventSink> Drop for FanManager<G, B, S> {
    fn drop(&mut self) {
        self.teardown();
    }
}
