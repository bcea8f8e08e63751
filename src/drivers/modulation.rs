//! Hardware PWM channels for the fan.
//!
//! Each wired channel has its own attach lifecycle, driven by the host's
//! probe/remove callbacks rather than by configuration changes:
//!
//! ```text
//!            attach                reconcile(level 1..6 | adaptive)
//! Detached ─────────▶ Attached ───────────────────────────▶ Driving
//!     ▲                  ▲  ◀──── reconcile(off) / quiesce ──┘  │
//!     └──── detach ──────┴──────────── detach ──────────────────┘
//! ```
//!
//! ## Policy
//!
//! - Off (`0b111`) means duty 0 with the output disabled.
//! - Adaptive (`0b000`) never derives a duty from the level; the last raw
//!   override stays in force.
//! - Fail closed: a channel without a handle, or whose last apply failed,
//!   is `Detached` and answers `ChannelUnavailable`.  A failed handle is
//!   dropped, never retried.

use heapless::Vec;
use log::{debug, info, warn};

use crate::app::ports::{PwmChannel, PwmDevice, PwmState};
use crate::codec::{FanConfig, PwmLevel};
use crate::config::{BoardConfig, Label, Polarity};
use crate::error::ModulationError;
use crate::pins::{MAX_PWM_CHANNELS, PinId};

/// Lifecycle state of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// No hardware handle.
    Detached,
    /// Handle present, output disabled.
    Attached,
    /// Handle present, duty applied and output enabled.
    Driving,
}

/// One PWM output wired to a GPIO.
pub struct ModulationChannel<P> {
    pin: PinId,
    label: Label,
    handle: Option<P>,
    period_ns: u64,
    duty_ns: u64,
    polarity: Polarity,
    enabled: bool,
    /// Last value from the raw override path.
    override_ns: Option<u64>,
}

impl<P: PwmChannel> ModulationChannel<P> {
    fn new(pin: PinId, label: Label, period_ns: u64, polarity: Polarity) -> Self {
        Self {
            pin,
            label,
            handle: None,
            period_ns,
            duty_ns: 0,
            polarity,
            enabled: false,
            override_ns: None,
        }
    }

    pub fn pin(&self) -> PinId {
        self.pin
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn period_ns(&self) -> u64 {
        self.period_ns
    }

    pub fn duty_ns(&self) -> u64 {
        self.duty_ns
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn state(&self) -> ChannelState {
        match (&self.handle, self.enabled) {
            (None, _) => ChannelState::Detached,
            (Some(_), false) => ChannelState::Attached,
            (Some(_), true) => ChannelState::Driving,
        }
    }

    /// Push `duty_ns`/`enabled` to the hardware.  The cached values only
    /// change once the hardware accepted them.
    fn apply(&mut self, duty_ns: u64, enabled: bool) -> Result<(), ModulationError> {
        let Some(handle) = self.handle.as_mut() else {
            return Err(ModulationError::ChannelUnavailable(self.pin));
        };
        let state = PwmState {
            period_ns: self.period_ns,
            duty_ns,
            polarity: self.polarity,
            enabled,
        };
        if let Err(e) = handle.apply(&state) {
            warn!("PWM channel '{}' apply failed ({}), detaching", self.label, e);
            self.handle = None;
            self.enabled = false;
            return Err(ModulationError::ChannelUnavailable(self.pin));
        }
        self.duty_ns = duty_ns;
        self.enabled = enabled;
        Ok(())
    }

    fn drive(&mut self, level: PwmLevel) -> Result<(), ModulationError> {
        match level {
            PwmLevel::Off => self.apply(0, false),
            PwmLevel::Adaptive => {
                let duty = self.override_ns.unwrap_or(self.duty_ns);
                self.apply(duty, true)
            }
            PwmLevel::Static(_) => {
                let duty = level.duty_ns(self.period_ns).unwrap_or_default();
                self.apply(duty, true)
            }
        }
    }
}

/// Owner of every PWM channel of the board.
pub struct ModulationController<P> {
    channels: Vec<ModulationChannel<P>, MAX_PWM_CHANNELS>,
    device_label: String,
    /// Last committed config; what an attaching channel should show.
    target: Option<FanConfig>,
}

impl<P: PwmChannel> ModulationController<P> {
    pub fn new(board: &BoardConfig) -> Self {
        let mut channels = Vec::new();
        for ch in board.pwm_channels.iter().take(MAX_PWM_CHANNELS) {
            let channel = ModulationChannel::new(ch.pin, ch.label.clone(), board.pwm_period_ns, board.pwm_polarity);
            if channels.push(channel).is_err() {
                break;
            }
        }
        Self {
            channels,
            device_label: board.device_label.clone(),
            target: None,
        }
    }

    pub fn channels(&self) -> &[ModulationChannel<P>] {
        &self.channels
    }

    pub fn channel_for_pin(&self, pin: PinId) -> Option<&ModulationChannel<P>> {
        self.channels.iter().find(|ch| ch.pin == pin)
    }

    fn channel_for_pin_mut(&mut self, pin: PinId) -> Option<&mut ModulationChannel<P>> {
        self.channels.iter_mut().find(|ch| ch.pin == pin)
    }

    /// Live duty of the channel wired to `pin`.  A detached channel has no
    /// live duty.
    pub fn duty_ns(&self, pin: PinId) -> Option<u64> {
        self.channel_for_pin(pin)
            .filter(|ch| ch.state() != ChannelState::Detached)
            .map(ModulationChannel::duty_ns)
    }

    // ── Configuration path ────────────────────────────────────

    /// Drive the channel named by `config.pin` according to its level.
    /// Pins without a channel are left alone.
    pub fn reconcile(&mut self, config: FanConfig) -> Result<(), ModulationError> {
        let Some(channel) = self.channel_for_pin_mut(config.pin()) else {
            return Ok(());
        };
        channel.drive(config.level())?;
        debug!(
            "PWM '{}' -> duty={}ns/{}ns enabled={}",
            channel.label, channel.duty_ns, channel.period_ns, channel.enabled
        );
        Ok(())
    }

    /// Remember the committed config for channels that attach later.
    pub fn retarget(&mut self, config: FanConfig) {
        self.target = Some(config);
    }

    /// Disable the channel wired to `pin`, if it is attached.
    pub fn quiesce(&mut self, pin: PinId) -> Result<(), ModulationError> {
        match self.channel_for_pin_mut(pin) {
            Some(channel) if channel.handle.is_some() => channel.apply(0, false),
            _ => Ok(()),
        }
    }

    /// Raw override: put `duty_ns` on the channel wired to `pin` as-is.
    pub fn apply_raw(&mut self, pin: PinId, duty_ns: u64) -> Result<(), ModulationError> {
        let channel = self
            .channel_for_pin_mut(pin)
            .ok_or(ModulationError::ChannelUnavailable(pin))?;
        if duty_ns > channel.period_ns {
            return Err(ModulationError::InvalidDuty {
                duty_ns,
                period_ns: channel.period_ns,
            });
        }
        channel.apply(duty_ns, true)?;
        channel.override_ns = Some(duty_ns);
        Ok(())
    }

    // ── Attach lifecycle ──────────────────────────────────────

    /// Attach a hardware handle to the channel called `label` and bring it
    /// to the last committed state.
    pub fn attach(&mut self, label: &str, handle: P) -> Result<PinId, ModulationError> {
        let target = self.target;
        let Some(channel) = self.channels.iter_mut().find(|ch| ch.label == label) else {
            warn!("PWM attach for unknown channel '{}'", label);
            return Err(ModulationError::UnknownChannel);
        };
        if channel.handle.replace(handle).is_some() {
            debug!("PWM channel '{}' re-attached, old handle dropped", label);
        }
        channel.enabled = false;

        match target {
            Some(config) if config.pin() == channel.pin => channel.drive(config.level())?,
            _ => channel.apply(0, false)?,
        }
        info!("PWM channel '{}' attached (GPIO_{})", label, channel.pin);
        Ok(channel.pin)
    }

    /// Drop the handle of the channel called `label`.  Returns its pin if it
    /// was attached.
    pub fn detach(&mut self, label: &str) -> Option<PinId> {
        let channel = self.channels.iter_mut().find(|ch| ch.label == label)?;
        channel.handle.take()?;
        channel.enabled = false;
        info!("PWM channel '{}' detached (GPIO_{})", label, channel.pin);
        Some(channel.pin)
    }

    /// Probe callback: claim every channel from `device`.
    ///
    /// Nothing is attached unless every channel could be obtained.
    pub fn probe<D>(&mut self, device: &mut D) -> Result<usize, ModulationError>
    where
        D: PwmDevice<Channel = P>,
    {
        match device.label() {
            None => {
                warn!("PWM probe: no device label present");
                return Err(ModulationError::NoDevice);
            }
            Some(label) if label != self.device_label => {
                warn!("PWM probe: device label '{}' does not match '{}'", label, self.device_label);
                return Err(ModulationError::NoDevice);
            }
            Some(_) => {}
        }

        let mut handles: Vec<(Label, P), MAX_PWM_CHANNELS> = Vec::new();
        for channel in &self.channels {
            match device.get(&channel.label) {
                Ok(handle) => {
                    if handles.push((channel.label.clone(), handle)).is_err() {
                        break;
                    }
                }
                Err(crate::app::ports::PwmError::Deferred) => {
                    debug!("PWM probe deferred on channel '{}'", channel.label);
                    return Err(ModulationError::Deferred);
                }
                Err(e) => {
                    warn!("PWM probe: requesting channel '{}' failed: {}", channel.label, e);
                    return Err(ModulationError::NoDevice);
                }
            }
        }

        let mut attached = 0;
        for (label, handle) in handles {
            if self.attach(&label, handle).is_ok() {
                attached += 1;
            }
        }
        Ok(attached)
    }

    /// Remove callback: detach every channel.  Returns detached pins.
    pub fn remove(&mut self) -> Vec<(Label, PinId), MAX_PWM_CHANNELS> {
        let labels: Vec<Label, MAX_PWM_CHANNELS> = self
            .channels
            .iter()
            .filter(|ch| ch.handle.is_some())
            .map(|ch| ch.label.clone())
            .collect();

        let mut detached = Vec::new();
        for label in labels {
            if let Some(pin) = self.detach(&label) {
                let _ = detached.push((label, pin));
            }
        }
        detached
    }
}
