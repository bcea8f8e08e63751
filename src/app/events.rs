//! Outbound fan events.
//!
//! The [`FanManager`](super::service::FanManager) emits these through the
//! [`EventSink`](super::ports::EventSink) port.  Cautions are events too:
//! they never block an operation, but they are never dropped either.

use crate::codec::FanConfig;
use crate::config::Label;
use crate::error::ModulationError;
use crate::pins::PinId;

/// Structured events emitted by the fan core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FanEvent {
    /// Startup acquired a line; carries the initial configuration.
    Initialized(FanConfig),

    /// A new configuration was committed.
    ConfigApplied { from: FanConfig, to: FanConfig },

    /// The selected pin is reserved for advanced use (ID_EEPROM).
    ReservedPin(PinId),

    /// A PWM level was requested on a pin without a PWM channel; the pin is
    /// driven as plain on/off.
    ModulationIgnored(PinId),

    /// The pin switch went through but its PWM channel could not be driven.
    ModulationDegraded { pin: PinId, cause: ModulationError },

    /// PWM driver registration failed or was deferred; plain on/off only.
    ModulationDeferred,

    /// A PWM channel appeared.
    ChannelAttached { label: Label, pin: PinId },

    /// A PWM channel went away.
    ChannelDetached { label: Label, pin: PinId },

    /// Teardown finished; carries the pin that was released, if any.
    TornDown(Option<PinId>),
}
