//! Port traits: the hexagonal boundary between fan logic and the host.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ FanManager (domain)
//! ```
//!
//! Driven adapters (GPIO controller, PWM provider, platform bus, event
//! sinks) implement these traits.  [`FanManager`](super::service::FanManager)
//! is generic over them, so the core never touches hardware directly.
//!
//! ## Ownership notes
//!
//! - A **GpioPort** line is an owned handle: holding it *is* owning the pin.
//!   Returning it through [`GpioPort::free`] gives the pin back to the host.
//! - A **PwmChannel** handle only exists while the hardware is attached;
//!   dropping it is how the core lets go of a removed channel.

use embedded_hal::digital::OutputPin;

use crate::config::Polarity;
use crate::pins::PinId;

// ───────────────────────────────────────────────────────────────
// GPIO port (driven adapter: domain → host line controller)
// ───────────────────────────────────────────────────────────────

/// Exclusive access to the host's GPIO lines.
pub trait GpioPort {
    /// Handle of an acquired output line.
    type Line: OutputPin;

    /// Request exclusive ownership of `pin` as an output, tagged `label`.
    fn request(&mut self, pin: PinId, label: &str) -> Result<Self::Line, GpioError>;

    /// Return ownership of a line to the host.
    fn free(&mut self, line: Self::Line);
}

// ───────────────────────────────────────────────────────────────
// PWM ports (driven adapter: domain → PWM provider)
// ───────────────────────────────────────────────────────────────

/// State pushed to a PWM channel in one atomic apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PwmState {
    pub period_ns: u64,
    pub duty_ns: u64,
    pub polarity: Polarity,
    pub enabled: bool,
}

/// An attached PWM output.
pub trait PwmChannel {
    /// Apply period, duty, polarity and enable in one step.
    fn apply(&mut self, state: &PwmState) -> Result<(), PwmError>;
}

/// The hardware-exposing device, as seen from a probe callback.
pub trait PwmDevice {
    type Channel: PwmChannel;

    /// Device label from the device tree, if any.
    fn label(&self) -> Option<&str>;

    /// Look up a channel by its `pwm-names` label.
    fn get(&mut self, channel_label: &str) -> Result<Self::Channel, PwmError>;
}

/// Platform bus the PWM driver registers with.  Registration only makes
/// probe/remove callbacks possible; they arrive later, or never.
pub trait PwmBus {
    type Channel: PwmChannel;

    fn register(&mut self, driver: &str) -> Result<(), PwmError>;

    fn unregister(&mut self, driver: &str);
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`FanEvent`](super::events::FanEvent)s
/// (including non-fatal cautions) through this port.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::FanEvent);
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`GpioPort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpioError {
    /// Line already owned by another consumer.
    Busy,
    /// Host refuses to hand out this line.
    Rejected,
    /// Generic I/O error from the controller.
    Io,
}

/// Errors from the PWM ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PwmError {
    /// Provider not bound yet; try again later.
    Deferred,
    /// No such channel / device.
    NotFound,
    /// Register write or sysfs I/O failed.
    Io,
}

impl core::fmt::Display for GpioError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Busy => write!(f, "line busy"),
            Self::Rejected => write!(f, "request rejected"),
            Self::Io => write!(f, "I/O error"),
        }
    }
}

impl core::fmt::Display for PwmError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Deferred => write!(f, "probe deferred"),
            Self::NotFound => write!(f, "not found"),
            Self::Io => write!(f, "I/O error"),
        }
    }
}
