//! Unified error types for the fan controller.
//!
//! A single [`FanError`] enum that the pin and modulation subsystems convert
//! into, so the façade and the boundary adapter handle every failure the
//! same way.  All variants are `Copy` so they can be passed through the
//! reconciliation hook and event sink without allocation.

use core::fmt;

use crate::pins::PinId;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible core operation funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanError {
    /// Selecting, acquiring or driving an output line failed.
    Pin(PinError),
    /// The duty-cycle path could not be applied.
    Modulation(ModulationError),
    /// A raw duty value was supplied while the level is not adaptive.
    NotInAdaptiveMode,
    /// The manager has no active pin yet (`initialize` not run or failed).
    NotInitialized,
}

impl fmt::Display for FanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pin(e) => write!(f, "pin: {e}"),
            Self::Modulation(e) => write!(f, "modulation: {e}"),
            Self::NotInAdaptiveMode => write!(f, "raw duty requires adaptive mode"),
            Self::NotInitialized => write!(f, "fan manager not initialised"),
        }
    }
}

impl std::error::Error for FanError {}

// ---------------------------------------------------------------------------
// Pin errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinError {
    /// The pin id is outside the controllable range of the board.
    InvalidPin(PinId),
    /// The host refused the line (already owned by another consumer).
    AcquireFailed(PinId),
    /// No controllable line could be acquired at startup.
    NotFound,
    /// The line was acquired but could not be driven.
    DriveFailed(PinId),
}

impl fmt::Display for PinError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidPin(pin) => write!(f, "GPIO_{pin} is not a usable pin"),
            Self::AcquireFailed(pin) => write!(f, "GPIO_{pin} request failed"),
            Self::NotFound => write!(f, "no free GPIO available"),
            Self::DriveFailed(pin) => write!(f, "GPIO_{pin} could not be driven"),
        }
    }
}

impl From<PinError> for FanError {
    fn from(e: PinError) -> Self {
        Self::Pin(e)
    }
}

// ---------------------------------------------------------------------------
// Modulation errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModulationError {
    /// The channel wired to this pin has no hardware handle (not probed yet,
    /// removed, or the last apply failed).
    ChannelUnavailable(PinId),
    /// Raw duty longer than the channel period.
    InvalidDuty { duty_ns: u64, period_ns: u64 },
    /// No configured channel carries the supplied label.
    UnknownChannel,
    /// The probed device is not ours (label missing or mismatched).
    NoDevice,
    /// The hardware provider is not ready yet; the host will probe again.
    Deferred,
}

impl fmt::Display for ModulationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ChannelUnavailable(pin) => write!(f, "PWM channel for GPIO_{pin} unavailable"),
            Self::InvalidDuty { duty_ns, period_ns } => {
                write!(f, "duty {duty_ns}ns exceeds period {period_ns}ns")
            }
            Self::UnknownChannel => write!(f, "unknown PWM channel label"),
            Self::NoDevice => write!(f, "PWM device label missing or mismatched"),
            Self::Deferred => write!(f, "PWM provider not ready (probe deferred)"),
        }
    }
}

impl From<ModulationError> for FanError {
    fn from(e: ModulationError) -> Self {
        Self::Modulation(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, FanError>;
