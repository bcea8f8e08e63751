//! One-byte fan configuration codec.
//!
//! Wire format (the value read from / written to the device):
//! ```text
//! ┌───────────────┬─────────────────────┐
//! │ bits 7..5     │ bits 4..0           │
//! │ PWM level     │ GPIO id (0..31)     │
//! └───────────────┴─────────────────────┘
//! ```
//!
//! Level `0b111` switches the output off, `0b000` hands the duty cycle to
//! the raw override path, anything in between is a static `level/7` duty.
//! Every byte decodes; whether the pin is usable is decided later by the
//! pin allocator.  Changing this layout breaks every client.

use serde::{Deserialize, Serialize};

use crate::pins::PinId;

const PIN_BITS: u8 = 5;
const PIN_MASK: u8 = (1 << PIN_BITS) - 1;
const LEVEL_MASK: u8 = 0b111;

/// Raw value of the "fully de-energised" sentinel.
pub const PWM_OFF: u8 = 0b111;
/// Raw value of the "adaptive / externally driven" sentinel.
pub const PWM_ADAPTIVE: u8 = 0b000;

/// The 3-bit modulation field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PwmLevel {
    /// Duty cycle supplied out-of-band via the raw override.
    Adaptive,
    /// Static duty of `n/7` of the period, `n` in `1..=6`.
    Static(u8),
    /// Output fully de-energised.
    Off,
}

impl PwmLevel {
    /// Divisor of the static duty fraction.
    pub const STEPS: u64 = PWM_OFF as u64;

    /// Interpret the low three bits of `bits`.
    pub const fn from_bits(bits: u8) -> Self {
        match bits & LEVEL_MASK {
            PWM_ADAPTIVE => Self::Adaptive,
            PWM_OFF => Self::Off,
            n => Self::Static(n),
        }
    }

    pub const fn bits(self) -> u8 {
        match self {
            Self::Adaptive => PWM_ADAPTIVE,
            Self::Off => PWM_OFF,
            Self::Static(n) => n & LEVEL_MASK,
        }
    }

    /// Duty for `period_ns`, or `None` when the level does not define one.
    pub fn duty_ns(self, period_ns: u64) -> Option<u64> {
        match self {
            Self::Adaptive => None,
            Self::Off => Some(0),
            Self::Static(n) => {
                let duty = u128::from(period_ns) * u128::from(n) / u128::from(Self::STEPS);
                Some(u64::try_from(duty).unwrap_or(u64::MAX))
            }
        }
    }
}

/// Decoded fan configuration.  Replaced wholesale, never patched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FanConfig {
    pin: PinId,
    level: PwmLevel,
}

impl FanConfig {
    /// Build a config; the pin is truncated to its 5-bit field.
    pub const fn new(pin: PinId, level: PwmLevel) -> Self {
        Self {
            pin: pin & PIN_MASK,
            level: PwmLevel::from_bits(level.bits()),
        }
    }

    pub const fn decode(byte: u8) -> Self {
        Self {
            pin: byte & PIN_MASK,
            level: PwmLevel::from_bits(byte >> PIN_BITS),
        }
    }

    pub const fn encode(self) -> u8 {
        (self.level.bits() << PIN_BITS) | (self.pin & PIN_MASK)
    }

    pub const fn pin(self) -> PinId {
        self.pin
    }

    pub const fn level(self) -> PwmLevel {
        self.level
    }

    pub const fn is_adaptive(self) -> bool {
        matches!(self.level, PwmLevel::Adaptive)
    }
}

impl From<u8> for FanConfig {
    fn from(byte: u8) -> Self {
        Self::decode(byte)
    }
}

impl From<FanConfig> for u8 {
    fn from(config: FanConfig) -> Self {
        config.encode()
    }
}

impl core::fmt::Display for FanConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "GPIO_{}, PWM_MODE_{}", self.pin, self.level.bits())
    }
}
