//! Board configuration
//!
//! Static topology of the board the fan is wired to: usable GPIO range,
//! PWM wiring and labels.  Defaults describe the Raspberry Pi 4 with the
//! stock `rpifan` overlay; a JSON file can override any field.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::codec::PwmLevel;
use crate::pins::{self, PinClass, PinId, PinTopology};

/// Longest accepted PWM period; keeps `period * level` inside `u64`.
pub const MAX_PWM_PERIOD_NS: u64 = u64::MAX / PwmLevel::STEPS;

/// Capacity of a channel label.
pub const LABEL_CAP: usize = 16;

/// Fixed-capacity channel label.
pub type Label = heapless::String<LABEL_CAP>;

/// Output polarity of a PWM channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Polarity {
    #[default]
    Normal,
    Inversed,
}

impl Polarity {
    /// Name used by the kernel PWM sysfs interface.
    pub fn as_sysfs(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Inversed => "inversed",
        }
    }
}

/// A PWM channel wired to a GPIO.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PwmChannelConfig {
    /// GPIO carrying the PWM output.
    pub pin: PinId,
    /// Channel name on the PWM device (`pwm-names` in the overlay).
    pub label: Label,
    /// Channel index on the PWM chip (sysfs `pwmN`).
    pub index: u32,
}

/// Paths used by the sysfs backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SysfsConfig {
    pub gpio_root: PathBuf,
    pub pwm_chip: PathBuf,
}

impl Default for SysfsConfig {
    fn default() -> Self {
        Self {
            gpio_root: PathBuf::from("/sys/class/gpio"),
            pwm_chip: PathBuf::from("/sys/class/pwm/pwmchip0"),
        }
    }
}

/// Board configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardConfig {
    // --- GPIO ---
    /// First GPIO scanned at startup
    pub gpio_min: PinId,
    /// Number of GPIO lines; ids at or above are rejected
    pub gpio_amount: u8,
    /// Pins that are allowed but warned about
    pub reserved_pins: Vec<PinId>,
    /// Consumer label for the fan line
    pub gpio_label: String,

    // --- PWM ---
    /// Pins that can be muxed to a PWM output
    pub pwm_capable_pins: Vec<PinId>,
    /// Channels actually wired by the overlay
    pub pwm_channels: Vec<PwmChannelConfig>,
    /// Fixed PWM period (nanoseconds)
    pub pwm_period_ns: u64,
    pub pwm_polarity: Polarity,
    /// Label the probed PWM device must carry
    pub device_label: String,
    /// Name used when registering with the PWM bus
    pub driver_name: String,

    // --- Host ---
    pub sysfs: SysfsConfig,
}

impl Default for BoardConfig {
    fn default() -> Self {
        let pwm_channels = pins::PWM_CHANNEL_WIRING
            .iter()
            .zip(0u32..)
            .map(|(&(pin, label), index)| PwmChannelConfig {
                pin,
                label: Label::try_from(label).unwrap_or_default(),
                index,
            })
            .collect();

        Self {
            gpio_min: pins::GPIO_MIN,
            gpio_amount: pins::GPIO_AMOUNT,
            reserved_pins: pins::RESERVED_GPIOS.to_vec(),
            gpio_label: pins::GPIO_LABEL.into(),

            pwm_capable_pins: pins::PWM_CAPABLE_GPIOS.to_vec(),
            pwm_channels,
            pwm_period_ns: pins::PWM_PERIOD_NS,
            pwm_polarity: Polarity::Normal,
            device_label: pins::PWM_DEVICE_LABEL.into(),
            driver_name: pins::PWM_DRIVER_NAME.into(),

            sysfs: SysfsConfig::default(),
        }
    }
}

/// Errors from loading or validating a [`BoardConfig`].
#[derive(Debug)]
pub enum ConfigError {
    /// The file could not be read.
    Io(std::io::Error),
    /// The file is not valid JSON for this schema.
    Parse(serde_json::Error),
    /// A field failed range validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {}", e),
            Self::Parse(e) => write!(f, "parse error: {}", e),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl BoardConfig {
    /// Load from a JSON file; absent fields take their defaults.
    /// The result is validated before it is returned.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        let config: Self = serde_json::from_str(&text).map_err(ConfigError::Parse)?;
        config.validate()?;
        log::info!("Board config loaded from {}", path.display());
        Ok(config)
    }

    /// Reject topologies the allocator and modulation controller cannot honour.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.gpio_amount == 0 || self.gpio_amount > 32 {
            return Err(ConfigError::ValidationFailed("gpio_amount must be 1..=32 (5-bit pin field)"));
        }
        if self.gpio_min >= self.gpio_amount {
            return Err(ConfigError::ValidationFailed("gpio_min must be below gpio_amount"));
        }
        if self.pwm_period_ns == 0 || self.pwm_period_ns > MAX_PWM_PERIOD_NS {
            return Err(ConfigError::ValidationFailed("pwm_period_ns must be 1..=u64::MAX/7"));
        }
        if self.gpio_label.is_empty() {
            return Err(ConfigError::ValidationFailed("gpio_label must not be empty"));
        }
        if self.pwm_channels.len() > pins::MAX_PWM_CHANNELS {
            return Err(ConfigError::ValidationFailed("too many pwm_channels"));
        }

        let topology = self.topology();
        for (i, ch) in self.pwm_channels.iter().enumerate() {
            if ch.label.is_empty() {
                return Err(ConfigError::ValidationFailed("pwm channel label must not be empty"));
            }
            if topology.classify(ch.pin) != PinClass::ModulationCapable {
                return Err(ConfigError::ValidationFailed("pwm channel pin is not PWM-capable"));
            }
            let duplicate = self.pwm_channels[..i]
                .iter()
                .any(|other| other.pin == ch.pin || other.label == ch.label || other.index == ch.index);
            if duplicate {
                return Err(ConfigError::ValidationFailed("pwm channels must have unique pin, label and index"));
            }
        }
        Ok(())
    }

    /// Bitmask form used for classification.
    pub fn topology(&self) -> PinTopology {
        PinTopology::new(
            self.gpio_min,
            self.gpio_amount,
            &self.reserved_pins,
            &self.pwm_capable_pins,
        )
    }
}
