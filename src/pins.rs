//! Board topology for the Raspberry Pi 4 header.
//!
//! Single source of truth for pin ranges and PWM wiring: the default
//! [`BoardConfig`](crate::config::BoardConfig) is built from these constants
//! and every classification goes through [`PinTopology`].

/// Board-specific numeric id of a GPIO line.
pub type PinId = u8;

// ---------------------------------------------------------------------------
// GPIO range
// ---------------------------------------------------------------------------

/// First GPIO the fan may be scanned onto.
pub const GPIO_MIN: PinId = 2;
/// Number of GPIO lines on the header (ids `0..GPIO_AMOUNT`).
pub const GPIO_AMOUNT: u8 = 28;
/// ID_EEPROM pins (physical 27, 28). Usable, but not recommended.
pub const RESERVED_GPIOS: [PinId; 2] = [0, 1];

// ---------------------------------------------------------------------------
// PWM
// ---------------------------------------------------------------------------

/// Every GPIO that can be muxed to a hardware PWM output.
pub const PWM_CAPABLE_GPIOS: [PinId; 4] = [12, 13, 18, 19];
/// GPIOs wired to a PWM channel by the default overlay, with their labels.
pub const PWM_CHANNEL_WIRING: [(PinId, &str); 2] = [(12, "ch0"), (13, "ch1")];
/// Fixed PWM period (20 Hz).
pub const PWM_PERIOD_NS: u64 = 50_000_000;
/// Upper bound on wired PWM channels.
pub const MAX_PWM_CHANNELS: usize = 4;

// ---------------------------------------------------------------------------
// Labels
// ---------------------------------------------------------------------------

/// Consumer label used when requesting the fan line.
pub const GPIO_LABEL: &str = "FAN_GPIO";
/// Label the PWM device must carry in the device tree overlay.
pub const PWM_DEVICE_LABEL: &str = "rpifan";
/// Name the PWM platform driver registers under.
pub const PWM_DRIVER_NAME: &str = "rpifan_pwm";

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// What a pin id means on this board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinClass {
    /// Allowed, but reserved for advanced use.
    Reserved,
    /// Plain on/off output.
    Digital,
    /// Output that can also carry a hardware PWM signal.
    ModulationCapable,
    /// Not a controllable line; rejected.
    OutOfRange,
}

/// Bitmask view of the board, cheap to copy into every component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinTopology {
    pub gpio_min: PinId,
    pub gpio_amount: u8,
    reserved: u32,
    pwm_capable: u32,
}

impl PinTopology {
    pub fn new(gpio_min: PinId, gpio_amount: u8, reserved: &[PinId], pwm_capable: &[PinId]) -> Self {
        Self {
            gpio_min,
            gpio_amount,
            reserved: mask(reserved),
            pwm_capable: mask(pwm_capable),
        }
    }

    /// Classify `pin`.  Pure function of the topology.
    pub fn classify(&self, pin: PinId) -> PinClass {
        if pin >= self.gpio_amount {
            PinClass::OutOfRange
        } else if bit(self.reserved, pin) {
            PinClass::Reserved
        } else if pin < self.gpio_min {
            PinClass::OutOfRange
        } else if bit(self.pwm_capable, pin) {
            PinClass::ModulationCapable
        } else {
            PinClass::Digital
        }
    }

    /// Ids the startup scan may try, lowest first.
    pub fn scan_order(&self) -> impl Iterator<Item = PinId> + '_ {
        (self.gpio_min..self.gpio_amount)
            .filter(|&pin| matches!(self.classify(pin), PinClass::Digital | PinClass::ModulationCapable))
    }
}

impl Default for PinTopology {
    fn default() -> Self {
        Self::new(GPIO_MIN, GPIO_AMOUNT, &RESERVED_GPIOS, &PWM_CAPABLE_GPIOS)
    }
}

fn mask(pins: &[PinId]) -> u32 {
    pins.iter()
        .filter(|&&p| p < 32)
        .fold(0, |acc, &p| acc | (1u32 << p))
}

fn bit(mask: u32, pin: PinId) -> bool {
    pin < 32 && mask & (1u32 << pin) != 0
}
