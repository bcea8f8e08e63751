//! Linux sysfs backend.
//!
//! GPIO lines through `/sys/class/gpio` and PWM channels through
//! `/sys/class/pwm/pwmchipN`.  Every attribute is a small text file, so the
//! whole adapter is plain `std::fs` reads and writes; the roots come from
//! [`SysfsConfig`] and point at a temporary tree in tests.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use embedded_hal::digital::{self, ErrorKind, ErrorType, OutputPin};
use log::{debug, warn};

use crate::app::ports::{GpioError, GpioPort, PwmBus, PwmChannel, PwmDevice, PwmError, PwmState};
use crate::config::{BoardConfig, Label, SysfsConfig};
use crate::pins::PinId;

fn write_attr(path: &Path, value: impl AsRef<[u8]>) -> io::Result<()> {
    fs::write(path, value).inspect_err(|e| debug!("sysfs write {} failed: {}", path.display(), e))
}

// ── GPIO ──────────────────────────────────────────────────────

/// GPIO controller behind `/sys/class/gpio`.
pub struct SysfsGpio {
    root: PathBuf,
}

impl SysfsGpio {
    pub fn new(config: &SysfsConfig) -> Self {
        Self {
            root: config.gpio_root.clone(),
        }
    }

    fn line_dir(&self, pin: PinId) -> PathBuf {
        self.root.join(format!("gpio{}", pin))
    }
}

impl GpioPort for SysfsGpio {
    type Line = SysfsLine;

    fn request(&mut self, pin: PinId, label: &str) -> Result<SysfsLine, GpioError> {
        write_attr(&self.root.join("export"), pin.to_string()).map_err(|e| match e.kind() {
            io::ErrorKind::ResourceBusy => GpioError::Busy,
            io::ErrorKind::InvalidInput | io::ErrorKind::PermissionDenied => GpioError::Rejected,
            _ => GpioError::Io,
        })?;

        let dir = self.line_dir(pin);
        if write_attr(&dir.join("direction"), "out").is_err() {
            let _ = write_attr(&self.root.join("unexport"), pin.to_string());
            return Err(GpioError::Rejected);
        }
        debug!("sysfs: GPIO_{} exported for '{}'", pin, label);
        Ok(SysfsLine { pin, dir })
    }

    fn free(&mut self, line: SysfsLine) {
        if let Err(e) = write_attr(&self.root.join("unexport"), line.pin.to_string()) {
            warn!("GPIO_{} unexport failed: {}", line.pin, e);
        }
    }
}

/// An exported output line.
pub struct SysfsLine {
    pin: PinId,
    dir: PathBuf,
}

/// Failed write to a line's `value` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SysfsLineError(pub io::ErrorKind);

impl digital::Error for SysfsLineError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

impl ErrorType for SysfsLine {
    type Error = SysfsLineError;
}

impl OutputPin for SysfsLine {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        write_attr(&self.dir.join("value"), "0").map_err(|e| SysfsLineError(e.kind()))
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        write_attr(&self.dir.join("value"), "1").map_err(|e| SysfsLineError(e.kind()))
    }
}

impl SysfsLine {
    pub fn pin(&self) -> PinId {
        self.pin
    }
}

// ── PWM ───────────────────────────────────────────────────────

/// A PWM chip under `/sys/class/pwm`.
///
/// The device label is read from the chip's device-tree node
/// (`device/of_node/label`) when the chip is opened.
pub struct SysfsPwmChip {
    chip: PathBuf,
    label: Option<String>,
    channels: Vec<(Label, u32)>,
}

impl SysfsPwmChip {
    pub fn open(board: &BoardConfig) -> Self {
        let chip = board.sysfs.pwm_chip.clone();
        let label = fs::read_to_string(chip.join("device/of_node/label"))
            .ok()
            .map(|s| s.trim_end_matches(['\0', '\n']).to_owned());
        let channels = board
            .pwm_channels
            .iter()
            .map(|ch| (ch.label.clone(), ch.index))
            .collect();
        Self { chip, label, channels }
    }
}

impl PwmDevice for SysfsPwmChip {
    type Channel = SysfsPwmChannel;

    fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    fn get(&mut self, channel_label: &str) -> Result<SysfsPwmChannel, PwmError> {
        if !self.chip.is_dir() {
            return Err(PwmError::Deferred);
        }
        let &(_, index) = self
            .channels
            .iter()
            .find(|(label, _)| label == channel_label)
            .ok_or(PwmError::NotFound)?;

        let dir = self.chip.join(format!("pwm{}", index));
        if !dir.is_dir() {
            write_attr(&self.chip.join("export"), index.to_string()).map_err(|_| PwmError::Io)?;
            if !dir.is_dir() {
                return Err(PwmError::Deferred);
            }
        }
        debug!("sysfs: PWM channel '{}' is {}", channel_label, dir.display());
        Ok(SysfsPwmChannel {
            chip: self.chip.clone(),
            dir,
            index,
            last: None,
        })
    }
}

/// An exported PWM channel.  Unexported when dropped.
pub struct SysfsPwmChannel {
    chip: PathBuf,
    dir: PathBuf,
    index: u32,
    last: Option<PwmState>,
}

impl SysfsPwmChannel {
    fn write_all(&self, state: &PwmState) -> io::Result<()> {
        let last = self.last;
        let polarity_changed = last.is_none_or(|l| l.polarity != state.polarity);
        let period_changed = last.is_none_or(|l| l.period_ns != state.period_ns);

        // The kernel refuses polarity changes on a running channel and a
        // duty longer than the period.
        if polarity_changed || !state.enabled {
            write_attr(&self.dir.join("enable"), "0")?;
        }
        if polarity_changed {
            write_attr(&self.dir.join("polarity"), state.polarity.as_sysfs())?;
        }
        if period_changed {
            write_attr(&self.dir.join("duty_cycle"), "0")?;
            write_attr(&self.dir.join("period"), state.period_ns.to_string())?;
        }
        write_attr(&self.dir.join("duty_cycle"), state.duty_ns.to_string())?;
        if state.enabled {
            write_attr(&self.dir.join("enable"), "1")?;
        }
        Ok(())
    }
}

impl PwmChannel for SysfsPwmChannel {
    fn apply(&mut self, state: &PwmState) -> Result<(), PwmError> {
        self.write_all(state).map_err(|_| PwmError::Io)?;
        self.last = Some(*state);
        Ok(())
    }
}

impl Drop for SysfsPwmChannel {
    fn drop(&mut self) {
        let _ = write_attr(&self.chip.join("unexport"), self.index.to_string());
    }
}

// ── Bus ───────────────────────────────────────────────────────

/// Registration succeeds once the PWM chip exists.
pub struct SysfsPwmBus {
    chip: PathBuf,
}

impl SysfsPwmBus {
    pub fn new(config: &SysfsConfig) -> Self {
        Self {
            chip: config.pwm_chip.clone(),
        }
    }
}

impl PwmBus for SysfsPwmBus {
    type Channel = SysfsPwmChannel;

    fn register(&mut self, driver: &str) -> Result<(), PwmError> {
        if self.chip.is_dir() {
            debug!("sysfs: '{}' bound to {}", driver, self.chip.display());
            Ok(())
        } else {
            Err(PwmError::Deferred)
        }
    }

    fn unregister(&mut self, driver: &str) {
        debug!("sysfs: '{}' unbound", driver);
    }
}
