//! Character-device boundary.
//!
//! The user-facing surface of the fan: a one-byte configuration exchanged
//! as ASCII decimal text, plus two control codes for the raw duty override.
//!
//! ```text
//!   read   ──▶ "108"            (GPIO_12, PWM_MODE_3)
//!   write  ◀── "226\n"          (GPIO_2,  off)
//!   control(IOCTL_WRITE_RAW_DUTY, u64 LE)   adaptive level only
//!   control(IOCTL_READ_RAW_DUTY,  u64 LE)
//! ```
//!
//! [`FanCharDev::serve`] wraps the same calls in a line protocol so the
//! host binary can be driven from a terminal or a pipe.

use std::io::{self, BufRead, Write};

use log::{debug, info, warn};

use crate::app::ports::{EventSink, GpioPort, PwmBus, PwmDevice};
use crate::app::service::FanManager;
use crate::error::FanError;

/// Size of the transfer buffer; "255" plus terminator.
pub const KBUF_SIZE: usize = 4;

/// Control code magic, as in `_IOC_TYPE`.
pub const IOCTL_MAGIC: u8 = b'F';

const IOC_WRITE: u32 = 1;
const IOC_READ: u32 = 2;

const fn ioc(dir: u32, nr: u8, size: usize) -> u32 {
    (dir << 30) | ((size as u32) << 16) | ((IOCTL_MAGIC as u32) << 8) | nr as u32
}

/// Set the raw duty (u64 nanoseconds, little endian).
pub const IOCTL_WRITE_RAW_DUTY: u32 = ioc(IOC_WRITE, 1, size_of::<u64>());
/// Read the live duty (u64 nanoseconds, little endian).
pub const IOCTL_READ_RAW_DUTY: u32 = ioc(IOC_READ, 2, size_of::<u64>());

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryError {
    /// Input longer than [`KBUF_SIZE`], or output buffer too small.
    InvalidSize,
    /// Input is not a decimal `u8`.
    Unparsable,
    /// Control code not recognised.
    UnknownCommand(u32),
    /// The fan rejected the request.
    Fan(FanError),
}

impl core::fmt::Display for BoundaryError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::InvalidSize => write!(f, "invalid size"),
            Self::Unparsable => write!(f, "unparsable value"),
            Self::UnknownCommand(code) => write!(f, "unknown command {:#010x}", code),
            Self::Fan(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for BoundaryError {}

impl From<FanError> for BoundaryError {
    fn from(e: FanError) -> Self {
        Self::Fan(e)
    }
}

// ── Parsing ───────────────────────────────────────────────────

/// Parse a decimal `u8` the way the kernel's `kstrtou8` does: optional
/// leading `+`, one optional trailing newline, nothing else.
pub fn parse_config(bytes: &[u8]) -> Result<u8, BoundaryError> {
    if bytes.len() > KBUF_SIZE {
        return Err(BoundaryError::InvalidSize);
    }
    let body = bytes.strip_suffix(b"\n").unwrap_or(bytes);
    let digits = body.strip_prefix(b"+").unwrap_or(body);
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return Err(BoundaryError::Unparsable);
    }
    let value = digits
        .iter()
        .try_fold(0u8, |acc, &d| acc.checked_mul(10)?.checked_add(d - b'0'))
        .ok_or(BoundaryError::Unparsable)?;
    Ok(value)
}

// ── Device ────────────────────────────────────────────────────

/// Boundary wrapper around one [`FanManager`].
pub struct FanCharDev<G: GpioPort, B: PwmBus, S: EventSink> {
    fan: FanManager<G, B, S>,
}

impl<G: GpioPort, B: PwmBus, S: EventSink> FanCharDev<G, B, S> {
    pub fn new(fan: FanManager<G, B, S>) -> Self {
        Self { fan }
    }

    pub fn fan(&self) -> &FanManager<G, B, S> {
        &self.fan
    }

    pub fn fan_mut(&mut self) -> &mut FanManager<G, B, S> {
        &mut self.fan
    }

    /// Current configuration byte as decimal text.  Returns the number of
    /// bytes written to `buf`.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize, BoundaryError> {
        let text = self.fan.config_byte().to_string();
        let out = buf.get_mut(..text.len()).ok_or(BoundaryError::InvalidSize)?;
        out.copy_from_slice(text.as_bytes());
        debug!("Data read successfully: {}", text);
        Ok(text.len())
    }

    /// Parse and apply a configuration byte.  Returns the number of bytes
    /// consumed.
    pub fn write(&mut self, bytes: &[u8]) -> Result<usize, BoundaryError> {
        let byte = parse_config(bytes).inspect_err(|e| warn!("write rejected: {}", e))?;
        self.fan.set_config(byte)?;
        Ok(bytes.len())
    }

    /// Raw duty control codes.
    pub fn control(&mut self, code: u32, arg: &mut [u8; 8]) -> Result<(), BoundaryError> {
        match code {
            IOCTL_WRITE_RAW_DUTY => {
                let duty_ns = u64::from_le_bytes(*arg);
                self.fan.set_raw_duty(duty_ns)?;
            }
            IOCTL_READ_RAW_DUTY => {
                *arg = self.fan.raw_duty().to_le_bytes();
            }
            other => return Err(BoundaryError::UnknownCommand(other)),
        }
        Ok(())
    }

    /// Serve the line protocol until `quit` or end of input.
    ///
    /// | Command        | Reply               |
    /// |----------------|---------------------|
    /// | `read`         | configuration byte  |
    /// | `write <text>` | `ok`                |
    /// | `duty <ns>`    | `ok`                |
    /// | `duty?`        | live duty in ns     |
    /// | `probe`        | `ok <channels>`     |
    /// | `remove`       | `ok`                |
    /// | `quit`         | (stops)             |
    ///
    /// Failures answer `err <reason>` and the session continues.
    pub fn serve<R, W, D>(&mut self, input: R, mut output: W, mut device: Option<&mut D>) -> io::Result<()>
    where
        R: BufRead,
        W: Write,
        D: PwmDevice<Channel = B::Channel>,
    {
        for line in input.lines() {
            let line = line?;
            let (cmd, arg) = match line.trim().split_once(' ') {
                Some((cmd, arg)) => (cmd, arg.trim()),
                None => (line.trim(), ""),
            };

            let reply = match cmd {
                "" => continue,
                "quit" => break,
                "read" => {
                    let mut buf = [0u8; KBUF_SIZE];
                    self.read(&mut buf)
                        .map(|n| String::from_utf8_lossy(&buf[..n]).into_owned())
                }
                "write" => self.write(arg.as_bytes()).map(|_| "ok".to_owned()),
                "duty" => match arg.parse::<u64>() {
                    Ok(duty) => {
                        let mut raw = duty.to_le_bytes();
                        self.control(IOCTL_WRITE_RAW_DUTY, &mut raw).map(|()| "ok".to_owned())
                    }
                    Err(_) => Err(BoundaryError::Unparsable),
                },
                "duty?" => {
                    let mut raw = [0u8; 8];
                    self.control(IOCTL_READ_RAW_DUTY, &mut raw)
                        .map(|()| u64::from_le_bytes(raw).to_string())
                }
                "probe" => match device.as_deref_mut() {
                    Some(dev) => self
                        .fan
                        .probe(dev)
                        .map(|n| format!("ok {}", n))
                        .map_err(BoundaryError::from),
                    None => Ok("err no PWM device".to_owned()),
                },
                "remove" => {
                    self.fan.remove();
                    Ok("ok".to_owned())
                }
                _ => Ok(format!("err unknown command '{}'", cmd)),
            };

            match reply {
                Ok(text) => writeln!(output, "{}", text)?,
                Err(e) => writeln!(output, "err {}", e)?,
            }
            output.flush()?;
        }
        info!("Session closed");
        Ok(())
    }
}
