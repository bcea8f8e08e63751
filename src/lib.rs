//! rpifan library.
//!
//! Single-fan controller for Raspberry Pi class boards: one GPIO line
//! switches the fan, an optional hardware PWM channel on the same pin sets
//! its speed.  The configuration is a single byte (pin in the low five
//! bits, PWM level in the high three).
//!
//! Hardware access goes through the traits in [`app::ports`]; the
//! [`adapters`] module provides a simulation backend and, on Linux, a sysfs
//! backend.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod codec;
pub mod config;
pub mod drivers;
pub mod error;
pub mod logging;
pub mod pins;

pub use app::service::FanManager;
pub use codec::{FanConfig, PwmLevel};
pub use config::BoardConfig;
pub use error::FanError;
