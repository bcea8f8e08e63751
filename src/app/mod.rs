//! Application core: fan logic behind port traits.
//!
//! The [`service::FanManager`] owns the live configuration and drives the
//! pin allocator and PWM channels.  All interaction with the host happens
//! through the **port traits** in [`ports`], so the core runs unchanged on
//! the simulation backend in tests.

pub mod events;
pub mod ports;
pub mod service;
