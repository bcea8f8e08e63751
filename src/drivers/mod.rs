//! Fan output drivers: line ownership and PWM channels.

pub mod modulation;
pub mod pin_allocator;
