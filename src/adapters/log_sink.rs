//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing every [`FanEvent`] to the `log`
//! facade as a tagged line.  Cautions go out at `warn` level so they stand
//! out in the host's log.

use log::{info, warn};

use crate::app::events::FanEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`FanEvent`].
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &FanEvent) {
        match event {
            FanEvent::Initialized(config) => {
                info!("INIT | {} | byte={}", config, config.encode());
            }
            FanEvent::ConfigApplied { from, to } => {
                info!("CONFIG | {} -> {} | byte={}", from, to, to.encode());
            }
            FanEvent::ReservedPin(pin) => {
                warn!("CAUTION | GPIO_{} is reserved (ID_EEPROM)", pin);
            }
            FanEvent::ModulationIgnored(pin) => {
                warn!("CAUTION | GPIO_{} has no PWM channel, level ignored", pin);
            }
            FanEvent::ModulationDegraded { pin, cause } => {
                warn!("CAUTION | GPIO_{} on/off only: {}", pin, cause);
            }
            FanEvent::ModulationDeferred => {
                warn!("PWM | driver registration deferred");
            }
            FanEvent::ChannelAttached { label, pin } => {
                info!("PWM | '{}' attached on GPIO_{}", label, pin);
            }
            FanEvent::ChannelDetached { label, pin } => {
                info!("PWM | '{}' detached from GPIO_{}", label, pin);
            }
            FanEvent::TornDown(Some(pin)) => {
                info!("CLOSE | GPIO_{} released", pin);
            }
            FanEvent::TornDown(None) => {
                info!("CLOSE | no pin held");
            }
        }
    }
}
