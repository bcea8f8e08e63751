//! Fuzz target: `FanCharDev::write`
//!
//! Feeds arbitrary byte strings to the boundary parser and then to a live
//! manager on the simulation backend.  The parser must agree with the
//! standard decimal parser, and no input may leave the fan without exactly
//! one owned line.
//!
//! cargo fuzz run fuzz_boundary_write

#![no_main]

use libfuzzer_sys::fuzz_target;
use rpifan::adapters::chardev::{FanCharDev, KBUF_SIZE, parse_config};
use rpifan::adapters::log_sink::LogEventSink;
use rpifan::adapters::sim::{SimGpio, SimPwmBus, SimPwmChip};
use rpifan::{BoardConfig, FanManager};

fuzz_target!(|data: &[u8]| {
    if let Ok(value) = parse_config(data) {
        assert!(data.len() <= KBUF_SIZE);
        let text = std::str::from_utf8(data).expect("accepted input is ASCII");
        let body = text.strip_suffix('\n').unwrap_or(text);
        assert_eq!(body.parse::<u8>().ok(), Some(value));
    }

    let board = BoardConfig::default();
    let gpio = SimGpio::new();
    let mut fan = FanManager::new(&board, gpio.clone(), SimPwmBus::new(), LogEventSink::new());
    fan.initialize().expect("free pins available");
    let mut chip = SimPwmChip::new("rpifan", &["ch0", "ch1"]);
    let _ = fan.probe(&mut chip);

    let mut dev = FanCharDev::new(fan);
    for chunk in data.chunks(KBUF_SIZE) {
        let _ = dev.write(chunk);
        let pin = dev.fan().config().pin();
        assert_eq!(gpio.owned_pins(), vec![pin]);
    }
});
