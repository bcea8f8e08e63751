//! Integration tests for the character-device boundary.
//!
//! Drives the manager only through the text/control surface, the way a
//! user-space client would.

use super::mock_hw::{RecordingSink, Rig};

use rpifan::adapters::chardev::{
    BoundaryError, FanCharDev, IOCTL_READ_RAW_DUTY, IOCTL_WRITE_RAW_DUTY, KBUF_SIZE,
};
use rpifan::adapters::sim::{SimGpio, SimPwmBus, SimPwmChip};
use rpifan::error::FanError;

type SimDev = FanCharDev<SimGpio, SimPwmBus, RecordingSink>;

fn open() -> (SimDev, SimGpio, SimPwmChip) {
    let Rig { fan, gpio, chip, .. } = Rig::probed();
    (FanCharDev::new(fan), gpio, chip)
}

fn read_text(dev: &SimDev) -> String {
    let mut buf = [0u8; KBUF_SIZE];
    let n = dev.read(&mut buf).unwrap();
    String::from_utf8(buf[..n].to_vec()).unwrap()
}

#[test]
fn written_config_reads_back() {
    let (mut dev, gpio, _chip) = open();
    assert_eq!(read_text(&dev), "226");

    dev.write(b"108\n").unwrap();
    assert_eq!(read_text(&dev), "108");
    assert_eq!(gpio.owned_pins(), vec![12]);
}

#[test]
fn oversized_write_changes_nothing() {
    let (mut dev, gpio, _chip) = open();
    assert_eq!(dev.write(b"0108\n"), Err(BoundaryError::InvalidSize));
    assert_eq!(dev.write(b"abc"), Err(BoundaryError::Unparsable));
    assert_eq!(read_text(&dev), "226");
    assert_eq!(gpio.owned_pins(), vec![2]);
}

#[test]
fn raw_duty_control_needs_adaptive() {
    let (mut dev, _gpio, chip) = open();
    let mut arg = 1_000u64.to_le_bytes();
    assert_eq!(
        dev.control(IOCTL_WRITE_RAW_DUTY, &mut arg),
        Err(BoundaryError::Fan(FanError::NotInAdaptiveMode))
    );

    dev.write(b"13").unwrap();
    dev.control(IOCTL_WRITE_RAW_DUTY, &mut arg).unwrap();
    assert_eq!(chip.output("ch1").unwrap().duty_ns, 1_000);

    let mut out = [0u8; 8];
    dev.control(IOCTL_READ_RAW_DUTY, &mut out).unwrap();
    assert_eq!(u64::from_le_bytes(out), 1_000);
}

#[test]
fn session_remove_then_probe_again() {
    let (mut dev, _gpio, mut chip) = open();
    let script = b"write 108\nremove\nwrite 172\nread\nprobe\nwrite 172\nread\n";
    let mut out = Vec::new();
    dev.serve(&script[..], &mut out, Some(&mut chip)).unwrap();

    let text = String::from_utf8(out).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "ok");
    assert_eq!(lines[1], "ok");
    assert!(lines[2].starts_with("err "), "detached channel must refuse: {}", lines[2]);
    assert_eq!(lines[3], "108");
    assert_eq!(lines[4], "ok 2");
    assert_eq!(lines[5], "ok");
    assert_eq!(lines[6], "172");
}

#[test]
fn session_without_device_reports_probe_error() {
    let (mut dev, _gpio, _chip) = open();
    let mut out = Vec::new();
    dev.serve(&b"probe\nduty?\n"[..], &mut out, None::<&mut SimPwmChip>)
        .unwrap();
    assert_eq!(String::from_utf8(out).unwrap(), "err no PWM device\n0\n");
}
