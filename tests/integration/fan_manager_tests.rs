//! Integration tests for the FanManager → PinAllocator / Modulation chain.
//!
//! Every test runs the real manager against the simulation backend and
//! checks the observable hardware state: which lines are owned, which are
//! high, and what each PWM channel was last told.

use super::mock_hw::Rig;

use rpifan::app::events::FanEvent;
use rpifan::codec::{FanConfig, PwmLevel};
use rpifan::drivers::modulation::ChannelState;
use rpifan::error::{FanError, ModulationError, PinError};

const PERIOD: u64 = 50_000_000;

fn byte(pin: u8, level: PwmLevel) -> u8 {
    FanConfig::new(pin, level).encode()
}

// ── Startup ───────────────────────────────────────────────────

#[test]
fn startup_takes_lowest_free_pin_switched_off() {
    let rig = Rig::started();
    assert_eq!(rig.fan.config(), FanConfig::new(2, PwmLevel::Off));
    assert_eq!(rig.fan.config_byte(), 226);
    assert_eq!(rig.gpio.owned_pins(), vec![2]);
    assert!(rig.gpio.is_high(2));
    assert_eq!(rig.bus.registered().as_deref(), Some("rpifan_pwm"));
    assert!(rig.events().contains(&FanEvent::Initialized(FanConfig::new(2, PwmLevel::Off))));
}

#[test]
fn startup_skips_busy_pins() {
    let mut rig = Rig::new();
    for pin in 2..6 {
        rig.gpio.claim_externally(pin);
    }
    rig.fan.initialize().unwrap();
    assert_eq!(rig.fan.active_pin(), Some(6));
    assert_eq!(rig.fan.config().pin(), 6);
}

#[test]
fn startup_without_any_free_pin_fails() {
    let mut rig = Rig::new();
    for pin in 0..28 {
        rig.gpio.claim_externally(pin);
    }
    assert_eq!(rig.fan.initialize(), Err(FanError::Pin(PinError::NotFound)));
    assert!(!rig.fan.is_initialized());
    assert_eq!(rig.fan.set_config(12), Err(FanError::NotInitialized));
}

#[test]
fn deferred_registration_is_not_fatal() {
    let mut rig = Rig::new();
    rig.bus.refuse_registration();
    rig.fan.initialize().unwrap();
    assert!(rig.fan.is_initialized());
    assert!(rig.events().contains(&FanEvent::ModulationDeferred));
    assert_eq!(rig.bus.registered(), None);
}

// ── Reference scenario ────────────────────────────────────────

#[test]
fn switch_override_then_detach() {
    let mut rig = Rig::probed();

    // (12, 3): pin 2 handed over to 12 at 3/7 duty.
    rig.fan.set_config(byte(12, PwmLevel::Static(3))).unwrap();
    assert_eq!(rig.gpio.owned_pins(), vec![12]);
    assert!(!rig.gpio.is_high(2));
    assert!(rig.gpio.is_high(12));
    let out = rig.chip.output("ch0").unwrap();
    assert_eq!(out.duty_ns, PERIOD * 3 / 7);
    assert!(out.enabled);
    assert_eq!(rig.fan.config_byte(), byte(12, PwmLevel::Static(3)));

    // (12, adaptive) then a raw override.
    rig.fan.set_config(byte(12, PwmLevel::Adaptive)).unwrap();
    rig.fan.set_raw_duty(25_000_000).unwrap();
    assert_eq!(rig.fan.raw_duty(), 25_000_000);
    assert_eq!(rig.chip.output("ch0").unwrap().duty_ns, 25_000_000);

    // Channel gone: an in-place level change is refused.
    assert_eq!(rig.fan.detach_channel("ch0"), Some(12));
    let before = rig.fan.config_byte();
    assert_eq!(
        rig.fan.set_config(byte(12, PwmLevel::Static(5))),
        Err(FanError::Modulation(ModulationError::ChannelUnavailable(12)))
    );
    assert_eq!(rig.fan.config_byte(), before);
    assert_eq!(rig.gpio.owned_pins(), vec![12]);
    assert_eq!(rig.fan.raw_duty(), 0);
}

// ── Pin handoff ───────────────────────────────────────────────

#[test]
fn busy_target_leaves_old_pin_active() {
    let mut rig = Rig::started();
    rig.gpio.claim_externally(17);

    let err = rig.fan.set_config(byte(17, PwmLevel::Off)).unwrap_err();
    assert_eq!(err, FanError::Pin(PinError::AcquireFailed(17)));
    assert_eq!(rig.fan.config(), FanConfig::new(2, PwmLevel::Off));
    assert_eq!(rig.gpio.owned_pins(), vec![2]);
    assert!(rig.gpio.is_high(2));
}

#[test]
fn busy_target_can_be_taken_once_released() {
    let mut rig = Rig::started();
    rig.gpio.claim_externally(17);
    assert!(rig.fan.set_config(byte(17, PwmLevel::Off)).is_err());

    rig.gpio.release_externally(17);
    rig.fan.set_config(byte(17, PwmLevel::Off)).unwrap();
    assert_eq!(rig.gpio.owned_pins(), vec![17]);
    assert!(rig.gpio.is_high(17));
}

#[test]
fn undrivable_target_leaves_pwm_quiet() {
    let mut rig = Rig::probed();
    rig.gpio.break_line(12);

    let err = rig.fan.set_config(byte(12, PwmLevel::Static(3))).unwrap_err();
    assert_eq!(err, FanError::Pin(PinError::DriveFailed(12)));
    assert_eq!(rig.fan.config(), FanConfig::new(2, PwmLevel::Off));
    assert_eq!(rig.gpio.owned_pins(), vec![2]);
    assert!(rig.gpio.is_high(2));

    let out = rig.chip.output("ch0").unwrap();
    assert!(!out.enabled);
    assert_eq!(out.duty_ns, 0);
    assert_eq!(rig.fan.raw_duty(), 0);
}

#[test]
fn out_of_range_pin_is_rejected() {
    let mut rig = Rig::started();
    let before = rig.fan.config_byte();
    assert_eq!(
        rig.fan.set_config(30),
        Err(FanError::Pin(PinError::InvalidPin(30)))
    );
    assert_eq!(rig.fan.config_byte(), before);
    assert_eq!(rig.gpio.owned_pins(), vec![2]);
}

#[test]
fn same_pin_level_change_does_not_touch_the_line() {
    let mut rig = Rig::probed();
    rig.fan.set_config(byte(12, PwmLevel::Static(1))).unwrap();
    rig.gpio.clear_ops();

    rig.fan.set_config(byte(12, PwmLevel::Static(6))).unwrap();
    assert!(rig.gpio.ops().is_empty());
    assert_eq!(rig.chip.output("ch0").unwrap().duty_ns, PERIOD * 6 / 7);
}

#[test]
fn leaving_a_pwm_pin_quiesces_its_channel() {
    let mut rig = Rig::probed();
    rig.fan.set_config(byte(12, PwmLevel::Static(4))).unwrap();
    rig.fan.set_config(byte(13, PwmLevel::Static(2))).unwrap();

    let old = rig.chip.output("ch0").unwrap();
    assert!(!old.enabled);
    assert_eq!(old.duty_ns, 0);
    let new = rig.chip.output("ch1").unwrap();
    assert!(new.enabled);
    assert_eq!(new.duty_ns, PERIOD * 2 / 7);
    assert_eq!(rig.gpio.owned_pins(), vec![13]);
}

// ── Cautions ──────────────────────────────────────────────────

#[test]
fn reserved_pin_is_allowed_with_a_caution() {
    let mut rig = Rig::started();
    rig.fan.set_config(byte(0, PwmLevel::Off)).unwrap();
    assert_eq!(rig.fan.active_pin(), Some(0));
    assert!(rig.events().contains(&FanEvent::ReservedPin(0)));
}

#[test]
fn rejected_request_emits_no_caution() {
    let mut rig = Rig::probed();
    rig.gpio.claim_externally(0);
    rig.gpio.claim_externally(4);

    assert!(rig.fan.set_config(byte(0, PwmLevel::Off)).is_err());
    assert!(rig.fan.set_config(byte(4, PwmLevel::Static(3))).is_err());
    let cautions = rig.fan.sink().count(|e| {
        matches!(
            e,
            FanEvent::ReservedPin(_) | FanEvent::ModulationIgnored(_) | FanEvent::ConfigApplied { .. }
        )
    });
    assert_eq!(cautions, 0);
}

#[test]
fn level_on_plain_pin_is_ignored_with_a_caution() {
    let mut rig = Rig::probed();
    rig.fan.set_config(byte(4, PwmLevel::Static(3))).unwrap();
    assert!(rig.gpio.is_high(4));
    assert!(rig.events().contains(&FanEvent::ModulationIgnored(4)));
    assert_eq!(rig.fan.raw_duty(), 0);
}

#[test]
fn switch_to_detached_channel_degrades_to_on_off() {
    let mut rig = Rig::started();
    rig.fan.set_config(byte(12, PwmLevel::Static(3))).unwrap();

    assert_eq!(rig.fan.active_pin(), Some(12));
    assert!(rig.gpio.is_high(12));
    assert!(rig.events().contains(&FanEvent::ModulationDegraded {
        pin: 12,
        cause: ModulationError::ChannelUnavailable(12),
    }));
}

// ── Levels ────────────────────────────────────────────────────

#[test]
fn off_level_disables_channel() {
    let mut rig = Rig::probed();
    rig.fan.set_config(byte(12, PwmLevel::Static(6))).unwrap();
    rig.fan.set_config(byte(12, PwmLevel::Off)).unwrap();

    let out = rig.chip.output("ch0").unwrap();
    assert_eq!(out.duty_ns, 0);
    assert!(!out.enabled);
    assert!(rig.gpio.is_high(12));
}

#[test]
fn adaptive_never_overwrites_raw_duty() {
    let mut rig = Rig::probed();
    rig.fan.set_config(byte(12, PwmLevel::Adaptive)).unwrap();
    rig.fan.set_raw_duty(10_000_000).unwrap();

    rig.fan.set_config(byte(12, PwmLevel::Adaptive)).unwrap();
    assert_eq!(rig.fan.raw_duty(), 10_000_000);

    rig.fan.set_config(byte(12, PwmLevel::Static(5))).unwrap();
    rig.fan.set_config(byte(12, PwmLevel::Adaptive)).unwrap();
    assert_eq!(rig.fan.raw_duty(), 10_000_000);
}

#[test]
fn raw_duty_requires_adaptive_level() {
    let mut rig = Rig::probed();
    assert_eq!(rig.fan.set_raw_duty(1), Err(FanError::NotInAdaptiveMode));
    rig.fan.set_config(byte(12, PwmLevel::Static(2))).unwrap();
    assert_eq!(rig.fan.set_raw_duty(1), Err(FanError::NotInAdaptiveMode));
}

#[test]
fn raw_duty_on_plain_pin_is_unavailable() {
    let mut rig = Rig::started();
    rig.fan.set_config(byte(5, PwmLevel::Adaptive)).unwrap();
    assert_eq!(
        rig.fan.set_raw_duty(100),
        Err(FanError::Modulation(ModulationError::ChannelUnavailable(5)))
    );
    assert_eq!(rig.fan.raw_duty(), 0);
}

// ── Attach lifecycle ──────────────────────────────────────────

#[test]
fn late_probe_applies_committed_config() {
    let mut rig = Rig::started();
    rig.fan.set_config(byte(12, PwmLevel::Static(3))).unwrap();
    assert_eq!(rig.chip.output("ch0"), None);

    assert_eq!(rig.probe(), Ok(2));
    let out = rig.chip.output("ch0").unwrap();
    assert_eq!(out.duty_ns, PERIOD * 3 / 7);
    assert!(out.enabled);
    assert!(!rig.chip.output("ch1").unwrap().enabled);
}

#[test]
fn reattach_restores_state_not_rejected_update() {
    let mut rig = Rig::probed();
    rig.fan.set_config(byte(12, PwmLevel::Static(2))).unwrap();
    rig.fan.detach_channel("ch0");
    assert!(rig.fan.set_config(byte(12, PwmLevel::Static(6))).is_err());

    let handle = rig.chip.handle("ch0");
    assert_eq!(rig.fan.attach_channel("ch0", handle), Ok(12));
    assert_eq!(rig.chip.output("ch0").unwrap().duty_ns, PERIOD * 2 / 7);
}

#[test]
fn mislabelled_device_is_rejected() {
    let mut rig = Rig::started();
    let mut other = rpifan::adapters::sim::SimPwmChip::new("someone-else", &["ch0", "ch1"]);
    assert_eq!(
        rig.fan.probe(&mut other),
        Err(FanError::Modulation(ModulationError::NoDevice))
    );
}

#[test]
fn deferred_channel_attaches_nothing() {
    let mut rig = Rig::started();
    rig.chip.defer("ch1");
    assert_eq!(rig.probe(), Err(FanError::Modulation(ModulationError::Deferred)));
    assert_eq!(rig.chip.apply_count("ch0"), 0);

    rig.chip.ready("ch1");
    assert_eq!(rig.probe(), Ok(2));
}

#[test]
fn remove_detaches_every_channel() {
    let mut rig = Rig::probed();
    rig.fan.remove();
    let detached = rig
        .fan
        .sink()
        .count(|e| matches!(e, FanEvent::ChannelDetached { .. }));
    assert_eq!(detached, 2);
}

// ── Teardown ──────────────────────────────────────────────────

#[test]
fn teardown_releases_everything_once() {
    let mut rig = Rig::probed();
    rig.fan.set_config(byte(12, PwmLevel::Static(3))).unwrap();

    rig.fan.teardown();
    assert!(rig.gpio.owned_pins().is_empty());
    assert!(!rig.gpio.is_high(12));
    assert!(!rig.chip.output("ch0").unwrap().enabled);
    assert_eq!(rig.bus.registered(), None);

    rig.fan.teardown();
    let torn = rig.fan.sink().count(|e| matches!(e, FanEvent::TornDown(_)));
    assert_eq!(torn, 1);
    assert!(rig.events().contains(&FanEvent::TornDown(Some(12))));
}

#[test]
fn teardown_after_failed_start_lets_go_of_channels() {
    let mut rig = Rig::new();
    assert_eq!(rig.probe(), Ok(2));
    for pin in 0..28 {
        rig.gpio.claim_externally(pin);
    }
    assert!(rig.fan.initialize().is_err());

    rig.fan.teardown();
    let attached = rig
        .fan
        .modulation()
        .channels()
        .iter()
        .filter(|ch| ch.state() != ChannelState::Detached)
        .count();
    assert_eq!(attached, 0);
    assert!(!rig.chip.output("ch0").unwrap().enabled);
    assert!(!rig.chip.output("ch1").unwrap().enabled);
}

#[test]
fn dropping_the_manager_releases_the_pin() {
    let Rig { fan, gpio, .. } = Rig::started();
    assert_eq!(gpio.owned_pins(), vec![2]);
    drop(fan);
    assert!(gpio.owned_pins().is_empty());
}
