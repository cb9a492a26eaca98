//! CurtainController against the recording GPIO mock.

use crate::mock_hw::{GpioCall, MockHardware, RecordingSink};

use greenhouse_edge::app::events::AppEvent;
use greenhouse_edge::app::ports::PinDirection;
use greenhouse_edge::curtain::{CurtainController, CurtainState, CurtainType};
use greenhouse_edge::pins::{MOTOR_DISABLE, MOTOR_ENABLE, SIDE_CURTAIN, TOP_CURTAIN};

fn initialized() -> (CurtainController, MockHardware, RecordingSink) {
    let mut ctl = CurtainController::new(2_000);
    let mut hw = MockHardware::new();
    let mut sink = RecordingSink::new();
    ctl.initialize(&mut hw, &mut sink).unwrap();
    hw.clear_calls();
    (ctl, hw, sink)
}

#[test]
fn initialize_exports_all_eight_pins_as_outputs() {
    let mut ctl = CurtainController::new(2_000);
    let mut hw = MockHardware::new();
    ctl.initialize(&mut hw, &mut RecordingSink::new()).unwrap();

    for pin in TOP_CURTAIN.all().into_iter().chain(SIDE_CURTAIN.all()) {
        assert!(hw.gpio_calls.contains(&GpioCall::Export(pin)), "pin {pin} exported");
        assert!(
            hw.gpio_calls.contains(&GpioCall::Direction(pin, PinDirection::Out)),
            "pin {pin} is an output"
        );
    }
    assert_eq!(hw.level(TOP_CURTAIN.enable), Some(MOTOR_DISABLE));
    assert_eq!(hw.level(SIDE_CURTAIN.enable2), Some(MOTOR_DISABLE));
}

#[test]
fn open_top_goes_opening_then_open() {
    let (mut ctl, mut hw, mut sink) = initialized();

    ctl.open(CurtainType::Top, 0, &mut hw, &mut sink).unwrap();
    assert_eq!(ctl.state(CurtainType::Top), CurtainState::Opening);
    assert_eq!(hw.level(TOP_CURTAIN.dir1), Some(true));
    assert_eq!(hw.level(TOP_CURTAIN.dir2), Some(false));
    assert_eq!(hw.level(TOP_CURTAIN.enable), Some(MOTOR_ENABLE));
    assert_eq!(hw.level(TOP_CURTAIN.enable2), Some(MOTOR_ENABLE));

    ctl.poll(2_000, &mut sink);
    assert_eq!(ctl.state(CurtainType::Top), CurtainState::Open);

    assert_eq!(
        sink.events,
        vec![
            AppEvent::CurtainStateChanged {
                curtain: CurtainType::Top,
                from: CurtainState::Stopped,
                to: CurtainState::Opening,
            },
            AppEvent::CurtainStateChanged {
                curtain: CurtainType::Top,
                from: CurtainState::Opening,
                to: CurtainState::Open,
            },
        ]
    );
}

#[test]
fn failed_actuation_goes_opening_then_error() {
    let (mut ctl, mut hw, mut sink) = initialized();
    hw.failing_pins.push(TOP_CURTAIN.enable2);

    assert!(ctl.open(CurtainType::Top, 0, &mut hw, &mut sink).is_err());
    assert_eq!(ctl.state(CurtainType::Top), CurtainState::Error);
    assert_eq!(
        sink.count(|e| matches!(
            e,
            AppEvent::CurtainStateChanged {
                to: CurtainState::Opening,
                ..
            }
        )),
        1
    );

    ctl.poll(10_000, &mut sink);
    assert_eq!(ctl.state(CurtainType::Top), CurtainState::Error, "Error is sticky");
}

#[test]
fn close_drives_reverse_direction() {
    let (mut ctl, mut hw, mut sink) = initialized();
    ctl.close(CurtainType::Side, 0, &mut hw, &mut sink).unwrap();
    assert_eq!(
        hw.gpio_calls,
        vec![
            GpioCall::Set(SIDE_CURTAIN.dir1, false),
            GpioCall::Set(SIDE_CURTAIN.dir2, true),
            GpioCall::Set(SIDE_CURTAIN.enable, MOTOR_ENABLE),
            GpioCall::Set(SIDE_CURTAIN.enable2, MOTOR_ENABLE),
        ]
    );
    ctl.poll(2_000, &mut sink);
    assert_eq!(ctl.state(CurtainType::Side), CurtainState::Closed);
}

#[test]
fn pause_releases_both_enables_only() {
    let (mut ctl, mut hw, mut sink) = initialized();
    ctl.open(CurtainType::Top, 0, &mut hw, &mut sink).unwrap();
    hw.clear_calls();

    ctl.pause(CurtainType::Top, &mut hw, &mut sink).unwrap();
    assert_eq!(
        hw.gpio_calls,
        vec![
            GpioCall::Set(TOP_CURTAIN.enable, MOTOR_DISABLE),
            GpioCall::Set(TOP_CURTAIN.enable2, MOTOR_DISABLE),
        ]
    );
    assert_eq!(ctl.state(CurtainType::Top), CurtainState::Paused);
}

#[test]
fn resume_after_paused_close_keeps_closing() {
    let (mut ctl, mut hw, mut sink) = initialized();
    ctl.close(CurtainType::Top, 0, &mut hw, &mut sink).unwrap();
    ctl.pause(CurtainType::Top, &mut hw, &mut sink).unwrap();
    ctl.resume(CurtainType::Top, 500, &mut hw, &mut sink).unwrap();

    assert_eq!(ctl.state(CurtainType::Top), CurtainState::Closing);
    assert_eq!(hw.level(TOP_CURTAIN.dir2), Some(true));
    ctl.poll(2_500, &mut sink);
    assert_eq!(ctl.state(CurtainType::Top), CurtainState::Closed);
}
