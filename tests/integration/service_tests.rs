//! AppService end to end: mock hardware, scripted broker, manual clock.

use crate::mock_hw::{ManualClock, MockHardware, MockTransport, RecordingSink};

use greenhouse_edge::app::commands::CurtainAction;
use greenhouse_edge::app::events::AppEvent;
use greenhouse_edge::app::ports::{Climate, Clock};
use greenhouse_edge::app::service::AppService;
use greenhouse_edge::config::SystemConfig;
use greenhouse_edge::curtain::{CurtainState, CurtainType};
use greenhouse_edge::decision::{DecisionState, OperationType};
use greenhouse_edge::error::{Error, PolicyRejection};
use greenhouse_edge::mqtt::codec::{Packet, QoS, build_publish};
use greenhouse_edge::mqtt::ConnectionState;
use greenhouse_edge::pins::{MOTOR_DISABLE, MOTOR_ENABLE, SIDE_CURTAIN, TOP_CURTAIN};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const CONNACK_OK: [u8; 4] = [0x20, 0x02, 0x00, 0x00];
const SET_TOPIC: &str = "/sys/k1zfks5ATvF/rk3588/thing/service/property/set";
const POST_TOPIC: &str = "/sys/k1zfks5ATvF/rk3588/thing/event/property/post";
const STEP_MS: u64 = 100;

struct Rig {
    svc: AppService<MockTransport>,
    clock: ManualClock,
    hw: MockHardware,
    sink: RecordingSink,
}

impl Rig {
    /// Started, connected at t=0, call history cleared.
    fn connected() -> Self {
        let mut rig = Self::started(MockHardware::new());
        rig.svc.mqtt_mut().transport_mut().push_inbound(&CONNACK_OK);
        rig.tick();
        assert!(rig.svc.mqtt().is_connected());
        rig.svc.mqtt_mut().transport_mut().clear_written();
        rig.hw.clear_calls();
        rig.sink.clear();
        rig
    }

    fn started(mut hw: MockHardware) -> Self {
        let mut cfg = SystemConfig::default();
        cfg.device.device_secret = "test-secret".into();
        let clock = ManualClock::new();
        let mut sink = RecordingSink::new();
        let mut svc = AppService::new(&cfg, MockTransport::new(), 1_700_000_000_000).unwrap();
        svc.start(&clock, &mut hw, &mut sink);
        Self {
            svc,
            clock,
            hw,
            sink,
        }
    }

    fn tick(&mut self) {
        self.svc.tick(&self.clock, &mut self.hw, &mut self.sink);
    }

    /// Tick every `STEP_MS` until the clock reads `t_ms`.
    fn run_until(&mut self, t_ms: u64) {
        while self.clock.monotonic_ms() < t_ms {
            self.clock.advance(STEP_MS);
            self.tick();
        }
    }

    fn push_set(&mut self, json: &str) {
        let frame = build_publish(SET_TOPIC, json.as_bytes(), QoS::AtMostOnce, 0, false).unwrap();
        self.svc.mqtt_mut().transport_mut().push_inbound(&frame);
    }

    fn locks(&self) -> Vec<bool> {
        self.sink
            .events
            .iter()
            .filter_map(|e| match e {
                AppEvent::ManualControlLocked(l) => Some(*l),
                _ => None,
            })
            .collect()
    }

    /// JSON bodies of every PUBLISH sent to the post topic.
    fn telemetry_posts(&self) -> Vec<Value> {
        self.svc
            .mqtt()
            .transport()
            .written_frames()
            .iter()
            .filter_map(|f| match Packet::parse(f) {
                Ok(Packet::Publish { topic, payload, .. }) if topic == POST_TOPIC => {
                    serde_json::from_slice(&payload).ok()
                }
                _ => None,
            })
            .collect()
    }
}

// ── Lifecycle ─────────────────────────────────────────────────

#[test]
fn start_initialises_curtains_and_connects() {
    let rig = Rig::started(MockHardware::new());
    assert!(rig.svc.curtains().is_initialized());
    assert_eq!(rig.svc.mqtt().state(), ConnectionState::Connecting);
    assert!(rig.sink.contains(&AppEvent::Started));
    assert_eq!(rig.hw.level(TOP_CURTAIN.enable), Some(MOTOR_DISABLE));
}

#[test]
fn curtain_init_failure_does_not_stop_the_service() {
    let mut hw = MockHardware::new();
    hw.failing_pins.push(SIDE_CURTAIN.dir2);
    let mut rig = Rig::started(hw);

    assert!(!rig.svc.curtains().is_initialized());
    assert_eq!(rig.svc.mqtt().state(), ConnectionState::Connecting);

    let result = rig.svc.manual_curtain(
        CurtainType::Side,
        CurtainAction::Open,
        0,
        &mut rig.hw,
        &mut rig.sink,
    );
    assert_eq!(result, Err(Error::Rejected(PolicyRejection::Uninitialized)));
}

#[test]
fn shutdown_disconnects_and_releases_motors() {
    let mut rig = Rig::connected();
    rig.svc.shutdown(&mut rig.hw, &mut rig.sink);

    assert_eq!(rig.svc.mqtt().state(), ConnectionState::Disconnected);
    assert_eq!(rig.svc.mqtt().transport().written, vec![0xE0, 0x00]);
    for pin in [TOP_CURTAIN.enable, TOP_CURTAIN.enable2, SIDE_CURTAIN.enable, SIDE_CURTAIN.enable2] {
        assert_eq!(rig.hw.level(pin), Some(MOTOR_DISABLE), "GPIO{pin} released");
    }
}

#[test]
fn raised_stop_flag_shuts_down_before_ticking() {
    let mut rig = Rig::connected();
    let stop = AtomicBool::new(true);
    rig.svc.run_until_stopped(
        &rig.clock,
        &mut rig.hw,
        &mut rig.sink,
        Duration::from_millis(1),
        &stop,
    );

    assert_eq!(rig.svc.tick_count(), 1);
    assert_eq!(rig.svc.mqtt().state(), ConnectionState::Disconnected);
    assert_eq!(rig.svc.mqtt().transport().written, vec![0xE0, 0x00]);
}

#[test]
fn stop_from_another_thread_ends_the_loop() {
    let mut rig = Rig::connected();
    let stop = Arc::new(AtomicBool::new(false));
    let raiser = {
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            stop.store(true, Ordering::Release);
        })
    };

    rig.svc.run_until_stopped(
        &rig.clock,
        &mut rig.hw,
        &mut rig.sink,
        Duration::from_millis(1),
        &stop,
    );
    raiser.join().unwrap();

    assert!(rig.svc.tick_count() > 1);
    assert_eq!(rig.svc.mqtt().state(), ConnectionState::Disconnected);
    for pin in [TOP_CURTAIN.enable, TOP_CURTAIN.enable2, SIDE_CURTAIN.enable, SIDE_CURTAIN.enable2] {
        assert_eq!(rig.hw.level(pin), Some(MOTOR_DISABLE), "GPIO{pin} released");
    }
}

// ── Telemetry ─────────────────────────────────────────────────

#[test]
fn telemetry_goes_out_on_the_report_interval() {
    let mut rig = Rig::connected();
    rig.hw.climate = Ok(Climate {
        temperature_c: 21.5,
        humidity_pct: 60.0,
    });

    rig.run_until(9_900);
    assert!(rig.telemetry_posts().is_empty());

    rig.run_until(10_000);
    let posts = rig.telemetry_posts();
    assert_eq!(posts.len(), 1);
    let params = &posts[0]["params"];
    assert_eq!(params["temperature"], 21.5);
    assert_eq!(params["Humidity"], 60.0);
    // No light reading or PWM write yet: defaults.
    assert_eq!(params["LightLux"], 500);
    assert_eq!(params["pwm"], 50);
    assert!(rig.sink.contains(&AppEvent::TelemetryPublished(true)));

    rig.run_until(20_000);
    assert_eq!(rig.telemetry_posts().len(), 2);
}

// ── Command dispatch ──────────────────────────────────────────

#[test]
fn pwm_command_sets_duty_cycle() {
    let mut rig = Rig::connected();
    rig.push_set(r#"{"id":"1","method":"thing.service.property.set","params":{"pwmDutyCycle":75}}"#);
    rig.run_until(STEP_MS);

    assert_eq!(rig.hw.pwm_duty, Some(75));
    assert_eq!(
        rig.sink.count(|e| matches!(e, AppEvent::CommandReceived { .. })),
        1
    );
}

#[test]
fn out_of_range_pwm_is_ignored() {
    let mut rig = Rig::connected();
    rig.push_set(r#"{"id":"2","method":"thing.service.property.set","params":{"pwmDutyCycle":150}}"#);
    rig.run_until(STEP_MS);

    assert!(rig.hw.pwm_calls.is_empty());
    assert_eq!(rig.hw.pwm_duty, None);
}

#[test]
fn curtain_command_drives_side_curtain() {
    let mut rig = Rig::connected();
    rig.push_set(r#"{"id":"3","method":"thing.service.property.set","params":{"curtainSideOpen":true}}"#);
    rig.run_until(STEP_MS);

    assert_eq!(rig.svc.curtains().state(CurtainType::Side), CurtainState::Opening);
    assert_eq!(rig.hw.level(SIDE_CURTAIN.dir1), Some(true));

    rig.run_until(2_100);
    assert_eq!(rig.svc.curtains().state(CurtainType::Side), CurtainState::Open);
}

#[test]
fn soil_humidity_is_stored_not_dispatched() {
    let mut rig = Rig::connected();
    rig.push_set(r#"{"items":{"soilHumidity":{"value":42.5}},"method":"x","params":{"pwmDutyCycle":10}}"#);
    rig.run_until(STEP_MS);

    assert_eq!(rig.svc.soil_humidity(), Some(42.5));
    assert!(rig.hw.pwm_calls.is_empty());
    assert_eq!(
        rig.sink.count(|e| matches!(e, AppEvent::CommandReceived { .. })),
        0
    );
}

// ── Light decision through the loop ───────────────────────────

#[test]
fn bright_light_opens_top_curtain_for_one_operation() {
    let mut rig = Rig::connected();
    rig.svc.enable_decision(&mut rig.sink).unwrap();
    rig.hw.script_light(100, 520.0);

    // Reading at 100, debounce elapses at 2100.
    rig.run_until(2_000);
    assert!(rig.locks().is_empty());
    rig.run_until(2_100);
    assert_eq!(rig.locks(), vec![true]);
    assert!(rig.svc.decision().is_operating());
    assert!(rig.sink.contains(&AppEvent::OperationStarted(OperationType::OpenCurtain)));

    // Motor stays enabled for the whole operation.
    rig.run_until(20_000);
    assert_eq!(rig.hw.writes_to(TOP_CURTAIN.enable), vec![MOTOR_ENABLE]);
    assert_eq!(rig.svc.curtains().state(CurtainType::Top), CurtainState::Open);

    rig.run_until(20_100);
    assert_eq!(rig.locks(), vec![true, false]);
    assert_eq!(rig.hw.writes_to(TOP_CURTAIN.dir1), vec![true]);
    assert_eq!(rig.hw.writes_to(TOP_CURTAIN.enable), vec![MOTOR_ENABLE, MOTOR_DISABLE]);
    assert_eq!(rig.svc.decision().state(), DecisionState::Enabled);
    assert!(rig.sink.contains(&AppEvent::OperationCompleted(OperationType::OpenCurtain)));
}

#[test]
fn top_curtain_command_refused_while_locked() {
    let mut rig = Rig::connected();
    rig.svc.enable_decision(&mut rig.sink).unwrap();
    rig.hw.script_light(100, 520.0);
    rig.run_until(2_100);
    assert!(rig.svc.decision().manual_control_locked());

    rig.push_set(
        r#"{"id":"4","method":"thing.service.property.set","params":{"curtainTopOpen":false,"curtainSideOpen":true}}"#,
    );
    rig.run_until(2_200);

    assert!(rig.sink.contains(&AppEvent::Error(Error::Rejected(
        PolicyRejection::ManualControlLocked
    ))));
    assert_eq!(rig.hw.writes_to(TOP_CURTAIN.dir2), vec![false]);
    // The side request in the same message is still applied.
    assert_eq!(rig.svc.curtains().state(CurtainType::Side), CurtainState::Opening);
}

#[test]
fn stop_is_allowed_while_locked() {
    let mut rig = Rig::connected();
    rig.svc.enable_decision(&mut rig.sink).unwrap();
    rig.hw.script_light(100, 100.0);
    rig.run_until(2_100);
    assert_eq!(rig.svc.decision().operation(), OperationType::CloseCurtain);

    let result = rig.svc.manual_curtain(
        CurtainType::Top,
        CurtainAction::Stop,
        2_100,
        &mut rig.hw,
        &mut rig.sink,
    );
    assert_eq!(result, Ok(()));
    assert!(rig.sink.contains(&AppEvent::CurtainStateChanged {
        curtain: CurtainType::Top,
        from: CurtainState::Closing,
        to: CurtainState::Closing,
    }));
}

#[test]
fn decision_disabled_by_default() {
    let mut rig = Rig::connected();
    rig.hw.script_light(100, 900.0);
    rig.run_until(5_000);

    assert_eq!(rig.svc.decision().state(), DecisionState::Disabled);
    assert_eq!(rig.svc.decision().last_lux(), Some(900.0));
    assert!(rig.hw.writes_to(TOP_CURTAIN.dir1).is_empty());
    assert_eq!(rig.svc.tick_count(), 51);
}
