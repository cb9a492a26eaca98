//! MqttClient against a scripted transport: connection lifecycle,
//! reconnect policy, stream reassembly and inbound dispatch.

use crate::mock_hw::{ManualClock, MockTransport, RecordingSink};

use greenhouse_edge::app::events::AppEvent;
use greenhouse_edge::config::MqttConfig;
use greenhouse_edge::error::{Error, PolicyRejection, ProtocolError, TransportError};
use greenhouse_edge::mqtt::client::{ClientEvent, ClientSettings, ConnectionState, MqttClient};
use greenhouse_edge::mqtt::codec::{Packet, QoS, build_publish};
use greenhouse_edge::mqtt::credentials::DeviceIdentity;
use greenhouse_edge::telemetry::DeviceData;

const CONNACK_OK: [u8; 4] = [0x20, 0x02, 0x00, 0x00];

fn identity() -> DeviceIdentity {
    DeviceIdentity {
        product_key: "k1zfks5ATvF".into(),
        device_name: "rk3588".into(),
        device_secret: "test-secret".into(),
    }
}

fn client_with(cfg: &MqttConfig) -> MqttClient<MockTransport> {
    MqttClient::new(
        MockTransport::new(),
        ClientSettings::from(cfg),
        &identity(),
        1_700_000_000_000,
    )
    .unwrap()
}

fn client() -> MqttClient<MockTransport> {
    client_with(&MqttConfig::default())
}

/// Connect and complete the CONNACK handshake at t=0.
fn connected() -> (MqttClient<MockTransport>, ManualClock, RecordingSink) {
    let mut c = client();
    let clock = ManualClock::new();
    let mut sink = RecordingSink::new();
    c.connect(0, &mut sink);
    c.transport_mut().push_inbound(&CONNACK_OK);
    c.poll(&clock, &mut sink);
    assert!(c.is_connected());
    c.transport_mut().clear_written();
    sink.clear();
    (c, clock, sink)
}

fn snapshot() -> DeviceData {
    DeviceData {
        temperature: 24.0,
        humidity: 55.0,
        light_intensity: 480.0,
        pwm_duty_cycle: 50,
        curtain_top_open: false,
        curtain_side_open: false,
        timestamp_ms: 1,
        valid: true,
    }
}

// ── Scenario A: CONNACK 0 → Connected, SUBSCRIBE, timers ──────

#[test]
fn connack_success_subscribes_and_starts_timers() {
    let mut c = client();
    let clock = ManualClock::new();
    let mut sink = RecordingSink::new();

    assert!(c.connect(0, &mut sink));
    assert_eq!(c.state(), ConnectionState::Connecting);
    assert_eq!(c.transport().written_types(), vec![0x10]);

    c.transport_mut().push_inbound(&CONNACK_OK);
    c.poll(&clock, &mut sink);

    assert_eq!(c.state(), ConnectionState::Connected);
    assert!(c.reporting_active());
    let frames = c.transport().written_frames();
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[1].header, 0x82);
    assert!(
        frames[1].body.ends_with(b"/sys/k1zfks5ATvF/rk3588/thing/service/property/set\x01"),
        "SUBSCRIBE must name the set topic at QoS 1"
    );
    assert_eq!(
        sink.events,
        vec![
            AppEvent::ConnectionStateChanged {
                from: ConnectionState::Disconnected,
                to: ConnectionState::Connecting,
            },
            AppEvent::ConnectionStateChanged {
                from: ConnectionState::Connecting,
                to: ConnectionState::Connected,
            },
        ]
    );
}

#[test]
fn connect_is_idempotent_while_connecting_or_connected() {
    let mut c = client();
    let mut sink = RecordingSink::new();
    c.connect(0, &mut sink);
    c.connect(0, &mut sink);
    assert_eq!(c.transport().open_calls, 1);
    assert_eq!(c.transport().written_types(), vec![0x10]);

    let (mut c, _, mut sink) = connected();
    assert!(c.connect(5, &mut sink));
    assert_eq!(c.transport().open_calls, 1);
    assert!(sink.events.is_empty());
}

#[test]
fn connect_is_deferred_until_the_link_opens() {
    let mut c = client();
    let clock = ManualClock::new();
    let mut sink = RecordingSink::new();
    c.transport_mut().hold_link = true;

    assert!(c.connect(0, &mut sink));
    assert_eq!(c.state(), ConnectionState::Connecting);
    for t in [100, 200, 300] {
        clock.set(t);
        c.poll(&clock, &mut sink);
    }
    assert!(c.transport().written.is_empty());
    assert_eq!(c.transport().open_calls, 1);
    assert_eq!(c.transport().flush_calls, 0, "nothing to flush before the link is up");

    c.transport_mut().hold_link = false;
    clock.set(400);
    c.poll(&clock, &mut sink);
    assert_eq!(c.transport().written_types(), vec![0x10]);

    c.transport_mut().push_inbound(&CONNACK_OK);
    c.poll(&clock, &mut sink);
    assert!(c.is_connected());
}

#[test]
fn failed_pending_open_schedules_reconnect() {
    let mut c = client();
    let clock = ManualClock::new();
    let mut sink = RecordingSink::new();
    c.transport_mut().hold_link = true;
    c.connect(0, &mut sink);

    c.transport_mut().hold_link = false;
    c.transport_mut().fail_link = true;
    clock.set(250);
    c.poll(&clock, &mut sink);

    assert_eq!(c.state(), ConnectionState::Reconnecting);
    assert_eq!(c.reconnect_deadline(), Some(1_250));
    assert!(c.transport().written.is_empty());
    assert!(sink.contains(&AppEvent::Error(Error::Transport(TransportError::ConnectFailed))));
}

#[test]
fn poll_flushes_pending_output_once() {
    let (mut c, clock, mut sink) = connected();
    let before = c.transport().flush_calls;
    clock.set(5);
    c.poll(&clock, &mut sink);
    assert_eq!(c.transport().flush_calls, before + 1);
}

#[test]
fn flush_failure_drops_the_connection() {
    let (mut c, clock, mut sink) = connected();
    c.transport_mut().fail_flush = true;
    clock.set(5);
    c.poll(&clock, &mut sink);

    assert_eq!(c.state(), ConnectionState::Reconnecting);
    assert!(sink.contains(&AppEvent::Error(Error::Transport(TransportError::Io))));
}

#[test]
fn connect_packet_carries_signed_credentials() {
    let mut c = client();
    c.connect(0, &mut RecordingSink::new());
    let frame = &c.transport().written_frames()[0];
    let body = &frame.body;

    assert_eq!(&body[..6], b"\x00\x04MQTT");
    assert_eq!(body[6], 0x04, "protocol level 4");
    assert_eq!(body[7], 0xC2, "username + password + clean session");
    assert_eq!(&body[8..10], &60u16.to_be_bytes());

    let creds = c.credentials().clone();
    let text = String::from_utf8_lossy(body);
    assert!(text.contains(&creds.client_id));
    assert!(text.contains("rk3588&k1zfks5ATvF"));
    assert!(text.contains(&creds.password));
}

// ── Scenario B: publish while disconnected ────────────────────

#[test]
fn publish_while_disconnected_emits_nothing() {
    let mut c = client();
    let mut sink = RecordingSink::new();

    assert!(!c.publish("t", b"{}", QoS::AtMostOnce, &mut sink));
    assert!(c.transport().written.is_empty());
    assert_eq!(
        c.last_error(),
        Some(Error::Rejected(PolicyRejection::NotConnected))
    );
}

#[test]
fn empty_payload_is_rejected() {
    let (mut c, _, mut sink) = connected();
    assert!(!c.publish("t", b"", QoS::AtLeastOnce, &mut sink));
    assert!(c.transport().written.is_empty());
}

#[test]
fn qos1_publishes_carry_increasing_packet_ids() {
    let (mut c, _, mut sink) = connected();
    assert!(c.publish("a", b"1", QoS::AtLeastOnce, &mut sink));
    assert!(c.publish("a", b"2", QoS::AtLeastOnce, &mut sink));

    let frames = c.transport().written_frames();
    let ids: Vec<u16> = frames
        .iter()
        .map(|f| match Packet::parse(f).unwrap() {
            Packet::Publish { packet_id, .. } => packet_id.unwrap(),
            other => panic!("unexpected {other:?}"),
        })
        .collect();
    // id 1 went to the SUBSCRIBE
    assert_eq!(ids, vec![2, 3]);
}

#[test]
fn telemetry_publish_reports_outcome() {
    let (mut c, _, mut sink) = connected();
    assert!(c.publish_device_data(&snapshot(), 1_700_000_000_123, &mut sink));
    assert!(sink.contains(&AppEvent::TelemetryPublished(true)));

    let frame = &c.transport().written_frames()[0];
    let Packet::Publish { topic, qos, payload, .. } = Packet::parse(frame).unwrap() else {
        panic!("expected PUBLISH");
    };
    assert_eq!(topic, "/sys/k1zfks5ATvF/rk3588/thing/event/property/post");
    assert_eq!(qos, QoS::AtLeastOnce);
    let v: serde_json::Value = serde_json::from_slice(&payload).unwrap();
    assert_eq!(v["id"], "1700000000123");
    assert_eq!(v["params"]["LightLux"], 480);

    let mut stale = snapshot();
    stale.valid = false;
    sink.clear();
    assert!(!c.publish_device_data(&stale, 0, &mut sink));
    assert!(sink.contains(&AppEvent::TelemetryPublished(false)));
}

// ── Periodic timers ───────────────────────────────────────────

#[test]
fn report_and_heartbeat_timers() {
    let (mut c, clock, mut sink) = connected();

    clock.set(10_000);
    assert_eq!(c.poll(&clock, &mut sink), vec![ClientEvent::TelemetryDue]);
    clock.set(20_000);
    assert_eq!(c.poll(&clock, &mut sink), vec![ClientEvent::TelemetryDue]);

    clock.set(300_000);
    c.poll(&clock, &mut sink);
    assert!(sink.contains(&AppEvent::HeartbeatSent));
    assert!(c.transport().written.ends_with(&[0xC0, 0x00]));
}

#[test]
fn report_interval_can_be_changed_at_runtime() {
    let (mut c, clock, mut sink) = connected();
    c.set_report_interval(3);
    clock.set(2_999);
    assert!(c.poll(&clock, &mut sink).is_empty());
    clock.set(3_000);
    assert_eq!(c.poll(&clock, &mut sink), vec![ClientEvent::TelemetryDue]);
}

// ── Scenario C and inbound dispatch ───────────────────────────

#[test]
fn soil_humidity_bypasses_command_dispatch() {
    let (mut c, clock, mut sink) = connected();
    let publish = build_publish(
        "/sys/k1zfks5ATvF/rk3588/thing/service/property/set",
        br#"{"params":{"soilHumidity":42.5}}"#,
        QoS::AtMostOnce,
        0,
        false,
    )
    .unwrap();
    c.transport_mut().push_inbound(&publish);

    let events = c.poll(&clock, &mut sink);
    assert_eq!(events, vec![ClientEvent::SoilHumidity(42.5)]);
    assert!(sink.contains(&AppEvent::SoilHumidity(42.5)));
    assert_eq!(
        sink.count(|e| matches!(e, AppEvent::CommandReceived { .. })),
        0
    );
}

#[test]
fn generic_command_is_handed_out() {
    let (mut c, clock, mut sink) = connected();
    let publish = build_publish(
        "x",
        br#"{"id":"9","method":"thing.service.property.set","params":{"pwmDutyCycle":30}}"#,
        QoS::AtLeastOnce,
        77,
        false,
    )
    .unwrap();
    c.transport_mut().push_inbound(&publish);

    let events = c.poll(&clock, &mut sink);
    let [ClientEvent::Command(cmd)] = events.as_slice() else {
        panic!("expected one command, got {events:?}");
    };
    assert_eq!(cmd.message_id, "9");
    assert_eq!(cmd.received_at_ms, crate::mock_hw::EPOCH_BASE_MS);
    assert_eq!(c.transport().written, vec![0x40, 0x02, 0x00, 77]);
}

#[test]
fn packets_split_across_reads_are_reassembled() {
    let (mut c, clock, mut sink) = connected();
    let mut stream = build_publish("t", br#"{"soilHumidity":1}"#, QoS::AtMostOnce, 0, false).unwrap();
    stream.extend(build_publish("t", br#"{"soilHumidity":2}"#, QoS::AtMostOnce, 0, false).unwrap());

    let (a, rest) = stream.split_at(3);
    let (b, tail) = rest.split_at(rest.len() - 5);
    c.transport_mut().push_inbound(a);
    assert!(c.poll(&clock, &mut sink).is_empty());

    c.transport_mut().push_inbound(b);
    c.transport_mut().push_inbound(tail);
    assert_eq!(
        c.poll(&clock, &mut sink),
        vec![ClientEvent::SoilHumidity(1.0), ClientEvent::SoilHumidity(2.0)]
    );
}

#[test]
fn malformed_packet_is_dropped_without_disconnect() {
    let (mut c, clock, mut sink) = connected();
    // PUBACK with a one-byte body
    c.transport_mut().push_inbound(&[0x40, 0x01, 0x00]);
    c.transport_mut().push_inbound(&[0xD0, 0x00]);
    c.poll(&clock, &mut sink);
    assert!(c.is_connected());
    assert_eq!(c.last_error(), Some(Error::Protocol(ProtocolError::ShortPacket(0x40))));
}

// ── Failures and reconnect policy ─────────────────────────────

#[test]
fn connack_refused_closes_and_schedules_reconnect() {
    let mut c = client();
    let clock = ManualClock::new();
    let mut sink = RecordingSink::new();
    c.connect(0, &mut sink);
    c.transport_mut().push_inbound(&[0x20, 0x02, 0x00, 0x05]);
    c.poll(&clock, &mut sink);

    assert_eq!(c.state(), ConnectionState::Reconnecting);
    assert_eq!(c.retry_count(), 1);
    assert_eq!(c.reconnect_deadline(), Some(1_000));
    assert!(!c.transport().open);
    assert_eq!(
        c.last_error(),
        Some(Error::Protocol(ProtocolError::ConnectionRefused(5)))
    );
}

#[test]
fn transport_loss_runs_linear_backoff_then_gives_up() {
    let mut cfg = MqttConfig::default();
    cfg.max_reconnect_count = 3;
    let mut c = client_with(&cfg);
    let clock = ManualClock::new();
    let mut sink = RecordingSink::new();

    c.transport_mut().fail_open = true;
    assert!(!c.connect(0, &mut sink));
    assert_eq!(c.state(), ConnectionState::Reconnecting);
    assert_eq!(c.reconnect_deadline(), Some(1_000));

    clock.set(1_000);
    c.poll(&clock, &mut sink);
    assert_eq!(c.retry_count(), 2);
    assert_eq!(c.reconnect_deadline(), Some(3_000));

    clock.set(3_000);
    c.poll(&clock, &mut sink);
    assert_eq!(c.retry_count(), 3);
    assert_eq!(c.reconnect_deadline(), Some(6_000));

    clock.set(6_000);
    c.poll(&clock, &mut sink);
    assert_eq!(c.state(), ConnectionState::Disconnected);
    assert_eq!(c.reconnect_deadline(), None);
    assert_eq!(c.transport().open_calls, 4);

    clock.set(60_000);
    c.poll(&clock, &mut sink);
    assert_eq!(c.transport().open_calls, 4, "no retries after exhaustion");
}

#[test]
fn retry_count_resets_on_successful_connack() {
    let mut c = client();
    let clock = ManualClock::new();
    let mut sink = RecordingSink::new();

    c.transport_mut().fail_open = true;
    c.connect(0, &mut sink);
    assert_eq!(c.retry_count(), 1);

    c.transport_mut().fail_open = false;
    clock.set(1_000);
    c.poll(&clock, &mut sink);
    assert_eq!(c.state(), ConnectionState::Connecting);
    assert_eq!(c.retry_count(), 1);

    c.transport_mut().push_inbound(&CONNACK_OK);
    c.poll(&clock, &mut sink);
    assert!(c.is_connected());
    assert_eq!(c.retry_count(), 0);
}

#[test]
fn read_error_while_connected_triggers_reconnect() {
    let (mut c, clock, mut sink) = connected();
    c.transport_mut().push_error(TransportError::Closed);
    clock.set(500);
    c.poll(&clock, &mut sink);

    assert_eq!(c.state(), ConnectionState::Reconnecting);
    assert!(!c.reporting_active());
    assert_eq!(c.reconnect_deadline(), Some(1_500));
    assert!(sink.contains(&AppEvent::Error(Error::Transport(TransportError::Closed))));
}

#[test]
fn oversized_remaining_length_forces_close() {
    let (mut c, clock, mut sink) = connected();
    c.transport_mut().push_inbound(&[0x30, 0xFF, 0xFF, 0xFF, 0xFF, 0x01]);
    c.poll(&clock, &mut sink);
    assert_ne!(c.state(), ConnectionState::Connected);
    assert_eq!(
        c.last_error(),
        Some(Error::Protocol(ProtocolError::MalformedLength))
    );
}

#[test]
fn auto_reconnect_off_stays_disconnected() {
    let mut cfg = MqttConfig::default();
    cfg.auto_reconnect = false;
    let mut c = client_with(&cfg);
    let mut sink = RecordingSink::new();
    c.transport_mut().fail_open = true;

    c.connect(0, &mut sink);
    assert_eq!(c.state(), ConnectionState::Disconnected);
    assert_eq!(c.reconnect_deadline(), None);
}

#[test]
fn disabling_auto_reconnect_cancels_pending_attempt() {
    let mut c = client();
    let mut sink = RecordingSink::new();
    c.transport_mut().fail_open = true;
    c.connect(0, &mut sink);
    assert_eq!(c.state(), ConnectionState::Reconnecting);

    c.set_auto_reconnect(false, &mut sink);
    assert_eq!(c.state(), ConnectionState::Disconnected);
    assert_eq!(c.reconnect_deadline(), None);
}

#[test]
fn disconnect_sends_disconnect_and_stops_timers() {
    let (mut c, clock, mut sink) = connected();
    c.disconnect(&mut sink);

    assert_eq!(c.transport().written, vec![0xE0, 0x00]);
    assert_eq!(c.state(), ConnectionState::Disconnected);
    assert!(!c.reporting_active());

    clock.set(1_000_000);
    assert!(c.poll(&clock, &mut sink).is_empty());
    assert_eq!(c.transport().open_calls, 1);
}

#[test]
fn disconnect_is_always_safe() {
    let mut c = client();
    let mut sink = RecordingSink::new();
    c.disconnect(&mut sink);
    c.disconnect(&mut sink);
    assert!(c.transport().written.is_empty());
    assert_eq!(c.state(), ConnectionState::Disconnected);
}
