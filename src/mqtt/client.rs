//! MQTT client: connection lifecycle, periodic reporting, inbound dispatch.
//!
//! ```text
//!            connect()                 CONNACK rc=0
//!  Disconnected ─────────▶ Connecting ─────────────▶ Connected
//!       ▲  ▲                    │                        │
//!       │  │  disconnect()      │ transport error /      │ transport error /
//!       │  └────────────────────┤ CONNACK rc≠0           │ framing error
//!       │                       ▼                        │
//!       │  retries exhausted  (lost) ◀───────────────────┘
//!       └──────────────────────  │
//!                                │ auto-reconnect, retry < max
//!                                ▼
//!                           Reconnecting ── backoff timer ──▶ connect()
//! ```
//!
//! The client is polled from the event loop.  [`poll`](MqttClient::poll)
//! fires due timers, finishes a pending transport open (CONNECT goes out
//! only once the link is up), drains the socket, flushes queued output,
//! and returns the
//! [`ClientEvent`]s the owner must act on (telemetry collection, commands,
//! soil-humidity pushes).  The client never collects telemetry itself.
//!
//! QoS 1 publishes get a packet id and are fire-and-forget at the call
//! boundary: PUBACK is logged, and nothing is retransmitted if it never
//! arrives.

use log::{debug, error, info, warn};

use crate::app::commands::ControlCommand;
use crate::app::events::AppEvent;
use crate::app::ports::{Clock, EventSink};
use crate::config::MqttConfig;
use crate::error::{Error, PolicyRejection, ProtocolError, Result};
use crate::telemetry::DeviceData;
use crate::timers::TimerSet;

use super::codec::{
    ConnectOptions, Frame, Packet, QoS, StreamDecoder, build_connect, build_disconnect,
    build_pingreq, build_puback, build_publish, build_subscribe,
};
use super::credentials::{Credentials, DeviceIdentity, Topics};
use super::payload::{InboundMessage, classify, property_post};
use super::transport::Transport;

// ───────────────────────────────────────────────────────────────
// Constants
// ───────────────────────────────────────────────────────────────

/// Backoff grows by this much per failed attempt.
pub const RECONNECT_STEP_MS: u64 = 1_000;

/// Backoff never exceeds this.
pub const RECONNECT_CAP_MS: u64 = 30_000;

/// Socket read size per call.
const READ_CHUNK: usize = 1024;

/// Upper bound on reads per poll, so a chatty broker cannot starve the loop.
const MAX_READS_PER_POLL: usize = 16;

/// Delay before reconnect attempt `retry` (1-indexed).
pub fn reconnect_delay_ms(retry: u32) -> u64 {
    (RECONNECT_STEP_MS * u64::from(retry)).min(RECONNECT_CAP_MS)
}

// ───────────────────────────────────────────────────────────────
// Types
// ───────────────────────────────────────────────────────────────

/// Broker connection state.  Only the client mutates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// Work the client hands back to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// The report timer fired: collect a snapshot and call
    /// [`MqttClient::publish_device_data`].
    TelemetryDue,
    /// A generic control command for the dispatcher.
    Command(ControlCommand),
    /// A soil-humidity push (never reaches the dispatcher).
    SoilHumidity(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClientTimer {
    Report,
    Heartbeat,
    Reconnect,
}

/// Runtime knobs, taken from [`MqttConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub keep_alive_secs: u16,
    pub report_interval_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub max_reconnect_count: u32,
    pub auto_reconnect: bool,
}

impl From<&MqttConfig> for ClientSettings {
    fn from(cfg: &MqttConfig) -> Self {
        Self {
            keep_alive_secs: cfg.keep_alive_secs,
            report_interval_ms: u64::from(cfg.report_interval_secs) * 1000,
            heartbeat_interval_ms: u64::from(cfg.heartbeat_interval_secs) * 1000,
            max_reconnect_count: cfg.max_reconnect_count,
            auto_reconnect: cfg.auto_reconnect,
        }
    }
}

// ───────────────────────────────────────────────────────────────
// MqttClient
// ───────────────────────────────────────────────────────────────

pub struct MqttClient<T: Transport> {
    transport: T,
    settings: ClientSettings,
    credentials: Credentials,
    topics: Topics,
    state: ConnectionState,
    retry_count: u32,
    packet_id: u16,
    decoder: StreamDecoder,
    /// Transport open started but not yet usable; CONNECT not sent.
    awaiting_link: bool,
    timers: TimerSet<ClientTimer, 3>,
    /// Monotonic time of the latest `connect`/`poll`; used to schedule
    /// reconnects discovered inside calls that take no clock.
    now_ms: u64,
    last_error: Option<Error>,
}

impl<T: Transport> MqttClient<T> {
    /// Build a client.  Credentials are signed here, once, with the
    /// wall-clock `timestamp_ms`.
    pub fn new(
        transport: T,
        settings: ClientSettings,
        identity: &DeviceIdentity,
        timestamp_ms: u64,
    ) -> Result<Self> {
        let credentials = Credentials::derive(identity, timestamp_ms)?;
        let topics = Topics::for_device(identity);
        info!("MQTT: client id {}", credentials.client_id);

        Ok(Self {
            transport,
            settings,
            credentials,
            topics,
            state: ConnectionState::Disconnected,
            retry_count: 0,
            packet_id: 0,
            decoder: StreamDecoder::new(),
            awaiting_link: false,
            timers: TimerSet::new(),
            now_ms: 0,
            last_error: None,
        })
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Start opening the transport; CONNECT follows as soon as the link
    /// is up (here, or from a later [`poll`](Self::poll)).  No-op while
    /// Connecting or Connected.  Returns `false` if the attempt failed
    /// immediately.
    pub fn connect(&mut self, now_ms: u64, sink: &mut impl EventSink) -> bool {
        self.now_ms = now_ms;
        if matches!(self.state, ConnectionState::Connected | ConnectionState::Connecting) {
            debug!("MQTT: connect ignored, already {:?}", self.state);
            return true;
        }

        self.timers.cancel(ClientTimer::Reconnect);
        self.decoder.reset();
        self.set_state(ConnectionState::Connecting, sink);

        if let Err(e) = self.transport.open() {
            self.record(e.into(), sink);
            self.connection_lost(sink);
            return false;
        }
        self.awaiting_link = true;
        self.finish_open(sink)
    }

    /// Check a pending open; send CONNECT once it completes.
    fn finish_open(&mut self, sink: &mut impl EventSink) -> bool {
        match self.transport.poll_open() {
            Ok(true) => {
                self.awaiting_link = false;
                self.send_connect(sink)
            }
            Ok(false) => true,
            Err(e) => {
                self.record(e.into(), sink);
                self.connection_lost(sink);
                false
            }
        }
    }

    fn send_connect(&mut self, sink: &mut impl EventSink) -> bool {
        let packet = build_connect(&ConnectOptions {
            client_id: &self.credentials.client_id,
            username: &self.credentials.username,
            password: &self.credentials.password,
            keep_alive_secs: self.settings.keep_alive_secs,
        });
        let sent = packet.map_err(Error::from).and_then(|p| self.send(&p));
        if let Err(e) = sent {
            self.record(e, sink);
            self.connection_lost(sink);
            return false;
        }
        debug!("MQTT: CONNECT sent, awaiting CONNACK");
        true
    }

    /// Stop timers, send DISCONNECT if connected, close.  Always safe.
    pub fn disconnect(&mut self, sink: &mut impl EventSink) {
        self.timers.cancel_all();
        if self.state == ConnectionState::Connected {
            if let Err(e) = self.send(&build_disconnect()) {
                debug!("MQTT: DISCONNECT not delivered: {}", e);
            }
        }
        self.transport.close();
        self.decoder.reset();
        self.awaiting_link = false;
        self.set_state(ConnectionState::Disconnected, sink);
        info!("MQTT: disconnected");
    }

    // ── Publishing ────────────────────────────────────────────

    /// Send a PUBLISH.  Fails without touching the wire unless Connected
    /// and `payload` is non-empty.
    pub fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        sink: &mut impl EventSink,
    ) -> bool {
        if self.state != ConnectionState::Connected {
            self.record(PolicyRejection::NotConnected.into(), sink);
            return false;
        }
        if payload.is_empty() {
            self.record(PolicyRejection::InvalidPayload.into(), sink);
            return false;
        }

        let packet_id = match qos {
            QoS::AtLeastOnce => self.next_packet_id(),
            QoS::AtMostOnce => 0,
        };
        let packet = match build_publish(topic, payload, qos, packet_id, false) {
            Ok(p) => p,
            Err(e) => {
                self.record(e.into(), sink);
                return false;
            }
        };
        match self.send(&packet) {
            Ok(()) => {
                debug!("MQTT: PUBLISH {} ({} B, id {})", topic, payload.len(), packet_id);
                true
            }
            Err(e) => {
                self.record(e, sink);
                self.connection_lost(sink);
                false
            }
        }
    }

    /// Serialise a telemetry snapshot and publish it on the post topic.
    pub fn publish_device_data(
        &mut self,
        data: &DeviceData,
        id_ms: u64,
        sink: &mut impl EventSink,
    ) -> bool {
        let ok = if data.valid {
            match property_post(data, id_ms) {
                Ok(payload) => {
                    let topic = self.topics.post.clone();
                    self.publish(&topic, &payload, QoS::AtLeastOnce, sink)
                }
                Err(e) => {
                    self.record(e.into(), sink);
                    false
                }
            }
        } else {
            self.record(PolicyRejection::InvalidPayload.into(), sink);
            false
        };
        sink.emit(&AppEvent::TelemetryPublished(ok));
        ok
    }

    /// Send PINGREQ.  Returns `false` when not connected.
    pub fn send_heartbeat(&mut self, sink: &mut impl EventSink) -> bool {
        if self.state != ConnectionState::Connected {
            return false;
        }
        match self.send(&build_pingreq()) {
            Ok(()) => {
                debug!("MQTT: PINGREQ");
                sink.emit(&AppEvent::HeartbeatSent);
                true
            }
            Err(e) => {
                self.record(e, sink);
                self.connection_lost(sink);
                false
            }
        }
    }

    // ── Event loop ────────────────────────────────────────────

    /// Fire due timers and process inbound bytes.
    pub fn poll(&mut self, clock: &impl Clock, sink: &mut impl EventSink) -> Vec<ClientEvent> {
        let now_ms = clock.monotonic_ms();
        self.now_ms = now_ms;
        let mut events = Vec::new();

        for timer in self.timers.due(now_ms) {
            match timer {
                ClientTimer::Reconnect => {
                    if self.settings.auto_reconnect
                        && matches!(
                            self.state,
                            ConnectionState::Reconnecting | ConnectionState::Disconnected
                        )
                    {
                        info!("MQTT: reconnect attempt {}", self.retry_count);
                        self.connect(now_ms, sink);
                    }
                }
                ClientTimer::Report => {
                    if self.state == ConnectionState::Connected {
                        events.push(ClientEvent::TelemetryDue);
                    }
                }
                ClientTimer::Heartbeat => {
                    self.send_heartbeat(sink);
                }
            }
        }

        if self.state == ConnectionState::Connecting && self.awaiting_link {
            self.finish_open(sink);
        }
        if self.link_ready() {
            self.pump_input(clock.epoch_ms(), sink, &mut events);
        }
        if self.link_ready() {
            if let Err(e) = self.transport.flush() {
                self.record(e.into(), sink);
                self.connection_lost(sink);
            }
        }
        events
    }

    fn pump_input(&mut self, epoch_ms: u64, sink: &mut impl EventSink, events: &mut Vec<ClientEvent>) {
        let mut chunk = [0u8; READ_CHUNK];

        for _ in 0..MAX_READS_PER_POLL {
            let room = self.decoder.spare_capacity().min(READ_CHUNK);
            if room == 0 {
                // Full buffer with no complete frame in it.
                self.framing_failure(ProtocolError::BufferOverflow, sink);
                return;
            }
            let n = match self.transport.read(&mut chunk[..room]) {
                Ok(0) => return,
                Ok(n) => n,
                Err(e) => {
                    self.record(e.into(), sink);
                    self.connection_lost(sink);
                    return;
                }
            };
            if let Err(e) = self.decoder.feed(&chunk[..n]) {
                self.framing_failure(e, sink);
                return;
            }

            loop {
                match self.decoder.next_frame() {
                    Ok(Some(frame)) => {
                        self.handle_frame(&frame, epoch_ms, sink, events);
                        if !self.is_link_up() {
                            return;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        self.framing_failure(e, sink);
                        return;
                    }
                }
            }
        }
    }

    fn handle_frame(
        &mut self,
        frame: &Frame,
        epoch_ms: u64,
        sink: &mut impl EventSink,
        events: &mut Vec<ClientEvent>,
    ) {
        let packet = match Packet::parse(frame) {
            Ok(p) => p,
            Err(e) => {
                warn!("MQTT: dropping malformed packet: {}", e);
                self.record(e.into(), sink);
                return;
            }
        };

        match packet {
            Packet::ConnAck { return_code: 0, .. } => self.on_connected(sink),
            Packet::ConnAck { return_code, .. } => {
                self.record(ProtocolError::ConnectionRefused(return_code).into(), sink);
                self.connection_lost(sink);
            }
            Packet::Publish {
                topic,
                packet_id,
                payload,
                ..
            } => {
                if let Some(id) = packet_id {
                    if let Err(e) = self.send(&build_puback(id)) {
                        self.record(e, sink);
                        self.connection_lost(sink);
                        return;
                    }
                }
                self.on_publish(&topic, &payload, epoch_ms, sink, events);
            }
            Packet::PubAck { packet_id } => debug!("MQTT: PUBACK {}", packet_id),
            Packet::SubAck {
                packet_id,
                granted_qos,
            } => {
                if granted_qos.contains(&0x80) {
                    warn!("MQTT: subscription {} rejected by broker", packet_id);
                } else {
                    info!("MQTT: subscribed (id {}, qos {:?})", packet_id, granted_qos);
                }
            }
            Packet::PingResp => debug!("MQTT: PINGRESP"),
            Packet::Other { packet_type } => {
                warn!("MQTT: ignoring unhandled packet type 0x{:02X}", packet_type);
            }
        }
    }

    fn on_connected(&mut self, sink: &mut impl EventSink) {
        self.retry_count = 0;
        self.set_state(ConnectionState::Connected, sink);
        info!("MQTT: connected");

        let id = self.next_packet_id();
        let sent = build_subscribe(id, &self.topics.set, QoS::AtLeastOnce)
            .map_err(Error::from)
            .and_then(|p| self.send(&p));
        if let Err(e) = sent {
            self.record(e, sink);
            self.connection_lost(sink);
            return;
        }
        info!("MQTT: SUBSCRIBE {} (id {})", self.topics.set, id);

        let now = self.now_ms;
        self.timers
            .arm_periodic(ClientTimer::Report, now, self.settings.report_interval_ms);
        self.timers
            .arm_periodic(ClientTimer::Heartbeat, now, self.settings.heartbeat_interval_ms);
    }

    fn on_publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        epoch_ms: u64,
        sink: &mut impl EventSink,
        events: &mut Vec<ClientEvent>,
    ) {
        match classify(payload, epoch_ms) {
            Ok(InboundMessage::SoilHumidity(value)) => {
                info!("MQTT: soil humidity {:.1}% on {}", value, topic);
                sink.emit(&AppEvent::SoilHumidity(value));
                events.push(ClientEvent::SoilHumidity(value));
            }
            Ok(InboundMessage::Command(cmd)) => {
                info!("MQTT: command '{}' (id '{}')", cmd.command_type, cmd.message_id);
                sink.emit(&AppEvent::CommandReceived {
                    command_type: cmd.command_type.clone(),
                    message_id: cmd.message_id.clone(),
                });
                events.push(ClientEvent::Command(cmd));
            }
            Ok(InboundMessage::Unrecognized) => {
                debug!("MQTT: unrecognised message on {}", topic);
            }
            Err(e) => {
                warn!("MQTT: dropping payload on {}: {}", topic, e);
            }
        }
    }

    // ── Failure handling ──────────────────────────────────────

    /// The stream can no longer be framed; drop the connection.
    fn framing_failure(&mut self, e: ProtocolError, sink: &mut impl EventSink) {
        self.record(e.into(), sink);
        self.connection_lost(sink);
    }

    /// Tear down and apply the reconnect policy.
    fn connection_lost(&mut self, sink: &mut impl EventSink) {
        self.timers.cancel(ClientTimer::Report);
        self.timers.cancel(ClientTimer::Heartbeat);
        self.transport.close();
        self.decoder.reset();
        self.awaiting_link = false;
        self.set_state(ConnectionState::Disconnected, sink);

        if !self.settings.auto_reconnect {
            return;
        }
        if self.retry_count >= self.settings.max_reconnect_count {
            warn!("MQTT: giving up after {} reconnect attempts", self.retry_count);
            return;
        }
        self.retry_count += 1;
        let delay = reconnect_delay_ms(self.retry_count);
        self.timers
            .arm_once(ClientTimer::Reconnect, self.now_ms, delay);
        self.set_state(ConnectionState::Reconnecting, sink);
        info!(
            "MQTT: reconnect {}/{} in {} ms",
            self.retry_count, self.settings.max_reconnect_count, delay
        );
    }

    fn record(&mut self, e: Error, sink: &mut impl EventSink) {
        match e {
            Error::Rejected(_) => warn!("MQTT: {}", e),
            _ => error!("MQTT: {}", e),
        }
        self.last_error = Some(e);
        sink.emit(&AppEvent::Error(e));
    }

    // ── Helpers ───────────────────────────────────────────────

    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        let written = self.transport.write(bytes)?;
        if written != bytes.len() {
            return Err(crate::error::TransportError::Io.into());
        }
        self.transport.flush()?;
        Ok(())
    }

    /// Next packet id in 1..=65535 (0 is reserved by the protocol).
    fn next_packet_id(&mut self) -> u16 {
        self.packet_id = self.packet_id.wrapping_add(1);
        if self.packet_id == 0 {
            self.packet_id = 1;
        }
        self.packet_id
    }

    fn set_state(&mut self, to: ConnectionState, sink: &mut impl EventSink) {
        if self.state == to {
            return;
        }
        let from = self.state;
        self.state = to;
        info!("MQTT state: {:?} -> {:?}", from, to);
        sink.emit(&AppEvent::ConnectionStateChanged { from, to });
    }

    fn is_link_up(&self) -> bool {
        matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Connected
        )
    }

    /// Transport usable and CONNECT sent.
    fn link_ready(&self) -> bool {
        self.is_link_up() && !self.awaiting_link
    }

    // ── Runtime configuration ─────────────────────────────────

    pub fn set_report_interval(&mut self, secs: u32) {
        self.settings.report_interval_ms = u64::from(secs.max(1)) * 1000;
        if self.timers.is_armed(ClientTimer::Report) {
            self.timers
                .arm_periodic(ClientTimer::Report, self.now_ms, self.settings.report_interval_ms);
        }
        info!("MQTT: report interval {} s", secs);
    }

    pub fn set_heartbeat_interval(&mut self, secs: u32) {
        self.settings.heartbeat_interval_ms = u64::from(secs.max(1)) * 1000;
        if self.timers.is_armed(ClientTimer::Heartbeat) {
            self.timers.arm_periodic(
                ClientTimer::Heartbeat,
                self.now_ms,
                self.settings.heartbeat_interval_ms,
            );
        }
        info!("MQTT: heartbeat interval {} s", secs);
    }

    /// Turning auto-reconnect off cancels a pending attempt.
    pub fn set_auto_reconnect(&mut self, enabled: bool, sink: &mut impl EventSink) {
        self.settings.auto_reconnect = enabled;
        if !enabled && self.timers.cancel(ClientTimer::Reconnect) {
            self.set_state(ConnectionState::Disconnected, sink);
        }
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn last_error(&self) -> Option<Error> {
        self.last_error
    }

    pub fn topics(&self) -> &Topics {
        &self.topics
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    /// Monotonic deadline of the pending reconnect attempt, if any.
    pub fn reconnect_deadline(&self) -> Option<u64> {
        self.timers.deadline(ClientTimer::Reconnect)
    }

    /// Whether the report and heartbeat timers are running.
    pub fn reporting_active(&self) -> bool {
        self.timers.is_armed(ClientTimer::Report) && self.timers.is_armed(ClientTimer::Heartbeat)
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}
