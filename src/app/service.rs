//! Application service: the process-level controller.
//!
//! [`AppService`] owns the MQTT client, the curtain controller, the
//! decision manager and the telemetry aggregator as sibling fields, and
//! is the command dispatcher.  Hardware is injected at call sites through
//! port traits, so the whole service runs against mocks in tests.
//!
//! ```text
//!  SensorPort ──▶ ┌──────────────────────────────┐ ──▶ EventSink
//!                 │          AppService           │
//!   GpioPort  ◀── │  Decision · Curtains · MQTT   │ ◀─▶ Transport
//!   PwmPort   ◀── │  Telemetry · dispatcher       │
//!                 └──────────────────────────────┘
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::sleep;
use std::time::Duration;

use log::{debug, info, warn};

use crate::config::SystemConfig;
use crate::curtain::{CurtainController, CurtainType};
use crate::decision::DecisionManager;
use crate::error::{Error, PolicyRejection, Result};
use crate::mqtt::client::{ClientEvent, ClientSettings, MqttClient};
use crate::mqtt::credentials::DeviceIdentity;
use crate::mqtt::transport::Transport;
use crate::telemetry::TelemetryAggregator;

use super::commands::{CommandParams, ControlCommand, CurtainAction};
use super::events::AppEvent;
use super::ports::{Clock, EventSink, GpioPort, PwmPort, SensorPort};

// ───────────────────────────────────────────────────────────────
// AppService
// ───────────────────────────────────────────────────────────────

pub struct AppService<T: Transport> {
    mqtt: MqttClient<T>,
    curtains: CurtainController,
    decision: DecisionManager,
    telemetry: TelemetryAggregator,
    /// Latest soil-humidity push from the cloud.
    soil_humidity: Option<f64>,
    tick_count: u64,
}

impl<T: Transport> AppService<T> {
    /// Build the service.  `epoch_ms` signs the MQTT credentials.
    ///
    /// Does not touch hardware or the network; call [`start`](Self::start).
    pub fn new(config: &SystemConfig, transport: T, epoch_ms: u64) -> Result<Self> {
        let identity = DeviceIdentity::from(&config.device);
        let mqtt = MqttClient::new(
            transport,
            ClientSettings::from(&config.mqtt),
            &identity,
            epoch_ms,
        )?;

        Ok(Self {
            mqtt,
            curtains: CurtainController::new(u64::from(config.curtain.settle_delay_ms)),
            decision: DecisionManager::new(&config.decision),
            telemetry: TelemetryAggregator::new(),
            soil_humidity: None,
            tick_count: 0,
        })
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Initialise the curtains and start connecting.  A curtain
    /// initialisation failure is logged; the controller keeps running and
    /// curtain commands are rejected until a restart.
    pub fn start(&mut self, clock: &impl Clock, gpio: &mut impl GpioPort, sink: &mut impl EventSink) {
        if let Err(e) = self.curtains.initialize(gpio, sink) {
            warn!("AppService: curtains unavailable: {}", e);
        }
        self.mqtt.connect(clock.monotonic_ms(), sink);
        sink.emit(&AppEvent::Started);
        info!("AppService started");
    }

    /// Disconnect and release both curtain motors.
    pub fn shutdown(&mut self, gpio: &mut impl GpioPort, sink: &mut impl EventSink) {
        self.mqtt.disconnect(sink);
        if self.curtains.is_initialized() {
            for curtain in CurtainType::ALL {
                if let Err(e) = self.curtains.pause(curtain, gpio, sink) {
                    warn!("AppService: releasing {} curtain failed: {}", curtain, e);
                }
            }
        }
        info!("AppService stopped after {} ticks", self.tick_count);
    }

    /// Tick every `period` until `stop` is raised, then shut down.
    pub fn run_until_stopped(
        &mut self,
        clock: &impl Clock,
        hw: &mut (impl GpioPort + PwmPort + SensorPort),
        sink: &mut impl EventSink,
        period: Duration,
        stop: &AtomicBool,
    ) {
        while !stop.load(Ordering::Acquire) {
            self.tick(clock, hw, sink);
            sleep(period);
        }
        info!("AppService: stop requested");
        self.shutdown(hw, sink);
    }

    // ── Per-tick orchestration ────────────────────────────────

    /// Run one loop iteration: curtain settles, decision timers, new light
    /// readings, then MQTT timers and inbound traffic.
    ///
    /// `hw` satisfies all three hardware ports; this avoids a double
    /// mutable borrow while keeping the port boundaries explicit.
    pub fn tick(
        &mut self,
        clock: &impl Clock,
        hw: &mut (impl GpioPort + PwmPort + SensorPort),
        sink: &mut impl EventSink,
    ) {
        self.tick_count += 1;
        let now_ms = clock.monotonic_ms();

        // 1. Curtain settle timers
        self.curtains.poll(now_ms, sink);

        // 2. Decision debounce / operation timers
        self.decision.poll(now_ms, &mut self.curtains, hw, sink);

        // 3. Light feed
        if let Some(lux) = hw.poll_light(now_ms) {
            debug!("AppService: light {:.0} lux", lux);
            self.decision.on_light_reading(lux, now_ms);
        }

        // 4. Cloud link
        for event in self.mqtt.poll(clock, sink) {
            match event {
                ClientEvent::TelemetryDue => self.publish_telemetry(clock.epoch_ms(), &*hw, sink),
                ClientEvent::Command(cmd) => self.dispatch_command(&cmd, now_ms, hw, sink),
                ClientEvent::SoilHumidity(value) => self.soil_humidity = Some(value),
            }
        }
    }

    fn publish_telemetry(
        &mut self,
        epoch_ms: u64,
        hw: &(impl PwmPort + SensorPort),
        sink: &mut impl EventSink,
    ) {
        if !self.mqtt.is_connected() {
            debug!("AppService: telemetry skipped, not connected");
            return;
        }
        let data = self.telemetry.collect(hw, hw, &self.curtains, epoch_ms);
        self.mqtt.publish_device_data(&data, epoch_ms, sink);
    }

    // ── Command dispatch ──────────────────────────────────────

    /// Apply the recognised parameters of a cloud command.  Unknown keys
    /// are ignored; each recognised key is applied independently.
    pub fn dispatch_command(
        &mut self,
        cmd: &ControlCommand,
        now_ms: u64,
        hw: &mut (impl GpioPort + PwmPort),
        sink: &mut impl EventSink,
    ) {
        let params = CommandParams::from_params(&cmd.parameters);
        if params.is_empty() {
            debug!("AppService: command '{}' has no recognised parameters", cmd.command_type);
            return;
        }

        if let Some(requested) = params.pwm_duty_cycle {
            match u8::try_from(requested).ok().filter(|d| *d <= 100) {
                Some(duty) => {
                    if let Err(e) = self.set_pwm(duty, hw, sink) {
                        warn!("AppService: pwm command failed: {}", e);
                    }
                }
                None => warn!("AppService: pwmDutyCycle {} out of range, ignored", requested),
            }
        }

        for (curtain, open) in params.curtain_requests() {
            let action = if open {
                CurtainAction::Open
            } else {
                CurtainAction::Close
            };
            if let Err(e) = self.manual_curtain(curtain, action, now_ms, hw, sink) {
                warn!("AppService: {} curtain command failed: {}", curtain, e);
            }
        }
    }

    /// Manual curtain control.  The top curtain is refused while the
    /// decision manager holds the manual-control lock.
    pub fn manual_curtain(
        &mut self,
        curtain: CurtainType,
        action: CurtainAction,
        now_ms: u64,
        gpio: &mut impl GpioPort,
        sink: &mut impl EventSink,
    ) -> Result<()> {
        if curtain == CurtainType::Top
            && action != CurtainAction::Stop
            && self.decision.manual_control_locked()
        {
            let e = Error::Rejected(PolicyRejection::ManualControlLocked);
            warn!("AppService: {:?} {} refused: {}", action, curtain, e);
            sink.emit(&AppEvent::Error(e));
            return Err(e);
        }

        match action {
            CurtainAction::Open => self.curtains.open(curtain, now_ms, gpio, sink),
            CurtainAction::Close => self.curtains.close(curtain, now_ms, gpio, sink),
            CurtainAction::Pause => self.curtains.pause(curtain, gpio, sink),
            CurtainAction::Resume => self.curtains.resume(curtain, now_ms, gpio, sink),
            CurtainAction::Stop => {
                self.curtains.stop(curtain, sink);
                Ok(())
            }
        }
    }

    pub fn set_pwm(&mut self, duty: u8, pwm: &mut impl PwmPort, sink: &mut impl EventSink) -> Result<()> {
        if duty > 100 {
            return Err(PolicyRejection::DutyOutOfRange.into());
        }
        match pwm.set_duty_cycle(duty) {
            Ok(()) => {
                info!("AppService: pwm duty {}%", duty);
                Ok(())
            }
            Err(e) => {
                sink.emit(&AppEvent::Error(e.into()));
                Err(e.into())
            }
        }
    }

    // ── Decision control ──────────────────────────────────────

    pub fn enable_decision(&mut self, sink: &mut impl EventSink) -> Result<()> {
        self.decision.enable(sink)
    }

    pub fn disable_decision(&mut self, sink: &mut impl EventSink) -> Result<()> {
        self.decision.disable(sink)
    }

    // ── Accessors ─────────────────────────────────────────────

    pub fn mqtt(&self) -> &MqttClient<T> {
        &self.mqtt
    }

    pub fn mqtt_mut(&mut self) -> &mut MqttClient<T> {
        &mut self.mqtt
    }

    pub fn curtains(&self) -> &CurtainController {
        &self.curtains
    }

    pub fn decision(&self) -> &DecisionManager {
        &self.decision
    }

    pub fn decision_mut(&mut self) -> &mut DecisionManager {
        &mut self.decision
    }

    pub fn soil_humidity(&self) -> Option<f64> {
        self.soil_humidity
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }
}
