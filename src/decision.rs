//! Light-driven curtain automation.
//!
//! Hysteresis on ambient light with a debounce and a fixed-length
//! operation window:
//!
//! ```text
//!   Disabled ── enable() ──▶ Enabled ── debounced lux > open  ──▶ Operating(OpenCurtain)
//!      ▲                       │  ▲ ─── debounced lux < close ──▶ Operating(CloseCurtain)
//!      └──── disable() ────────┘  │                                   │
//!                                 └──── operation window elapses ─────┘
//!                                       (pause top curtain, unlock)
//! ```
//!
//! While Operating the manager holds the manual-control lock on the top
//! curtain, and `enable()`/`disable()` are rejected.  Readings inside the
//! band `[close, open]` never trigger anything.
//!
//! The state always starts Disabled; nothing is persisted.

use log::{debug, error, info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::{EventSink, GpioPort};
use crate::config::DecisionConfig;
use crate::curtain::{CurtainController, CurtainType};
use crate::error::{Error, PolicyRejection, Result};
use crate::timers::TimerSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionState {
    Disabled,
    Enabled,
    Operating,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationType {
    None,
    OpenCurtain,
    CloseCurtain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecisionTimer {
    Debounce,
    Operation,
}

/// Pure hysteresis rule.
pub fn intent_for(lux: f32, open_threshold: f32, close_threshold: f32) -> OperationType {
    if lux > open_threshold {
        OperationType::OpenCurtain
    } else if lux < close_threshold {
        OperationType::CloseCurtain
    } else {
        OperationType::None
    }
}

pub struct DecisionManager {
    state: DecisionState,
    operation: OperationType,
    open_threshold: f32,
    close_threshold: f32,
    operation_duration_ms: u64,
    debounce_ms: u64,
    /// Most recent reading, whatever the state.
    last_lux: Option<f32>,
    /// Reading awaiting the debounce timer.
    pending_lux: Option<f32>,
    locked: bool,
    timers: TimerSet<DecisionTimer, 2>,
}

impl DecisionManager {
    pub fn new(cfg: &DecisionConfig) -> Self {
        Self {
            state: DecisionState::Disabled,
            operation: OperationType::None,
            open_threshold: cfg.open_threshold_lux,
            close_threshold: cfg.close_threshold_lux,
            operation_duration_ms: u64::from(cfg.operation_duration_secs) * 1000,
            debounce_ms: u64::from(cfg.debounce_interval_secs) * 1000,
            last_lux: None,
            pending_lux: None,
            locked: false,
            timers: TimerSet::new(),
        }
    }

    // ── Mode control ──────────────────────────────────────────

    pub fn enable(&mut self, sink: &mut impl EventSink) -> Result<()> {
        match self.state {
            DecisionState::Operating => {
                warn!("Decision: enable rejected, operation in progress");
                Err(PolicyRejection::OperationInProgress.into())
            }
            DecisionState::Enabled => Ok(()),
            DecisionState::Disabled => {
                self.set_state(DecisionState::Enabled, sink);
                Ok(())
            }
        }
    }

    pub fn disable(&mut self, sink: &mut impl EventSink) -> Result<()> {
        match self.state {
            DecisionState::Operating => {
                warn!("Decision: disable rejected, operation in progress");
                Err(PolicyRejection::OperationInProgress.into())
            }
            DecisionState::Disabled => Ok(()),
            DecisionState::Enabled => {
                self.timers.cancel(DecisionTimer::Debounce);
                self.pending_lux = None;
                self.set_state(DecisionState::Disabled, sink);
                Ok(())
            }
        }
    }

    // ── Inputs ────────────────────────────────────────────────

    /// Record a light reading.  While Enabled it (re)starts the debounce
    /// window; only the last reading in a window is evaluated.
    pub fn on_light_reading(&mut self, lux: f32, now_ms: u64) {
        self.last_lux = Some(lux);
        if self.state != DecisionState::Enabled {
            return;
        }
        self.pending_lux = Some(lux);
        self.timers
            .arm_once(DecisionTimer::Debounce, now_ms, self.debounce_ms);
    }

    /// Fire due timers: evaluate a debounced reading, or end an operation.
    pub fn poll(
        &mut self,
        now_ms: u64,
        curtains: &mut CurtainController,
        gpio: &mut impl GpioPort,
        sink: &mut impl EventSink,
    ) {
        for timer in self.timers.due(now_ms) {
            match timer {
                DecisionTimer::Debounce => {
                    let Some(lux) = self.pending_lux.take() else {
                        continue;
                    };
                    if self.state != DecisionState::Enabled {
                        continue;
                    }
                    match intent_for(lux, self.open_threshold, self.close_threshold) {
                        OperationType::None => {
                            debug!("Decision: {:.0} lux inside hysteresis band", lux);
                        }
                        op => self.execute(op, lux, now_ms, curtains, gpio, sink),
                    }
                }
                DecisionTimer::Operation => self.complete(curtains, gpio, sink),
            }
        }
    }

    fn execute(
        &mut self,
        op: OperationType,
        lux: f32,
        now_ms: u64,
        curtains: &mut CurtainController,
        gpio: &mut impl GpioPort,
        sink: &mut impl EventSink,
    ) {
        info!("Decision: {:.0} lux -> {:?}", lux, op);
        self.operation = op;
        self.set_state(DecisionState::Operating, sink);
        sink.emit(&AppEvent::OperationStarted(op));
        self.set_lock(true, sink);

        let result = match op {
            OperationType::OpenCurtain => curtains.open(CurtainType::Top, now_ms, gpio, sink),
            OperationType::CloseCurtain => curtains.close(CurtainType::Top, now_ms, gpio, sink),
            OperationType::None => Ok(()),
        };

        match result {
            Ok(()) => {
                self.timers
                    .arm_once(DecisionTimer::Operation, now_ms, self.operation_duration_ms);
            }
            Err(e) => {
                error!("Decision: {:?} failed: {}", op, e);
                // The controller reports its own actuation failures.
                if !matches!(e, Error::Actuation(_)) {
                    sink.emit(&AppEvent::Error(e));
                }
                self.complete(curtains, gpio, sink);
            }
        }
    }

    /// End the operation: pause the top curtain, release the lock,
    /// return to Enabled.
    fn complete(
        &mut self,
        curtains: &mut CurtainController,
        gpio: &mut impl GpioPort,
        sink: &mut impl EventSink,
    ) {
        self.timers.cancel(DecisionTimer::Operation);
        if let Err(e) = curtains.pause(CurtainType::Top, gpio, sink) {
            warn!("Decision: pause after operation failed: {}", e);
        }

        let op = self.operation;
        self.operation = OperationType::None;
        self.set_lock(false, sink);
        self.set_state(DecisionState::Enabled, sink);
        sink.emit(&AppEvent::OperationCompleted(op));
        info!("Decision: {:?} complete", op);
    }

    // ── Tuning ────────────────────────────────────────────────

    /// Requires `open > close >= 0`, both finite.
    pub fn set_light_thresholds(&mut self, open: f32, close: f32) -> Result<()> {
        if !(open.is_finite() && close.is_finite() && close >= 0.0 && open > close) {
            warn!("Decision: rejected thresholds open={} close={}", open, close);
            return Err(PolicyRejection::InvalidThresholds.into());
        }
        self.open_threshold = open;
        self.close_threshold = close;
        info!("Decision: thresholds open>{} close<{}", open, close);
        Ok(())
    }

    /// Applies to the next operation.
    pub fn set_operation_duration(&mut self, secs: u32) {
        self.operation_duration_ms = u64::from(secs.max(1)) * 1000;
    }

    pub fn set_debounce_interval(&mut self, secs: u32) {
        self.debounce_ms = u64::from(secs) * 1000;
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn state(&self) -> DecisionState {
        self.state
    }

    pub fn operation(&self) -> OperationType {
        self.operation
    }

    pub fn is_operating(&self) -> bool {
        self.state == DecisionState::Operating
    }

    pub fn manual_control_locked(&self) -> bool {
        self.locked
    }

    pub fn last_lux(&self) -> Option<f32> {
        self.last_lux
    }

    pub fn thresholds(&self) -> (f32, f32) {
        (self.open_threshold, self.close_threshold)
    }

    // ── Internals ─────────────────────────────────────────────

    fn set_state(&mut self, to: DecisionState, sink: &mut impl EventSink) {
        if self.state == to {
            return;
        }
        let from = self.state;
        self.state = to;
        info!("Decision: {:?} -> {:?}", from, to);
        sink.emit(&AppEvent::DecisionStateChanged { from, to });
    }

    fn set_lock(&mut self, locked: bool, sink: &mut impl EventSink) {
        self.locked = locked;
        sink.emit(&AppEvent::ManualControlLocked(locked));
    }
}
