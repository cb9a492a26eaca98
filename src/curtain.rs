//! Curtain controller: two motorised curtains behind a GPIO port.
//!
//! Each curtain has its own state machine:
//!
//! ```text
//!            open()                settle delay
//!  Stopped ──────────▶ Opening ──────────────────▶ Open
//!     │                  │  │
//!     │ close()          │  └── pause() ──▶ Paused ── resume() ──▶ Opening / Closing
//!     ▼                  │
//!  Closing ──── settle ──┼──────────────────────▶ Closed
//!                        │
//!                        └── GPIO write failed ──▶ Error
//! ```
//!
//! Top and side are independent; each may have one pending settle timer.
//! A new open/close while a curtain is moving restarts its timer.  Error is
//! sticky until a later actuation succeeds.
//!
//! Every actuation drives two direction lines and two redundant enable
//! lines (active-low).  All writes of one actuation are attempted even if
//! an earlier write fails; any failure fails the actuation.

use log::{debug, error, info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::{EventSink, GpioPort, PinDirection};
use crate::error::{ActuationError, Error, PolicyRejection, Result};
use crate::pins::{CurtainPins, MOTOR_DISABLE, MOTOR_ENABLE, curtain_pins};
use crate::timers::TimerSet;

// ───────────────────────────────────────────────────────────────
// Types
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CurtainType {
    Top,
    Side,
}

impl CurtainType {
    pub const ALL: [Self; 2] = [Self::Top, Self::Side];

    const fn index(self) -> usize {
        match self {
            Self::Top => 0,
            Self::Side => 1,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Top => "top",
            Self::Side => "side",
        }
    }
}

impl core::fmt::Display for CurtainType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurtainState {
    Stopped,
    Opening,
    Closing,
    Paused,
    Open,
    Closed,
    Error,
}

impl core::fmt::Display for CurtainState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            Self::Stopped => "stopped",
            Self::Opening => "opening",
            Self::Closing => "closing",
            Self::Paused => "paused",
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// Direction of travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Open,
    Close,
}

impl Direction {
    const fn moving_state(self) -> CurtainState {
        match self {
            Self::Open => CurtainState::Opening,
            Self::Close => CurtainState::Closing,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    state: CurtainState,
    /// Last commanded direction; `resume()` continues in it.
    direction: Option<Direction>,
}

impl Slot {
    const fn new() -> Self {
        Self {
            state: CurtainState::Stopped,
            direction: None,
        }
    }
}

// ───────────────────────────────────────────────────────────────
// CurtainController
// ───────────────────────────────────────────────────────────────

pub struct CurtainController {
    initialized: bool,
    settle_delay_ms: u64,
    slots: [Slot; 2],
    timers: TimerSet<CurtainType, 2>,
}

impl CurtainController {
    pub fn new(settle_delay_ms: u64) -> Self {
        Self {
            initialized: false,
            settle_delay_ms,
            slots: [Slot::new(); 2],
            timers: TimerSet::new(),
        }
    }

    /// Export all eight control pins as outputs and park both curtains
    /// (direction lines low, enables released).
    pub fn initialize(&mut self, gpio: &mut impl GpioPort, sink: &mut impl EventSink) -> Result<()> {
        let result = CurtainType::ALL.into_iter().try_for_each(|curtain| {
            let pins = curtain_pins(curtain);
            for pin in pins.all() {
                gpio.export_pin(pin)?;
                gpio.set_direction(pin, PinDirection::Out)?;
            }
            write_all(
                gpio,
                &[
                    (pins.dir1, false),
                    (pins.dir2, false),
                    (pins.enable, MOTOR_DISABLE),
                    (pins.enable2, MOTOR_DISABLE),
                ],
            )
        });

        match result {
            Ok(()) => {
                self.initialized = true;
                info!("Curtain: controller initialised");
                Ok(())
            }
            Err(e) => {
                error!("Curtain: initialisation failed: {}", e);
                sink.emit(&AppEvent::Error(e.into()));
                Err(e.into())
            }
        }
    }

    pub fn open(
        &mut self,
        curtain: CurtainType,
        now_ms: u64,
        gpio: &mut impl GpioPort,
        sink: &mut impl EventSink,
    ) -> Result<()> {
        self.ensure_initialized(curtain)?;
        self.actuate(curtain, Direction::Open, now_ms, gpio, sink)
    }

    pub fn close(
        &mut self,
        curtain: CurtainType,
        now_ms: u64,
        gpio: &mut impl GpioPort,
        sink: &mut impl EventSink,
    ) -> Result<()> {
        self.ensure_initialized(curtain)?;
        self.actuate(curtain, Direction::Close, now_ms, gpio, sink)
    }

    /// Release the enables.  A moving curtain becomes Paused and its
    /// settle timer is cancelled; a settled curtain keeps its state.
    pub fn pause(
        &mut self,
        curtain: CurtainType,
        gpio: &mut impl GpioPort,
        sink: &mut impl EventSink,
    ) -> Result<()> {
        self.ensure_initialized(curtain)?;
        let pins = curtain_pins(curtain);

        if let Err(e) = write_all(
            gpio,
            &[(pins.enable, MOTOR_DISABLE), (pins.enable2, MOTOR_DISABLE)],
        ) {
            self.fail(curtain, e, sink);
            return Err(e.into());
        }

        match self.state(curtain) {
            CurtainState::Opening | CurtainState::Closing => {
                self.timers.cancel(curtain);
                self.set_state(curtain, CurtainState::Paused, sink);
            }
            state => debug!("Curtain: {} paused while {}, enables released", curtain, state),
        }
        Ok(())
    }

    /// Continue a paused curtain in its last commanded direction
    /// (open if it was never commanded).
    pub fn resume(
        &mut self,
        curtain: CurtainType,
        now_ms: u64,
        gpio: &mut impl GpioPort,
        sink: &mut impl EventSink,
    ) -> Result<()> {
        self.ensure_initialized(curtain)?;
        if self.state(curtain) != CurtainState::Paused {
            warn!("Curtain: resume {} rejected, state is {}", curtain, self.state(curtain));
            return Err(PolicyRejection::NotPaused.into());
        }
        let direction = self.slots[curtain.index()].direction.unwrap_or(Direction::Open);
        self.actuate(curtain, direction, now_ms, gpio, sink)
    }

    /// Advisory stop: re-emits the current state, outputs are untouched.
    pub fn stop(&mut self, curtain: CurtainType, sink: &mut impl EventSink) {
        let state = self.state(curtain);
        warn!("Curtain: hardware stop not supported, {} stays {}", curtain, state);
        sink.emit(&AppEvent::CurtainStateChanged {
            curtain,
            from: state,
            to: state,
        });
    }

    /// Complete settle delays that have elapsed.
    pub fn poll(&mut self, now_ms: u64, sink: &mut impl EventSink) {
        for curtain in self.timers.due(now_ms) {
            match self.state(curtain) {
                CurtainState::Opening => self.set_state(curtain, CurtainState::Open, sink),
                CurtainState::Closing => self.set_state(curtain, CurtainState::Closed, sink),
                state => debug!("Curtain: stale settle timer for {} ({})", curtain, state),
            }
        }
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn state(&self, curtain: CurtainType) -> CurtainState {
        self.slots[curtain.index()].state
    }

    pub fn is_open(&self, curtain: CurtainType) -> bool {
        self.state(curtain) == CurtainState::Open
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Last commanded direction, if any.
    pub fn direction(&self, curtain: CurtainType) -> Option<Direction> {
        self.slots[curtain.index()].direction
    }

    /// Deadline of the pending settle timer, if the curtain is moving.
    pub fn settle_deadline(&self, curtain: CurtainType) -> Option<u64> {
        self.timers.deadline(curtain)
    }

    /// One-line human-readable summary, e.g. `top: opening`.
    pub fn status_line(&self, curtain: CurtainType) -> String {
        format!("{}: {}", curtain, self.state(curtain))
    }

    // ── Internals ─────────────────────────────────────────────

    fn ensure_initialized(&self, curtain: CurtainType) -> Result<()> {
        if self.initialized {
            Ok(())
        } else {
            warn!("Curtain: {} command before initialisation", curtain);
            Err(PolicyRejection::Uninitialized.into())
        }
    }

    fn actuate(
        &mut self,
        curtain: CurtainType,
        direction: Direction,
        now_ms: u64,
        gpio: &mut impl GpioPort,
        sink: &mut impl EventSink,
    ) -> Result<()> {
        self.slots[curtain.index()].direction = Some(direction);
        self.set_state(curtain, direction.moving_state(), sink);

        match drive(gpio, curtain_pins(curtain), direction) {
            Ok(()) => {
                self.timers.arm_once(curtain, now_ms, self.settle_delay_ms);
                Ok(())
            }
            Err(e) => {
                self.fail(curtain, e, sink);
                Err(e.into())
            }
        }
    }

    fn fail(&mut self, curtain: CurtainType, e: ActuationError, sink: &mut impl EventSink) {
        error!("Curtain: {} actuation failed: {}", curtain, e);
        self.timers.cancel(curtain);
        self.set_state(curtain, CurtainState::Error, sink);
        sink.emit(&AppEvent::Error(Error::Actuation(e)));
    }

    fn set_state(&mut self, curtain: CurtainType, to: CurtainState, sink: &mut impl EventSink) {
        let slot = &mut self.slots[curtain.index()];
        if slot.state == to {
            return;
        }
        let from = slot.state;
        slot.state = to;
        info!("Curtain: {} {} -> {}", curtain, from, to);
        sink.emit(&AppEvent::CurtainStateChanged { curtain, from, to });
    }
}

// ───────────────────────────────────────────────────────────────
// Pin driving
// ───────────────────────────────────────────────────────────────

fn drive(gpio: &mut impl GpioPort, pins: CurtainPins, direction: Direction) -> core::result::Result<(), ActuationError> {
    let (dir1, dir2) = match direction {
        Direction::Open => (true, false),
        Direction::Close => (false, true),
    };
    write_all(
        gpio,
        &[
            (pins.dir1, dir1),
            (pins.dir2, dir2),
            (pins.enable, MOTOR_ENABLE),
            (pins.enable2, MOTOR_ENABLE),
        ],
    )
}

/// Attempt every write; report the first failure.
fn write_all(gpio: &mut impl GpioPort, writes: &[(u32, bool)]) -> core::result::Result<(), ActuationError> {
    let mut first_error = None;
    for &(pin, level) in writes {
        if let Err(e) = gpio.set_pin(pin, level) {
            first_error.get_or_insert(e);
        }
    }
    first_error.map_or(Ok(()), Err)
}
