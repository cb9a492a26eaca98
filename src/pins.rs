//! GPIO pin assignments for the greenhouse controller board.
//!
//! Single source of truth: the curtain controller references this module
//! rather than hard-coding pin numbers.  Numbers are Linux sysfs GPIO
//! indices on the RK3588 carrier board.
//!
//! Each curtain motor is driven by two parallel H-bridge driver boards.
//! Both boards share the direction lines; each has its own enable line,
//! and the two enables are always written with the same level.

use crate::curtain::CurtainType;

/// Pin set for one curtain motor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurtainPins {
    /// Direction line A: HIGH while opening.
    pub dir1: u32,
    /// Direction line B: HIGH while closing.
    pub dir2: u32,
    /// Enable line of driver board 1 (active LOW).
    pub enable: u32,
    /// Enable line of driver board 2 (active LOW).
    pub enable2: u32,
}

impl CurtainPins {
    /// All four pins, in export order.
    pub const fn all(&self) -> [u32; 4] {
        [self.dir1, self.dir2, self.enable, self.enable2]
    }
}

// ---------------------------------------------------------------------------
// Top (roof) curtain
// ---------------------------------------------------------------------------

pub const TOP_CURTAIN: CurtainPins = CurtainPins {
    dir1: 116,
    dir2: 139,
    enable: 99,
    enable2: 96,
};

// ---------------------------------------------------------------------------
// Side curtain
// ---------------------------------------------------------------------------

pub const SIDE_CURTAIN: CurtainPins = CurtainPins {
    dir1: 117,
    dir2: 138,
    enable: 105,
    enable2: 101,
};

// ---------------------------------------------------------------------------
// Enable polarity
// ---------------------------------------------------------------------------

/// Level that energises a driver board.
pub const MOTOR_ENABLE: bool = false;
/// Level that de-energises a driver board.
pub const MOTOR_DISABLE: bool = true;

/// Look up the pin set for a curtain.
pub const fn curtain_pins(curtain: CurtainType) -> CurtainPins {
    match curtain {
        CurtainType::Top => TOP_CURTAIN,
        CurtainType::Side => SIDE_CURTAIN,
    }
}
