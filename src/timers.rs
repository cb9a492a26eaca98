//! Named timer engine.
//!
//! Every time-based behaviour in the controller (curtain settle delay,
//! decision debounce and operation duration, MQTT report / heartbeat /
//! reconnect backoff) is a keyed timer in a [`TimerSet`].  The set never
//! calls back into its owner; instead the owner polls it once per loop
//! iteration and dispatches on the keys that came due:
//!
//! ```text
//!   main loop ── now_ms ──▶ owner.poll(now_ms)
//!                              │
//!                              ▼
//!                        timers.due(now_ms) ──▶ [Key, Key, …]
//!                              │
//!                              ▼
//!                        match key { … }
//! ```
//!
//! Rules:
//! - at most one live timer per key; arming a key again replaces its
//!   deadline (last writer wins, timers never stack),
//! - one-shot timers disarm themselves when they fire,
//! - periodic timers re-arm relative to their previous deadline and skip
//!   ticks that were missed entirely.
//!
//! Time is a caller-supplied monotonic millisecond counter, so tests can
//! drive the whole controller with a virtual clock.

use log::warn;

// ═══════════════════════════════════════════════════════════════
//  Timer types
// ═══════════════════════════════════════════════════════════════

/// How a timer behaves after it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Fire once, then disarm.
    OneShot,
    /// Fire every `interval_ms` until cancelled.
    Periodic { interval_ms: u64 },
}

/// Internal bookkeeping for a live timer.
#[derive(Debug, Clone, Copy)]
struct TimerEntry<K> {
    key: K,
    deadline_ms: u64,
    kind: TimerKind,
}

// ═══════════════════════════════════════════════════════════════
//  TimerSet
// ═══════════════════════════════════════════════════════════════

/// Fixed-capacity set of keyed timers (stack-allocated).
///
/// `N` is the number of distinct keys the owner uses.
pub struct TimerSet<K, const N: usize> {
    slots: [Option<TimerEntry<K>>; N],
}

impl<K: Copy + PartialEq + core::fmt::Debug, const N: usize> TimerSet<K, N> {
    pub fn new() -> Self {
        Self {
            slots: core::array::from_fn(|_| None),
        }
    }

    /// Arm `key` to fire once, `delay_ms` after `now_ms`.
    pub fn arm_once(&mut self, key: K, now_ms: u64, delay_ms: u64) -> bool {
        self.arm(key, now_ms.saturating_add(delay_ms), TimerKind::OneShot)
    }

    /// Arm `key` to fire every `interval_ms`, first at `now_ms + interval_ms`.
    pub fn arm_periodic(&mut self, key: K, now_ms: u64, interval_ms: u64) -> bool {
        let interval_ms = interval_ms.max(1);
        self.arm(
            key,
            now_ms.saturating_add(interval_ms),
            TimerKind::Periodic { interval_ms },
        )
    }

    fn arm(&mut self, key: K, deadline_ms: u64, kind: TimerKind) -> bool {
        let entry = TimerEntry {
            key,
            deadline_ms,
            kind,
        };

        // Replace an existing instance of the same key first.
        if let Some(slot) = self.slots.iter_mut().find(|s| matches!(s, Some(e) if e.key == key)) {
            *slot = Some(entry);
            return true;
        }
        if let Some(slot) = self.slots.iter_mut().find(|s| s.is_none()) {
            *slot = Some(entry);
            return true;
        }
        warn!("TimerSet: no free slot for {:?}", key);
        false
    }

    /// Disarm `key`.  Returns `true` if it was armed.
    pub fn cancel(&mut self, key: K) -> bool {
        for slot in &mut self.slots {
            if matches!(slot, Some(e) if e.key == key) {
                *slot = None;
                return true;
            }
        }
        false
    }

    /// Disarm every timer.
    pub fn cancel_all(&mut self) {
        self.slots = core::array::from_fn(|_| None);
    }

    pub fn is_armed(&self, key: K) -> bool {
        self.slots.iter().flatten().any(|e| e.key == key)
    }

    /// Absolute deadline of `key`, if armed.
    pub fn deadline(&self, key: K) -> Option<u64> {
        self.slots
            .iter()
            .flatten()
            .find(|e| e.key == key)
            .map(|e| e.deadline_ms)
    }

    /// Interval of a periodic timer, if `key` is armed as periodic.
    pub fn interval(&self, key: K) -> Option<u64> {
        self.slots.iter().flatten().find(|e| e.key == key).and_then(|e| match e.kind {
            TimerKind::Periodic { interval_ms } => Some(interval_ms),
            TimerKind::OneShot => None,
        })
    }

    /// Number of armed timers.
    pub fn armed_count(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    /// Collect every key whose deadline is `<= now_ms`, earliest first.
    ///
    /// One-shot entries are removed; periodic entries are re-armed.
    pub fn due(&mut self, now_ms: u64) -> heapless::Vec<K, N> {
        let mut fired: heapless::Vec<(u64, K), N> = heapless::Vec::new();

        for slot in &mut self.slots {
            let Some(entry) = *slot else { continue };
            if entry.deadline_ms > now_ms {
                continue;
            }
            // Capacity equals slot count, so this push cannot fail.
            let _ = fired.push((entry.deadline_ms, entry.key));
            *slot = match entry.kind {
                TimerKind::OneShot => None,
                TimerKind::Periodic { interval_ms } => {
                    let next = entry.deadline_ms.saturating_add(interval_ms);
                    let deadline_ms = if next > now_ms {
                        next
                    } else {
                        now_ms.saturating_add(interval_ms)
                    };
                    Some(TimerEntry { deadline_ms, ..entry })
                }
            };
        }

        fired.sort_unstable_by_key(|(deadline, _)| *deadline);
        fired.into_iter().map(|(_, key)| key).collect()
    }
}

impl<K: Copy + PartialEq + core::fmt::Debug, const N: usize> Default for TimerSet<K, N> {
    fn default() -> Self {
        Self::new()
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════
