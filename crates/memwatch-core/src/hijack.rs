//! Time-bounded controller input hijacks.
//!
//! Injecting input into a controller slot overrides its real input source for
//! a fixed duration. Every poll tick counts the remaining time down; once it
//! runs out the slot returns to [`HijackState::Idle`] and the host is told to
//! restore the real input. Re-injecting while overridden restarts the full
//! duration.

use crate::error::{Result, WatchError};
use crate::host::ControllerClass;
use std::time::Duration;

/// Override state of one controller slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HijackState {
    /// Real input passes through.
    Idle,
    /// Forced input is active; `remaining` is always non-zero.
    Overridden { remaining: Duration },
}

impl HijackState {
    pub fn is_overridden(&self) -> bool {
        matches!(self, HijackState::Overridden { .. })
    }
}

/// Hijack timers for every remote and pad slot.
#[derive(Debug)]
pub struct HijackTable {
    timeout: Duration,
    remotes: Vec<HijackState>,
    pads: Vec<HijackState>,
}

impl HijackTable {
    pub fn new(remote_slots: usize, pad_slots: usize, timeout: Duration) -> Self {
        Self {
            timeout,
            remotes: vec![HijackState::Idle; remote_slots],
            pads: vec![HijackState::Idle; pad_slots],
        }
    }

    fn slots(&self, class: ControllerClass) -> &[HijackState] {
        match class {
            ControllerClass::Remote => &self.remotes,
            ControllerClass::Pad => &self.pads,
        }
    }

    fn slots_mut(&mut self, class: ControllerClass) -> &mut [HijackState] {
        match class {
            ControllerClass::Remote => &mut self.remotes,
            ControllerClass::Pad => &mut self.pads,
        }
    }

    pub fn slot_count(&self, class: ControllerClass) -> usize {
        self.slots(class).len()
    }

    /// Fail unless `slot` exists for `class`.
    pub fn check_slot(&self, class: ControllerClass, slot: usize) -> Result<()> {
        let count = self.slot_count(class);
        if slot >= count {
            return Err(WatchError::SlotOutOfRange { class, slot, count });
        }
        Ok(())
    }

    pub fn state(&self, class: ControllerClass, slot: usize) -> Option<HijackState> {
        self.slots(class).get(slot).copied()
    }

    /// Start or restart the hijack on a slot.
    pub fn arm(&mut self, class: ControllerClass, slot: usize) -> Result<()> {
        self.check_slot(class, slot)?;
        let timeout = self.timeout;
        self.slots_mut(class)[slot] = HijackState::Overridden { remaining: timeout };
        Ok(())
    }

    /// Advance every active hijack by `elapsed`.
    ///
    /// Returns the slots whose hijack ran out during this tick; the caller must
    /// release their forced input.
    pub fn tick(&mut self, elapsed: Duration) -> Vec<(ControllerClass, usize)> {
        let mut expired = Vec::new();
        for class in ControllerClass::ALL {
            for (slot, state) in self.slots_mut(class).iter_mut().enumerate() {
                if let HijackState::Overridden { remaining } = *state {
                    *state = match remaining.checked_sub(elapsed) {
                        Some(left) if !left.is_zero() => {
                            HijackState::Overridden { remaining: left }
                        }
                        _ => {
                            expired.push((class, slot));
                            HijackState::Idle
                        }
                    };
                }
            }
        }
        expired
    }

    pub fn active_count(&self) -> usize {
        self.remotes
            .iter()
            .chain(self.pads.iter())
            .filter(|s| s.is_overridden())
            .count()
    }
}
