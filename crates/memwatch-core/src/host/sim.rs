//! In-process host used by the standalone server and by tests.
//!
//! Guest memory is a big-endian byte window starting at a configurable base
//! address. Accesses outside the window read as zero and writes are ignored.

use super::{
    AudioOutput, ControllerClass, ControllerPorts, GuestMemory, PadState, RunControl, RunState,
    SnapshotStore, Width,
};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

/// A save or load request observed by the simulated host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotRequest {
    Save(String),
    Load { name: String, success: bool },
}

#[derive(Debug)]
struct SimState {
    base: u32,
    memory: Vec<u8>,
    memory_ready: bool,
    running: bool,
    run_state: RunState,
    snapshots: HashMap<String, Vec<u8>>,
    snapshot_log: Vec<SnapshotRequest>,
    remote_overrides: HashMap<usize, u16>,
    pad_overrides: HashMap<usize, PadState>,
    cleared: Vec<(ControllerClass, usize)>,
    volume: u8,
    speed: f32,
    resets: u32,
    stopped: bool,
}

/// A self-contained [`super::Host`] with a flat memory window.
#[derive(Debug)]
pub struct SimulatedHost {
    state: Mutex<SimState>,
}

impl SimulatedHost {
    /// Create a running host with `size` bytes of zeroed memory at `base`.
    pub fn new(base: u32, size: usize) -> Self {
        Self {
            state: Mutex::new(SimState {
                base,
                memory: vec![0; size],
                memory_ready: true,
                running: true,
                run_state: RunState::Running,
                snapshots: HashMap::new(),
                snapshot_log: Vec::new(),
                remote_overrides: HashMap::new(),
                pad_overrides: HashMap::new(),
                cleared: Vec::new(),
                volume: 100,
                speed: 1.0,
                resets: 0,
                stopped: false,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_memory_ready(&self, ready: bool) {
        self.state().memory_ready = ready;
    }

    /// Boot (or power down) the simulated core.
    pub fn set_running(&self, running: bool) {
        let mut state = self.state();
        state.running = running;
        if running {
            state.stopped = false;
        }
    }

    pub fn remote_override(&self, slot: usize) -> Option<u16> {
        self.state().remote_overrides.get(&slot).copied()
    }

    pub fn pad_override(&self, slot: usize) -> Option<PadState> {
        self.state().pad_overrides.get(&slot).copied()
    }

    /// Every `clear_override` call received, in order.
    pub fn cleared_overrides(&self) -> Vec<(ControllerClass, usize)> {
        self.state().cleared.clone()
    }

    pub fn snapshot_requests(&self) -> Vec<SnapshotRequest> {
        self.state().snapshot_log.clone()
    }

    pub fn volume(&self) -> u8 {
        self.state().volume
    }

    pub fn speed(&self) -> f32 {
        self.state().speed
    }

    pub fn reset_count(&self) -> u32 {
        self.state().resets
    }

    pub fn is_stopped(&self) -> bool {
        self.state().stopped
    }
}

impl SimState {
    fn offset(&self, addr: u32) -> Option<usize> {
        let offset = addr.wrapping_sub(self.base) as usize;
        (offset < self.memory.len()).then_some(offset)
    }
}

impl GuestMemory for SimulatedHost {
    fn is_ready(&self) -> bool {
        self.state().memory_ready
    }

    fn read(&self, width: Width, addr: u32) -> u32 {
        let state = self.state();
        (0..width.bytes() as u32).fold(0u32, |acc, i| {
            let byte = state
                .offset(addr.wrapping_add(i))
                .map(|o| state.memory[o])
                .unwrap_or(0);
            (acc << 8) | u32::from(byte)
        })
    }

    fn write(&self, width: Width, addr: u32, value: u32) {
        let mut state = self.state();
        let bytes = value.to_be_bytes();
        let start = 4 - width.bytes();
        for (i, byte) in bytes[start..].iter().enumerate() {
            if let Some(o) = state.offset(addr.wrapping_add(i as u32)) {
                state.memory[o] = *byte;
            }
        }
    }
}

impl RunControl for SimulatedHost {
    fn is_running(&self) -> bool {
        self.state().running
    }

    fn run_state(&self) -> RunState {
        self.state().run_state
    }

    fn set_run_state(&self, run_state: RunState) {
        debug!("Simulated host run state -> {:?}", run_state);
        self.state().run_state = run_state;
    }

    fn reset(&self) {
        self.state().resets += 1;
    }

    fn set_speed(&self, multiplier: f32) {
        self.state().speed = multiplier;
    }

    fn stop(&self) {
        info!("Simulated host stopped");
        let mut state = self.state();
        state.running = false;
        state.stopped = true;
    }
}

impl SnapshotStore for SimulatedHost {
    fn save_snapshot(&self, name: &str) {
        let mut state = self.state();
        let image = state.memory.clone();
        state.snapshots.insert(name.to_string(), image);
        state.snapshot_log.push(SnapshotRequest::Save(name.to_string()));
    }

    fn load_snapshot(&self, name: &str) -> bool {
        let mut state = self.state();
        let success = match state.snapshots.get(name).cloned() {
            Some(image) => {
                state.memory = image;
                true
            }
            None => false,
        };
        state.snapshot_log.push(SnapshotRequest::Load {
            name: name.to_string(),
            success,
        });
        success
    }
}

impl ControllerPorts for SimulatedHost {
    fn inject_buttons(&self, slot: usize, buttons: u16) {
        self.state().remote_overrides.insert(slot, buttons);
    }

    fn inject_pad(&self, slot: usize, pad: PadState) {
        self.state().pad_overrides.insert(slot, pad);
    }

    fn clear_override(&self, class: ControllerClass, slot: usize) {
        let mut state = self.state();
        match class {
            ControllerClass::Remote => {
                state.remote_overrides.remove(&slot);
            }
            ControllerClass::Pad => {
                state.pad_overrides.remove(&slot);
            }
        }
        state.cleared.push((class, slot));
    }
}

impl AudioOutput for SimulatedHost {
    fn set_volume(&self, volume: u8) {
        self.state().volume = volume;
    }
}
