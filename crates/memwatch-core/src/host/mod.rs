//! Interfaces to the host application.
//!
//! The server never touches emulator internals directly. Everything it needs
//! is expressed by the narrow traits in this module, grouped by subsystem:
//!
//! - [`GuestMemory`] - sized reads and writes of the guest address space
//! - [`RunControl`] - running/paused state, reset, speed and stop
//! - [`SnapshotStore`] - named save states
//! - [`ControllerPorts`] - forced controller input and its release
//! - [`AudioOutput`] - output volume
//!
//! [`Host`] is the union of all of them. Implementations must be safe to call
//! from the server's tasks; the host is responsible for serializing these
//! calls against its own simulation thread.

mod sim;

pub use sim::{SimulatedHost, SnapshotRequest};

use std::fmt;

/// Access width of a guest memory operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Width {
    W8,
    W16,
    W32,
}

impl Width {
    /// Parse a protocol width field (8, 16 or 32).
    pub fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            8 => Some(Width::W8),
            16 => Some(Width::W16),
            32 => Some(Width::W32),
            _ => None,
        }
    }

    pub fn bits(self) -> u32 {
        match self {
            Width::W8 => 8,
            Width::W16 => 16,
            Width::W32 => 32,
        }
    }

    pub fn bytes(self) -> usize {
        self.bits() as usize / 8
    }

    /// Truncate `value` to this width.
    pub fn truncate(self, value: u32) -> u32 {
        match self {
            Width::W8 => value & 0xff,
            Width::W16 => value & 0xffff,
            Width::W32 => value,
        }
    }
}

impl fmt::Display for Width {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.bits())
    }
}

/// Execution state of a running host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    Paused,
}

/// The two independent classes of virtual controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControllerClass {
    /// Button-only motion remote.
    Remote,
    /// Console pad with buttons and two analog sticks.
    Pad,
}

impl ControllerClass {
    pub const ALL: [ControllerClass; 2] = [ControllerClass::Remote, ControllerClass::Pad];

    pub fn as_str(&self) -> &'static str {
        match self {
            ControllerClass::Remote => "WII",
            ControllerClass::Pad => "GC",
        }
    }
}

impl fmt::Display for ControllerClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A complete forced pad input, with sticks in the controller's native range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PadState {
    pub buttons: u16,
    pub stick_x: u8,
    pub stick_y: u8,
    pub substick_x: u8,
    pub substick_y: u8,
}

impl PadState {
    pub const STICK_CENTER: i32 = 0x80;
    pub const STICK_RADIUS: f32 = 127.0;

    /// Build a pad state from normalized axes in `[-1, 1]`.
    ///
    /// Returns `None` if any axis is outside that range (NaN included).
    pub fn from_axes(buttons: u16, stick: (f32, f32), substick: (f32, f32)) -> Option<Self> {
        let axes = [stick.0, stick.1, substick.0, substick.1];
        if axes.iter().any(|a| !(-1.0..=1.0).contains(a)) {
            return None;
        }
        Some(Self {
            buttons,
            stick_x: Self::scale(stick.0),
            stick_y: Self::scale(stick.1),
            substick_x: Self::scale(substick.0),
            substick_y: Self::scale(substick.1),
        })
    }

    fn scale(axis: f32) -> u8 {
        // Truncates toward zero; the range check keeps the sum in 1..=255.
        (Self::STICK_CENTER + (axis * Self::STICK_RADIUS) as i32) as u8
    }
}

/// Sized access to the guest address space.
pub trait GuestMemory {
    /// Whether guest memory is mapped and may be accessed.
    fn is_ready(&self) -> bool;

    fn read(&self, width: Width, addr: u32) -> u32;

    /// Write `value` at `addr`; bits above `width` are discarded.
    fn write(&self, width: Width, addr: u32, value: u32);
}

/// Execution control of the host.
pub trait RunControl {
    /// Whether a title is booted and the core is up.
    fn is_running(&self) -> bool;
    fn run_state(&self) -> RunState;
    fn set_run_state(&self, state: RunState);
    /// Tap the console reset line.
    fn reset(&self);
    /// Set the emulation speed multiplier.
    fn set_speed(&self, multiplier: f32);
    /// Stop execution entirely.
    fn stop(&self);
}

/// Named save states.
pub trait SnapshotStore {
    fn save_snapshot(&self, name: &str);
    /// Returns `false` if the snapshot could not be loaded.
    fn load_snapshot(&self, name: &str) -> bool;
}

/// Forced input for virtual controllers.
pub trait ControllerPorts {
    /// Force button state on a remote slot, suppressing its real reports.
    fn inject_buttons(&self, slot: usize, buttons: u16);
    /// Force a complete pad state on a pad slot.
    fn inject_pad(&self, slot: usize, state: PadState);
    /// Drop any forced input on the slot and restore its real source.
    fn clear_override(&self, class: ControllerClass, slot: usize);
}

/// Audio output control.
pub trait AudioOutput {
    /// Set output volume, `0..=100`.
    fn set_volume(&self, volume: u8);
}

/// Everything the server needs from its host.
pub trait Host:
    GuestMemory + RunControl + SnapshotStore + ControllerPorts + AudioOutput + Send + Sync + 'static
{
}

impl<T> Host for T where
    T: GuestMemory
        + RunControl
        + SnapshotStore
        + ControllerPorts
        + AudioOutput
        + Send
        + Sync
        + 'static
{
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_width_from_bits() {
        assert_eq!(Width::from_bits(8), Some(Width::W8));
        assert_eq!(Width::from_bits(16), Some(Width::W16));
        assert_eq!(Width::from_bits(32), Some(Width::W32));
        assert_eq!(Width::from_bits(24), None);
        assert_eq!(Width::from_bits(0), None);
    }

    #[test]
    fn test_width_truncate() {
        assert_eq!(Width::W8.truncate(0x1234), 0x34);
        assert_eq!(Width::W16.truncate(0x12345678), 0x5678);
        assert_eq!(Width::W32.truncate(0x12345678), 0x12345678);
    }

    #[test]
    fn test_pad_state_scaling() {
        let neutral = PadState::from_axes(0, (0.0, 0.0), (0.0, 0.0)).unwrap();
        assert_eq!(neutral.stick_x, 0x80);
        assert_eq!(neutral.substick_y, 0x80);

        let extremes = PadState::from_axes(0x0100, (1.0, -1.0), (0.5, -0.5)).unwrap();
        assert_eq!(extremes.buttons, 0x0100);
        assert_eq!(extremes.stick_x, 255);
        assert_eq!(extremes.stick_y, 1);
        assert_eq!(extremes.substick_x, 128 + 63);
        assert_eq!(extremes.substick_y, 128 - 63);
    }

    #[test]
    fn test_pad_state_rejects_out_of_range() {
        assert!(PadState::from_axes(0, (1.01, 0.0), (0.0, 0.0)).is_none());
        assert!(PadState::from_axes(0, (0.0, 0.0), (0.0, -2.0)).is_none());
        assert!(PadState::from_axes(0, (f32::NAN, 0.0), (0.0, 0.0)).is_none());
    }
}
