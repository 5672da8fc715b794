//! One iteration of the poll loop.
//!
//! A tick first diffs every live session's subscriptions against guest memory
//! and queues `MEM`/`MEM_MULTI` notifications for the values that changed, then
//! advances the controller hijack timers and hands expired slots back to the
//! real input source.

use crate::host::{ControllerPorts, GuestMemory, Host, RunControl, RunState};
use crate::server::ServerState;
use std::time::Duration;
use tracing::debug;

/// What a single tick did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    /// Notifications queued across all sessions.
    pub notifications: usize,
    /// Hijacks that ran out and were released.
    pub released: usize,
}

/// Run one tick of `elapsed` length over the shared state.
pub fn tick(state: &mut ServerState, host: &dyn Host, elapsed: Duration) -> TickReport {
    let mut report = TickReport::default();

    if host.is_ready() {
        for session in state.sessions.iter_mut() {
            if session.is_disconnected() {
                continue;
            }
            for reply in session.subscriptions_mut().poll(host) {
                if session.send(&reply).is_err() {
                    break;
                }
                report.notifications += 1;
            }
        }
    }

    if host.is_running() && host.run_state() == RunState::Running {
        for (class, slot) in state.hijacks.tick(elapsed) {
            debug!("Hijack on {} slot {} expired", class, slot);
            host.clear_override(class, slot);
            report.released += 1;
        }
    }

    report
}
