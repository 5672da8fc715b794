//! Controller input injection verbs.
//!
//! Each injection forces input on one slot and (re)arms that slot's hijack
//! timer; the poll loop releases the slot once the timer runs out.

use super::{CommandArgs, CommandContext};
use crate::error::{Result, WatchError};
use crate::host::{ControllerClass, ControllerPorts, PadState};
use crate::protocol::Reply;
use tracing::debug;

/// `BUTTONSTATES_WII <slot> <buttons>`
pub(super) fn buttonstates_remote(
    ctx: &mut CommandContext<'_>,
    args: &CommandArgs<'_>,
) -> Result<Option<Reply>> {
    ctx.require_running(args.verb())?;
    args.expect_len(2)?;
    let slot = args.usize(0, "slot")?;
    let buttons = args.u16(1, "buttons")?;
    ctx.hijacks.check_slot(ControllerClass::Remote, slot)?;

    debug!("Sending remote buttons. slot: {}, buttons: {:#06x}", slot, buttons);
    ctx.host.inject_buttons(slot, buttons);
    ctx.hijacks.arm(ControllerClass::Remote, slot)?;
    Ok(None)
}

/// `BUTTONSTATES_GC <slot> <buttons> <stickX> <stickY> <substickX> <substickY>`
///
/// Axes are normalized to `[-1, 1]`.
pub(super) fn buttonstates_pad(
    ctx: &mut CommandContext<'_>,
    args: &CommandArgs<'_>,
) -> Result<Option<Reply>> {
    ctx.require_running(args.verb())?;
    args.expect_len(6)?;
    let slot = args.usize(0, "slot")?;
    let buttons = args.u16(1, "buttons")?;
    let stick = (args.f32(2, "stickX")?, args.f32(3, "stickY")?);
    let substick = (args.f32(4, "substickX")?, args.f32(5, "substickY")?);
    ctx.hijacks.check_slot(ControllerClass::Pad, slot)?;

    let pad = PadState::from_axes(buttons, stick, substick).ok_or_else(|| {
        WatchError::Validation {
            field: "axes".to_string(),
            message: format!(
                "stick values must be within [-1, 1], got {:?} {:?}",
                stick, substick
            ),
        }
    })?;

    debug!("Sending pad input. slot: {}, state: {:?}", slot, pad);
    ctx.host.inject_pad(slot, pad);
    ctx.hijacks.arm(ControllerClass::Pad, slot)?;
    Ok(None)
}
