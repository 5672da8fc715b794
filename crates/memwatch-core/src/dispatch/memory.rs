//! Guest memory access and subscription verbs.

use super::{CommandArgs, CommandContext};
use crate::error::{Result, WatchError};
use crate::host::{GuestMemory, Width};
use crate::protocol::Reply;
use tracing::debug;

/// `WRITE <width> <addr> <value>`
pub(super) fn write(ctx: &mut CommandContext<'_>, args: &CommandArgs<'_>) -> Result<Option<Reply>> {
    ctx.require_memory(args.verb())?;
    args.expect_len(3)?;
    let width = args.width(0)?;
    let addr = args.u32(1, "addr")?;
    let value = args.u32(2, "value")?;

    ctx.host.write(width, addr, value);
    Ok(None)
}

/// `WRITE_MULTI <addr> <value> [<value> ...]`, one byte per value.
pub(super) fn write_multi(
    ctx: &mut CommandContext<'_>,
    args: &CommandArgs<'_>,
) -> Result<Option<Reply>> {
    ctx.require_memory(args.verb())?;
    args.expect_at_least(2)?;
    let addr = args.u32(0, "addr")?;
    let values = args.u32_list(1, "value")?;

    for (offset, value) in (0u32..).zip(values) {
        ctx.host.write(Width::W8, addr.wrapping_add(offset), value);
    }
    Ok(None)
}

/// `READ <width> <addr>`, answered with `MEM <addr> <value>`.
pub(super) fn read(ctx: &mut CommandContext<'_>, args: &CommandArgs<'_>) -> Result<Option<Reply>> {
    ctx.require_memory(args.verb())?;
    args.expect_len(2)?;
    let width = args.width(0)?;
    let addr = args.u32(1, "addr")?;

    let value = ctx.host.read(width, addr);
    Ok(Some(Reply::Mem { addr, value }))
}

/// `SUBSCRIBE <width> <addr>`
pub(super) fn subscribe(
    ctx: &mut CommandContext<'_>,
    args: &CommandArgs<'_>,
) -> Result<Option<Reply>> {
    args.expect_len(2)?;
    let width = args.width(0)?;
    let addr = args.u32(1, "addr")?;

    if !ctx.session.subscriptions_mut().subscribe(addr, width) {
        debug!("Address {} already subscribed", addr);
    }
    Ok(None)
}

/// `SUBSCRIBE_MULTI <size> <addr>`
pub(super) fn subscribe_multi(
    ctx: &mut CommandContext<'_>,
    args: &CommandArgs<'_>,
) -> Result<Option<Reply>> {
    args.expect_len(2)?;
    let size = args.u32(0, "size")?;
    let addr = args.u32(1, "addr")?;

    if size == 0 || size > ctx.max_range_bytes {
        return Err(WatchError::Validation {
            field: "size".to_string(),
            message: format!("must be between 1 and {}, got {}", ctx.max_range_bytes, size),
        });
    }

    if !ctx
        .session
        .subscriptions_mut()
        .subscribe_range(addr, size as usize)
    {
        debug!("Range at {} already subscribed", addr);
    }
    Ok(None)
}

/// `UNSUBSCRIBE <addr>`
pub(super) fn unsubscribe(
    ctx: &mut CommandContext<'_>,
    args: &CommandArgs<'_>,
) -> Result<Option<Reply>> {
    args.expect_len(1)?;
    let addr = args.u32(0, "addr")?;
    ctx.session.subscriptions_mut().unsubscribe(addr);
    Ok(None)
}

/// `UNSUBSCRIBE_MULTI <addr>`
pub(super) fn unsubscribe_multi(
    ctx: &mut CommandContext<'_>,
    args: &CommandArgs<'_>,
) -> Result<Option<Reply>> {
    args.expect_len(1)?;
    let addr = args.u32(0, "addr")?;
    ctx.session.subscriptions_mut().unsubscribe_range(addr);
    Ok(None)
}
