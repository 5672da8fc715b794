//! Execution control, save state and audio verbs.

use super::{CommandArgs, CommandContext};
use crate::config::ProtocolConfig;
use crate::error::{Result, WatchError};
use crate::host::{AudioOutput, RunControl, RunState, SnapshotStore};
use crate::protocol::Reply;
use tracing::warn;

/// Reject empty names and names containing reserved characters.
pub(crate) fn validate_filename(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() || name.contains(ProtocolConfig::RESERVED_FILENAME_CHARS) {
        return Err(WatchError::InvalidFilename {
            name: name.to_string(),
        });
    }
    Ok(name)
}

fn set_run_state(
    ctx: &mut CommandContext<'_>,
    args: &CommandArgs<'_>,
    state: RunState,
) -> Result<Option<Reply>> {
    ctx.require_running(args.verb())?;
    args.expect_len(0)?;
    ctx.host.set_run_state(state);
    Ok(None)
}

/// `PAUSE`
pub(super) fn pause(ctx: &mut CommandContext<'_>, args: &CommandArgs<'_>) -> Result<Option<Reply>> {
    set_run_state(ctx, args, RunState::Paused)
}

/// `RESUME`
pub(super) fn resume(
    ctx: &mut CommandContext<'_>,
    args: &CommandArgs<'_>,
) -> Result<Option<Reply>> {
    set_run_state(ctx, args, RunState::Running)
}

/// `RESET`
pub(super) fn reset(ctx: &mut CommandContext<'_>, args: &CommandArgs<'_>) -> Result<Option<Reply>> {
    ctx.require_running(args.verb())?;
    args.expect_len(0)?;
    ctx.host.reset();
    Ok(None)
}

/// `SAVE <filename>`
pub(super) fn save(ctx: &mut CommandContext<'_>, args: &CommandArgs<'_>) -> Result<Option<Reply>> {
    ctx.require_running(args.verb())?;
    let name = validate_filename(args.rest())?;
    ctx.host.save_snapshot(name);
    Ok(None)
}

/// `LOAD <filename>`, always answered with `SUCCESS` or `FAIL`.
pub(super) fn load(ctx: &mut CommandContext<'_>, args: &CommandArgs<'_>) -> Result<Option<Reply>> {
    let outcome = (|| -> Result<()> {
        ctx.require_running(args.verb())?;
        let name = validate_filename(args.rest())?;
        if !ctx.host.load_snapshot(name) {
            return Err(WatchError::SnapshotLoadFailed {
                name: name.to_string(),
            });
        }
        Ok(())
    })();

    if let Err(e) = &outcome {
        warn!("LOAD failed: {}", e);
    }
    Ok(Some(Reply::feedback(outcome.is_ok())))
}

/// `VOLUME <0-100>`
pub(super) fn volume(
    ctx: &mut CommandContext<'_>,
    args: &CommandArgs<'_>,
) -> Result<Option<Reply>> {
    args.expect_len(1)?;
    let volume = args.i32(0, "volume")?;
    if !(0..=100).contains(&volume) {
        return Err(WatchError::Validation {
            field: "volume".to_string(),
            message: format!("must be between 0 and 100, got {}", volume),
        });
    }
    ctx.host.set_volume(volume as u8);
    Ok(None)
}

/// `SPEED <multiplier>`
pub(super) fn speed(ctx: &mut CommandContext<'_>, args: &CommandArgs<'_>) -> Result<Option<Reply>> {
    args.expect_len(1)?;
    let multiplier = args.f32(0, "speed")?;
    if !multiplier.is_finite() || multiplier < 0.0 {
        return Err(WatchError::Validation {
            field: "speed".to_string(),
            message: format!("must be a finite non-negative number, got {}", multiplier),
        });
    }
    ctx.host.set_speed(multiplier);
    Ok(None)
}

/// `STOP`
pub(super) fn stop(ctx: &mut CommandContext<'_>, args: &CommandArgs<'_>) -> Result<Option<Reply>> {
    args.expect_len(0)?;
    ctx.host.stop();
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::Harness;
    use super::*;
    use crate::host::SnapshotRequest;

    #[test]
    fn test_validate_filename() {
        assert_eq!(validate_filename("  slot 1.sav ").unwrap(), "slot 1.sav");
        for bad in ["", "   ", "a\"b", "a<b", "a>b", "a|b", "what?"] {
            assert!(validate_filename(bad).is_err(), "{:?} should be rejected", bad);
        }
    }

    #[test]
    fn test_pause_and_resume() {
        let mut h = Harness::new();
        h.run("PAUSE");
        assert_eq!(h.host.run_state(), RunState::Paused);
        h.run("RESUME");
        assert_eq!(h.host.run_state(), RunState::Running);
    }

    #[test]
    fn test_run_control_requires_running_host() {
        let mut h = Harness::new();
        h.host.set_running(false);
        assert!(matches!(
            h.dispatch("PAUSE"),
            Err(WatchError::HostNotRunning { .. })
        ));
        assert!(h.dispatch("RESET").is_err());
        assert!(h.dispatch("SAVE state").is_err());
        assert_eq!(h.host.run_state(), RunState::Running);
        assert_eq!(h.host.reset_count(), 0);
        assert!(h.host.snapshot_requests().is_empty());
    }

    #[test]
    fn test_reset() {
        let mut h = Harness::new();
        h.run("RESET;RESET");
        assert_eq!(h.host.reset_count(), 2);
    }

    #[test]
    fn test_save_uses_rest_of_line() {
        let mut h = Harness::new();
        h.run("SAVE  my save file.sav ");
        assert_eq!(
            h.host.snapshot_requests(),
            vec![SnapshotRequest::Save("my save file.sav".into())]
        );
    }

    #[test]
    fn test_save_rejects_reserved_characters() {
        let mut h = Harness::new();
        assert!(matches!(
            h.dispatch("SAVE bad|name"),
            Err(WatchError::InvalidFilename { .. })
        ));
        assert!(h.dispatch("SAVE").is_err());
        assert!(h.host.snapshot_requests().is_empty());
    }

    #[test]
    fn test_load_success_and_failure() {
        let mut h = Harness::new();
        h.run("SAVE a;LOAD a;LOAD missing");
        assert_eq!(h.replies(), vec!["SUCCESS\n", "FAIL\n"]);
    }

    #[test]
    fn test_load_invalid_name_never_reaches_host() {
        let mut h = Harness::new();
        h.run("LOAD \"quoted\"");
        h.run("LOAD");
        assert_eq!(h.replies(), vec!["FAIL\n", "FAIL\n"]);
        assert!(h.host.snapshot_requests().is_empty());
    }

    #[test]
    fn test_load_requires_running_host() {
        let mut h = Harness::new();
        h.run("SAVE a");
        h.host.set_running(false);
        h.run("LOAD a");
        assert_eq!(h.replies(), vec!["FAIL\n"]);
        assert_eq!(h.host.snapshot_requests().len(), 1);
    }

    #[test]
    fn test_volume() {
        let mut h = Harness::new();
        h.run("VOLUME 40");
        assert_eq!(h.host.volume(), 40);
        assert!(h.dispatch("VOLUME 101").is_err());
        assert!(h.dispatch("VOLUME -1").is_err());
        assert!(h.dispatch("VOLUME loud").is_err());
        assert_eq!(h.host.volume(), 40);
    }

    #[test]
    fn test_volume_does_not_need_running_host() {
        let mut h = Harness::new();
        h.host.set_running(false);
        h.run("VOLUME 0;SPEED 2.5");
        assert_eq!(h.host.volume(), 0);
        assert_eq!(h.host.speed(), 2.5);
    }

    #[test]
    fn test_speed_rejects_invalid() {
        let mut h = Harness::new();
        assert!(h.dispatch("SPEED inf").is_err());
        assert!(h.dispatch("SPEED -1").is_err());
        assert!(h.dispatch("SPEED NaN").is_err());
        assert_eq!(h.host.speed(), 1.0);
    }

    #[test]
    fn test_stop() {
        let mut h = Harness::new();
        h.host.set_running(false);
        h.run("STOP");
        assert!(h.host.is_stopped());
    }
}
