//! Command dispatch.
//!
//! Every protocol verb maps to a plain handler function in a
//! [`CommandRegistry`]. A handler receives the calling session, the hijack
//! table and the host through a [`CommandContext`], performs its effect and
//! optionally returns a [`Reply`] for the caller.
//!
//! Failed commands are logged and dropped. They never end the session.

mod args;
mod emulation;
mod input;
mod memory;

pub use args::{parse_unsigned, CommandArgs};

use crate::error::{ErrorKind, Result, WatchError};
use crate::hijack::HijackTable;
use crate::host::{GuestMemory, Host, RunControl};
use crate::protocol::{split_statements, Reply};
use crate::session::Session;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Everything a handler may touch while running one command.
pub struct CommandContext<'a> {
    pub session: &'a mut Session,
    pub hijacks: &'a mut HijackTable,
    pub host: &'a dyn Host,
    pub max_range_bytes: u32,
}

impl CommandContext<'_> {
    /// Fail unless guest memory may be accessed.
    pub fn require_memory(&self, verb: &str) -> Result<()> {
        if !self.host.is_ready() {
            return Err(WatchError::MemoryNotReady {
                verb: verb.to_string(),
            });
        }
        Ok(())
    }

    /// Fail unless the host core is running.
    pub fn require_running(&self, verb: &str) -> Result<()> {
        if !self.host.is_running() {
            return Err(WatchError::HostNotRunning {
                verb: verb.to_string(),
            });
        }
        Ok(())
    }
}

/// A command handler.
pub type Handler = fn(&mut CommandContext<'_>, &CommandArgs<'_>) -> Result<Option<Reply>>;

/// Verb-to-handler table.
pub struct CommandRegistry {
    handlers: HashMap<&'static str, Handler>,
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandRegistry {
    /// Create a registry with every protocol verb registered.
    pub fn new() -> Self {
        let mut registry = Self::empty();

        registry.register("WRITE", memory::write);
        registry.register("WRITE_MULTI", memory::write_multi);
        registry.register("READ", memory::read);
        registry.register("SUBSCRIBE", memory::subscribe);
        registry.register("SUBSCRIBE_MULTI", memory::subscribe_multi);
        registry.register("UNSUBSCRIBE", memory::unsubscribe);
        registry.register("UNSUBSCRIBE_MULTI", memory::unsubscribe_multi);

        registry.register("BUTTONSTATES_WII", input::buttonstates_remote);
        registry.register("BUTTONSTATES_GC", input::buttonstates_pad);

        registry.register("PAUSE", emulation::pause);
        registry.register("RESUME", emulation::resume);
        registry.register("RESET", emulation::reset);
        registry.register("SAVE", emulation::save);
        registry.register("LOAD", emulation::load);
        registry.register("VOLUME", emulation::volume);
        registry.register("SPEED", emulation::speed);
        registry.register("STOP", emulation::stop);

        registry
    }

    /// Create a registry with no verbs.
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register or replace the handler for `verb`.
    pub fn register(&mut self, verb: &'static str, handler: Handler) {
        self.handlers.insert(verb, handler);
    }

    pub fn contains(&self, verb: &str) -> bool {
        self.handlers.contains_key(verb)
    }

    /// All registered verbs, sorted.
    pub fn verbs(&self) -> Vec<&'static str> {
        let mut verbs: Vec<_> = self.handlers.keys().copied().collect();
        verbs.sort_unstable();
        verbs
    }

    /// Run one statement and return its reply, if any.
    pub fn dispatch(&self, ctx: &mut CommandContext<'_>, statement: &str) -> Result<Option<Reply>> {
        let args = CommandArgs::parse(statement)?;
        let handler = self
            .handlers
            .get(args.verb())
            .ok_or_else(|| WatchError::UnknownCommand {
                verb: args.verb().to_string(),
            })?;
        handler(ctx, &args)
    }

    /// Run every `;`-separated statement of one line, in order.
    ///
    /// Each statement is dispatched independently; replies are queued on the
    /// session and failures are logged.
    pub fn execute_line(&self, ctx: &mut CommandContext<'_>, line: &str) {
        for statement in split_statements(line) {
            self.execute(ctx, statement);
        }
    }

    /// Run one statement, queue its reply and log any failure.
    pub fn execute(&self, ctx: &mut CommandContext<'_>, statement: &str) {
        debug!("Processing: {}", statement);
        match self.dispatch(ctx, statement) {
            Ok(Some(reply)) => {
                if let Err(e) = ctx.session.send(&reply) {
                    debug!("Reply to {} not queued: {}", ctx.session.peer(), e);
                }
            }
            Ok(None) => {}
            Err(e) => match e.kind() {
                ErrorKind::Parse => warn!("Invalid command line {:?}: {}", statement, e),
                _ => warn!("Command {:?} dropped: {}", statement, e),
            },
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::Harness;
    use super::*;

    #[test]
    fn test_registry_has_every_verb() {
        let registry = CommandRegistry::new();
        assert_eq!(
            registry.verbs(),
            vec![
                "BUTTONSTATES_GC",
                "BUTTONSTATES_WII",
                "LOAD",
                "PAUSE",
                "READ",
                "RESET",
                "RESUME",
                "SAVE",
                "SPEED",
                "STOP",
                "SUBSCRIBE",
                "SUBSCRIBE_MULTI",
                "UNSUBSCRIBE",
                "UNSUBSCRIBE_MULTI",
                "VOLUME",
                "WRITE",
                "WRITE_MULTI",
            ]
        );
    }

    #[test]
    fn test_unknown_verb() {
        let mut h = Harness::new();
        assert!(matches!(
            h.dispatch("JUMP 1"),
            Err(WatchError::UnknownCommand { .. })
        ));
        h.run("JUMP 1");
        assert!(h.replies().is_empty());
        assert!(!h.session.is_disconnected());
    }

    #[test]
    fn test_verbs_are_case_sensitive() {
        let mut h = Harness::new();
        assert!(matches!(
            h.dispatch("read 8 0"),
            Err(WatchError::UnknownCommand { .. })
        ));
    }

    #[test]
    fn test_statements_run_in_order() {
        let mut h = Harness::new();
        h.run("WRITE 8 5 1;READ 8 5; WRITE 8 5 2 ;READ 8 5");
        assert_eq!(h.replies(), vec!["MEM 5 1\n", "MEM 5 2\n"]);
    }

    #[test]
    fn test_failing_statement_does_not_affect_others() {
        let mut h = Harness::new();
        h.run("READ 12 5;BOGUS;READ 8 5");
        assert_eq!(h.replies(), vec!["MEM 5 0\n"]);
    }

    #[test]
    fn test_custom_handler() {
        fn ping(_: &mut CommandContext<'_>, _: &CommandArgs<'_>) -> Result<Option<Reply>> {
            Ok(Some(Reply::Success))
        }

        let mut h = Harness::new();
        h.registry = CommandRegistry::empty();
        h.registry.register("PING", ping);
        assert!(h.registry.contains("PING"));
        h.run("PING;READ 8 0");
        assert_eq!(h.replies(), vec!["SUCCESS\n"]);
    }
}
