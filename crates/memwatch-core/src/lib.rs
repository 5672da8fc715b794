//! Memwatch Core - Remote control server for a running emulator.
//!
//! Clients connect over TCP and speak a newline-delimited text protocol to
//! read and write guest memory, subscribe to memory changes, inject
//! controller input for a limited time, and drive execution (pause, resume,
//! reset, save states, volume, speed, stop).
//!
//! The emulator itself is reached through the traits in [`host`]; the crate
//! ships a [`SimulatedHost`] that implements all of them in-process.
//!
//! # Example
//!
//! ```rust,ignore
//! use memwatch_core::{SimulatedHost, WatchConfig, WatchServer};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> memwatch_core::Result<()> {
//!     let host = Arc::new(SimulatedHost::new(0x8000_0000, 24 * 1024 * 1024));
//!     let handle = WatchServer::start(WatchConfig::default(), host).await?;
//!     println!("Listening on {}", handle.addr());
//!
//!     tokio::signal::ctrl_c().await?;
//!     handle.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod hijack;
pub mod host;
pub mod poll;
pub mod protocol;
pub mod server;
pub mod session;
pub mod subscription;

// Re-export commonly used types
pub use config::{ProtocolConfig, WatchConfig};
pub use dispatch::{CommandArgs, CommandContext, CommandRegistry};
pub use error::{ErrorKind, Result, WatchError};
pub use hijack::{HijackState, HijackTable};
pub use host::{
    AudioOutput, ControllerClass, ControllerPorts, GuestMemory, Host, PadState, RunControl,
    RunState, SimulatedHost, SnapshotRequest, SnapshotStore, Width,
};
pub use protocol::{LineAccumulator, Reply};
pub use server::{ServerState, WatchServer, WatchServerHandle};
pub use session::{Session, SessionId, SessionRegistry};
pub use subscription::SubscriptionStore;
