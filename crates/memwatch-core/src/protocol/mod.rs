//! Wire protocol: line framing and outbound messages.
//!
//! The protocol is newline-delimited ASCII text:
//!
//! ```text
//! client -> server   VERB arg arg ...[;VERB arg ...]\n
//! server -> client   MEM <addr> <value>\n
//!                    MEM_MULTI <addr> <v0> <v1> ...\n
//!                    SUCCESS\n | FAIL\n
//! ```
//!
//! Unsigned integer fields are base-10 and additionally accept a `0x` prefix.

pub mod framing;
pub mod reply;

pub use framing::{split_statements, LineAccumulator};
pub use reply::Reply;
