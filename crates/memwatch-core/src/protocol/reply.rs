//! Server-to-client lines.

use std::fmt;

/// A message the server sends to a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Value of a scalar read or scalar subscription.
    Mem { addr: u32, value: u32 },
    /// Bytes of a range subscription.
    MemMulti { addr: u32, values: Vec<u8> },
    Success,
    Fail,
}

impl Reply {
    pub fn feedback(success: bool) -> Self {
        if success {
            Reply::Success
        } else {
            Reply::Fail
        }
    }

    /// Render as a newline-terminated wire line.
    pub fn to_line(&self) -> String {
        format!("{}\n", self)
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Mem { addr, value } => write!(f, "MEM {} {}", addr, value),
            Reply::MemMulti { addr, values } => {
                write!(f, "MEM_MULTI {}", addr)?;
                for v in values {
                    write!(f, " {}", v)?;
                }
                Ok(())
            }
            Reply::Success => f.write_str("SUCCESS"),
            Reply::Fail => f.write_str("FAIL"),
        }
    }
}
