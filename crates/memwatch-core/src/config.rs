//! Centralized configuration for the memwatch server.
//!
//! Protocol constants live on [`ProtocolConfig`]; runtime settings that an
//! embedding host or the standalone binary may override live on
//! [`WatchConfig`], which can also be loaded from a JSON file.

use crate::error::{Result, WatchError};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Protocol-level constants.
pub struct ProtocolConfig;

impl ProtocolConfig {
    pub const DEFAULT_PORT: u16 = 6000;
    pub const DEFAULT_HOST: &'static str = "127.0.0.1";

    // Timing
    pub const TICK_INTERVAL: Duration = Duration::from_millis(10);
    pub const HIJACK_TIMEOUT: Duration = Duration::from_millis(500);
    pub const ACCEPT_WAIT: Duration = Duration::from_secs(1);

    // Controller slots
    pub const REMOTE_SLOTS: usize = 4;
    pub const PAD_SLOTS: usize = 4;

    // I/O and limits
    pub const READ_CHUNK_SIZE: usize = 1024;
    pub const MAX_LINE_BYTES: usize = 64 * 1024;
    pub const MAX_RANGE_BYTES: u32 = 4096;
    pub const OUTBOUND_CAPACITY: usize = 1024;
    pub const MAX_SESSIONS: usize = 32;

    /// Characters that may not appear in snapshot file names.
    pub const RESERVED_FILENAME_CHARS: &'static [char] = &['"', '<', '>', '|', '?'];

    /// Statement separator within one line.
    pub const STATEMENT_SEPARATOR: char = ';';
}

/// Runtime configuration for a [`crate::WatchServer`].
///
/// Durations are expressed in milliseconds in the JSON form.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    pub host: String,
    pub port: u16,
    pub tick_interval_ms: u64,
    pub hijack_timeout_ms: u64,
    pub accept_wait_ms: u64,
    pub remote_slots: usize,
    pub pad_slots: usize,
    pub read_chunk_size: usize,
    pub max_line_bytes: usize,
    pub max_range_bytes: u32,
    pub outbound_capacity: usize,
    pub max_sessions: usize,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            host: ProtocolConfig::DEFAULT_HOST.to_string(),
            port: ProtocolConfig::DEFAULT_PORT,
            tick_interval_ms: ProtocolConfig::TICK_INTERVAL.as_millis() as u64,
            hijack_timeout_ms: ProtocolConfig::HIJACK_TIMEOUT.as_millis() as u64,
            accept_wait_ms: ProtocolConfig::ACCEPT_WAIT.as_millis() as u64,
            remote_slots: ProtocolConfig::REMOTE_SLOTS,
            pad_slots: ProtocolConfig::PAD_SLOTS,
            read_chunk_size: ProtocolConfig::READ_CHUNK_SIZE,
            max_line_bytes: ProtocolConfig::MAX_LINE_BYTES,
            max_range_bytes: ProtocolConfig::MAX_RANGE_BYTES,
            outbound_capacity: ProtocolConfig::OUTBOUND_CAPACITY,
            max_sessions: ProtocolConfig::MAX_SESSIONS,
        }
    }
}

impl WatchConfig {
    /// Load a configuration from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text =
            std::fs::read_to_string(path).map_err(|e| WatchError::io_with_path(e, path))?;
        let config: WatchConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn hijack_timeout(&self) -> Duration {
        Duration::from_millis(self.hijack_timeout_ms)
    }

    pub fn accept_wait(&self) -> Duration {
        Duration::from_millis(self.accept_wait_ms)
    }

    /// Resolve `host:port` into a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| WatchError::Config {
                message: format!("invalid bind address {}:{}: {}", self.host, self.port, e),
            })
    }

    /// Check that the settings describe a server that can actually run.
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: &str| {
            Err(WatchError::Config {
                message: message.to_string(),
            })
        };

        if self.tick_interval_ms == 0 {
            return invalid("tick_interval_ms must be greater than zero");
        }
        if self.accept_wait_ms == 0 {
            return invalid("accept_wait_ms must be greater than zero");
        }
        if self.hijack_timeout_ms < self.tick_interval_ms {
            return invalid("hijack_timeout_ms must be at least one tick");
        }
        if self.read_chunk_size == 0 || self.max_line_bytes == 0 {
            return invalid("read_chunk_size and max_line_bytes must be greater than zero");
        }
        if self.max_range_bytes == 0 {
            return invalid("max_range_bytes must be greater than zero");
        }
        if self.outbound_capacity == 0 || self.max_sessions == 0 {
            return invalid("outbound_capacity and max_sessions must be greater than zero");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = WatchConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tick_interval(), ProtocolConfig::TICK_INTERVAL);
        assert_eq!(config.hijack_timeout(), ProtocolConfig::HIJACK_TIMEOUT);
        assert_eq!(config.port, 6000);
    }

    #[test]
    fn test_hijack_shorter_than_tick_rejected() {
        let config = WatchConfig {
            tick_interval_ms: 20,
            hijack_timeout_ms: 5,
            ..WatchConfig::default()
        };
        assert!(matches!(config.validate(), Err(WatchError::Config { .. })));
    }

    #[test]
    fn test_bind_addr() {
        let config = WatchConfig {
            port: 7777,
            ..WatchConfig::default()
        };
        assert_eq!(config.bind_addr().unwrap().port(), 7777);

        let bad = WatchConfig {
            host: "not an address".into(),
            ..WatchConfig::default()
        };
        assert!(bad.bind_addr().is_err());
    }

    #[test]
    fn test_from_json_file_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "port": 6123, "tick_interval_ms": 16 }}"#).unwrap();

        let config = WatchConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.port, 6123);
        assert_eq!(config.tick_interval_ms, 16);
        assert_eq!(config.remote_slots, ProtocolConfig::REMOTE_SLOTS);
    }

    #[test]
    fn test_from_json_file_rejects_garbage() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(matches!(
            WatchConfig::from_json_file(file.path()),
            Err(WatchError::Json { .. })
        ));
    }
}
