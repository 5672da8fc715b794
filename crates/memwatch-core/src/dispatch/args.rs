//! Tokenizing and typed access to command arguments.

use crate::error::{Result, WatchError};
use crate::host::Width;

/// One statement split into its verb and whitespace-separated arguments.
#[derive(Debug)]
pub struct CommandArgs<'a> {
    verb: &'a str,
    rest: &'a str,
    tokens: Vec<&'a str>,
}

impl<'a> CommandArgs<'a> {
    pub fn parse(statement: &'a str) -> Result<Self> {
        let statement = statement.trim();
        if statement.is_empty() {
            return Err(WatchError::EmptyCommand);
        }
        let (verb, rest) = match statement.find(char::is_whitespace) {
            Some(pos) => (&statement[..pos], statement[pos..].trim()),
            None => (statement, ""),
        };
        Ok(Self {
            verb,
            rest,
            tokens: rest.split_whitespace().collect(),
        })
    }

    pub fn verb(&self) -> &'a str {
        self.verb
    }

    /// Everything after the verb, trimmed. Used for free-text arguments.
    pub fn rest(&self) -> &'a str {
        self.rest
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn expect_len(&self, expected: usize) -> Result<()> {
        if self.tokens.len() != expected {
            return Err(self.invalid(format!(
                "expected {} arguments, got {}",
                expected,
                self.tokens.len()
            )));
        }
        Ok(())
    }

    pub fn expect_at_least(&self, minimum: usize) -> Result<()> {
        if self.tokens.len() < minimum {
            return Err(self.invalid(format!(
                "expected at least {} arguments, got {}",
                minimum,
                self.tokens.len()
            )));
        }
        Ok(())
    }

    fn token(&self, index: usize, field: &str) -> Result<&'a str> {
        self.tokens
            .get(index)
            .copied()
            .ok_or_else(|| self.invalid(format!("missing {}", field)))
    }

    fn invalid(&self, message: String) -> WatchError {
        WatchError::invalid_args(self.verb, message)
    }

    fn unsigned(&self, index: usize, field: &str, max: u64) -> Result<u64> {
        let token = self.token(index, field)?;
        parse_unsigned(token)
            .filter(|v| *v <= max)
            .ok_or_else(|| self.invalid(format!("invalid {}: {:?}", field, token)))
    }

    pub fn u32(&self, index: usize, field: &str) -> Result<u32> {
        self.unsigned(index, field, u64::from(u32::MAX)).map(|v| v as u32)
    }

    pub fn u16(&self, index: usize, field: &str) -> Result<u16> {
        self.unsigned(index, field, u64::from(u16::MAX)).map(|v| v as u16)
    }

    pub fn usize(&self, index: usize, field: &str) -> Result<usize> {
        self.u32(index, field).map(|v| v as usize)
    }

    pub fn i32(&self, index: usize, field: &str) -> Result<i32> {
        let token = self.token(index, field)?;
        token
            .parse()
            .map_err(|_| self.invalid(format!("invalid {}: {:?}", field, token)))
    }

    pub fn f32(&self, index: usize, field: &str) -> Result<f32> {
        let token = self.token(index, field)?;
        token
            .parse()
            .map_err(|_| self.invalid(format!("invalid {}: {:?}", field, token)))
    }

    /// Parse an access width. Numbers other than 8, 16 and 32 are a domain error.
    pub fn width(&self, index: usize) -> Result<Width> {
        let bits = self.u32(index, "width")?;
        Width::from_bits(bits).ok_or_else(|| WatchError::Validation {
            field: "width".to_string(),
            message: format!("8/16/32 required, got {}", bits),
        })
    }

    /// Parse every argument from `start` on as a u32.
    pub fn u32_list(&self, start: usize, field: &str) -> Result<Vec<u32>> {
        (start..self.tokens.len())
            .map(|i| self.u32(i, field))
            .collect()
    }
}

/// Parse a base-10 or `0x`-prefixed hexadecimal unsigned integer.
pub fn parse_unsigned(text: &str) -> Option<u64> {
    match text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => text.parse().ok(),
    }
}
