//! Length-bounded argument list.

use crate::error::{Error, Result};

/// Append-only list of argument tokens with a byte budget.
///
/// Each token is charged its length plus one separator, matching the
/// space-joined form the emulator ultimately receives. A push that would
/// exceed the budget fails and leaves the list untouched.
#[derive(Debug, Clone)]
pub struct CommandLine {
    tokens: Vec<String>,
    used: usize,
    limit: usize,
}

impl CommandLine {
    /// Create an empty list allowing at most `limit` bytes.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            tokens: Vec::new(),
            used: 0,
            limit,
        }
    }

    /// Append one token.
    pub fn push(&mut self, token: impl Into<String>) -> Result<()> {
        let token = token.into();
        let required = self.used + token.len() + 1;
        if required > self.limit {
            return Err(Error::CommandTooLong {
                limit: self.limit,
                required,
            });
        }
        self.used = required;
        self.tokens.push(token);
        Ok(())
    }

    /// Append tokens in order, stopping at the first overflow.
    pub fn extend<I, S>(&mut self, tokens: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        tokens.into_iter().try_for_each(|t| self.push(t))
    }

    /// Append an option followed by its value.
    pub fn opt(&mut self, flag: &str, value: impl Into<String>) -> Result<()> {
        self.push(flag)?;
        self.push(value)
    }

    /// Bytes still available.
    pub fn remaining(&self) -> usize {
        self.limit - self.used
    }

    /// Bytes charged so far.
    pub fn len_bytes(&self) -> usize {
        self.used
    }

    /// Tokens appended so far.
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Consume the list, returning its tokens.
    pub fn into_tokens(self) -> Vec<String> {
        self.tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracks_capacity() {
        let mut cmd = CommandLine::with_limit(32);
        cmd.opt("-m", "4096").unwrap();
        assert_eq!(cmd.len_bytes(), 3 + 5);
        assert_eq!(cmd.remaining(), 32 - 8);
        assert_eq!(cmd.tokens(), ["-m", "4096"]);
    }

    #[test]
    fn test_overflow_is_rejected_not_truncated() {
        let mut cmd = CommandLine::with_limit(10);
        cmd.push("-smp").unwrap();

        let err = cmd.push("a-very-long-token").unwrap_err();
        assert!(matches!(
            err,
            Error::CommandTooLong {
                limit: 10,
                required: 23
            }
        ));
        assert_eq!(cmd.tokens(), ["-smp"]);
        assert_eq!(cmd.len_bytes(), 5);
    }

    #[test]
    fn test_exact_fit() {
        let mut cmd = CommandLine::with_limit(6);
        cmd.push("12345").unwrap();
        assert_eq!(cmd.remaining(), 0);
        assert!(cmd.push("").is_err());
    }

    #[test]
    fn test_extend_stops_at_overflow() {
        let mut cmd = CommandLine::with_limit(8);
        assert!(cmd.extend(["-a", "-b", "-c"]).is_err());
        assert_eq!(cmd.into_tokens(), vec!["-a", "-b"]);
    }
}
