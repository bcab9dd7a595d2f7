//! Child process execution.
//!
//! Commands are carried as an [`Invocation`] (program plus argument tokens)
//! and only handed to [`std::process::Command`] inside [`HostExecutor`], so
//! no shell quoting is ever involved.

use crate::error::{Error, Result};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::process::{Command, Stdio};

/// A program together with its argument tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Invocation {
    /// Binary name or path.
    pub program: PathBuf,
    /// Arguments, one token each.
    pub args: Vec<String>,
}

impl Invocation {
    /// Create an invocation with no arguments.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Spawns external programs.
pub trait Executor {
    /// Run to completion. A non-zero exit is an error.
    fn run(&self, invocation: &Invocation) -> Result<()>;

    /// Start in the background and return its PID without waiting.
    fn spawn(&self, invocation: &Invocation) -> Result<u32>;
}

/// Executor backed by real host processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostExecutor;

impl HostExecutor {
    fn command(invocation: &Invocation) -> Command {
        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args);
        cmd
    }
}

impl Executor for HostExecutor {
    fn run(&self, invocation: &Invocation) -> Result<()> {
        tracing::debug!(command = %invocation, "running");

        let output = Self::command(invocation)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| Error::command_failed(invocation.to_string(), e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::command_failed(
                invocation.to_string(),
                format!("{}: {}", output.status, stderr.trim()),
            ));
        }

        Ok(())
    }

    fn spawn(&self, invocation: &Invocation) -> Result<u32> {
        tracing::debug!(command = %invocation, "spawning");

        let child = Self::command(invocation)
            .stdin(Stdio::null())
            .spawn()
            .map_err(|e| Error::command_failed(invocation.to_string(), e.to_string()))?;

        Ok(child.id())
    }
}
