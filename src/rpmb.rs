//! Virtual RPMB backend.
//!
//! Each guest with an `[rpmb]` group gets a software RPMB daemon serving a
//! backing file over a unix socket, both inside the guest's data directory:
//!
//! ```text
//! <data_dir>/
//! ├── rpmb-data   # backing store, provisioned once and kept
//! └── rpmb.sock   # control socket, recreated on every start
//! ```

use crate::error::{Error, Result};
use crate::exec::{Executor, Invocation};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Backing store filename.
pub const RPMB_DATA: &str = "rpmb-data";

/// Control socket filename.
pub const RPMB_SOCK: &str = "rpmb.sock";

/// Capacity passed to the provisioning call.
pub const RPMB_SIZE: u32 = 2048;

/// Where the RPMB backend lives for one guest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RpmbConfig {
    /// Backend binary.
    pub bin: Option<PathBuf>,
    /// Guest data directory.
    pub data_dir: Option<PathBuf>,
}

impl RpmbConfig {
    /// Create a fully specified configuration.
    pub fn new(bin: impl Into<PathBuf>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            bin: Some(bin.into()),
            data_dir: Some(data_dir.into()),
        }
    }
}

/// RPMB store lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpmbState {
    /// No backing file yet.
    Uninitialized,
    /// Backing file exists on disk.
    Initialized,
    /// Daemon has been started.
    Running,
}

impl fmt::Display for RpmbState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RpmbState::Uninitialized => "uninitialized",
            RpmbState::Initialized => "initialized",
            RpmbState::Running => "running",
        };
        f.write_str(name)
    }
}

/// A started RPMB daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpmbDaemon {
    /// Daemon process ID.
    pub pid: u32,
    /// Control socket the daemon serves.
    pub socket: PathBuf,
}

/// Manages the RPMB backend of one guest.
pub struct RpmbBackend<'a> {
    config: RpmbConfig,
    executor: &'a dyn Executor,
}

impl<'a> RpmbBackend<'a> {
    /// Create a backend manager. Nothing is checked until first use.
    pub fn new(config: RpmbConfig, executor: &'a dyn Executor) -> Self {
        Self { config, executor }
    }

    /// Binary and data directory, both required to exist.
    fn configured(&self) -> Result<(&Path, &Path)> {
        let bin = self
            .config
            .bin
            .as_deref()
            .ok_or_else(|| Error::RpmbNotConfigured("no backend binary set".into()))?;
        let data_dir = self
            .config
            .data_dir
            .as_deref()
            .ok_or_else(|| Error::RpmbNotConfigured("no data directory set".into()))?;

        if !bin.exists() {
            return Err(Error::RpmbNotConfigured(format!(
                "backend binary not found: {}",
                bin.display()
            )));
        }
        if !data_dir.is_dir() {
            return Err(Error::RpmbNotConfigured(format!(
                "data directory not found: {}",
                data_dir.display()
            )));
        }
        Ok((bin, data_dir))
    }

    /// Fail with [`Error::RpmbNotConfigured`] unless the binary and data
    /// directory are set and present.
    pub fn check(&self) -> Result<()> {
        self.configured().map(|_| ())
    }

    /// Path of the backing store.
    pub fn backing_path(&self) -> Result<PathBuf> {
        let (_, data_dir) = self.configured()?;
        Ok(data_dir.join(RPMB_DATA))
    }

    /// Path of the control socket.
    pub fn socket_path(&self) -> Result<PathBuf> {
        let (_, data_dir) = self.configured()?;
        Ok(data_dir.join(RPMB_SOCK))
    }

    /// Current on-disk state.
    pub fn probe(&self) -> Result<RpmbState> {
        if self.backing_path()?.exists() {
            Ok(RpmbState::Initialized)
        } else {
            Ok(RpmbState::Uninitialized)
        }
    }

    /// Provision the backing store unless it already exists.
    pub fn ensure_initialized(&self) -> Result<()> {
        let (bin, _) = self.configured()?;
        let data = self.backing_path()?;

        if data.exists() {
            tracing::debug!(path = %data.display(), "rpmb store already initialized");
            return Ok(());
        }

        tracing::info!(path = %data.display(), size = RPMB_SIZE, "provisioning rpmb store");
        let provision = Invocation::new(bin)
            .arg("--dev")
            .arg(data.to_string_lossy())
            .arg("--init")
            .arg("--size")
            .arg(RPMB_SIZE.to_string());
        self.executor.run(&provision)?;

        // The tool can exit 0 without producing the file
        if !data.exists() {
            return Err(Error::rpmb(format!(
                "provisioning succeeded but {} was not created",
                data.display()
            )));
        }
        Ok(())
    }

    /// Remove whatever is left at the socket path.
    pub fn prepare_socket(&self) -> Result<()> {
        let sock = self.socket_path()?;

        if std::fs::symlink_metadata(&sock).is_ok() {
            tracing::debug!(path = %sock.display(), "removing stale rpmb socket");
            std::fs::remove_file(&sock).map_err(|e| {
                Error::rpmb(format!("failed to remove {}: {}", sock.display(), e))
            })?;
        }
        Ok(())
    }

    /// Start the daemon in the background.
    pub fn start_daemon(&self) -> Result<RpmbDaemon> {
        let (bin, _) = self.configured()?;
        let data = self.backing_path()?;
        let socket = self.socket_path()?;

        let daemon = Invocation::new(bin)
            .arg("--dev")
            .arg(data.to_string_lossy())
            .arg("--sock")
            .arg(socket.to_string_lossy());
        let pid = self.executor.spawn(&daemon)?;

        tracing::info!(
            pid,
            socket = %socket.display(),
            state = %RpmbState::Running,
            "rpmb daemon started"
        );
        Ok(RpmbDaemon { pid, socket })
    }

    /// Initialize the store, clear the socket and start the daemon.
    pub fn run(&self) -> Result<RpmbDaemon> {
        self.ensure_initialized()?;
        self.prepare_socket()?;
        self.start_daemon()
    }
}
