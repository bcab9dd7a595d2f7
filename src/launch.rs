//! Guest launch pipeline.
//!
//! One launch runs strictly in order:
//!
//! 1. resolve `<guest_dir>/<name>.toml` into a [`GuestConfig`] and check
//!    that the RPMB binary and data directory exist
//! 2. acquire the GPU resource, if the graphics mode needs one
//! 3. provision the RPMB store and clear its socket, if configured
//! 4. compose the emulator command
//! 5. start the RPMB daemon, then the emulator, both in the background
//!
//! Any failure stops the pipeline. Side effects of earlier steps (a created
//! vGPU, an unbound driver, a provisioned store) are left in place.

use crate::config::Settings;
use crate::error::{Error, Result};
use crate::exec::{Executor, Invocation};
use crate::gpu::GpuManager;
use crate::guest::{self, GuestConfig, TomlSource};
use crate::qemu::CommandBuilder;
use crate::rpmb::{RpmbBackend, RpmbDaemon};
use crate::sysfs::Sysfs;

/// Outcome of a successful launch.
#[derive(Debug, Clone)]
pub struct LaunchReport {
    /// Guest name.
    pub guest: String,
    /// Emulator command that was started.
    pub command: Invocation,
    /// Emulator process ID.
    pub emulator_pid: u32,
    /// RPMB daemon, when the guest has one.
    pub rpmb: Option<RpmbDaemon>,
}

/// Runs the launch pipeline for guests on this host.
pub struct Launcher<'a> {
    settings: &'a Settings,
    executor: &'a dyn Executor,
    sysfs: &'a dyn Sysfs,
}

impl<'a> Launcher<'a> {
    /// Create a launcher over the given host collaborators.
    pub fn new(
        settings: &'a Settings,
        executor: &'a dyn Executor,
        sysfs: &'a dyn Sysfs,
    ) -> Self {
        Self {
            settings,
            executor,
            sysfs,
        }
    }

    /// Load and resolve a guest's configuration.
    pub fn load(&self, name: &str) -> Result<GuestConfig> {
        guest::validate_name(name)?;

        let path = self.settings.guest_config_path(name);
        if !path.exists() {
            return Err(Error::GuestNotFound {
                name: name.to_string(),
                path,
            });
        }

        let source = TomlSource::load(&path)?;
        let config = GuestConfig::resolve(&source)?;
        guest::validate_name(&config.name)?;

        tracing::debug!(guest = %config.name, path = %path.display(), "resolved guest config");
        Ok(config)
    }

    /// Launch a guest by name.
    pub fn launch(&self, name: &str) -> Result<LaunchReport> {
        let config = self.load(name)?;
        self.launch_config(&config)
    }

    /// Launch an already-resolved guest.
    pub fn launch_config(&self, guest: &GuestConfig) -> Result<LaunchReport> {
        tracing::info!(guest = %guest.name, graphics = %guest.graphics, "launching guest");

        let rpmb = guest
            .rpmb
            .clone()
            .map(|config| RpmbBackend::new(config, self.executor));
        if let Some(backend) = &rpmb {
            backend.check()?;
        }

        let gpu = GpuManager::new(self.sysfs, self.executor, &self.settings.gpu)
            .acquire(&guest.graphics)?;

        if let Some(backend) = &rpmb {
            backend.ensure_initialized()?;
            backend.prepare_socket()?;
        }

        let command = CommandBuilder::new(self.settings).build(guest, gpu.as_ref())?;

        let rpmb = rpmb.map(|backend| backend.start_daemon()).transpose()?;

        tracing::info!(guest = %guest.name, command = %command, "starting emulator");
        let emulator_pid = self.executor.spawn(&command)?;

        Ok(LaunchReport {
            guest: guest.name.clone(),
            command,
            emulator_pid,
            rpmb,
        })
    }

    /// Compose the emulator command without acquiring anything.
    pub fn compose(&self, guest: &GuestConfig) -> Result<Invocation> {
        let gpu = GpuManager::new(self.sysfs, self.executor, &self.settings.gpu)
            .preview(&guest.graphics)?;
        CommandBuilder::new(self.settings).build(guest, gpu.as_ref())
    }
}
