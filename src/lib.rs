//! vmlaunch - declarative guest launcher for QEMU/KVM hosts.
//!
//! A guest is described by a TOML file under the guest directory. Launching
//! it resolves that file, prepares the host resources the guest needs
//! (a GVT-g vGPU, a passthrough GPU, an RPMB backend) and starts the
//! emulator with a fully composed command line.
//!
//! # Example
//!
//! ```no_run
//! use vmlaunch::{HostExecutor, HostSysfs, Launcher, Settings};
//!
//! let settings = Settings::load()?;
//! let sysfs = HostSysfs::new(&settings.sysfs_root);
//! let launcher = Launcher::new(&settings, &HostExecutor, &sysfs);
//! let report = launcher.launch("pixel")?;
//! println!("emulator running as {}", report.emulator_pid);
//! # Ok::<(), vmlaunch::Error>(())
//! ```

pub mod config;
pub mod error;
pub mod exec;
pub mod gpu;
pub mod guest;
pub mod launch;
pub mod qemu;
pub mod rpmb;
pub mod sysfs;

#[cfg(test)]
mod testutil;

pub use config::Settings;
pub use error::{Error, GpuStep, Result};
pub use exec::{Executor, HostExecutor, Invocation};
pub use gpu::{BoundGpu, GpuManager, GpuState};
pub use guest::{GuestConfig, KeySource, TomlSource};
pub use launch::{LaunchReport, Launcher};
pub use qemu::{CommandBuilder, CommandLine};
pub use rpmb::{RpmbBackend, RpmbConfig, RpmbDaemon};
pub use sysfs::{HostSysfs, Sysfs};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
