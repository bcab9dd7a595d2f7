//! Host-wide vmlaunch settings.
//!
//! Settings are read from `config.toml` in the vmlaunch config directory
//! (or the file named by `VMLAUNCH_CONFIG`). Every field has a default, so a
//! missing file or a partial file is fine.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application name for config file storage.
const APP_NAME: &str = "vmlaunch";

/// Environment variable overriding the settings file location.
pub const CONFIG_ENV: &str = "VMLAUNCH_CONFIG";

/// Default upper bound on the serialized emulator command line.
pub const DEFAULT_MAX_CMDLINE_LEN: usize = 10240;

/// Host-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Directory holding `<guest>.toml` files and QMP sockets.
    pub guest_dir: PathBuf,

    /// Mount point of sysfs.
    pub sysfs_root: PathBuf,

    /// Maximum emulator command line length in bytes.
    pub max_cmdline_len: usize,

    /// GPU device selection.
    pub gpu: GpuSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            guest_dir: default_guest_dir(),
            sysfs_root: PathBuf::from("/sys"),
            max_cmdline_len: DEFAULT_MAX_CMDLINE_LEN,
            gpu: GpuSettings::default(),
        }
    }
}

/// Physical GPU used for mediated devices and passthrough.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GpuSettings {
    /// PCI bus address of the GPU (domain:bus:device.function).
    pub bdf: String,

    /// PCI vendor id in hex, without prefix.
    pub vendor_id: String,

    /// Driver the device is handed to for passthrough.
    pub passthrough_driver: String,

    /// Kernel modules loaded before passthrough, in order.
    pub modules: Vec<String>,
}

impl Default for GpuSettings {
    fn default() -> Self {
        Self {
            bdf: "0000:00:02.0".to_string(),
            vendor_id: "8086".to_string(),
            passthrough_driver: "vfio-pci".to_string(),
            modules: vec!["vfio".to_string(), "vfio-pci".to_string()],
        }
    }
}

impl GpuSettings {
    /// Bus address without the PCI domain, as QEMU's `host=` expects it.
    pub fn short_bdf(&self) -> &str {
        match self.bdf.split_once(':') {
            Some((domain, rest)) if rest.contains(':') && domain.len() == 4 => rest,
            _ => &self.bdf,
        }
    }
}

impl Settings {
    /// Default location of the settings file.
    pub fn default_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Ok(PathBuf::from(path));
        }

        let config_dir = dirs::config_dir()
            .ok_or_else(|| Error::ConfigLoad("could not determine config directory".into()))?;
        Ok(config_dir.join(APP_NAME).join("config.toml"))
    }

    /// Load settings from the default location.
    ///
    /// If the file doesn't exist, returns the default settings.
    pub fn load() -> Result<Self> {
        let path = Self::default_path()?;
        Self::load_from(&path)
    }

    /// Load settings from a specific file.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no settings file, using defaults");
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigLoad(format!("{}: {}", path.display(), e)))?;
        toml::from_str(&text).map_err(|e| Error::ConfigLoad(format!("{}: {}", path.display(), e)))
    }

    /// Path of the configuration file for a guest.
    pub fn guest_config_path(&self, name: &str) -> PathBuf {
        self.guest_dir.join(format!("{}.toml", name))
    }

    /// Path of the QMP control socket for a guest.
    pub fn qmp_socket_path(&self, name: &str) -> PathBuf {
        self.guest_dir.join(format!(".{}.qmp.unix.socket", name))
    }
}

fn default_guest_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("/etc"))
        .join(APP_NAME)
}
