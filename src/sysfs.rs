//! Access to kernel control files.
//!
//! Paths handed to a [`Sysfs`] are relative to the sysfs mount point, for
//! example `bus/pci/devices/0000:00:02.0/device`.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Read/write access to sysfs-style control files.
pub trait Sysfs {
    /// Absolute host path for a sysfs-relative path.
    fn path(&self, rel: &Path) -> PathBuf;

    /// Whether an entry exists at the path.
    fn exists(&self, rel: &Path) -> bool;

    /// Read a whole attribute file.
    fn read(&self, rel: &Path) -> io::Result<String>;

    /// Issue one write of `data`, returning the number of bytes accepted.
    ///
    /// Control files act on a single write, so this never loops.
    fn write(&self, rel: &Path, data: &[u8]) -> io::Result<usize>;
}

/// Sysfs mounted on the host.
#[derive(Debug, Clone)]
pub struct HostSysfs {
    root: PathBuf,
}

impl HostSysfs {
    /// Create a handle rooted at the given mount point.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Default for HostSysfs {
    fn default() -> Self {
        Self::new("/sys")
    }
}

impl Sysfs for HostSysfs {
    fn path(&self, rel: &Path) -> PathBuf {
        self.root.join(rel)
    }

    fn exists(&self, rel: &Path) -> bool {
        self.path(rel).exists()
    }

    fn read(&self, rel: &Path) -> io::Result<String> {
        std::fs::read_to_string(self.path(rel))
    }

    fn write(&self, rel: &Path, data: &[u8]) -> io::Result<usize> {
        let mut file = OpenOptions::new().write(true).open(self.path(rel))?;
        file.write(data)
    }
}
