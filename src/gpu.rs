//! GPU acquisition for GVT-g mediated devices and GVT-d passthrough.
//!
//! A GPU resource moves through [`GpuState`] once per launch attempt:
//!
//! ```text
//! Absent ──► Creating ──► Bound
//!    │           │
//!    └───────────┴──────► Failed
//! ```
//!
//! Nothing is cached between attempts; the current state is re-derived from
//! sysfs every time. The manager takes no locks, so two launches sharing
//! one device must be serialized by the caller.

use crate::config::GpuSettings;
use crate::error::{Error, GpuStep, Result};
use crate::exec::{Executor, Invocation};
use crate::guest::Graphics;
use crate::sysfs::Sysfs;
use std::fmt;
use std::path::{Path, PathBuf};
use uuid::fmt::Hyphenated;
use uuid::Uuid;

/// Kernel module loader.
const MODPROBE: &str = "modprobe";

/// Lifecycle of a GPU resource within one launch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpuState {
    /// No device instance exists yet.
    Absent,
    /// Device instance is being created or rebound.
    Creating,
    /// Device is ready for the guest.
    Bound,
    /// Acquisition failed.
    Failed,
}

impl fmt::Display for GpuState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GpuState::Absent => "absent",
            GpuState::Creating => "creating",
            GpuState::Bound => "bound",
            GpuState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Proof that a GPU resource reached [`GpuState::Bound`].
///
/// Only [`GpuManager`] hands these out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundGpu {
    kind: BoundKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum BoundKind {
    Mediated { uuid: Uuid, sysfsdev: PathBuf },
    Passthrough { host: String },
}

impl BoundGpu {
    /// Host path of the mediated device, for `sysfsdev=`.
    pub fn sysfsdev(&self) -> Option<&Path> {
        match &self.kind {
            BoundKind::Mediated { sysfsdev, .. } => Some(sysfsdev),
            BoundKind::Passthrough { .. } => None,
        }
    }

    /// Short PCI address of a passed-through device, for `host=`.
    pub fn host_address(&self) -> Option<&str> {
        match &self.kind {
            BoundKind::Passthrough { host } => Some(host),
            BoundKind::Mediated { .. } => None,
        }
    }

    /// Whether this binding satisfies the given graphics mode.
    pub fn satisfies(&self, graphics: &Graphics) -> bool {
        match (&self.kind, graphics) {
            (BoundKind::Mediated { uuid, .. }, Graphics::Mediated { uuid: want, .. }) => {
                validate_uuid(want).is_ok_and(|want| want == *uuid)
            }
            (BoundKind::Passthrough { .. }, Graphics::Passthrough) => true,
            _ => false,
        }
    }
}

/// Parse a UUID given in 8-4-4-4-12 hyphenated hex form.
///
/// Simple, braced and URN forms are rejected.
pub fn validate_uuid(text: &str) -> Result<Uuid> {
    if text.len() != Hyphenated::LENGTH {
        return Err(Error::InvalidUuid(text.to_string()));
    }
    Uuid::try_parse(text).map_err(|_| Error::InvalidUuid(text.to_string()))
}

/// Acquires the GPU resource a guest's graphics mode needs.
pub struct GpuManager<'a> {
    sysfs: &'a dyn Sysfs,
    executor: &'a dyn Executor,
    settings: &'a GpuSettings,
}

impl<'a> GpuManager<'a> {
    /// Create a manager for the configured GPU.
    pub fn new(
        sysfs: &'a dyn Sysfs,
        executor: &'a dyn Executor,
        settings: &'a GpuSettings,
    ) -> Self {
        Self {
            sysfs,
            executor,
            settings,
        }
    }

    /// Bring the resource for `graphics` to [`GpuState::Bound`].
    ///
    /// Returns `None` for modes that need no GPU resource.
    pub fn acquire(&self, graphics: &Graphics) -> Result<Option<BoundGpu>> {
        let bound = match graphics {
            Graphics::Mediated { gvtg_type, uuid } => self.acquire_mediated(gvtg_type, uuid)?,
            Graphics::Passthrough => self.acquire_passthrough()?,
            Graphics::Virtio | Graphics::Software => return Ok(None),
        };
        Ok(Some(bound))
    }

    /// The binding [`acquire`](Self::acquire) would produce, without
    /// touching sysfs or running anything.
    pub fn preview(&self, graphics: &Graphics) -> Result<Option<BoundGpu>> {
        match graphics {
            Graphics::Mediated { uuid, .. } => {
                let uuid = validate_uuid(uuid)?;
                Ok(Some(self.mediated_binding(&uuid)))
            }
            Graphics::Passthrough => Ok(Some(self.passthrough_binding())),
            Graphics::Virtio | Graphics::Software => Ok(None),
        }
    }

    /// Current state of a mediated device, derived from sysfs.
    pub fn probe_mediated(&self, uuid: &Uuid) -> GpuState {
        if self.sysfs.exists(&self.mdev_dir(uuid)) {
            GpuState::Bound
        } else {
            GpuState::Absent
        }
    }

    fn acquire_mediated(&self, gvtg_type: &str, uuid: &str) -> Result<BoundGpu> {
        let uuid = validate_uuid(uuid)?;

        if self.probe_mediated(&uuid) == GpuState::Bound {
            tracing::info!(uuid = %uuid, "reusing existing vgpu");
            return Ok(self.mediated_binding(&uuid));
        }

        let create = self
            .device_dir()
            .join("mdev_supported_types")
            .join(gvtg_type)
            .join("create");
        tracing::info!(
            uuid = %uuid,
            gvtg_type = %gvtg_type,
            state = %GpuState::Creating,
            "creating vgpu"
        );

        // The kernel names the device after the lowercase form
        let payload = uuid.hyphenated().to_string();
        let created = write_control(self.sysfs, &create, payload.as_bytes(), GpuStep::CreateMdev);
        if let Err(e) = created {
            tracing::warn!(
                uuid = %uuid,
                state = %GpuState::Failed,
                error = %e,
                "vgpu creation failed"
            );
            return Err(e);
        }

        tracing::info!(uuid = %uuid, state = %GpuState::Bound, "vgpu created");
        Ok(self.mediated_binding(&uuid))
    }

    fn acquire_passthrough(&self) -> Result<BoundGpu> {
        let bdf = &self.settings.bdf;
        tracing::info!(bdf = %bdf, state = %GpuState::Creating, "preparing gpu passthrough");

        let mut unbound = false;
        let result = self.load_modules().and_then(|()| {
            let device_id = self.read_device_id()?;
            unbound = self.unbind_driver()?;
            self.register_id(device_id)
        });

        if let Err(e) = result {
            if unbound {
                // No rollback: the device stays detached from its original driver
                tracing::warn!(
                    bdf = %bdf,
                    "gpu left unbound from its original driver; rebind it manually"
                );
            }
            tracing::warn!(
                bdf = %bdf,
                state = %GpuState::Failed,
                error = %e,
                "gpu passthrough failed"
            );
            return Err(e);
        }

        tracing::info!(bdf = %bdf, state = %GpuState::Bound, "gpu ready for passthrough");
        Ok(self.passthrough_binding())
    }

    /// Load the passthrough module family. Already-loaded modules are skipped.
    fn load_modules(&self) -> Result<()> {
        for module in &self.settings.modules {
            let loaded = PathBuf::from("module").join(module.replace('-', "_"));
            if self.sysfs.exists(&loaded) {
                tracing::debug!(module = %module, "module already loaded");
                continue;
            }

            self.executor
                .run(&Invocation::new(MODPROBE).arg(module.as_str()))
                .map_err(|e| Error::gpu(GpuStep::ModuleLoad, format!("{}: {}", module, e)))?;
        }
        Ok(())
    }

    fn read_device_id(&self) -> Result<u32> {
        let path = self.device_dir().join("device");
        let raw = self
            .sysfs
            .read(&path)
            .map_err(|e| Error::gpu(GpuStep::ReadDeviceId, format!("{}: {}", path.display(), e)))?;

        let trimmed = raw.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        u32::from_str_radix(digits, 16).map_err(|e| {
            Error::gpu(
                GpuStep::ReadDeviceId,
                format!("{}: '{}': {}", path.display(), trimmed, e),
            )
        })
    }

    /// Detach the device from its current driver, if any.
    ///
    /// Returns whether an unbind happened.
    fn unbind_driver(&self) -> Result<bool> {
        let driver = self.device_dir().join("driver");
        if !self.sysfs.exists(&driver) {
            return Ok(false);
        }

        tracing::debug!(bdf = %self.settings.bdf, "unbinding current driver");
        write_control(
            self.sysfs,
            &driver.join("unbind"),
            self.settings.bdf.as_bytes(),
            GpuStep::Unbind,
        )?;
        Ok(true)
    }

    fn register_id(&self, device_id: u32) -> Result<()> {
        let new_id = PathBuf::from("bus/pci/drivers")
            .join(&self.settings.passthrough_driver)
            .join("new_id");
        let pair = format!("{} {:x}", self.settings.vendor_id, device_id);
        write_control(self.sysfs, &new_id, pair.as_bytes(), GpuStep::RegisterId)
    }

    fn device_dir(&self) -> PathBuf {
        PathBuf::from("bus/pci/devices").join(&self.settings.bdf)
    }

    fn mdev_dir(&self, uuid: &Uuid) -> PathBuf {
        self.device_dir().join(uuid.hyphenated().to_string())
    }

    fn mediated_binding(&self, uuid: &Uuid) -> BoundGpu {
        BoundGpu {
            kind: BoundKind::Mediated {
                uuid: *uuid,
                sysfsdev: self.sysfs.path(&self.mdev_dir(uuid)),
            },
        }
    }

    fn passthrough_binding(&self) -> BoundGpu {
        BoundGpu {
            kind: BoundKind::Passthrough {
                host: self.settings.short_bdf().to_string(),
            },
        }
    }
}

/// Issue a single write to a control file. Short writes are failures.
fn write_control(sysfs: &dyn Sysfs, rel: &Path, data: &[u8], step: GpuStep) -> Result<()> {
    let written = sysfs
        .write(rel, data)
        .map_err(|e| Error::gpu(step, format!("write {}: {}", rel.display(), e)))?;

    if written != data.len() {
        return Err(Error::gpu(
            step,
            format!(
                "short write to {}: {} of {} bytes",
                rel.display(),
                written,
                data.len()
            ),
        ));
    }
    Ok(())
}
