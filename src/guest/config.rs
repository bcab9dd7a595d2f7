//! Resolved guest configuration.

use super::source::{require, require_parsed, KeySource};
use crate::error::{Error, Result};
use crate::rpmb::RpmbConfig;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// Configuration groups and keys.
pub mod keys {
    pub const EMULATOR: &str = "emulator";
    pub const EMULATOR_PATH: &str = "path";

    pub const GLOBAL: &str = "global";
    pub const GLOBAL_NAME: &str = "name";
    pub const GLOBAL_ADB_PORT: &str = "adb_port";
    pub const GLOBAL_FASTBOOT_PORT: &str = "fastboot_port";

    pub const MEMORY: &str = "memory";
    pub const MEMORY_SIZE: &str = "size";

    pub const VCPU: &str = "vcpu";
    pub const VCPU_NUM: &str = "num";

    pub const FIRMWARE: &str = "firmware";
    pub const FIRMWARE_TYPE: &str = "type";
    pub const FIRMWARE_PATH: &str = "path";
    pub const FIRMWARE_CODE: &str = "code";
    pub const FIRMWARE_VARS: &str = "vars";

    pub const DISK: &str = "disk";
    pub const DISK_PATH: &str = "path";

    pub const GRAPHICS: &str = "graphics";
    pub const GRAPHICS_TYPE: &str = "type";
    pub const GRAPHICS_GVTG_VERSION: &str = "gvtg_version";
    pub const GRAPHICS_VGPU_UUID: &str = "vgpu_uuid";

    pub const RPMB: &str = "rpmb";
    pub const RPMB_BIN_PATH: &str = "bin_path";
    pub const RPMB_DATA_DIR: &str = "data_dir";

    pub const EXTRA: &str = "extra";
}

/// Host port forwards for adb and fastboot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NetworkForward {
    /// Host port forwarded to the guest's adb port (5555).
    pub adb_port: u16,
    /// Host port forwarded to the guest's fastboot port (5554).
    pub fastboot_port: u16,
}

/// Guest firmware layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Firmware {
    /// Single combined image, writable.
    Unified {
        /// Image path.
        path: PathBuf,
    },
    /// Read-only code image plus writable variable store.
    Split {
        /// Code image path.
        code: PathBuf,
        /// Variable store path.
        vars: PathBuf,
    },
}

/// Graphics backend for the guest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Graphics {
    /// GVT-g mediated vGPU slice.
    Mediated {
        /// Mediated device type, e.g. `i915-GVTg_V5_4`.
        gvtg_type: String,
        /// Device instance UUID.
        uuid: String,
    },
    /// GVT-d exclusive passthrough of the whole GPU.
    Passthrough,
    /// Paravirtual virtio-gpu.
    Virtio,
    /// Emulated display adapter.
    Software,
}

impl Graphics {
    /// Configuration spelling of the mode.
    pub fn name(&self) -> &'static str {
        match self {
            Graphics::Mediated { .. } => "GVT-g",
            Graphics::Passthrough => "GVT-d",
            Graphics::Virtio => "virtio",
            Graphics::Software => "software",
        }
    }
}

impl fmt::Display for Graphics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Fully resolved guest configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GuestConfig {
    /// Guest name.
    pub name: String,
    /// Emulator binary.
    pub emulator: PathBuf,
    /// Port forwards.
    pub network: NetworkForward,
    /// Memory in MiB.
    pub memory_mb: u32,
    /// Number of vCPUs.
    pub vcpus: u32,
    /// Firmware layout.
    pub firmware: Firmware,
    /// Boot disk image.
    pub disk: PathBuf,
    /// Graphics backend.
    pub graphics: Graphics,
    /// RPMB backend, when the guest has an `[rpmb]` group.
    pub rpmb: Option<RpmbConfig>,
    /// Raw extra emulator arguments, in configured order.
    pub extra_args: Vec<String>,
}

impl GuestConfig {
    /// Resolve every group the launch consults.
    ///
    /// Fails on the first missing or malformed value; nothing is partially
    /// resolved.
    pub fn resolve(src: &dyn KeySource) -> Result<Self> {
        use keys::*;

        let emulator = PathBuf::from(require(src, EMULATOR, EMULATOR_PATH)?);
        let name = require(src, GLOBAL, GLOBAL_NAME)?;
        let network = NetworkForward {
            adb_port: require_parsed(src, GLOBAL, GLOBAL_ADB_PORT)?,
            fastboot_port: require_parsed(src, GLOBAL, GLOBAL_FASTBOOT_PORT)?,
        };
        let memory_mb: u32 = require_parsed(src, MEMORY, MEMORY_SIZE)?;
        if memory_mb == 0 {
            return Err(Error::invalid_value(MEMORY, MEMORY_SIZE, "0", "must be non-zero"));
        }
        let vcpus: u32 = require_parsed(src, VCPU, VCPU_NUM)?;
        if vcpus == 0 {
            return Err(Error::invalid_value(VCPU, VCPU_NUM, "0", "must be non-zero"));
        }

        let firmware = resolve_firmware(src)?;
        let disk = PathBuf::from(require(src, DISK, DISK_PATH)?);
        let graphics = resolve_graphics(src)?;

        let rpmb = if src.has_group(RPMB) {
            Some(RpmbConfig::new(
                require(src, RPMB, RPMB_BIN_PATH)?,
                require(src, RPMB, RPMB_DATA_DIR)?,
            ))
        } else {
            None
        };

        let extra_args = src
            .keys(EXTRA)
            .iter()
            .filter_map(|k| src.get(EXTRA, k))
            .flat_map(|v| {
                v.split_ascii_whitespace()
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .collect();

        Ok(Self {
            name,
            emulator,
            network,
            memory_mb,
            vcpus,
            firmware,
            disk,
            graphics,
            rpmb,
            extra_args,
        })
    }
}

fn resolve_firmware(src: &dyn KeySource) -> Result<Firmware> {
    use keys::*;

    let mode = require(src, FIRMWARE, FIRMWARE_TYPE)?;
    match mode.as_str() {
        "unified" => Ok(Firmware::Unified {
            path: require(src, FIRMWARE, FIRMWARE_PATH)?.into(),
        }),
        "split" => Ok(Firmware::Split {
            code: require(src, FIRMWARE, FIRMWARE_CODE)?.into(),
            vars: require(src, FIRMWARE, FIRMWARE_VARS)?.into(),
        }),
        _ => Err(Error::invalid_value(
            FIRMWARE,
            FIRMWARE_TYPE,
            mode.as_str(),
            "expected 'unified' or 'split'",
        )),
    }
}

fn resolve_graphics(src: &dyn KeySource) -> Result<Graphics> {
    use keys::*;

    let mode = require(src, GRAPHICS, GRAPHICS_TYPE)?;
    match mode.as_str() {
        "GVT-g" => {
            let gvtg_type = require(src, GRAPHICS, GRAPHICS_GVTG_VERSION)?;
            validate_gvtg_type(&gvtg_type)?;
            Ok(Graphics::Mediated {
                gvtg_type,
                uuid: require(src, GRAPHICS, GRAPHICS_VGPU_UUID)?,
            })
        }
        "GVT-d" => Ok(Graphics::Passthrough),
        "virtio" => Ok(Graphics::Virtio),
        "software" => Ok(Graphics::Software),
        _ => Err(Error::invalid_value(
            GRAPHICS,
            GRAPHICS_TYPE,
            mode.as_str(),
            "expected one of GVT-g, GVT-d, virtio, software",
        )),
    }
}

/// The mdev type names a directory under `mdev_supported_types`.
fn validate_gvtg_type(gvtg_type: &str) -> Result<()> {
    let valid = !gvtg_type.starts_with('.')
        && gvtg_type
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(Error::invalid_value(
            keys::GRAPHICS,
            keys::GRAPHICS_GVTG_VERSION,
            gvtg_type,
            "must be a plain mdev type name",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guest::source::TomlSource;
    use crate::testutil::PIXEL_TOML as PIXEL;

    fn resolve(text: &str) -> Result<GuestConfig> {
        GuestConfig::resolve(&TomlSource::parse(text).unwrap())
    }

    #[test]
    fn test_resolve_pixel() {
        let cfg = resolve(PIXEL).unwrap();
        assert_eq!(cfg.name, "pixel");
        assert_eq!(cfg.memory_mb, 4096);
        assert_eq!(cfg.vcpus, 4);
        assert_eq!(
            cfg.firmware,
            Firmware::Unified {
                path: PathBuf::from("/fw/ovmf.fd")
            }
        );
        assert_eq!(cfg.graphics, Graphics::Virtio);
        assert!(cfg.rpmb.is_none());
        assert!(cfg.extra_args.is_empty());
    }

    #[test]
    fn test_split_firmware() {
        let text = PIXEL.replace(
            "type = \"unified\"\npath = \"/fw/ovmf.fd\"",
            "type = \"split\"\ncode = \"/fw/CODE.fd\"\nvars = \"/fw/VARS.fd\"",
        );
        let cfg = resolve(&text).unwrap();
        assert_eq!(
            cfg.firmware,
            Firmware::Split {
                code: PathBuf::from("/fw/CODE.fd"),
                vars: PathBuf::from("/fw/VARS.fd"),
            }
        );
    }

    #[test]
    fn test_unknown_firmware_mode() {
        let text = PIXEL.replace("type = \"unified\"", "type = \"bios\"");
        let err = resolve(&text).unwrap_err();
        assert!(
            matches!(err, Error::InvalidValue { ref group, .. } if group == "firmware"),
            "got {err}"
        );
    }

    #[test]
    fn test_missing_key_aborts() {
        let text = PIXEL.replace("size = 4096", "");
        let err = resolve(&text).unwrap_err();
        assert!(matches!(
            err,
            Error::MissingKey { ref group, ref key } if group == "memory" && key == "size"
        ));
    }

    #[test]
    fn test_missing_port_aborts() {
        let text = PIXEL.replace("fastboot_port = 5554", "");
        let err = resolve(&text).unwrap_err();
        assert!(matches!(err, Error::MissingKey { ref key, .. } if key == "fastboot_port"));
    }

    fn mediated(gvtg_version: &str) -> String {
        PIXEL.replace(
            "type = \"virtio\"",
            &format!(
                "type = \"GVT-g\"\ngvtg_version = \"{gvtg_version}\"\n\
                 vgpu_uuid = \"4ec1ff92-81d7-11e9-aed4-5bf6a9a2bb0a\""
            ),
        )
    }

    #[test]
    fn test_mediated_graphics() {
        let text = mediated("i915-GVTg_V5_4");
        let cfg = resolve(&text).unwrap();
        assert_eq!(
            cfg.graphics,
            Graphics::Mediated {
                gvtg_type: "i915-GVTg_V5_4".to_string(),
                uuid: "4ec1ff92-81d7-11e9-aed4-5bf6a9a2bb0a".to_string(),
            }
        );
    }

    #[test]
    fn test_mediated_requires_uuid() {
        let text = PIXEL.replace(
            "type = \"virtio\"",
            "type = \"GVT-g\"\ngvtg_version = \"i915-GVTg_V5_4\"",
        );
        let err = resolve(&text).unwrap_err();
        assert!(matches!(err, Error::MissingKey { ref key, .. } if key == "vgpu_uuid"));
    }

    #[test]
    fn test_mdev_type_cannot_leave_type_dir() {
        for bad in ["../../../driver/unbind", "i915/../../x", "..", ".hidden", ""] {
            let err = resolve(&mediated(bad)).unwrap_err();
            assert!(
                matches!(
                    err,
                    Error::InvalidValue { ref key, .. } | Error::MissingKey { ref key, .. }
                        if key == "gvtg_version"
                ),
                "{bad:?} gave {err}"
            );
        }
    }

    #[test]
    fn test_unknown_graphics_mode() {
        let text = PIXEL.replace("type = \"virtio\"", "type = \"cirrus\"");
        assert!(matches!(resolve(&text), Err(Error::InvalidValue { .. })));
    }

    #[test]
    fn test_extra_args_keep_order() {
        let text = format!(
            "{PIXEL}\n[extra]\n\
             cmd = \"-device virtio-serial -chardev pty,id=p0\"\n\
             usb = \"-device usb-host,hostbus=1\"\n"
        );
        let cfg = resolve(&text).unwrap();
        assert_eq!(
            cfg.extra_args,
            vec![
                "-device",
                "virtio-serial",
                "-chardev",
                "pty,id=p0",
                "-device",
                "usb-host,hostbus=1"
            ]
        );
    }

    #[test]
    fn test_rpmb_group() {
        let text = format!(
            "{PIXEL}\n[rpmb]\nbin_path = \"/opt/rpmb_dev\"\ndata_dir = \"/var/civ\"\n"
        );
        let cfg = resolve(&text).unwrap();
        let rpmb = cfg.rpmb.unwrap();
        assert_eq!(rpmb.bin, Some(PathBuf::from("/opt/rpmb_dev")));
        assert_eq!(rpmb.data_dir, Some(PathBuf::from("/var/civ")));
    }

    #[test]
    fn test_incomplete_rpmb_group_rejected() {
        let text = format!("{PIXEL}\n[rpmb]\nbin_path = \"/opt/rpmb_dev\"\n");
        let err = resolve(&text).unwrap_err();
        assert!(matches!(
            err,
            Error::MissingKey { ref group, ref key } if group == "rpmb" && key == "data_dir"
        ));

        let text = format!("{PIXEL}\n[rpmb]\ndata_dir = \"/var/civ\"\n");
        let err = resolve(&text).unwrap_err();
        assert!(matches!(
            err,
            Error::MissingKey { ref group, ref key } if group == "rpmb" && key == "bin_path"
        ));
    }

    #[test]
    fn test_zero_vcpus_rejected() {
        let text = PIXEL.replace("num = 4", "num = 0");
        assert!(matches!(resolve(&text), Err(Error::InvalidValue { .. })));
    }
}
