//! Emulator command composition.
//!
//! The argument order is fixed:
//! identity/QMP, network, memory, vCPUs, firmware, disk, graphics, extra
//! arguments, then the platform defaults.

use super::cmdline::CommandLine;
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::exec::Invocation;
use crate::gpu::BoundGpu;
use crate::guest::{Firmware, Graphics, GuestConfig};

/// Guest-side adb port.
const GUEST_ADB_PORT: u16 = 5555;

/// Guest-side fastboot port.
const GUEST_FASTBOOT_PORT: u16 = 5554;

/// Platform defaults appended to every command.
pub const PLATFORM_DEFAULTS: &[&str] = &[
    "-machine",
    "type=q35,kernel_irqchip=off",
    "-k",
    "en-us",
    "-cpu",
    "host",
    "-vga",
    "none",
    "-enable-kvm",
    "-device",
    "qemu-xhci,id=xhci,addr=0x8",
    "-device",
    "usb-mouse",
    "-device",
    "usb-kbd",
    "-device",
    "intel-hda",
    "-device",
    "hda-duplex",
    "-audiodev",
    "id=android_spk,timer-period=5000,driver=pa",
    "-device",
    "e1000,netdev=net0",
    "-device",
    "intel-iommu,device-iotlb=off,caching-mode=on",
    "-nodefaults",
];

/// Composes emulator invocations from resolved guest configuration.
#[derive(Debug, Clone)]
pub struct CommandBuilder<'a> {
    settings: &'a Settings,
}

impl<'a> CommandBuilder<'a> {
    /// Create a builder using the host settings for paths and limits.
    pub fn new(settings: &'a Settings) -> Self {
        Self { settings }
    }

    /// Compose the full emulator invocation.
    ///
    /// `gpu` must be the binding for `guest.graphics` when that mode needs
    /// one. Either the whole command is returned or an error; never a
    /// truncated command.
    pub fn build(&self, guest: &GuestConfig, gpu: Option<&BoundGpu>) -> Result<Invocation> {
        let graphics = graphics_args(&guest.graphics, gpu)?;

        let mut cmd = CommandLine::with_limit(self.settings.max_cmdline_len);

        cmd.opt("-name", guest.name.as_str())?;
        cmd.opt(
            "-qmp",
            format!(
                "unix:{},server,nowait",
                self.settings.qmp_socket_path(&guest.name).display()
            ),
        )?;

        cmd.opt(
            "-netdev",
            format!(
                "user,id=net0,hostfwd=tcp::{}-:{},hostfwd=tcp::{}-:{}",
                guest.network.adb_port,
                GUEST_ADB_PORT,
                guest.network.fastboot_port,
                GUEST_FASTBOOT_PORT
            ),
        )?;

        cmd.opt("-m", guest.memory_mb.to_string())?;
        cmd.opt("-smp", guest.vcpus.to_string())?;

        cmd.extend(firmware_args(&guest.firmware))?;

        cmd.opt(
            "-drive",
            format!("file={},if=none,id=disk1", guest.disk.display()),
        )?;
        cmd.opt("-device", "virtio-blk-pci,drive=disk1,bootindex=1")?;

        cmd.extend(graphics)?;
        cmd.extend(guest.extra_args.iter().cloned())?;
        cmd.extend(PLATFORM_DEFAULTS.iter().copied())?;

        tracing::debug!(
            guest = %guest.name,
            bytes = cmd.len_bytes(),
            limit = self.settings.max_cmdline_len,
            "composed emulator command"
        );

        Ok(Invocation::new(&guest.emulator).args(cmd.into_tokens()))
    }
}

fn firmware_args(firmware: &Firmware) -> Vec<String> {
    match firmware {
        Firmware::Unified { path } => vec![
            "-drive".to_string(),
            format!("if=pflash,format=raw,file={}", path.display()),
        ],
        Firmware::Split { code, vars } => vec![
            "-drive".to_string(),
            format!("if=pflash,format=raw,readonly=on,file={}", code.display()),
            "-drive".to_string(),
            format!("if=pflash,format=raw,file={}", vars.display()),
        ],
    }
}

fn graphics_args(graphics: &Graphics, gpu: Option<&BoundGpu>) -> Result<Vec<String>> {
    let bound = || {
        gpu.filter(|g| g.satisfies(graphics))
            .ok_or_else(|| Error::MissingGpuBinding(graphics.to_string()))
    };

    let args = match graphics {
        Graphics::Mediated { .. } => {
            let sysfsdev = bound()?
                .sysfsdev()
                .ok_or_else(|| Error::MissingGpuBinding(graphics.to_string()))?;
            vec![
                "-display".to_string(),
                "gtk,gl=on".to_string(),
                "-device".to_string(),
                format!(
                    "vfio-pci-nohotplug,ramfb=on,sysfsdev={},display=on,x-igd-opregion=on",
                    sysfsdev.display()
                ),
            ]
        }
        Graphics::Passthrough => {
            let host = bound()?
                .host_address()
                .ok_or_else(|| Error::MissingGpuBinding(graphics.to_string()))?;
            vec![
                "-vga".to_string(),
                "none".to_string(),
                "-nographic".to_string(),
                "-device".to_string(),
                format!(
                    "vfio-pci,host={},x-igd-gms=2,id=hostdev0,bus=pcie.0,addr=0x2,\
                     x-igd-opregion=on",
                    host
                ),
            ]
        }
        Graphics::Virtio => vec![
            "-display".to_string(),
            "gtk,gl=on".to_string(),
            "-device".to_string(),
            "virtio-gpu-pci".to_string(),
        ],
        Graphics::Software => vec![
            "-display".to_string(),
            "gtk,gl=on".to_string(),
            "-device".to_string(),
            "qxl-vga,xres=480,yres=360".to_string(),
        ],
    };
    Ok(args)
}
