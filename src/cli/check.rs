//! Check command implementation.

use clap::Args;
use vmlaunch::guest::Firmware;
use vmlaunch::{HostExecutor, HostSysfs, Launcher, Settings};

/// Validate a guest configuration.
#[derive(Args, Debug)]
pub struct CheckCmd {
    /// Guest name.
    pub name: String,
}

impl CheckCmd {
    /// Execute the check command.
    pub fn run(&self, settings: &Settings) -> vmlaunch::Result<()> {
        let sysfs = HostSysfs::new(&settings.sysfs_root);
        let launcher = Launcher::new(settings, &HostExecutor, &sysfs);

        let guest = launcher.load(&self.name)?;
        // Also catches a malformed vGPU UUID and an oversize command
        launcher.compose(&guest)?;

        println!("Guest:    {}", guest.name);
        println!("Emulator: {}", guest.emulator.display());
        println!("Memory:   {} MiB", guest.memory_mb);
        println!("vCPUs:    {}", guest.vcpus);
        match &guest.firmware {
            Firmware::Unified { path } => println!("Firmware: {}", path.display()),
            Firmware::Split { code, vars } => {
                println!("Firmware: {} + {}", code.display(), vars.display())
            }
        }
        println!("Disk:     {}", guest.disk.display());
        println!("Graphics: {}", guest.graphics);
        println!(
            "Ports:    adb {} fastboot {}",
            guest.network.adb_port, guest.network.fastboot_port
        );
        if let Some(rpmb) = &guest.rpmb {
            let show = |p: &Option<std::path::PathBuf>| {
                p.as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "-".to_string())
            };
            println!("RPMB:     {} in {}", show(&rpmb.bin), show(&rpmb.data_dir));
        }
        if !guest.extra_args.is_empty() {
            println!("Extra:    {}", guest.extra_args.join(" "));
        }

        println!("OK");
        Ok(())
    }
}
