//! Start command implementation.

use clap::Args;
use vmlaunch::{HostExecutor, HostSysfs, Launcher, Settings};

/// Launch a guest.
#[derive(Args, Debug)]
pub struct StartCmd {
    /// Guest name (`<guest_dir>/<name>.toml`).
    pub name: String,
}

impl StartCmd {
    /// Execute the start command.
    pub fn run(self, settings: &Settings) -> vmlaunch::Result<()> {
        let sysfs = HostSysfs::new(&settings.sysfs_root);
        let launcher = Launcher::new(settings, &HostExecutor, &sysfs);

        let report = launcher.launch(&self.name)?;

        if let Some(rpmb) = &report.rpmb {
            println!("RPMB backend: {} (PID: {})", rpmb.socket.display(), rpmb.pid);
        }
        println!("Started guest: {} (PID: {})", report.guest, report.emulator_pid);
        println!(
            "QMP: {}",
            settings.qmp_socket_path(&report.guest).display()
        );

        Ok(())
    }
}
