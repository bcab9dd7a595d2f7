//! Cmdline command implementation.

use clap::Args;
use vmlaunch::{HostExecutor, HostSysfs, Launcher, Settings};

/// Print the emulator command a guest would be started with.
///
/// Nothing is created, bound or started.
#[derive(Args, Debug)]
pub struct CmdlineCmd {
    /// Guest name.
    pub name: String,

    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

impl CmdlineCmd {
    /// Execute the cmdline command.
    pub fn run(&self, settings: &Settings) -> vmlaunch::Result<()> {
        let sysfs = HostSysfs::new(&settings.sysfs_root);
        let launcher = Launcher::new(settings, &HostExecutor, &sysfs);

        let guest = launcher.load(&self.name)?;
        let invocation = launcher.compose(&guest)?;

        if self.json {
            let json =
                serde_json::to_string_pretty(&invocation).map_err(std::io::Error::from)?;
            println!("{}", json);
        } else {
            println!("{}", invocation);
        }

        Ok(())
    }
}
