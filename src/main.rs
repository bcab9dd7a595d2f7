//! vmlaunch CLI entry point.

use clap::{Parser, Subcommand};
use vmlaunch::Settings;
use tracing_subscriber::EnvFilter;

mod cli;

/// vmlaunch - launch QEMU/KVM guests from declarative configuration
#[derive(Parser, Debug)]
#[command(name = "vmlaunch")]
#[command(about = "Launch QEMU/KVM guests from declarative configuration")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Prepare host resources and start a guest.
    Start(cli::start::StartCmd),

    /// Print the emulator command without starting anything.
    Cmdline(cli::cmdline::CmdlineCmd),

    /// Validate a guest configuration.
    Check(cli::check::CheckCmd),
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging based on RUST_LOG or default to info
    init_logging();

    tracing::debug!(version = vmlaunch::VERSION, "starting vmlaunch");

    // Load host settings
    let settings = match Settings::load() {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "failed to load settings, using defaults");
            Settings::default()
        }
    };

    let result = match cli.command {
        Commands::Start(cmd) => cmd.run(&settings),
        Commands::Cmdline(cmd) => cmd.run(&settings),
        Commands::Check(cmd) => cmd.run(&settings),
    };

    if let Err(e) = result {
        tracing::error!(error = %e, "command failed");
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Initialize the tracing subscriber.
fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("vmlaunch=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
