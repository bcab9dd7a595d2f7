//! QEMU command line construction.
//!
//! - [`CommandLine`]: token list with a byte budget
//! - [`CommandBuilder`]: turns a [`GuestConfig`](crate::guest::GuestConfig)
//!   into an emulator [`Invocation`](crate::exec::Invocation)

pub mod builder;
pub mod cmdline;

pub use builder::{CommandBuilder, PLATFORM_DEFAULTS};
pub use cmdline::CommandLine;
