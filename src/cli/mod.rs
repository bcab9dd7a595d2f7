//! CLI command implementations.

pub mod check;
pub mod cmdline;
pub mod start;
