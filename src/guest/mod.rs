//! Per-guest configuration.
//!
//! Each guest is described by one TOML file, `<guest_dir>/<name>.toml`.
//! [`source`] exposes it as grouped key lookup; [`config`] resolves the
//! groups a launch needs into a typed [`GuestConfig`].

pub mod config;
pub mod source;

pub use config::{Firmware, Graphics, GuestConfig, NetworkForward};
pub use source::{KeySource, TomlSource};

use crate::error::{Error, Result};

/// Check that a guest name is safe to use in file and socket names.
pub fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.len() <= 64
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        && !name.starts_with('.');

    if valid {
        Ok(())
    } else {
        Err(Error::invalid_value(
            "global",
            "name",
            name,
            "only letters, digits, '-', '_' and '.' are allowed, up to 64 characters",
        ))
    }
}
