//! Error types for vmlaunch.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using vmlaunch's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Step of GPU acquisition that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpuStep {
    /// Writing the mediated device UUID to the type's `create` file.
    CreateMdev,
    /// Loading the passthrough module family.
    ModuleLoad,
    /// Reading the PCI device identifier.
    ReadDeviceId,
    /// Unbinding the device from its current driver.
    Unbind,
    /// Registering the vendor/device pair with the passthrough driver.
    RegisterId,
}

impl fmt::Display for GpuStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GpuStep::CreateMdev => "mdev create",
            GpuStep::ModuleLoad => "module load",
            GpuStep::ReadDeviceId => "device id read",
            GpuStep::Unbind => "driver unbind",
            GpuStep::RegisterId => "id registration",
        };
        f.write_str(name)
    }
}

/// Errors that can occur while launching a guest.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    /// Guest configuration file does not exist.
    #[error("guest not found: {name} (no config at {})", path.display())]
    GuestNotFound {
        /// Guest name.
        name: String,
        /// Expected configuration path.
        path: PathBuf,
    },

    /// Failed to load or parse a configuration file.
    #[error("failed to load config: {0}")]
    ConfigLoad(String),

    /// Required key is absent.
    #[error("missing key '{key}' in group [{group}]")]
    MissingKey {
        /// Configuration group.
        group: String,
        /// Key within the group.
        key: String,
    },

    /// Key is present but its value is unusable.
    #[error("invalid value '{value}' for [{group}] {key}: {reason}")]
    InvalidValue {
        /// Configuration group.
        group: String,
        /// Key within the group.
        key: String,
        /// Offending value.
        value: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// Mediated device UUID is not in canonical hyphenated form.
    #[error("invalid vgpu uuid: {0}")]
    InvalidUuid(String),

    // Resource errors
    /// GPU acquisition failed.
    #[error("gpu {step} failed: {message}")]
    Gpu {
        /// Step that failed.
        step: GpuStep,
        /// Error message.
        message: String,
    },

    /// RPMB backend has no binary or data directory configured.
    #[error("rpmb backend not configured: {0}")]
    RpmbNotConfigured(String),

    /// RPMB backend preparation failed.
    #[error("rpmb error: {0}")]
    Rpmb(String),

    // Composition errors
    /// Emulator command line would exceed the configured limit.
    #[error("emulator command line too long: {required} bytes exceeds limit of {limit}")]
    CommandTooLong {
        /// Configured maximum length.
        limit: usize,
        /// Length the command would have reached.
        required: usize,
    },

    /// Graphics mode needs a bound GPU that was not supplied.
    #[error("graphics mode {0} requires a bound gpu")]
    MissingGpuBinding(String),

    // Command execution errors
    /// External command failed.
    #[error("command failed: {command}: {message}")]
    CommandFailed {
        /// The command that failed.
        command: String,
        /// Error message.
        message: String,
    },

    // IO errors
    /// IO error wrapper.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a missing key error.
    pub fn missing_key(group: impl Into<String>, key: impl Into<String>) -> Self {
        Self::MissingKey {
            group: group.into(),
            key: key.into(),
        }
    }

    /// Create an invalid value error.
    pub fn invalid_value(
        group: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            group: group.into(),
            key: key.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Create a GPU error for the given step.
    pub fn gpu(step: GpuStep, message: impl Into<String>) -> Self {
        Self::Gpu {
            step,
            message: message.into(),
        }
    }

    /// Create an RPMB error with a message.
    pub fn rpmb(msg: impl Into<String>) -> Self {
        Self::Rpmb(msg.into())
    }

    /// Create a command failed error.
    pub fn command_failed(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CommandFailed {
            command: command.into(),
            message: message.into(),
        }
    }

    /// The GPU step that failed, if this is a GPU error.
    pub fn gpu_step(&self) -> Option<GpuStep> {
        match self {
            Error::Gpu { step, .. } => Some(*step),
            _ => None,
        }
    }
}
