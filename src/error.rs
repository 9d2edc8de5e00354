//! Unified error types for containervmm

use nix::errno::Errno;
use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for containervmm operations
#[derive(Error, Debug)]
pub enum Error {
    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    // Config errors
    #[error("Failed to read config file '{path}': {source}")]
    ConfigRead { path: PathBuf, source: io::Error },

    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Config validation failed: {0}")]
    ConfigValidation(String),

    // Kernel session errors
    #[error("Failed to open netlink session: {0}")]
    Session(Errno),

    // Network errors
    #[error("Cannot get local network interfaces: {0}")]
    Enumeration(String),

    #[error("No active or valid interfaces available yet")]
    NoUsableInterfaces,

    #[error("Failed to create TAP device '{tap}' for '{iface}' ({phase}): {source}")]
    DeviceCreation {
        iface: String,
        tap: String,
        phase: TapPhase,
        source: Errno,
    },

    #[error("Failed to attach ingress qdisc to '{device}' for '{iface}': {source}")]
    Qdisc {
        iface: String,
        device: String,
        source: Errno,
    },

    #[error("Failed to redirect '{from}' to '{to}' for '{iface}': {fault}")]
    Filter {
        iface: String,
        from: String,
        to: String,
        fault: FilterFault,
    },

    // Disk errors
    #[error("Invalid disk size '{0}'")]
    InvalidSize(String),

    #[error("Failed to create the disk file {file}: {message}")]
    DiskCreate { file: String, message: String },

    #[error("Command '{command}' failed: {message}")]
    CommandFailed { command: String, message: String },

    // Handoff errors
    #[error("Failed to encode guest descriptor: {0}")]
    Descriptor(#[from] serde_json::Error),
}

/// Which half of TAP provisioning failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapPhase {
    /// Registering the device with the kernel; nothing is left behind
    Register,
    /// Resolving or setting the device up; the device remains, administratively down
    Activate,
}

impl fmt::Display for TapPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TapPhase::Register => write!(f, "register"),
            TapPhase::Activate => write!(f, "set up"),
        }
    }
}

/// Why a redirect classifier was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterFault {
    /// No ingress qdisc on the source device; the filter was ordered before its parent
    MissingParent,
    /// EINVAL with the parent qdisc in place: the kernel could not use the request
    InvalidRequest,
    /// Any other kernel rejection
    Kernel(Errno),
}

impl fmt::Display for FilterFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterFault::MissingParent => write!(f, "parent ingress qdisc does not exist"),
            FilterFault::InvalidRequest => write!(f, "filter rejected as invalid"),
            FilterFault::Kernel(errno) => write!(f, "{}", errno),
        }
    }
}

/// Result type alias for containervmm operations
pub type Result<T> = std::result::Result<T, Error>;
