//! Guest descriptor
//!
//! Everything the hypervisor and DHCP collaborators need to know about the
//! VM being provisioned: sizing, boot artifacts, NICs, disks and shared
//! host volumes.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// The VM being provisioned
#[derive(Debug, Clone, Default, Serialize)]
pub struct Guest {
    pub name: String,
    pub cpus: String,
    pub memory: String,
    pub os: GuestOs,
    /// Filled in by the network bridge, one entry per bridged interface
    pub nics: Vec<NetworkInterface>,
    pub disks: Vec<Disk>,
    pub host_volumes: Vec<HostVolume>,
}

impl Guest {
    pub fn new(name: impl Into<String>, cpus: impl Into<String>, memory: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cpus: cpus.into(),
            memory: memory.into(),
            ..Default::default()
        }
    }
}

/// OS image selection, resolved by the image collaborator
#[derive(Debug, Clone, Default, Serialize)]
pub struct GuestOs {
    pub channel: String,
    pub version: Option<String>,
    pub ignition_config: Option<PathBuf>,
    /// Verify image signatures before boot
    pub sanity_checks: bool,
}

/// A guest NIC backed by a TAP device
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkInterface {
    /// MAC of the host interface, so the guest takes over its identity
    pub mac_addr: String,
    pub tap: String,
}

/// Filesystem created on a disk image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FsType {
    #[default]
    Xfs,
}

impl fmt::Display for FsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FsType::Xfs => write!(f, "xfs"),
        }
    }
}

/// A block device exposed to the guest
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Disk {
    pub id: String,
    /// Requested size as given by the user (e.g. "20G")
    pub size: String,
    pub is_root: bool,
    /// Image file, set when the disk is created
    pub file: Option<PathBuf>,
    pub filesystem: FsType,
}

impl Disk {
    pub fn new(id: impl Into<String>, size: impl Into<String>, is_root: bool) -> Self {
        Self {
            id: id.into(),
            size: size.into(),
            is_root,
            file: None,
            filesystem: FsType::default(),
        }
    }
}

/// A host directory shared into the guest under a mount tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostVolume {
    pub mount_tag: String,
    pub host_path: PathBuf,
}
