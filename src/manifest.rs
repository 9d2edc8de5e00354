//! Configuration file parsing for containervmm
//!
//! An optional TOML file supplies guest settings. Precedence is
//! CLI flags, then the file, then built-in defaults.

use crate::cli::RunArgs;
use crate::disk;
use crate::error::{Error, Result};
use crate::guest::{Disk, Guest, GuestOs, HostVolume};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Id of the root disk; additional disks may not reuse it
pub const ROOT_DISK_ID: &str = "rootfs";

/// Load configuration from a file
pub fn load(path: &Path) -> Result<Config> {
    let content = fs::read_to_string(path).map_err(|e| Error::ConfigRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    let config: Config = toml::from_str(&content)?;
    config.validate()?;

    Ok(config)
}

/// Load the file if one was given, defaults otherwise
pub fn load_optional(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => load(path),
        None => Ok(Config::default()),
    }
}

/// Root configuration structure
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub guest: GuestConfig,

    #[serde(default)]
    pub flatcar: FlatcarConfig,
}

/// `[guest]` section
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GuestConfig {
    #[serde(default = "default_name")]
    pub name: String,

    #[serde(default = "default_memory")]
    pub memory: String,

    #[serde(default = "default_cpus")]
    pub cpus: String,

    #[serde(default = "default_root_disk_size")]
    pub root_disk_size: String,

    /// `id:size` pairs
    #[serde(default)]
    pub additional_disks: Vec<String>,

    /// `tag:path` pairs
    #[serde(default)]
    pub host_volumes: Vec<String>,

    #[serde(default = "default_disk_dir")]
    pub disk_dir: PathBuf,
}

impl Default for GuestConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            memory: default_memory(),
            cpus: default_cpus(),
            root_disk_size: default_root_disk_size(),
            additional_disks: Vec::new(),
            host_volumes: Vec::new(),
            disk_dir: default_disk_dir(),
        }
    }
}

/// `[flatcar]` section
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlatcarConfig {
    #[serde(default = "default_channel")]
    pub channel: String,

    #[serde(default)]
    pub version: Option<String>,

    #[serde(default)]
    pub ignition: Option<PathBuf>,

    #[serde(default = "default_sanity_checks")]
    pub sanity_checks: bool,
}

impl Default for FlatcarConfig {
    fn default() -> Self {
        Self {
            channel: default_channel(),
            version: None,
            ignition: None,
            sanity_checks: default_sanity_checks(),
        }
    }
}

fn default_name() -> String {
    "flatcar_production_qemu".to_string()
}

fn default_memory() -> String {
    "1024M".to_string()
}

fn default_cpus() -> String {
    "1".to_string()
}

fn default_root_disk_size() -> String {
    "20G".to_string()
}

fn default_disk_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_channel() -> String {
    "stable".to_string()
}

fn default_sanity_checks() -> bool {
    true
}

/// Split an `a:b` pair, both halves non-empty
fn split_pair<'a>(kind: &str, format: &str, value: &'a str) -> Result<(&'a str, &'a str)> {
    match value.split_once(':') {
        Some((left, right)) if !left.is_empty() && !right.is_empty() => Ok((left, right)),
        _ => Err(Error::ConfigValidation(format!(
            "Invalid {} '{}': expected {}",
            kind, value, format
        ))),
    }
}

impl Config {
    /// Overlay flags the user actually passed
    pub fn apply(&mut self, args: &RunArgs) {
        let guest = &mut self.guest;
        if let Some(name) = &args.guest_name {
            guest.name = name.clone();
        }
        if let Some(memory) = &args.guest_memory {
            guest.memory = memory.clone();
        }
        if let Some(cpus) = &args.guest_cpus {
            guest.cpus = cpus.clone();
        }
        if let Some(size) = &args.guest_root_disk_size {
            guest.root_disk_size = size.clone();
        }
        if let Some(disks) = &args.guest_additional_disks {
            guest.additional_disks = disks.clone();
        }
        if let Some(volumes) = &args.guest_host_volumes {
            guest.host_volumes = volumes.clone();
        }
        if let Some(dir) = &args.disk_dir {
            guest.disk_dir = dir.clone();
        }

        let flatcar = &mut self.flatcar;
        if let Some(channel) = &args.flatcar_channel {
            flatcar.channel = channel.clone();
        }
        if args.flatcar_version.is_some() {
            flatcar.version = args.flatcar_version.clone();
        }
        if args.flatcar_ignition.is_some() {
            flatcar.ignition = args.flatcar_ignition.clone();
        }
        if let Some(checks) = args.sanity_checks {
            flatcar.sanity_checks = checks;
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let guest = &self.guest;

        if guest.name.trim().is_empty() {
            return Err(Error::ConfigValidation("Guest name must not be empty".into()));
        }

        match guest.cpus.parse::<u32>() {
            Ok(n) if n >= 1 => {}
            _ => {
                return Err(Error::ConfigValidation(format!(
                    "Invalid CPU count '{}': expected a positive integer",
                    guest.cpus
                )));
            }
        }

        disk::parse_size(&guest.memory)?;
        disk::parse_size(&guest.root_disk_size)?;

        let mut ids = HashSet::new();
        ids.insert(ROOT_DISK_ID);
        for entry in &guest.additional_disks {
            let (id, size) = split_pair("additional disk", "<id>:<size>", entry)?;
            if !ids.insert(id) {
                return Err(Error::ConfigValidation(format!("Duplicate disk id: {}", id)));
            }
            disk::parse_size(size)?;
        }

        let mut tags = HashSet::new();
        for entry in &guest.host_volumes {
            let (tag, _) = split_pair("host volume", "<tag>:<path>", entry)?;
            if !tags.insert(tag) {
                return Err(Error::ConfigValidation(format!("Duplicate mount tag: {}", tag)));
            }
        }

        if self.flatcar.channel.trim().is_empty() {
            return Err(Error::ConfigValidation("Flatcar channel must not be empty".into()));
        }

        Ok(())
    }

    /// Build the guest descriptor; NICs are left for the network bridge
    pub fn guest(&self) -> Result<Guest> {
        self.validate()?;

        let cfg = &self.guest;
        let mut guest = Guest::new(&cfg.name, &cfg.cpus, &cfg.memory);

        guest.os = GuestOs {
            channel: self.flatcar.channel.clone(),
            version: self.flatcar.version.clone(),
            ignition_config: self.flatcar.ignition.clone(),
            sanity_checks: self.flatcar.sanity_checks,
        };

        guest.disks.push(Disk::new(ROOT_DISK_ID, &cfg.root_disk_size, true));
        for entry in &cfg.additional_disks {
            let (id, size) = split_pair("additional disk", "<id>:<size>", entry)?;
            guest.disks.push(Disk::new(id, size, false));
        }

        for entry in &cfg.host_volumes {
            let (tag, path) = split_pair("host volume", "<tag>:<path>", entry)?;
            guest.host_volumes.push(HostVolume {
                mount_tag: tag.to_string(),
                host_path: PathBuf::from(path),
            });
        }

        Ok(guest)
    }
}
