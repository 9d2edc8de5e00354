//! Command-line interface for containervmm
//!
//! Uses clap with derive; every flag can also come from a
//! `CONTAINERVMM_*` environment variable.

use crate::logging::LogFormat;
use clap::{ArgAction, Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// containervmm - run a container's workload inside a VM that takes over its network
#[derive(Parser)]
#[command(name = "containervmm")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Optional TOML file with guest settings
    #[arg(short, long, global = true, env = "CONTAINERVMM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true, env = "CONTAINERVMM_DEBUG")]
    pub debug: bool,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text, env = "CONTAINERVMM_LOG_FORMAT")]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Bridge the container's interfaces, create disks and emit the guest descriptor
    Run(RunArgs),

    /// List host interfaces as the bridge sees them
    Interfaces {
        /// Output in JSON format
        #[arg(long)]
        json: bool,

        /// Include ignored interfaces (lo, tunl0)
        #[arg(long)]
        all: bool,
    },

    /// Generate shell completions
    Completion {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Guest settings; unset flags fall back to the config file, then defaults
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Guest name [default: flatcar_production_qemu]
    #[arg(long, env = "CONTAINERVMM_GUEST_NAME")]
    pub guest_name: Option<String>,

    /// Guest memory [default: 1024M]
    #[arg(long, env = "CONTAINERVMM_GUEST_MEMORY")]
    pub guest_memory: Option<String>,

    /// Guest vCPUs [default: 1]
    #[arg(long, env = "CONTAINERVMM_GUEST_CPUS")]
    pub guest_cpus: Option<String>,

    /// Root disk size [default: 20G]
    #[arg(long, env = "CONTAINERVMM_GUEST_ROOT_DISK_SIZE")]
    pub guest_root_disk_size: Option<String>,

    /// Additional disks as id:size pairs
    #[arg(long, value_delimiter = ',', env = "CONTAINERVMM_GUEST_ADDITIONAL_DISKS")]
    pub guest_additional_disks: Option<Vec<String>>,

    /// Host directories to share as tag:path pairs
    #[arg(long, value_delimiter = ',', env = "CONTAINERVMM_GUEST_HOST_VOLUMES")]
    pub guest_host_volumes: Option<Vec<String>>,

    /// Directory the disk images are created in [default: .]
    #[arg(long, env = "CONTAINERVMM_DISK_DIR")]
    pub disk_dir: Option<PathBuf>,

    /// Flatcar release channel [default: stable]
    #[arg(long, env = "CONTAINERVMM_FLATCAR_CHANNEL")]
    pub flatcar_channel: Option<String>,

    /// Flatcar version [default: latest of the channel]
    #[arg(long, env = "CONTAINERVMM_FLATCAR_VERSION")]
    pub flatcar_version: Option<String>,

    /// Ignition config handed to the guest
    #[arg(long, env = "CONTAINERVMM_FLATCAR_IGNITION")]
    pub flatcar_ignition: Option<PathBuf>,

    /// Verify image signatures before boot [default: true]
    #[arg(
        long,
        env = "CONTAINERVMM_SANITY_CHECKS",
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true"
    )]
    pub sanity_checks: Option<bool>,

    /// Show the planned TAP pairs without touching the kernel
    #[arg(long)]
    pub dry_run: bool,

    /// Write the guest descriptor here instead of stdout
    #[arg(long, env = "CONTAINERVMM_DESCRIPTOR_OUT")]
    pub descriptor_out: Option<PathBuf>,
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Generate shell completion scripts
    pub fn generate_completion(shell: Shell) {
        let mut cmd = Self::command();
        clap_complete::generate(shell, &mut cmd, "containervmm", &mut std::io::stdout());
    }
}
