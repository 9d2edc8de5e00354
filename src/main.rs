//! containervmm - hand a container's network to a VM
//!
//! Runs inside a container, creates a TAP device per container interface and
//! cross-connects them with tc redirects, so a VM booted on those TAPs takes
//! over the container's network identity.

mod cli;
mod disk;
mod error;
mod guest;
mod handoff;
mod logging;
mod manifest;
mod network;

use cli::{Cli, Commands, RunArgs};
use error::{Error, Result};
use handoff::Handoff;
use network::{HostInterface, IgnoreSet, NetlinkSession};
use serde::Serialize;
use std::path::Path;
use tracing::info;

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse_args();

    if let Commands::Completion { shell } = cli.command {
        Cli::generate_completion(shell);
        return Ok(());
    }

    logging::init(cli.debug, cli.log_format);

    match cli.command {
        Commands::Run(args) => run_guest(cli.config.as_deref(), &args),
        Commands::Interfaces { json, all } => interfaces(json, all),
        Commands::Completion { .. } => unreachable!(),
    }
}

/// Bridge the network, create disks and hand the guest over
fn run_guest(config_path: Option<&Path>, args: &RunArgs) -> Result<()> {
    let mut config = manifest::load_optional(config_path)?;
    config.apply(args);
    let mut guest = config.guest()?;

    if args.dry_run {
        let mut session = NetlinkSession::open().map_err(Error::Session)?;
        let planned = network::plan(&mut session)?;

        println!("{:<16} {:<8} {:<20} {:<16}", "INTERFACE", "INDEX", "MAC", "TAP");
        for bridge in &planned {
            println!(
                "{:<16} {:<8} {:<20} {:<16}",
                bridge.iface, bridge.index, bridge.mac_addr, bridge.tap
            );
        }
        return Ok(());
    }

    let tap_names = {
        let mut session = NetlinkSession::open().map_err(Error::Session)?;
        network::setup_container_networking(&mut session, &mut guest)?
    };

    disk::create_disks(&mut guest, &config.guest.disk_dir)?;

    info!(guest = %guest.name, nics = guest.nics.len(), disks = guest.disks.len(), "Guest ready");
    Handoff::new(&guest, &tap_names).emit(args.descriptor_out.as_deref())
}

#[derive(Serialize)]
struct InterfaceRow<'a> {
    #[serde(flatten)]
    iface: &'a HostInterface,
    ignored: bool,
}

/// Show host interfaces the way the bridge enumerates them
fn interfaces(json: bool, all: bool) -> Result<()> {
    let ignore = IgnoreSet::default();
    let mut session = NetlinkSession::open().map_err(Error::Session)?;
    let links = network::link::list(&mut session)?;

    let rows: Vec<InterfaceRow> = links
        .iter()
        .map(|iface| InterfaceRow {
            iface,
            ignored: ignore.contains(&iface.name),
        })
        .filter(|row| all || !row.ignored)
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    println!("{:<8} {:<16} {:<20} {:<8}", "INDEX", "NAME", "MAC", "STATUS");
    for row in &rows {
        let status = if row.ignored { "ignored" } else { "bridged" };
        let mac = if row.iface.hardware_addr.is_empty() {
            "-".to_string()
        } else {
            row.iface.hardware_addr.to_string()
        };
        println!(
            "{:<8} {:<16} {:<20} {:<8}",
            row.iface.index, row.iface.name, mac, status
        );
    }

    Ok(())
}
