//! Guest disk images
//!
//! Provides:
//! - Size parsing ("20G", "512MiB", "1T", plain bytes)
//! - Sparse image creation, `<id>.img` in the disk directory
//! - Formatting with `mkfs.<fs>`

use crate::error::{Error, Result};
use crate::guest::{FsType, Guest};
use std::fs::OpenOptions;
use std::path::Path;
use std::process::Command;
use tracing::{error, info};

/// Parse a disk size into bytes; suffixes are binary (K = 1024)
pub fn parse_size(size: &str) -> Result<u64> {
    let trimmed = size.trim();
    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (digits, unit) = trimmed.split_at(split);

    let value: u64 = digits
        .parse()
        .map_err(|_| Error::InvalidSize(size.to_string()))?;

    let multiplier: u64 = match unit.to_ascii_uppercase().as_str() {
        "" | "B" => 1,
        "K" | "KB" | "KIB" => 1 << 10,
        "M" | "MB" | "MIB" => 1 << 20,
        "G" | "GB" | "GIB" => 1 << 30,
        "T" | "TB" | "TIB" => 1 << 40,
        _ => return Err(Error::InvalidSize(size.to_string())),
    };

    match value.checked_mul(multiplier) {
        Some(0) | None => Err(Error::InvalidSize(size.to_string())),
        Some(bytes) => Ok(bytes),
    }
}

/// Create every disk of the guest and record its image file
pub fn create_disks(guest: &mut Guest, dir: &Path) -> Result<()> {
    create_disks_with(guest, dir, &|fs| format!("mkfs.{}", fs))
}

fn create_disks_with(guest: &mut Guest, dir: &Path, mkfs: &dyn Fn(FsType) -> String) -> Result<()> {
    for disk in guest.disks.iter_mut() {
        let file = dir.join(format!("{}.img", disk.id));
        disk.filesystem = FsType::Xfs;

        create_disk_file(&file, &disk.size)?;
        run_mkfs(&mkfs(disk.filesystem), &file)?;

        info!(disk = %disk.id, size = %disk.size, file = %file.display(), "Created block disk");
        disk.file = Some(file);
    }

    Ok(())
}

/// Create (or truncate) a sparse image file of the given size
fn create_disk_file(path: &Path, size: &str) -> Result<()> {
    let bytes = parse_size(size)?;
    let disk_err = |message: String| Error::DiskCreate {
        file: path.display().to_string(),
        message,
    };

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .map_err(|e| disk_err(format!("failed to create file: {}", e)))?;

    file.set_len(bytes)
        .map_err(|e| disk_err(format!("failed to truncate the file: {}", e)))?;

    Ok(())
}

/// Run a formatter against an image; its stderr becomes the error message
fn run_mkfs(command: &str, file: &Path) -> Result<()> {
    let output = Command::new(command)
        .arg(file)
        .output()
        .map_err(|e| Error::CommandFailed {
            command: command.to_string(),
            message: e.to_string(),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        error!(command, status = %output.status, "Unable to format disk");
        return Err(Error::CommandFailed {
            command: command.to_string(),
            message: stderr,
        });
    }

    Ok(())
}
