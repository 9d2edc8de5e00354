//! Guest descriptor handoff
//!
//! The hypervisor launcher and the DHCP server run as separate processes;
//! they receive the finished guest and the TAP names as JSON.

use crate::error::Result;
use crate::guest::Guest;
use serde::Serialize;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use tracing::info;

#[derive(Debug, Serialize)]
pub struct Handoff<'a> {
    pub guest: &'a Guest,
    /// TAP devices the DHCP server should listen on
    pub tap_names: &'a [String],
}

impl<'a> Handoff<'a> {
    pub fn new(guest: &'a Guest, tap_names: &'a [String]) -> Self {
        Self { guest, tap_names }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write to `path`, or stdout when none is given
    pub fn emit(&self, path: Option<&Path>) -> Result<()> {
        let json = self.to_json()?;

        match path {
            Some(path) => {
                fs::write(path, format!("{}\n", json))?;
                info!(path = %path.display(), "Guest descriptor written");
            }
            None => {
                let mut stdout = io::stdout().lock();
                writeln!(stdout, "{}", json)?;
            }
        }

        Ok(())
    }
}
