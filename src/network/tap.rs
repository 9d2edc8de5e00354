//! TAP devices paired with host interfaces
//!
//! Each bridged host interface `X` gets a TAP named `tap-X`. The guest's
//! virtio-net device is backed by the TAP; tc redirects splice it to `X`.
//!
//! TAPs are registered persistent and are never removed here: they live as
//! long as the container's network namespace.

use crate::error::{Error, Result, TapPhase};
use crate::network::kernel::NetKernel;
use crate::network::tc::Link;
use nix::errno::Errno;
use nix::sys::ioctl::ioctl_param_type;
use std::fs::OpenOptions;
use std::os::unix::io::AsRawFd;
use tracing::debug;

/// Prefix of every TAP name; the DHCP and hypervisor side rely on it
pub const TAP_PREFIX: &str = "tap-";

/// Derive the TAP name for a host interface
pub fn tap_name(iface: &str) -> String {
    format!("{}{}", TAP_PREFIX, iface)
}

nix::ioctl_write_int!(tunsetiff, b'T', 202);
nix::ioctl_write_int!(tunsetpersist, b'T', 203);

/// Register a persistent TAP device (IFF_TAP | IFF_NO_PI) through /dev/net/tun
///
/// The tun file descriptor is closed on return; TUNSETPERSIST keeps the
/// device around without it.
pub fn register_persistent(name: &str) -> std::result::Result<(), Errno> {
    let name_bytes = name.as_bytes();
    if name_bytes.is_empty() || name_bytes.contains(&0) {
        return Err(Errno::EINVAL);
    }
    if name_bytes.len() >= libc::IFNAMSIZ {
        return Err(Errno::ENAMETOOLONG);
    }

    let tun = OpenOptions::new()
        .read(true)
        .write(true)
        .open("/dev/net/tun")
        .map_err(|e| e.raw_os_error().map(Errno::from_raw).unwrap_or(Errno::EIO))?;

    let mut req: libc::ifreq = unsafe { std::mem::zeroed() };
    for (dst, src) in req.ifr_name.iter_mut().zip(name_bytes) {
        *dst = *src as libc::c_char;
    }
    req.ifr_ifru.ifru_flags = (libc::IFF_TAP | libc::IFF_NO_PI) as libc::c_short;

    unsafe {
        tunsetiff(tun.as_raw_fd(), &req as *const libc::ifreq as ioctl_param_type)?;
        tunsetpersist(tun.as_raw_fd(), 1)?;
    }

    Ok(())
}

/// A TAP device created for a host interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TapDevice {
    name: String,
    index: u32,
}

impl TapDevice {
    /// Create and bring up the TAP paired with host interface `iface`
    ///
    /// If registration fails nothing is left behind. Once registered, a
    /// failure to resolve or bring up the device leaves it registered and
    /// down.
    pub fn create<K: NetKernel>(kernel: &mut K, iface: &str) -> Result<Self> {
        let name = tap_name(iface);
        let fail = |phase: TapPhase, source: Errno| Error::DeviceCreation {
            iface: iface.to_string(),
            tap: name.clone(),
            phase,
            source,
        };

        kernel
            .add_tap(&name)
            .map_err(|source| fail(TapPhase::Register, source))?;

        let index = kernel
            .link_index(&name)
            .map_err(|source| fail(TapPhase::Activate, source))?;

        kernel
            .set_link_up(index)
            .map_err(|source| fail(TapPhase::Activate, source))?;

        debug!(tap = %name, index, "TAP device created and up");

        Ok(Self { name, index })
    }

    /// Get the TAP device name
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn link(&self) -> Link<'_> {
        Link::new(&self.name, self.index)
    }
}
