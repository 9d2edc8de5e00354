//! Container-to-guest network bridging
//!
//! For every non-ignored interface `X` in the container:
//! 1. create and bring up `tap-X`
//! 2. cross-connect `X` and `tap-X` with tc ingress redirects
//! 3. record a guest NIC carrying `X`'s MAC on `tap-X`
//!
//! The guest then owns `X`'s L2 identity; DHCP on `tap-X` hands it `X`'s address.

use crate::error::{Error, Result};
use crate::guest::{Guest, NetworkInterface};
use crate::network::kernel::NetKernel;
use crate::network::link::{self, HostInterface, IgnoreSet};
use crate::network::tap::{self, TapDevice};
use crate::network::tc::{self, Link};
use serde::Serialize;
use tracing::{debug, info};

/// Bridge every usable container interface into the guest
///
/// On success the guest's NIC list is replaced and the TAP names are
/// returned for the DHCP side. Any failure aborts immediately; kernel objects
/// created for earlier interfaces are left in place.
pub fn setup_container_networking<K: NetKernel>(
    kernel: &mut K,
    guest: &mut Guest,
) -> Result<Vec<String>> {
    let interfaces = link::enumerate(kernel, &IgnoreSet::default())?;

    let mut nics = Vec::with_capacity(interfaces.len());
    for iface in &interfaces {
        nics.push(bridge_interface(kernel, iface)?);
    }

    if nics.is_empty() {
        return Err(Error::NoUsableInterfaces);
    }

    let tap_names = nics.iter().map(|nic| nic.tap.clone()).collect();
    info!(count = nics.len(), "Container networking ready");
    guest.nics = nics;

    Ok(tap_names)
}

/// TAP creation and redirect installation for a single interface
fn bridge_interface<K: NetKernel>(kernel: &mut K, iface: &HostInterface) -> Result<NetworkInterface> {
    info!(iface = %iface.name, "Adding tc-redirect");

    let tap = TapDevice::create(kernel, &iface.name)?;
    let host = Link::new(&iface.name, iface.index);
    let pair = tc::install_redirect_pair(kernel, &iface.name, host, tap.link())?;

    debug!(iface = %iface.name, tap = tap.name(), links = ?pair.links(), "Interface bridged");

    Ok(NetworkInterface {
        mac_addr: iface.hardware_addr.to_string(),
        tap: tap.name().to_string(),
    })
}

/// What `setup_container_networking` would create for one interface
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedBridge {
    pub iface: String,
    pub index: u32,
    pub mac_addr: String,
    pub tap: String,
}

/// Read-only preview of the bridge; performs no mutations
pub fn plan<K: NetKernel>(kernel: &mut K) -> Result<Vec<PlannedBridge>> {
    let interfaces = link::enumerate(kernel, &IgnoreSet::default())?;

    if interfaces.is_empty() {
        return Err(Error::NoUsableInterfaces);
    }

    Ok(interfaces
        .into_iter()
        .map(|iface| PlannedBridge {
            tap: tap::tap_name(&iface.name),
            mac_addr: iface.hardware_addr.to_string(),
            index: iface.index,
            iface: iface.name,
        })
        .collect())
}
