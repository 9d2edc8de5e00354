//! Host interface enumeration
//!
//! Provides:
//! - `HostInterface` snapshots read from a link dump
//! - The fixed ignore-set (loopback, IP-in-IP tunnel)
//! - The link set-up request

use crate::error::{Error, Result};
use crate::network::kernel::NetKernel;
use bitflags::bitflags;
use netlink_packet_route::link::{LinkAttribute, LinkFlags, LinkMessage};
use netlink_packet_route::RouteNetlinkMessage;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

bitflags! {
    /// Device flags reported in `ifinfomsg.ifi_flags`
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct InterfaceFlags: u32 {
        const UP = 0x1;
        const BROADCAST = 0x2;
        const LOOPBACK = 0x8;
        const POINTOPOINT = 0x10;
        const RUNNING = 0x40;
        const NOARP = 0x80;
        const PROMISC = 0x100;
        const MULTICAST = 0x1000;
        const LOWER_UP = 0x10000;
    }
}

impl Serialize for InterfaceFlags {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter_names().map(|(name, _)| name.to_lowercase()))
    }
}

/// Link-layer address, rendered as lowercase colon-separated hex
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HardwareAddr(Vec<u8>);

impl HardwareAddr {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for HardwareAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ":")?;
            }
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl FromStr for HardwareAddr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Ok(Self::default());
        }

        s.split(':')
            .map(|part| {
                if part.len() != 2 {
                    return Err(Error::ConfigValidation(format!(
                        "Invalid hardware address: {}",
                        s
                    )));
                }
                u8::from_str_radix(part, 16).map_err(|e| {
                    Error::ConfigValidation(format!("Invalid hardware address {}: {}", s, e))
                })
            })
            .collect::<Result<Vec<u8>>>()
            .map(Self)
    }
}

impl Serialize for HardwareAddr {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A network interface as seen at enumeration time
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostInterface {
    pub index: u32,
    pub name: String,
    pub hardware_addr: HardwareAddr,
    pub flags: InterfaceFlags,
}

impl HostInterface {
    pub fn new(index: u32, name: impl Into<String>, hardware_addr: HardwareAddr) -> Self {
        Self {
            index,
            name: name.into(),
            hardware_addr,
            flags: InterfaceFlags::empty(),
        }
    }

    pub fn with_flags(mut self, flags: InterfaceFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Decode one link dump entry; `None` for entries without a name
    pub fn from_link_message(message: &LinkMessage) -> Option<Self> {
        let mut name = None;
        let mut hardware_addr = HardwareAddr::default();
        for attr in &message.attributes {
            match attr {
                LinkAttribute::IfName(ifname) => name = Some(ifname.clone()),
                LinkAttribute::Address(bytes) => hardware_addr = HardwareAddr::new(bytes.clone()),
                _ => {}
            }
        }

        let flags = InterfaceFlags::from_bits_retain(message.header.flags.bits());
        Some(Self::new(message.header.index, name?, hardware_addr).with_flags(flags))
    }
}

/// Interface names never bridged into the guest
#[derive(Debug, Clone, Copy)]
pub struct IgnoreSet(&'static [&'static str]);

impl IgnoreSet {
    pub const DEFAULT: IgnoreSet = IgnoreSet(&["lo", "tunl0"]);

    /// Exact-name membership
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(&name)
    }

}

impl Default for IgnoreSet {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Dump request for every link
pub fn dump_request() -> RouteNetlinkMessage {
    RouteNetlinkMessage::GetLink(LinkMessage::default())
}

/// Request setting IFF_UP on `index`
pub fn set_up_request(index: u32) -> RouteNetlinkMessage {
    let mut message = LinkMessage::default();
    message.header.index = index;
    message.header.flags = LinkFlags::Up;
    message.header.change_mask = LinkFlags::Up;
    RouteNetlinkMessage::SetLink(message)
}

/// List every host interface, ignored ones included
///
/// Fails if the kernel call errors or returns nothing at all.
pub fn list<K: NetKernel>(kernel: &mut K) -> Result<Vec<HostInterface>> {
    let links = kernel
        .links()
        .map_err(|e| Error::Enumeration(e.to_string()))?;

    if links.is_empty() {
        return Err(Error::Enumeration("no interfaces returned".to_string()));
    }

    Ok(links)
}

/// List host interfaces with the ignore-set removed, in kernel order
pub fn enumerate<K: NetKernel>(kernel: &mut K, ignore: &IgnoreSet) -> Result<Vec<HostInterface>> {
    let links = list(kernel)?;
    let total = links.len();

    let candidates: Vec<HostInterface> = links
        .into_iter()
        .filter(|link| !ignore.contains(&link.name))
        .collect();

    debug!(
        total,
        candidates = candidates.len(),
        "Enumerated host interfaces"
    );

    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::testing::FakeKernel;

    fn link_message(index: u32, name: Option<&str>, mac: &[u8]) -> LinkMessage {
        let mut message = LinkMessage::default();
        message.header.index = index;
        message.header.flags = LinkFlags::Up | LinkFlags::Running;
        message.attributes.push(LinkAttribute::Address(mac.to_vec()));
        if let Some(name) = name {
            message.attributes.push(LinkAttribute::IfName(name.to_string()));
        }
        message
    }

    #[test]
    fn test_hardware_addr_display() {
        let mac = HardwareAddr::new(vec![0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);
        assert_eq!(mac.to_string(), "aa:bb:cc:dd:ee:ff");
        assert_eq!(HardwareAddr::default().to_string(), "");
    }

    #[test]
    fn test_hardware_addr_parse() {
        let mac: HardwareAddr = "02:42:AC:11:00:02".parse().unwrap();
        assert_eq!(mac, HardwareAddr::new(vec![0x02, 0x42, 0xac, 0x11, 0x00, 0x02]));
        assert!("02:42".parse::<HardwareAddr>().is_ok());
        assert!("zz:00".parse::<HardwareAddr>().is_err());
        assert!("2:42".parse::<HardwareAddr>().is_err());
    }

    #[test]
    fn test_decode_link_message() {
        let message = link_message(3, Some("eth0"), &[0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);
        let iface = HostInterface::from_link_message(&message).unwrap();

        assert_eq!(iface.index, 3);
        assert_eq!(iface.name, "eth0");
        assert_eq!(iface.hardware_addr.to_string(), "aa:bb:cc:dd:ee:ff");
        assert!(iface.flags.contains(InterfaceFlags::UP | InterfaceFlags::RUNNING));
    }

    #[test]
    fn test_decode_rejects_nameless() {
        assert!(HostInterface::from_link_message(&link_message(2, None, &[])).is_none());
    }

    #[test]
    fn test_set_up_request_targets_index() {
        match set_up_request(7) {
            RouteNetlinkMessage::SetLink(message) => {
                assert_eq!(message.header.index, 7);
                assert_eq!(message.header.flags, LinkFlags::Up);
                assert_eq!(message.header.change_mask, LinkFlags::Up);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_ignore_set_is_exact_match() {
        let ignore = IgnoreSet::default();
        assert!(ignore.contains("lo"));
        assert!(ignore.contains("tunl0"));
        assert!(!ignore.contains("lo0"));
        assert!(!ignore.contains("tunl"));
        assert!(!ignore.contains("eth0"));
    }

    #[test]
    fn test_enumerate_filters_ignored_anywhere_in_list() {
        let mut kernel = FakeKernel::with_links(vec![
            HostInterface::new(1, "lo", HardwareAddr::default()),
            HostInterface::new(2, "eth0", "aa:bb:cc:dd:ee:ff".parse().unwrap()),
            HostInterface::new(3, "tunl0", HardwareAddr::default()),
            HostInterface::new(4, "lo", HardwareAddr::default()),
            HostInterface::new(5, "eth1", "aa:bb:cc:dd:ee:01".parse().unwrap()),
        ]);

        let names: Vec<String> = enumerate(&mut kernel, &IgnoreSet::default())
            .unwrap()
            .into_iter()
            .map(|i| i.name)
            .collect();
        assert_eq!(names, vec!["eth0", "eth1"]);
    }

    #[test]
    fn test_enumerate_empty_list_fails() {
        let mut kernel = FakeKernel::with_links(Vec::new());
        let err = enumerate(&mut kernel, &IgnoreSet::default()).unwrap_err();
        assert!(matches!(err, Error::Enumeration(_)));
    }

    #[test]
    fn test_enumerate_kernel_error_fails() {
        let mut kernel = FakeKernel::with_links(Vec::new());
        kernel.fail_links = Some(nix::errno::Errno::EACCES);
        let err = enumerate(&mut kernel, &IgnoreSet::default()).unwrap_err();
        assert!(matches!(err, Error::Enumeration(_)));
    }
}
