//! Container-to-guest network bridge
//!
//! Provides:
//! - rtnetlink session
//! - Host interface enumeration with the loopback/tunnel ignore-set
//! - TAP device creation for the guest's NICs
//! - tc ingress redirect pairs between each interface and its TAP
//! - The bridging flow that ties them together

pub mod kernel;
pub mod link;
pub mod netlink;
pub mod setup;
pub mod tap;
pub mod tc;

#[cfg(test)]
pub mod testing;

pub use link::{HostInterface, IgnoreSet};
pub use netlink::NetlinkSession;
pub use setup::{plan, setup_container_networking};
