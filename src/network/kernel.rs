//! Kernel operations used by the bridge
//!
//! `NetKernel` is the seam between the orchestration logic and the kernel.
//! `NetlinkSession` is the real implementation; every operation is a
//! blocking call whose failure is reported as the kernel's `Errno`.

use crate::network::link::{self, HostInterface};
use crate::network::netlink::NetlinkSession;
use crate::network::tap;
use crate::network::tc::{self, IngressQdisc, RedirectFilter};
use netlink_packet_core::{NLM_F_CREATE, NLM_F_EXCL};
use netlink_packet_route::tc::TcMessage;
use netlink_packet_route::RouteNetlinkMessage;
use nix::errno::Errno;

/// Primitive network-configuration operations
pub trait NetKernel {
    /// All links, in kernel index order
    fn links(&mut self) -> Result<Vec<HostInterface>, Errno>;

    /// Register a persistent TAP device named `name`, administratively down
    fn add_tap(&mut self, name: &str) -> Result<(), Errno>;

    /// Resolve a link index by name
    fn link_index(&mut self, name: &str) -> Result<u32, Errno>;

    /// Set IFF_UP on a link
    fn set_link_up(&mut self, index: u32) -> Result<(), Errno>;

    /// Attach an ingress qdisc; an existing one is reported as `EEXIST`
    fn add_qdisc(&mut self, qdisc: IngressQdisc) -> Result<(), Errno>;

    /// Attach a classifier with a redirect action
    fn add_filter(&mut self, filter: RedirectFilter) -> Result<(), Errno>;

    /// Whether `index` currently has an ingress qdisc
    fn has_ingress_qdisc(&mut self, index: u32) -> Result<bool, Errno>;
}

impl NetKernel for NetlinkSession {
    fn links(&mut self) -> Result<Vec<HostInterface>, Errno> {
        let replies = self.dump(link::dump_request())?;
        Ok(replies
            .iter()
            .filter_map(|reply| match reply {
                RouteNetlinkMessage::NewLink(message) => HostInterface::from_link_message(message),
                _ => None,
            })
            .collect())
    }

    fn add_tap(&mut self, name: &str) -> Result<(), Errno> {
        tap::register_persistent(name)
    }

    fn link_index(&mut self, name: &str) -> Result<u32, Errno> {
        nix::net::if_::if_nametoindex(name)
    }

    fn set_link_up(&mut self, index: u32) -> Result<(), Errno> {
        self.request(link::set_up_request(index), 0)
    }

    fn add_qdisc(&mut self, qdisc: IngressQdisc) -> Result<(), Errno> {
        let message = RouteNetlinkMessage::NewQueueDiscipline(qdisc.request());
        self.request(message, NLM_F_CREATE | NLM_F_EXCL)
    }

    fn add_filter(&mut self, filter: RedirectFilter) -> Result<(), Errno> {
        let message = RouteNetlinkMessage::NewTrafficFilter(filter.request());
        self.request(message, NLM_F_CREATE | NLM_F_EXCL)
    }

    fn has_ingress_qdisc(&mut self, index: u32) -> Result<bool, Errno> {
        let replies = self.dump(RouteNetlinkMessage::GetQueueDiscipline(TcMessage::default()))?;
        Ok(replies.iter().any(|reply| match reply {
            RouteNetlinkMessage::NewQueueDiscipline(message) => tc::is_ingress_on(message, index),
            _ => false,
        }))
    }
}
