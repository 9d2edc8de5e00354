//! In-memory kernel for unit tests
//!
//! Models the parts of kernel behaviour the bridge depends on: an exclusive
//! ingress qdisc add answers EEXIST, a filter on a device without an ingress
//! qdisc answers EINVAL, and so does `fail_filter = Some(EINVAL)` with the
//! qdisc in place. Every successful mutation is recorded in order.

use crate::network::kernel::NetKernel;
use crate::network::link::HostInterface;
use crate::network::tc::{IngressQdisc, RedirectFilter};
use nix::errno::Errno;

/// A recorded kernel mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Tap(String),
    Up(u32),
    Qdisc(u32),
    Filter(RedirectFilter),
}

#[derive(Debug, Default)]
pub struct FakeKernel {
    pub links: Vec<HostInterface>,
    pub taps: Vec<(String, u32)>,
    pub up: Vec<u32>,
    pub qdiscs: Vec<u32>,
    pub filters: Vec<RedirectFilter>,
    pub ops: Vec<Op>,

    pub fail_links: Option<Errno>,
    pub fail_tap: Option<Errno>,
    pub fail_index: Option<Errno>,
    pub fail_up: Option<Errno>,
    pub fail_qdisc: Option<Errno>,
    pub fail_filter: Option<Errno>,
}

impl FakeKernel {
    pub fn with_links(links: Vec<HostInterface>) -> Self {
        Self {
            links,
            ..Default::default()
        }
    }

    pub fn has_filter(&self, from: u32, to: u32) -> bool {
        self.filters.contains(&RedirectFilter::new(from, to))
    }

    fn next_index(&self) -> u32 {
        let links = self.links.iter().map(|l| l.index);
        let taps = self.taps.iter().map(|(_, i)| *i);
        links.chain(taps).max().unwrap_or(0) + 1
    }
}

impl NetKernel for FakeKernel {
    fn links(&mut self) -> Result<Vec<HostInterface>, Errno> {
        match self.fail_links {
            Some(errno) => Err(errno),
            None => Ok(self.links.clone()),
        }
    }

    fn add_tap(&mut self, name: &str) -> Result<(), Errno> {
        if let Some(errno) = self.fail_tap {
            return Err(errno);
        }
        let index = self.next_index();
        self.taps.push((name.to_string(), index));
        self.ops.push(Op::Tap(name.to_string()));
        Ok(())
    }

    fn link_index(&mut self, name: &str) -> Result<u32, Errno> {
        if let Some(errno) = self.fail_index {
            return Err(errno);
        }
        let links = self.links.iter().map(|l| (l.name.as_str(), l.index));
        let taps = self.taps.iter().map(|(n, i)| (n.as_str(), *i));
        links
            .chain(taps)
            .find(|(n, _)| *n == name)
            .map(|(_, i)| i)
            .ok_or(Errno::ENODEV)
    }

    fn set_link_up(&mut self, index: u32) -> Result<(), Errno> {
        if let Some(errno) = self.fail_up {
            return Err(errno);
        }
        self.up.push(index);
        self.ops.push(Op::Up(index));
        Ok(())
    }

    fn add_qdisc(&mut self, qdisc: IngressQdisc) -> Result<(), Errno> {
        if let Some(errno) = self.fail_qdisc {
            return Err(errno);
        }
        if self.qdiscs.contains(&qdisc.link) {
            return Err(Errno::EEXIST);
        }
        self.qdiscs.push(qdisc.link);
        self.ops.push(Op::Qdisc(qdisc.link));
        Ok(())
    }

    fn add_filter(&mut self, filter: RedirectFilter) -> Result<(), Errno> {
        if let Some(errno) = self.fail_filter {
            return Err(errno);
        }
        if !self.qdiscs.contains(&filter.from) {
            return Err(Errno::EINVAL);
        }
        self.filters.push(filter);
        self.ops.push(Op::Filter(filter));
        Ok(())
    }

    fn has_ingress_qdisc(&mut self, index: u32) -> Result<bool, Errno> {
        Ok(self.qdiscs.contains(&index))
    }
}
