//! tc ingress redirects between two devices
//!
//! A redirect pair is the netlink equivalent of:
//!
//! ```text
//! tc qdisc add dev A ingress
//! tc qdisc add dev B ingress
//! tc filter add dev A parent ffff: protocol all u32 match u32 0 0 \
//!     action mirred egress redirect dev B
//! tc filter add dev B parent ffff: protocol all u32 match u32 0 0 \
//!     action mirred egress redirect dev A
//! ```
//!
//! Frames entering either device are stolen from its stack and transmitted
//! out of the other one. No learning, no flooding, no promiscuous mode.

use crate::error::{Error, FilterFault, Result};
use crate::network::kernel::NetKernel;
use netlink_packet_route::tc::{
    TcAction, TcActionAttribute, TcActionGeneric, TcActionMirrorOption, TcActionOption,
    TcActionType, TcAttribute, TcFilterU32Option, TcHandle, TcMessage, TcMirror,
    TcMirrorActionType, TcOption, TcU32Key, TcU32Selector, TcU32SelectorFlags,
};
use nix::errno::Errno;
use tracing::debug;

/// Parent id of the ingress hook (TC_H_INGRESS)
const TC_H_INGRESS: u32 = 0xffff_fff1;
/// Handle of the ingress qdisc, `ffff:`
const INGRESS_HANDLE: u32 = 0xffff_0000;

/// First slot of an action list
const TCA_ACT_TAB: u16 = 1;

/// A device taking part in a redirect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Link<'a> {
    pub name: &'a str,
    pub index: u32,
}

impl<'a> Link<'a> {
    pub fn new(name: &'a str, index: u32) -> Self {
        Self { name, index }
    }
}

/// `tc qdisc add dev <link> ingress`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngressQdisc {
    pub link: u32,
}

impl IngressQdisc {
    pub fn new(link: u32) -> Self {
        Self { link }
    }

    pub fn request(&self) -> TcMessage {
        let mut message = TcMessage::with_index(self.link as i32);
        message.header.handle = TcHandle::from(INGRESS_HANDLE);
        message.header.parent = TcHandle::from(TC_H_INGRESS);
        message.attributes.push(TcAttribute::Kind("ingress".to_string()));
        message
    }
}

/// Whether a qdisc dump entry is the ingress qdisc of `index`
pub fn is_ingress_on(message: &TcMessage, index: u32) -> bool {
    message.header.index == index as i32
        && message
            .attributes
            .iter()
            .any(|attr| matches!(attr, TcAttribute::Kind(kind) if kind == "ingress"))
}

/// Match-all u32 classifier on `from`'s ingress whose mirred action
/// redirects every frame to `to`'s egress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedirectFilter {
    pub from: u32,
    pub to: u32,
}

impl RedirectFilter {
    pub fn new(from: u32, to: u32) -> Self {
        Self { from, to }
    }

    pub fn request(&self) -> TcMessage {
        let mut message = TcMessage::with_index(self.from as i32);
        message.header.parent = TcHandle::from(INGRESS_HANDLE);
        // Priority 0 (kernel picks one), protocol all in network byte order
        message.header.info = u32::from((libc::ETH_P_ALL as u16).to_be());

        message.attributes.push(TcAttribute::Kind("u32".to_string()));
        message.attributes.push(TcAttribute::Options(vec![
            TcOption::U32(TcFilterU32Option::Selector(match_all_selector())),
            TcOption::U32(TcFilterU32Option::Action(vec![redirect_action(self.to)])),
        ]));
        message
    }
}

/// `match u32 0 0`: one all-zero key, terminal
fn match_all_selector() -> TcU32Selector {
    let mut selector = TcU32Selector::default();
    selector.flags = TcU32SelectorFlags::Terminal;
    selector.nkeys = 1;
    selector.keys = vec![TcU32Key::default()];
    selector
}

/// `action mirred egress redirect dev <ifindex>`, packet stolen
fn redirect_action(ifindex: u32) -> TcAction {
    let mut generic = TcActionGeneric::default();
    generic.action = TcActionType::Stolen;
    let mut mirror = TcMirror::default();
    mirror.generic = generic;
    mirror.eaction = TcMirrorActionType::EgressRedir;
    mirror.ifindex = ifindex;
    let mut action = TcAction::default();
    action.tab = TCA_ACT_TAB;
    action.attributes = vec![
        TcActionAttribute::Kind("mirred".to_string()),
        TcActionAttribute::Options(vec![TcActionOption::Mirror(TcActionMirrorOption::Parms(
            mirror,
        ))]),
    ];
    action
}

/// Proof that a device's ingress qdisc is attached
///
/// Redirect filters can only be installed through a hook, so a filter is
/// never sent ahead of its parent qdisc.
#[derive(Debug)]
pub struct IngressHook<'a> {
    link: Link<'a>,
}

impl<'a> IngressHook<'a> {
    pub fn link(&self) -> Link<'a> {
        self.link
    }
}

/// The two directional redirects between a host interface and its TAP
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedirectPair {
    pub forward: RedirectFilter,
    pub reverse: RedirectFilter,
}

impl RedirectPair {
    /// Source link of each direction: `[a, b]`
    pub fn links(&self) -> [u32; 2] {
        [self.forward.from, self.reverse.from]
    }
}

/// Attach the ingress qdisc to `link`; an existing one counts as success
pub fn attach_ingress<'a, K: NetKernel>(
    kernel: &mut K,
    iface: &str,
    link: Link<'a>,
) -> Result<IngressHook<'a>> {
    match kernel.add_qdisc(IngressQdisc::new(link.index)) {
        Ok(()) => debug!(device = link.name, "Ingress qdisc attached"),
        Err(Errno::EEXIST) => debug!(device = link.name, "Ingress qdisc already attached"),
        Err(source) => {
            return Err(Error::Qdisc {
                iface: iface.to_string(),
                device: link.name.to_string(),
                source,
            });
        }
    }

    Ok(IngressHook { link })
}

/// Redirect everything arriving on `from` to the egress of `to`
pub fn redirect<K: NetKernel>(
    kernel: &mut K,
    iface: &str,
    from: &IngressHook<'_>,
    to: Link<'_>,
) -> Result<RedirectFilter> {
    let filter = RedirectFilter::new(from.link.index, to.index);

    if let Err(errno) = kernel.add_filter(filter) {
        return Err(Error::Filter {
            iface: iface.to_string(),
            from: from.link.name.to_string(),
            to: to.name.to_string(),
            fault: classify_filter_error(kernel, from.link.index, errno),
        });
    }

    debug!(from = from.link.name, to = to.name, "Redirect installed");
    Ok(filter)
}

/// EINVAL is the kernel's answer both to a filter whose parent qdisc is
/// absent and to a malformed request; the qdisc table tells them apart
fn classify_filter_error<K: NetKernel>(kernel: &mut K, from: u32, errno: Errno) -> FilterFault {
    if errno != Errno::EINVAL {
        return FilterFault::Kernel(errno);
    }
    match kernel.has_ingress_qdisc(from) {
        Ok(false) => FilterFault::MissingParent,
        Ok(true) => FilterFault::InvalidRequest,
        Err(lookup) => {
            debug!(%lookup, "Qdisc lookup failed, cannot tell a missing parent");
            FilterFault::InvalidRequest
        }
    }
}

/// Cross-connect `a` and `b` in both directions
///
/// Order: qdisc on a, qdisc on b, filter a→b, filter b→a. The first failure
/// stops the sequence; what was already attached stays attached.
pub fn install_redirect_pair<K: NetKernel>(
    kernel: &mut K,
    iface: &str,
    a: Link<'_>,
    b: Link<'_>,
) -> Result<RedirectPair> {
    let hook_a = attach_ingress(kernel, iface, a)?;
    let hook_b = attach_ingress(kernel, iface, b)?;

    let forward = redirect(kernel, iface, &hook_a, hook_b.link())?;
    let reverse = redirect(kernel, iface, &hook_b, hook_a.link())?;

    Ok(RedirectPair { forward, reverse })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::testing::{FakeKernel, Op};

    fn options(message: &TcMessage) -> &[TcOption] {
        message
            .attributes
            .iter()
            .find_map(|attr| match attr {
                TcAttribute::Options(options) => Some(options.as_slice()),
                _ => None,
            })
            .unwrap()
    }

    #[test]
    fn test_ingress_qdisc_request() {
        let message = IngressQdisc::new(4).request();

        assert_eq!(message.header.index, 4);
        assert_eq!(message.header.handle, TcHandle::from(INGRESS_HANDLE));
        assert_eq!(message.header.parent, TcHandle::from(TC_H_INGRESS));
        assert!(message
            .attributes
            .contains(&TcAttribute::Kind("ingress".to_string())));
    }

    #[test]
    fn test_redirect_filter_request() {
        let message = RedirectFilter::new(2, 9).request();

        assert_eq!(message.header.index, 2);
        assert_eq!(message.header.parent, TcHandle::from(INGRESS_HANDLE));
        assert_eq!(message.header.info, u32::from(0x0003u16.to_be()));
        assert!(message.attributes.contains(&TcAttribute::Kind("u32".to_string())));

        let options = options(&message);
        let selector = options
            .iter()
            .find_map(|opt| match opt {
                TcOption::U32(TcFilterU32Option::Selector(sel)) => Some(sel),
                _ => None,
            })
            .unwrap();
        assert!(selector.flags.contains(TcU32SelectorFlags::Terminal));
        assert_eq!(selector.nkeys, 1);
        assert_eq!(selector.keys, vec![TcU32Key::default()]);

        let actions = options
            .iter()
            .find_map(|opt| match opt {
                TcOption::U32(TcFilterU32Option::Action(actions)) => Some(actions),
                _ => None,
            })
            .unwrap();
        assert_eq!(actions.len(), 1);
        assert!(actions[0]
            .attributes
            .contains(&TcActionAttribute::Kind("mirred".to_string())));

        let mirror = actions[0]
            .attributes
            .iter()
            .find_map(|attr| match attr {
                TcActionAttribute::Options(opts) => opts.iter().find_map(|opt| match opt {
                    TcActionOption::Mirror(TcActionMirrorOption::Parms(parms)) => Some(parms),
                    _ => None,
                }),
                _ => None,
            })
            .unwrap();
        assert_eq!(mirror.ifindex, 9);
        assert_eq!(mirror.eaction, TcMirrorActionType::EgressRedir);
        assert_eq!(mirror.generic.action, TcActionType::Stolen);
    }

    #[test]
    fn test_attach_ingress_is_idempotent() {
        let mut kernel = FakeKernel::default();
        let link = Link::new("eth0", 2);

        assert!(attach_ingress(&mut kernel, "eth0", link).is_ok());
        assert!(attach_ingress(&mut kernel, "eth0", link).is_ok());
        assert_eq!(kernel.qdiscs, vec![2]);
    }

    #[test]
    fn test_attach_ingress_other_error_fails_every_time() {
        let mut kernel = FakeKernel::default();
        kernel.fail_qdisc = Some(Errno::EOPNOTSUPP);
        let link = Link::new("eth0", 2);

        for _ in 0..2 {
            let err = attach_ingress(&mut kernel, "eth0", link).unwrap_err();
            match err {
                Error::Qdisc { iface, device, source } => {
                    assert_eq!(iface, "eth0");
                    assert_eq!(device, "eth0");
                    assert_eq!(source, Errno::EOPNOTSUPP);
                }
                other => panic!("unexpected error: {other}"),
            }
        }
    }

    #[test]
    fn test_pair_is_symmetric_and_ordered() {
        let mut kernel = FakeKernel::default();
        let pair = install_redirect_pair(
            &mut kernel,
            "eth0",
            Link::new("eth0", 2),
            Link::new("tap-eth0", 7),
        )
        .unwrap();

        assert_eq!(pair.forward, RedirectFilter::new(2, 7));
        assert_eq!(pair.reverse, RedirectFilter::new(7, 2));
        assert_eq!(pair.links(), [2, 7]);

        assert_eq!(
            kernel.ops,
            vec![
                Op::Qdisc(2),
                Op::Qdisc(7),
                Op::Filter(RedirectFilter::new(2, 7)),
                Op::Filter(RedirectFilter::new(7, 2)),
            ]
        );
        assert!(kernel.has_filter(2, 7));
        assert!(kernel.has_filter(7, 2));
    }

    #[test]
    fn test_filter_without_parent_is_ordering_fault() {
        let mut kernel = FakeKernel::default();
        let hook = attach_ingress(&mut kernel, "eth0", Link::new("eth0", 2)).unwrap();
        // qdisc removed behind our back
        kernel.qdiscs.clear();

        let err = redirect(&mut kernel, "eth0", &hook, Link::new("tap-eth0", 7)).unwrap_err();
        assert!(matches!(
            err,
            Error::Filter { fault: FilterFault::MissingParent, .. }
        ));
        assert!(kernel.filters.is_empty());
    }

    #[test]
    fn test_filter_einval_with_parent_is_invalid_request() {
        let mut kernel = FakeKernel::default();
        let hook = attach_ingress(&mut kernel, "eth0", Link::new("eth0", 2)).unwrap();
        kernel.fail_filter = Some(Errno::EINVAL);

        let err = redirect(&mut kernel, "eth0", &hook, Link::new("tap-eth0", 7)).unwrap_err();
        assert!(matches!(
            err,
            Error::Filter { fault: FilterFault::InvalidRequest, .. }
        ));
    }

    #[test]
    fn test_is_ingress_on() {
        let ingress = IngressQdisc::new(4).request();
        assert!(is_ingress_on(&ingress, 4));
        assert!(!is_ingress_on(&ingress, 5));

        let mut other = TcMessage::with_index(4);
        other.attributes.push(TcAttribute::Kind("fq_codel".to_string()));
        assert!(!is_ingress_on(&other, 4));
    }

    #[test]
    fn test_filter_other_error_is_kernel_fault() {
        let mut kernel = FakeKernel::default();
        kernel.fail_filter = Some(Errno::ENOBUFS);

        let err = install_redirect_pair(
            &mut kernel,
            "eth0",
            Link::new("eth0", 2),
            Link::new("tap-eth0", 7),
        )
        .unwrap_err();

        match err {
            Error::Filter { iface, from, to, fault } => {
                assert_eq!(iface, "eth0");
                assert_eq!(from, "eth0");
                assert_eq!(to, "tap-eth0");
                assert_eq!(fault, FilterFault::Kernel(Errno::ENOBUFS));
            }
            other => panic!("unexpected error: {other}"),
        }
        // Both qdiscs stay attached
        assert_eq!(kernel.qdiscs, vec![2, 7]);
    }
}
