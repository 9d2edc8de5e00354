//! rtnetlink session
//!
//! A blocking `NETLINK_ROUTE` socket (`netlink-sys`) carrying
//! `netlink-packet-route` messages. Requests are ACK-checked; the kernel's
//! error code comes back as an `Errno`.

use netlink_packet_core::{
    ErrorMessage, NetlinkBuffer, NetlinkHeader, NetlinkMessage, NetlinkPayload, NLM_F_ACK,
    NLM_F_DUMP, NLM_F_REQUEST,
};
use netlink_packet_route::RouteNetlinkMessage;
use netlink_sys::{protocols::NETLINK_ROUTE, Socket, SocketAddr};
use nix::errno::Errno;
use std::io;
use std::os::fd::AsRawFd;
use tracing::{debug, trace};

/// Receive buffer; large enough for one multipart dump datagram
const RECV_BUF_LEN: usize = 64 * 1024;

fn errno(e: io::Error) -> Errno {
    Errno::from_raw(e.raw_os_error().unwrap_or(libc::EIO))
}

/// Errno carried by an NLMSG_ERROR reply; no code means a plain ACK
fn ack_result(err: &ErrorMessage) -> Result<(), Errno> {
    match err.code {
        None => Ok(()),
        Some(code) => Err(Errno::from_raw(-code.get())),
    }
}

/// Serialize one request with the given header flags and sequence number
fn encode(message: RouteNetlinkMessage, flags: u16, seq: u32) -> Vec<u8> {
    let mut header = NetlinkHeader::default();
    header.flags = flags;
    header.sequence_number = seq;

    let mut packet = NetlinkMessage::new(header, NetlinkPayload::from(message));
    packet.finalize();

    let mut buf = vec![0u8; packet.buffer_len()];
    packet.serialize(&mut buf[..]);
    buf
}

/// Split a received datagram into messages
fn decode(buf: &[u8]) -> Result<Vec<NetlinkMessage<RouteNetlinkMessage>>, Errno> {
    let mut out = Vec::new();
    let mut offset = 0;

    while offset < buf.len() {
        let bytes = &buf[offset..];
        let len = NetlinkBuffer::new_checked(bytes)
            .map_err(|_| Errno::EBADMSG)?
            .length() as usize;
        let message = NetlinkMessage::<RouteNetlinkMessage>::deserialize(bytes)
            .map_err(|_| Errno::EBADMSG)?;

        out.push(message);
        offset += (len + 3) & !3; // NLMSG_ALIGN
    }

    Ok(out)
}

/// An open rtnetlink socket
///
/// The socket is closed when the session is dropped, so a session scoped to
/// one orchestration call is released on every exit path.
pub struct NetlinkSession {
    socket: Socket,
    seq: u32,
}

impl NetlinkSession {
    /// Open a `NETLINK_ROUTE` socket bound to an automatic port and
    /// connected to the kernel
    pub fn open() -> Result<Self, Errno> {
        let mut socket = Socket::new(NETLINK_ROUTE).map_err(errno)?;
        socket.bind_auto().map_err(errno)?;
        socket.connect(&SocketAddr::new(0, 0)).map_err(errno)?;

        debug!(fd = socket.as_raw_fd(), "Opened netlink session");
        Ok(Self { socket, seq: 0 })
    }

    /// Send a request and wait for its ACK
    ///
    /// `flags` are added to NLM_F_REQUEST | NLM_F_ACK.
    pub fn request(&mut self, message: RouteNetlinkMessage, flags: u16) -> Result<(), Errno> {
        let seq = self.send(message, flags | NLM_F_REQUEST | NLM_F_ACK)?;

        loop {
            for reply in self.recv()? {
                if reply.header.sequence_number != seq {
                    continue;
                }
                if let NetlinkPayload::Error(err) = reply.payload {
                    if let Err(errno) = ack_result(&err) {
                        trace!(seq, %errno, "netlink request rejected");
                        return Err(errno);
                    }
                    return Ok(());
                }
            }
        }
    }

    /// Send a dump request and collect every reply until NLMSG_DONE
    pub fn dump(&mut self, message: RouteNetlinkMessage) -> Result<Vec<RouteNetlinkMessage>, Errno> {
        let seq = self.send(message, NLM_F_REQUEST | NLM_F_DUMP)?;
        let mut out = Vec::new();

        loop {
            for reply in self.recv()? {
                if reply.header.sequence_number != seq {
                    continue;
                }
                match reply.payload {
                    NetlinkPayload::Done(_) => return Ok(out),
                    NetlinkPayload::Error(err) => ack_result(&err)?,
                    NetlinkPayload::InnerMessage(inner) => out.push(inner),
                    _ => {}
                }
            }
        }
    }

    fn send(&mut self, message: RouteNetlinkMessage, flags: u16) -> Result<u32, Errno> {
        self.seq = self.seq.wrapping_add(1);
        let seq = self.seq;
        let bytes = encode(message, flags, seq);

        let sent = loop {
            match self.socket.send(&bytes, 0) {
                Ok(sent) => break sent,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(errno(e)),
            }
        };

        if sent != bytes.len() {
            return Err(Errno::EMSGSIZE);
        }

        Ok(seq)
    }

    fn recv(&self) -> Result<Vec<NetlinkMessage<RouteNetlinkMessage>>, Errno> {
        let mut buf = vec![0u8; RECV_BUF_LEN];
        let len = loop {
            match self.socket.recv(&mut &mut buf[..], 0) {
                Ok(len) => break len,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(errno(e)),
            }
        };

        decode(&buf[..len])
    }
}

impl Drop for NetlinkSession {
    fn drop(&mut self) {
        debug!(fd = self.socket.as_raw_fd(), "Closing netlink session");
    }
}
