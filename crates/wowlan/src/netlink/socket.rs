//! NETLINK_GENERIC socket registered with the tokio reactor.

use std::io;
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicU32, Ordering};

use bytes::BytesMut;
use netlink_sys::{Socket, SocketAddr, protocols};
use tokio::io::Interest;
use tokio::io::unix::AsyncFd;

use super::error::{Error, Result};

/// Receive buffer size. Split wiphy dumps stay well below this.
const RECV_BUF_SIZE: usize = 64 * 1024;

/// Async generic netlink socket.
///
/// Sequence numbers are handed out per socket so that replies can be matched
/// to the request that caused them.
pub struct NetlinkSocket {
    fd: AsyncFd<Socket>,
    seq: AtomicU32,
    port: u32,
}

impl NetlinkSocket {
    /// Open a generic netlink socket bound to a kernel-assigned port.
    pub fn generic() -> Result<Self> {
        let mut socket = Socket::new(protocols::NETLINK_GENERIC)?;
        socket.set_non_blocking(true)?;

        let mut addr = SocketAddr::new(0, 0);
        socket.bind(&addr)?;
        socket.get_address(&mut addr)?;

        // drivers explain rejected WoWLAN configurations through extack
        if let Err(e) = socket.set_ext_ack(true) {
            tracing::debug!("extended ACK unavailable: {e}");
        }

        Ok(Self {
            port: addr.port_number(),
            fd: AsyncFd::new(socket)?,
            seq: AtomicU32::new(1),
        })
    }

    pub fn next_seq(&self) -> u32 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Port ID the kernel assigned at bind time.
    pub fn pid(&self) -> u32 {
        self.port
    }

    /// Join a multicast group (e.g. nl80211 "mlme" for wake notifications).
    pub fn add_membership(&mut self, group: u32) -> Result<()> {
        self.fd.get_mut().add_membership(group)?;
        Ok(())
    }

    async fn when_ready<R>(
        &self,
        interest: Interest,
        mut op: impl FnMut(&Socket) -> io::Result<R>,
    ) -> Result<R> {
        loop {
            let mut guard = self.fd.ready(interest).await?;
            if let Ok(result) = guard.try_io(|fd| op(fd.get_ref())) {
                return Ok(result?);
            }
        }
    }

    /// Send one complete netlink message.
    pub async fn send(&self, msg: &[u8]) -> Result<()> {
        let sent = self
            .when_ready(Interest::WRITABLE, |socket| socket.send(msg, 0))
            .await?;
        if sent < msg.len() {
            return Err(Error::Truncated {
                expected: msg.len(),
                actual: sent,
            });
        }
        Ok(())
    }

    /// Receive one datagram, which may hold several netlink messages.
    pub async fn recv_msg(&self) -> Result<Vec<u8>> {
        let mut buf = BytesMut::with_capacity(RECV_BUF_SIZE);
        self.when_ready(Interest::READABLE, |socket| {
            buf.clear();
            socket.recv(&mut buf, 0)
        })
        .await?;
        Ok(buf.to_vec())
    }
}

impl AsRawFd for NetlinkSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.get_ref().as_raw_fd()
    }
}
