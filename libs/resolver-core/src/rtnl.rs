//! The route-netlink channel delivering link and address notifications.

use anyhow::{Context as _, Result};
use futures::channel::mpsc::UnboundedReceiver;
use rtnetlink::Handle;
use rtnetlink::packet_core::NetlinkMessage;
use rtnetlink::packet_route::RouteNetlinkMessage;
use rtnetlink::sys::{AsyncSocket as _, SocketAddr};

pub(crate) type Messages = UnboundedReceiver<(NetlinkMessage<RouteNetlinkMessage>, SocketAddr)>;

/// An open rtnetlink connection subscribed to the link, IPv4-address and
/// IPv6-address multicast groups.
pub(crate) struct RtnlConnection {
    pub(crate) handle: Handle,
    pub(crate) messages: Messages,
    task: tokio::task::JoinHandle<()>,
}

impl Drop for RtnlConnection {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl RtnlConnection {
    /// Opens the connection and binds it to the multicast groups before
    /// the connection task starts, so no notification is lost.
    pub(crate) fn connect() -> Result<Self> {
        let (mut connection, handle, messages) =
            rtnetlink::new_connection().context("Failed to create netlink connection")?;

        let groups =
            (libc::RTMGRP_LINK | libc::RTMGRP_IPV4_IFADDR | libc::RTMGRP_IPV6_IFADDR) as u32;

        connection
            .socket_mut()
            .socket_mut()
            .bind(&SocketAddr::new(0, groups))
            .context("Failed to bind netlink socket for events")?;

        let task = tokio::spawn(connection);

        Ok(Self {
            handle,
            messages,
            task,
        })
    }
}
