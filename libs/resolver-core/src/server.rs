use std::net::IpAddr;

/// Where a [`DnsServer`] entry was learned from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerOrigin {
    /// The `DNS=` option of the daemon configuration, or the built-in
    /// fallback list.
    System,
    /// Statically configured for one link.
    LinkStatic,
    /// Learned from the link's DHCP lease.
    LinkDhcp,
}

/// One upstream DNS server.
///
/// Each server belongs to exactly one ordered list: the Manager's global
/// list or one of a link's two lists. Within a list, entries are unique by
/// address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsServer {
    pub address: IpAddr,
    pub origin: ServerOrigin,
    /// The link this server was learned on. `None` for
    /// [`ServerOrigin::System`].
    pub link: Option<u32>,
}

impl DnsServer {
    pub fn system(address: IpAddr) -> Self {
        Self {
            address,
            origin: ServerOrigin::System,
            link: None,
        }
    }

    pub fn link_static(address: IpAddr, ifindex: u32) -> Self {
        Self {
            address,
            origin: ServerOrigin::LinkStatic,
            link: Some(ifindex),
        }
    }

    pub fn link_dhcp(address: IpAddr, ifindex: u32) -> Self {
        Self {
            address,
            origin: ServerOrigin::LinkDhcp,
            link: Some(ifindex),
        }
    }
}

/// Append `server` unless the list already contains its address.
pub(crate) fn push_unique(list: &mut Vec<DnsServer>, server: DnsServer) {
    if list.iter().any(|existing| existing.address == server.address) {
        return;
    }

    list.push(server);
}
