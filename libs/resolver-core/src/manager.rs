//! The resolver Manager and the event loop driving it.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::io;
use std::net::IpAddr;
use std::path::PathBuf;

use anyhow::{Context as _, Result};
use futures::StreamExt as _;
use futures::TryStreamExt as _;
use futures::future;
use rtnetlink::Handle;
use rtnetlink::packet_core::{NetlinkMessage, NetlinkPayload};
use rtnetlink::packet_route::address::{AddressAttribute, AddressMessage};
use rtnetlink::packet_route::link::LinkMessage;
use rtnetlink::packet_route::{AddressFamily, RouteNetlinkMessage};
use socket2::Domain;
use tokio::sync::mpsc;

use crate::config::{self, ResolveConfig};
use crate::link::Link;
use crate::netmon::NetworkMonitor;
use crate::packet::DnsPacket;
use crate::resolv_conf;
use crate::rtnl::RtnlConnection;
use crate::server::{self, DnsServer};
use crate::signals::{Hangup, Terminate};
use crate::transaction::{QuerySubmission, ReplySink, Scope, ScopeRequest};
use crate::udp::{DnsEndpoint, SendError};

/// Paths the daemon operates on.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Where the resolv.conf view of the upstream servers is published.
    pub resolv_conf: PathBuf,
    /// Directory where the network manager publishes per-link state.
    pub state_dir: PathBuf,
    /// The daemon configuration file.
    pub config_file: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            resolv_conf: PathBuf::from("/run/resolverd/resolv.conf"),
            state_dir: PathBuf::from("/run/resolverd/netif"),
            config_file: PathBuf::from("/etc/resolverd/resolverd.conf"),
        }
    }
}

/// Whether an rtnl message announces or retracts an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RtnlKind {
    New,
    Del,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    V4,
    V6,
}

/// The single coordinator owning the link inventory, the upstream server
/// pool, the UDP endpoints and the transaction routing table.
pub struct Manager {
    settings: Settings,
    links: BTreeMap<u32, Link>,
    dns_servers: Vec<DnsServer>,
    /// Cursor into `dns_servers`; resolved with a bounds check on read and
    /// reset whenever the list is rebuilt.
    current_dns_server: Option<usize>,
    transactions: HashMap<u16, ReplySink>,
    udp4: Option<DnsEndpoint>,
    udp6: Option<DnsEndpoint>,
}

impl Manager {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            links: BTreeMap::new(),
            dns_servers: Vec::new(),
            current_dns_server: None,
            transactions: HashMap::new(),
            udp4: None,
            udp6: None,
        }
    }

    /// Seed the built-in fallback servers, then apply the configuration's
    /// `DNS=` assignments in source order.
    pub fn apply_config(&mut self, config: &ResolveConfig) {
        self.dns_servers.clear();
        self.current_dns_server = None;

        for address in config::parse_ip_list(config::FALLBACK_DNS_SERVERS) {
            server::push_unique(&mut self.dns_servers, DnsServer::system(address));
        }

        for assignment in &config.dns {
            self.set_dns_servers(assignment);
        }
    }

    /// Apply one `DNS=` assignment: replace the global server list with
    /// the parsed literals, or clear it for an empty assignment.
    pub fn set_dns_servers(&mut self, value: &str) {
        self.dns_servers.clear();
        self.current_dns_server = None;

        for address in config::parse_ip_list(value) {
            if self.find_dns_server(address).is_some() {
                continue;
            }

            self.dns_servers.push(DnsServer::system(address));
        }
    }

    /// The global server with this address, if configured.
    pub fn find_dns_server(&self, address: IpAddr) -> Option<&DnsServer> {
        self.dns_servers
            .iter()
            .find(|server| server.address == address)
    }

    /// The currently preferred upstream server, snapping to the head of
    /// the list when no (valid) cursor is set.
    pub fn current_dns_server(&mut self) -> Option<&DnsServer> {
        match self.current_dns_server {
            Some(index) if index < self.dns_servers.len() => {}
            _ if self.dns_servers.is_empty() => self.current_dns_server = None,
            _ => self.current_dns_server = Some(0),
        }

        self.current_dns_server
            .and_then(|index| self.dns_servers.get(index))
    }

    /// Advance the cursor round-robin, wrapping at the tail. On an empty
    /// list the cursor stays unset.
    pub fn next_dns_server(&mut self) {
        if self.dns_servers.is_empty() {
            self.current_dns_server = None;

            return;
        }

        self.current_dns_server = Some(match self.current_dns_server {
            Some(index) => (index + 1) % self.dns_servers.len(),
            None => 0,
        });
    }

    pub fn dns_servers(&self) -> &[DnsServer] {
        &self.dns_servers
    }

    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.links.values()
    }

    pub fn link(&self, ifindex: u32) -> Option<&Link> {
        self.links.get(&ifindex)
    }

    /// Handle one NEWLINK/DELLINK message; enumeration dumps and live
    /// notifications share this path.
    pub fn process_link(&mut self, kind: RtnlKind, message: &LinkMessage) {
        let ifindex = message.header.index;

        if ifindex == 0 {
            tracing::warn!("Ignoring link message without an interface index");

            return;
        }

        match kind {
            RtnlKind::New => {
                let link = self.links.entry(ifindex).or_insert_with(|| {
                    tracing::debug!(%ifindex, "Found new link");

                    Link::new(ifindex)
                });

                link.apply(message);
            }
            RtnlKind::Del => {
                if self.links.remove(&ifindex).is_some() {
                    tracing::debug!(%ifindex, "Removing link");
                }
            }
        }
    }

    /// Handle one NEWADDR/DELADDR message. Addresses for links we have
    /// never seen are dropped; the kernel announces links first.
    #[expect(
        clippy::wildcard_enum_match_arm,
        reason = "Only IPv4 and IPv6 addresses are tracked."
    )]
    pub fn process_address(&mut self, kind: RtnlKind, message: &AddressMessage) {
        let ifindex = message.header.index;

        let Some(link) = self.links.get_mut(&ifindex) else {
            return;
        };

        match message.header.family {
            AddressFamily::Inet | AddressFamily::Inet6 => {}
            _ => return,
        }

        let Some(address) = address_from_message(message) else {
            tracing::warn!(%ifindex, "Address message carries no usable address");

            return;
        };

        if address.is_ipv4() != (message.header.family == AddressFamily::Inet) {
            tracing::warn!(%ifindex, %address, "Address does not match the family in the message header");

            return;
        }

        match kind {
            RtnlKind::New => link.upsert_address(address, message),
            RtnlKind::Del => link.remove_address(&address),
        }
    }

    /// Route one live netlink notification to the link or address handler.
    #[expect(
        clippy::wildcard_enum_match_arm,
        reason = "We subscribed to link and address groups only."
    )]
    pub(crate) fn process_rtnl_message(&mut self, message: NetlinkMessage<RouteNetlinkMessage>) {
        let NetlinkPayload::InnerMessage(message) = message.payload else {
            return;
        };

        match &message {
            RouteNetlinkMessage::NewLink(message) => self.process_link(RtnlKind::New, message),
            RouteNetlinkMessage::DelLink(message) => self.process_link(RtnlKind::Del, message),
            RouteNetlinkMessage::NewAddress(message) => {
                self.process_address(RtnlKind::New, message);
            }
            RouteNetlinkMessage::DelAddress(message) => {
                self.process_address(RtnlKind::Del, message);
            }
            _ => {}
        }
    }

    /// Refresh every link's runtime server lists from the state directory
    /// and republish resolv.conf.
    pub fn refresh_link_servers(&mut self) {
        for link in self.links.values_mut() {
            if let Err(e) = link.update_monitor(&self.settings.state_dir) {
                tracing::warn!(ifindex = %link.ifindex, "Failed to refresh link servers: {e:#}");
            }
        }

        if let Err(e) = self.write_resolv_conf() {
            tracing::warn!("Could not update resolv.conf: {e:#}");
        }
    }

    /// All servers in publication order: per-link static then per-link
    /// DHCP for each link, then the global list. Duplicates across
    /// sources are deliberately kept.
    fn resolv_conf_servers(&self) -> impl Iterator<Item = IpAddr> + '_ {
        self.links
            .values()
            .flat_map(|link| {
                link.link_dns_servers()
                    .iter()
                    .chain(link.dhcp_dns_servers().iter())
            })
            .chain(self.dns_servers.iter())
            .map(|server| server.address)
    }

    /// Atomically publish the current server view.
    pub fn write_resolv_conf(&self) -> Result<()> {
        resolv_conf::write(&self.settings.resolv_conf, self.resolv_conf_servers())
    }

    /// Register a transaction's reply sink under its DNS ID. IDs must be
    /// unique across outstanding transactions.
    pub fn register_transaction(&mut self, id: u16, sink: ReplySink) -> Result<()> {
        match self.transactions.entry(id) {
            Entry::Occupied(_) => anyhow::bail!("transaction ID {id:#06x} is already in flight"),
            Entry::Vacant(entry) => {
                entry.insert(sink);

                Ok(())
            }
        }
    }

    pub fn deregister_transaction(&mut self, id: u16) {
        self.transactions.remove(&id);
    }

    pub fn has_transaction(&self, id: u16) -> bool {
        self.transactions.contains_key(&id)
    }

    /// Deliver one inbound datagram to its transaction. Packets without a
    /// matching transaction are dropped: they are stale, mis-addressed or
    /// malicious.
    pub fn dispatch_reply(&mut self, packet: DnsPacket) {
        let Some(id) = packet.id() else {
            tracing::debug!(len = %packet.len(), "Discarding runt datagram");

            return;
        };

        let Some(sink) = self.transactions.get(&id) else {
            tracing::debug!(id = %format_args!("{id:#06x}"), "Discarding reply without a matching transaction");

            return;
        };

        if sink.send(packet).is_err() {
            // The transaction went away without cancelling.
            self.transactions.remove(&id);
        }
    }

    /// Send one query datagram to `server`, creating the endpoint for its
    /// family on first use.
    pub async fn send_query(
        &mut self,
        server: &DnsServer,
        ifindex: Option<u32>,
        packet: &DnsPacket,
    ) -> Result<(), SendError> {
        let endpoint = self.endpoint_for(server.address)?;

        endpoint.send(server.address, ifindex, packet).await
    }

    fn endpoint_for(&mut self, address: IpAddr) -> io::Result<&DnsEndpoint> {
        let (slot, domain) = match address {
            IpAddr::V4(_) => (&mut self.udp4, Domain::IPV4),
            IpAddr::V6(_) => (&mut self.udp6, Domain::IPV6),
        };

        if slot.is_none() {
            *slot = Some(DnsEndpoint::new(domain)?);
        }

        match slot {
            Some(endpoint) => Ok(endpoint),
            None => Err(io::Error::other("endpoint was just created")),
        }
    }

    async fn submit_query(&mut self, submission: QuerySubmission) -> Result<()> {
        let id = submission
            .packet
            .id()
            .context("query is too short to carry a DNS header")?;

        let server = self
            .current_dns_server()
            .cloned()
            .context("no DNS servers available")?;

        self.register_transaction(id, submission.reply_tx)?;

        // Send failures are left to the transaction's own timeout; the
        // table entry stays so a late reply can still be routed.
        if let Err(e) = self
            .send_query(&server, submission.ifindex, &submission.packet)
            .await
        {
            tracing::warn!(server = %server.address, "Failed to send query: {e}");
        }

        Ok(())
    }

    pub(crate) async fn handle_request(&mut self, request: ScopeRequest) {
        match request {
            ScopeRequest::Submit(submission) => {
                if let Err(e) = self.submit_query(submission).await {
                    tracing::warn!("Failed to submit query: {e:#}");
                }
            }
            ScopeRequest::RotateServer => self.next_dns_server(),
            ScopeRequest::Cancel { id } => self.deregister_transaction(id),
        }
    }

    fn receive_reply(&mut self, family: Family) {
        let endpoint = match family {
            Family::V4 => self.udp4.as_ref(),
            Family::V6 => self.udp6.as_ref(),
        };

        let Some(endpoint) = endpoint else {
            return;
        };

        let packet = match endpoint.recv() {
            Ok(Some(packet)) => packet,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(?family, "Failed to receive DNS reply: {e}");

                return;
            }
        };

        self.dispatch_reply(packet);
    }

    /// The smallest positive MTU across all links, bounding outgoing
    /// packet sizes while the egress interface is still undecided.
    /// 0 when no link has reported one.
    pub fn find_mtu(&self) -> u32 {
        let mut mtu = 0;

        for link in self.links.values() {
            if link.mtu == 0 {
                continue;
            }

            if mtu == 0 || link.mtu < mtu {
                mtu = link.mtu;
            }
        }

        mtu
    }
}

/// IFA_LOCAL is the interface's own address on point-to-point links,
/// where IFA_ADDRESS is the peer; prefer it.
#[expect(
    clippy::wildcard_enum_match_arm,
    reason = "Only the address-carrying attributes matter here."
)]
fn address_from_message(message: &AddressMessage) -> Option<IpAddr> {
    let mut local = None;
    let mut address = None;

    for attribute in &message.attributes {
        match attribute {
            AddressAttribute::Local(ip) => local = Some(*ip),
            AddressAttribute::Address(ip) => address = Some(*ip),
            _ => {}
        }
    }

    local.or(address)
}

enum Event {
    Rtnl(Option<NetlinkMessage<RouteNetlinkMessage>>),
    NetworkChanged(io::Result<()>),
    Request(Option<ScopeRequest>),
    Datagram(Family),
    ReloadRequested,
    Terminated,
}

/// Drives the [`Manager`]: rtnl notifications, the network-state monitor,
/// scope requests, the two UDP endpoints and the shutdown/reload signals
/// all funnel into one `select!` loop on a single reactor thread.
pub struct EventLoop {
    manager: Manager,
    rtnl: RtnlConnection,
    monitor: NetworkMonitor,
    requests: mpsc::UnboundedReceiver<ScopeRequest>,
    requests_closed: bool,
    terminate: Terminate,
    hangup: Hangup,
}

impl EventLoop {
    /// Connect all event sources, enumerate the current links and
    /// addresses, apply the configuration and publish the first
    /// resolv.conf. Failures here are fatal for the daemon.
    pub async fn new(settings: Settings) -> Result<(Self, Scope)> {
        let mut manager = Manager::new(settings.clone());

        let config = config::load(&settings.config_file)?;
        manager.apply_config(&config);

        let rtnl = RtnlConnection::connect()?;
        let monitor = NetworkMonitor::new(&settings.state_dir)?;

        enumerate(&rtnl.handle, &mut manager).await?;
        manager.refresh_link_servers();

        let (scope, requests) = Scope::new();

        Ok((
            Self {
                manager,
                rtnl,
                monitor,
                requests,
                requests_closed: false,
                terminate: Terminate::new().context("Failed to install signal handlers")?,
                hangup: Hangup::new().context("Failed to install signal handlers")?,
            },
            scope,
        ))
    }

    pub fn manager(&self) -> &Manager {
        &self.manager
    }

    /// Runs until a termination signal arrives or the netlink channel
    /// fails. Handler errors are logged and never tear down the loop.
    pub async fn run(&mut self) -> Result<()> {
        loop {
            let event = tokio::select! {
                message = self.rtnl.messages.next() => {
                    Event::Rtnl(message.map(|(message, _address)| message))
                }
                result = self.monitor.changed() => Event::NetworkChanged(result),
                request = self.requests.recv(), if !self.requests_closed => {
                    Event::Request(request)
                }
                _ = readable(self.manager.udp4.as_ref()) => Event::Datagram(Family::V4),
                _ = readable(self.manager.udp6.as_ref()) => Event::Datagram(Family::V6),
                _ = self.hangup.recv() => Event::ReloadRequested,
                _ = self.terminate.recv() => Event::Terminated,
            };

            match event {
                Event::Rtnl(Some(message)) => self.manager.process_rtnl_message(message),
                Event::Rtnl(None) => anyhow::bail!("netlink event channel closed"),
                Event::NetworkChanged(Ok(())) => self.manager.refresh_link_servers(),
                Event::NetworkChanged(Err(e)) => {
                    return Err(e).context("network state monitor failed");
                }
                Event::Request(Some(request)) => self.manager.handle_request(request).await,
                Event::Request(None) => {
                    tracing::debug!("All scope handles are gone");

                    self.requests_closed = true;
                }
                Event::Datagram(family) => self.manager.receive_reply(family),
                Event::ReloadRequested => self.reload(),
                Event::Terminated => {
                    tracing::info!("Received stop signal, exiting");

                    return Ok(());
                }
            }
        }
    }

    fn reload(&mut self) {
        tracing::info!("Reloading configuration");

        match config::load(&self.manager.settings.config_file) {
            Ok(config) => {
                self.manager.apply_config(&config);

                if let Err(e) = self.manager.write_resolv_conf() {
                    tracing::warn!("Could not update resolv.conf: {e:#}");
                }
            }
            Err(e) => tracing::warn!("Failed to reload configuration: {e:#}"),
        }
    }
}

async fn readable(endpoint: Option<&DnsEndpoint>) {
    match endpoint {
        Some(endpoint) => {
            if let Err(e) = endpoint.readable().await {
                tracing::warn!("Failed to wait for datagrams: {e}");
            }
        }
        None => future::pending().await,
    }
}

/// Process the kernel's full link and address dumps through the same
/// handlers that live notifications use.
async fn enumerate(handle: &Handle, manager: &mut Manager) -> Result<()> {
    let mut links = handle.link().get().execute();
    while let Some(message) = links
        .try_next()
        .await
        .context("Failed to enumerate links")?
    {
        manager.process_link(RtnlKind::New, &message);
    }

    let mut addresses = handle.address().get().execute();
    while let Some(message) = addresses
        .try_next()
        .await
        .context("Failed to enumerate addresses")?
    {
        manager.process_address(RtnlKind::New, &message);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtnetlink::packet_route::link::LinkAttribute;

    fn test_manager() -> Manager {
        Manager::new(Settings::default())
    }

    fn link_message(ifindex: u32, name: &str, mtu: u32) -> LinkMessage {
        let mut message = LinkMessage::default();
        message.header.index = ifindex;
        message
            .attributes
            .push(LinkAttribute::IfName(name.to_owned()));
        message.attributes.push(LinkAttribute::Mtu(mtu));

        message
    }

    fn address_message(ifindex: u32, address: IpAddr) -> AddressMessage {
        let mut message = AddressMessage::default();
        message.header.index = ifindex;
        message.header.family = match address {
            IpAddr::V4(_) => AddressFamily::Inet,
            IpAddr::V6(_) => AddressFamily::Inet6,
        };
        message.attributes.push(AddressAttribute::Local(address));

        message
    }

    #[test]
    fn enumerated_link_and_address_show_up_in_the_inventory() {
        let mut manager = test_manager();

        manager.process_link(RtnlKind::New, &link_message(2, "eth0", 1500));
        manager.process_address(RtnlKind::New, &address_message(2, "10.0.0.5".parse().unwrap()));

        let link = manager.link(2).unwrap();
        assert_eq!(link.name, "eth0");
        assert_eq!(link.mtu, 1500);

        let addresses: Vec<_> = link.addresses().collect();
        assert_eq!(addresses.len(), 1);
        assert_eq!(addresses[0].address, "10.0.0.5".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn deleting_a_link_cascades_to_its_addresses() {
        let mut manager = test_manager();

        manager.process_link(RtnlKind::New, &link_message(2, "eth0", 1500));
        manager.process_address(RtnlKind::New, &address_message(2, "10.0.0.5".parse().unwrap()));

        manager.process_link(RtnlKind::Del, &link_message(2, "eth0", 1500));

        assert!(manager.link(2).is_none());
        assert_eq!(manager.links().count(), 0);
    }

    #[test]
    fn deleting_an_unknown_link_is_a_no_op() {
        let mut manager = test_manager();

        manager.process_link(RtnlKind::Del, &link_message(7, "eth7", 1500));

        assert_eq!(manager.links().count(), 0);
    }

    #[test]
    fn addresses_for_unknown_links_are_dropped() {
        let mut manager = test_manager();

        manager.process_address(RtnlKind::New, &address_message(9, "10.0.0.5".parse().unwrap()));

        assert_eq!(manager.links().count(), 0);
    }

    #[test]
    fn deleting_an_address_removes_only_that_record() {
        let mut manager = test_manager();

        manager.process_link(RtnlKind::New, &link_message(2, "eth0", 1500));
        manager.process_address(RtnlKind::New, &address_message(2, "10.0.0.5".parse().unwrap()));
        manager.process_address(RtnlKind::New, &address_message(2, "fe80::1".parse().unwrap()));

        manager.process_address(RtnlKind::Del, &address_message(2, "10.0.0.5".parse().unwrap()));

        let link = manager.link(2).unwrap();
        let addresses: Vec<_> = link.addresses().collect();
        assert_eq!(addresses.len(), 1);
        assert_eq!(addresses[0].address, "fe80::1".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn local_address_is_preferred_over_the_peer_address() {
        let mut manager = test_manager();

        manager.process_link(RtnlKind::New, &link_message(3, "ppp0", 1400));

        let mut message = AddressMessage::default();
        message.header.index = 3;
        message.header.family = AddressFamily::Inet;
        message
            .attributes
            .push(AddressAttribute::Address("192.0.2.1".parse().unwrap()));
        message
            .attributes
            .push(AddressAttribute::Local("10.0.0.2".parse().unwrap()));

        manager.process_address(RtnlKind::New, &message);

        let link = manager.link(3).unwrap();
        let addresses: Vec<_> = link.addresses().collect();
        assert_eq!(addresses.len(), 1);
        assert_eq!(addresses[0].address, "10.0.0.2".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn unknown_address_families_are_dropped_silently() {
        let mut manager = test_manager();

        manager.process_link(RtnlKind::New, &link_message(2, "eth0", 1500));

        let mut message = AddressMessage::default();
        message.header.index = 2;
        message.header.family = AddressFamily::Unspec;
        message
            .attributes
            .push(AddressAttribute::Local("10.0.0.5".parse().unwrap()));

        manager.process_address(RtnlKind::New, &message);

        assert_eq!(manager.link(2).unwrap().addresses().count(), 0);
    }

    #[test]
    fn link_messages_without_an_index_are_dropped() {
        let mut manager = test_manager();

        manager.process_link(RtnlKind::New, &LinkMessage::default());

        assert_eq!(manager.links().count(), 0);
    }

    #[test]
    fn servers_rotate_round_robin() {
        let mut manager = test_manager();
        manager.set_dns_servers("1.1.1.1 8.8.8.8 9.9.9.9");

        let current = |manager: &mut Manager| manager.current_dns_server().unwrap().address;

        assert_eq!(current(&mut manager), "1.1.1.1".parse::<IpAddr>().unwrap());

        manager.next_dns_server();
        assert_eq!(current(&mut manager), "8.8.8.8".parse::<IpAddr>().unwrap());

        manager.next_dns_server();
        assert_eq!(current(&mut manager), "9.9.9.9".parse::<IpAddr>().unwrap());

        manager.next_dns_server();
        assert_eq!(current(&mut manager), "1.1.1.1".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn rotation_is_modular_in_the_list_length() {
        let mut manager = test_manager();
        manager.set_dns_servers("1.1.1.1 8.8.8.8 9.9.9.9");

        // Take the cursor off `None` first.
        let start = manager.current_dns_server().unwrap().address;
        assert_eq!(start, "1.1.1.1".parse::<IpAddr>().unwrap());

        for _ in 0..7 {
            manager.next_dns_server();
        }

        // (0 + 7) mod 3 == 1
        assert_eq!(
            manager.current_dns_server().unwrap().address,
            "8.8.8.8".parse::<IpAddr>().unwrap()
        );
    }

    #[test]
    fn empty_server_list_has_no_current_server() {
        let mut manager = test_manager();

        assert!(manager.current_dns_server().is_none());

        manager.next_dns_server();
        assert!(manager.current_dns_server().is_none());
    }

    #[test]
    fn clearing_the_list_resets_the_cursor() {
        let mut manager = test_manager();
        manager.set_dns_servers("1.1.1.1 8.8.8.8");
        manager.next_dns_server();

        manager.set_dns_servers("");

        assert!(manager.dns_servers().is_empty());
        assert!(manager.current_dns_server().is_none());
    }

    #[test]
    fn configured_servers_are_deduplicated_in_order() {
        let mut manager = test_manager();

        manager.set_dns_servers("8.8.8.8 not-an-ip 1.1.1.1 8.8.8.8 '9.9.9.9'");

        let emitted = manager
            .dns_servers()
            .iter()
            .map(|server| server.address.to_string())
            .collect::<Vec<_>>()
            .join(" ");

        assert_eq!(emitted, "8.8.8.8 1.1.1.1 9.9.9.9");
    }

    #[test]
    fn fallback_servers_are_seeded_without_configuration() {
        let mut manager = test_manager();

        manager.apply_config(&ResolveConfig::default());

        assert_eq!(manager.dns_servers().len(), 4);
        assert_eq!(
            manager.dns_servers()[0].address,
            "8.8.8.8".parse::<IpAddr>().unwrap()
        );
    }

    #[test]
    fn configured_servers_replace_the_fallback() {
        let mut manager = test_manager();

        manager.apply_config(&ResolveConfig {
            dns: vec!["1.1.1.1".to_owned()],
        });

        assert_eq!(manager.dns_servers().len(), 1);
        assert_eq!(
            manager.dns_servers()[0].address,
            "1.1.1.1".parse::<IpAddr>().unwrap()
        );
    }

    #[test]
    fn replies_are_routed_to_the_matching_transaction() {
        let mut manager = test_manager();
        let (tx, mut rx) = mpsc::unbounded_channel();

        manager.register_transaction(0x1234, tx).unwrap();

        let mut payload = vec![0u8; 12];
        payload[0] = 0x12;
        payload[1] = 0x34;
        manager.dispatch_reply(DnsPacket::new(payload.clone()));

        assert_eq!(rx.try_recv().unwrap().as_bytes(), payload.as_slice());
        assert!(rx.try_recv().is_err(), "exactly one reply is delivered");

        // Removal is the transaction's responsibility.
        assert!(manager.has_transaction(0x1234));
    }

    #[test]
    fn replies_without_a_transaction_are_dropped() {
        let mut manager = test_manager();

        let mut payload = vec![0u8; 12];
        payload[0] = 0x42;
        payload[1] = 0x42;
        manager.dispatch_reply(DnsPacket::new(payload));

        assert!(!manager.has_transaction(0x4242));
    }

    #[test]
    fn runt_datagrams_are_dropped() {
        let mut manager = test_manager();
        let (tx, mut rx) = mpsc::unbounded_channel();

        manager.register_transaction(0x1234, tx).unwrap();
        manager.dispatch_reply(DnsPacket::new(vec![0x12, 0x34]));

        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn duplicate_transaction_ids_are_rejected() {
        let mut manager = test_manager();
        let (tx, _rx) = mpsc::unbounded_channel();
        let (other_tx, _other_rx) = mpsc::unbounded_channel();

        manager.register_transaction(0x1234, tx).unwrap();

        assert!(manager.register_transaction(0x1234, other_tx).is_err());
    }

    #[test]
    fn stale_transactions_are_pruned_on_delivery() {
        let mut manager = test_manager();
        let (tx, rx) = mpsc::unbounded_channel();

        manager.register_transaction(0x1234, tx).unwrap();
        drop(rx);

        let mut payload = vec![0u8; 12];
        payload[0] = 0x12;
        payload[1] = 0x34;
        manager.dispatch_reply(DnsPacket::new(payload));

        assert!(!manager.has_transaction(0x1234));
    }

    #[test]
    fn cancel_removes_the_table_entry() {
        let mut manager = test_manager();
        let (tx, _rx) = mpsc::unbounded_channel();

        manager.register_transaction(0x1234, tx).unwrap();
        manager.deregister_transaction(0x1234);

        assert!(!manager.has_transaction(0x1234));
    }

    #[test]
    fn find_mtu_is_the_smallest_known_mtu() {
        let mut manager = test_manager();

        manager.process_link(RtnlKind::New, &link_message(2, "eth0", 1500));
        manager.process_link(RtnlKind::New, &link_message(3, "wg0", 1280));
        manager.process_link(RtnlKind::New, &link_message(4, "unknown0", 0));

        assert_eq!(manager.find_mtu(), 1280);
    }

    #[test]
    fn find_mtu_without_links_is_zero() {
        let manager = test_manager();

        assert_eq!(manager.find_mtu(), 0);
    }

    #[test]
    fn find_mtu_ignores_links_with_unknown_mtu() {
        let mut manager = test_manager();

        manager.process_link(RtnlKind::New, &link_message(1, "lo", 0));

        assert_eq!(manager.find_mtu(), 0);
    }

    #[test]
    fn find_dns_server_matches_by_address() {
        let mut manager = test_manager();
        manager.set_dns_servers("1.1.1.1 2001:4860:4860::8888");

        assert!(manager.find_dns_server("1.1.1.1".parse().unwrap()).is_some());
        assert!(
            manager
                .find_dns_server("2001:4860:4860::8888".parse().unwrap())
                .is_some()
        );
        assert!(manager.find_dns_server("9.9.9.9".parse().unwrap()).is_none());
    }

    #[test]
    fn ipv4_mapped_and_plain_addresses_are_distinct_servers() {
        let mut manager = test_manager();
        manager.set_dns_servers("8.8.8.8 ::ffff:8.8.8.8");

        assert_eq!(manager.dns_servers().len(), 2);
    }
}
