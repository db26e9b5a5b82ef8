use std::collections::HashMap;
use std::io;
use std::net::IpAddr;
use std::path::Path;

use anyhow::{Context as _, Result};
use rtnetlink::packet_route::address::AddressMessage;
use rtnetlink::packet_route::link::{LinkAttribute, LinkMessage, State};

use crate::config;
use crate::server::{self, DnsServer};

/// One IP address currently bound on a [`Link`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressRecord {
    pub address: IpAddr,
    pub prefix_len: u8,
}

/// One network interface as reported by the kernel, together with the DNS
/// servers learned on it.
#[derive(Debug)]
pub struct Link {
    pub ifindex: u32,
    pub name: String,
    /// 0 until the kernel reports one.
    pub mtu: u32,
    pub operstate: State,
    addresses: HashMap<IpAddr, AddressRecord>,
    link_dns_servers: Vec<DnsServer>,
    dhcp_dns_servers: Vec<DnsServer>,
}

impl Link {
    pub(crate) fn new(ifindex: u32) -> Self {
        Self {
            ifindex,
            name: String::new(),
            mtu: 0,
            operstate: State::Unknown,
            addresses: HashMap::new(),
            link_dns_servers: Vec::new(),
            dhcp_dns_servers: Vec::new(),
        }
    }

    pub fn addresses(&self) -> impl Iterator<Item = &AddressRecord> {
        self.addresses.values()
    }

    /// Servers statically configured for this link.
    pub fn link_dns_servers(&self) -> &[DnsServer] {
        &self.link_dns_servers
    }

    /// Servers from this link's DHCP lease.
    pub fn dhcp_dns_servers(&self) -> &[DnsServer] {
        &self.dhcp_dns_servers
    }

    /// Apply the attributes of a NEWLINK message.
    #[expect(
        clippy::wildcard_enum_match_arm,
        reason = "We only consume a few of the many link attributes."
    )]
    pub(crate) fn apply(&mut self, message: &LinkMessage) {
        for attribute in &message.attributes {
            match attribute {
                LinkAttribute::IfName(name) => self.name = name.clone(),
                LinkAttribute::Mtu(mtu) => self.mtu = *mtu,
                LinkAttribute::OperState(state) => self.operstate = *state,
                _ => {}
            }
        }
    }

    pub(crate) fn upsert_address(&mut self, address: IpAddr, message: &AddressMessage) {
        let record = self.addresses.entry(address).or_insert(AddressRecord {
            address,
            prefix_len: 0,
        });

        record.prefix_len = message.header.prefix_len;
    }

    pub(crate) fn remove_address(&mut self, address: &IpAddr) {
        self.addresses.remove(address);
    }

    /// Refresh both per-link server lists from the network manager's state
    /// file for this link. A missing file means the link is unmanaged and
    /// clears the lists.
    pub(crate) fn update_monitor(&mut self, state_dir: &Path) -> Result<()> {
        let path = state_dir.join("links").join(self.ifindex.to_string());

        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.link_dns_servers.clear();
                self.dhcp_dns_servers.clear();

                return Ok(());
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read link state file {}", path.display()));
            }
        };

        self.link_dns_servers.clear();
        self.dhcp_dns_servers.clear();

        for line in content.lines() {
            let line = line.trim();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                continue;
            };

            match key {
                "DNS" => {
                    for address in config::parse_ip_list(value) {
                        server::push_unique(
                            &mut self.link_dns_servers,
                            DnsServer::link_static(address, self.ifindex),
                        );
                    }
                }
                "DHCP_DNS" => {
                    for address in config::parse_ip_list(value) {
                        server::push_unique(
                            &mut self.dhcp_dns_servers,
                            DnsServer::link_dhcp(address, self.ifindex),
                        );
                    }
                }
                _ => {}
            }
        }

        Ok(())
    }
}
