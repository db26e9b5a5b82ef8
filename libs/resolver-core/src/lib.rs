//! Core of `resolverd`, a host-local recursive-stub DNS resolver.
//!
//! The [`Manager`] owns the network-interface inventory, the upstream
//! server pool, the two UDP endpoints and the table of in-flight query
//! transactions. [`EventLoop`] funnels kernel link/address notifications,
//! the network-state monitor, query submissions and inbound reply
//! datagrams into a single-threaded reactor loop and publishes the
//! current server view as a `resolv.conf` file.

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod config;
mod link;
mod manager;
mod netmon;
mod packet;
mod resolv_conf;
mod rtnl;
mod server;
pub mod signals;
mod transaction;
mod udp;

pub use link::{AddressRecord, Link};
pub use manager::{EventLoop, Manager, RtnlKind, Settings};
pub use packet::DnsPacket;
pub use resolv_conf::MAXNS;
pub use server::{DnsServer, ServerOrigin};
pub use transaction::{QuerySubmission, ReplySink, Scope, ScopeRequest};
pub use udp::SendError;
