//! The interface between the Manager and the query transactions of the
//! unicast scope.
//!
//! The retransmission and timeout state machine lives with the
//! transaction itself; the Manager only provides the send/receive
//! substrate and the ID-keyed routing table.

use anyhow::Result;
use tokio::sync::mpsc;

use crate::packet::DnsPacket;

/// Non-owning handle through which the Manager delivers reply packets to
/// an outstanding transaction. The transaction owns the receiving half.
pub type ReplySink = mpsc::UnboundedSender<DnsPacket>;

/// One query handed to the Manager by the bus front-end.
pub struct QuerySubmission {
    /// The fully encoded query; its header ID keys the transaction table.
    pub packet: DnsPacket,
    /// Restricts the query to one egress interface, e.g. for link-local
    /// servers.
    pub ifindex: Option<u32>,
    /// Where replies for this transaction are delivered.
    pub reply_tx: ReplySink,
}

/// Requests flowing from the unicast scope into the event loop.
pub enum ScopeRequest {
    Submit(QuerySubmission),
    /// A transaction observed sustained failure against the current
    /// server; move the global cursor to the next one.
    RotateServer,
    /// The transaction with this ID is gone; drop its table entry.
    Cancel { id: u16 },
}

/// Front door of the unicast scope. Clones share one channel into the
/// event loop.
#[derive(Clone)]
pub struct Scope {
    requests: mpsc::UnboundedSender<ScopeRequest>,
}

impl Scope {
    pub(crate) fn new() -> (Self, mpsc::UnboundedReceiver<ScopeRequest>) {
        let (requests, receiver) = mpsc::unbounded_channel();

        (Self { requests }, receiver)
    }

    /// Submit an encoded query. A transaction that goes away without
    /// [`Scope::cancel`] is pruned on the next delivery attempt.
    pub fn submit(&self, submission: QuerySubmission) -> Result<()> {
        self.send(ScopeRequest::Submit(submission))
    }

    /// Report sustained failure against the current server.
    pub fn rotate_server(&self) -> Result<()> {
        self.send(ScopeRequest::RotateServer)
    }

    /// Remove the transaction with `id` from the routing table.
    pub fn cancel(&self, id: u16) -> Result<()> {
        self.send(ScopeRequest::Cancel { id })
    }

    fn send(&self, request: ScopeRequest) -> Result<()> {
        self.requests
            .send(request)
            .map_err(|_| anyhow::anyhow!("the event loop is gone"))
    }
}
