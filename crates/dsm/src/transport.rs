//! Point-to-point channels between nodes.
//!
//! Every transport hands the engine the same [`Endpoint`]: one [`Outbound`] table addressed by
//! NodeID and one [`Inbound`] queue per peer. Messages on one channel arrive in send order; there
//! is no ordering across channels.

use {
    crate::TransportError,
    dsm_core::{Message, NodeId},
    std::sync::{PoisonError, RwLock},
    tokio::sync::mpsc,
    tracing::debug,
};

/// The sending half of every channel this node owns, indexed by peer NodeID.
///
/// `send` may be called from any thread. Each channel queues whole messages, so concurrent
/// senders never interleave partial records.
pub struct Outbound {
    id: NodeId,
    // `None` once closed.
    senders: RwLock<Option<Vec<Option<mpsc::UnboundedSender<Message>>>>>,
}

impl Outbound {
    pub(crate) fn new(id: NodeId, senders: Vec<Option<mpsc::UnboundedSender<Message>>>) -> Self {
        Outbound {
            id,
            senders: RwLock::new(Some(senders)),
        }
    }

    pub fn send(&self, dst: NodeId, msg: Message) -> Result<(), TransportError> {
        let senders = self.senders.read().unwrap_or_else(PoisonError::into_inner);
        let senders = senders
            .as_ref()
            .ok_or(TransportError::ChannelClosed { peer: dst })?;
        let sender = senders
            .get(dst.index())
            .and_then(Option::as_ref)
            .ok_or(TransportError::UnknownPeer { peer: dst })?;
        debug!(src = ?self.id, ?dst, ?msg, "Sending.");
        sender
            .send(msg)
            .map_err(|_| TransportError::ChannelClosed { peer: dst })
    }

    /// Every NodeID this node has a channel to.
    pub fn peers(&self) -> Vec<NodeId> {
        let senders = self.senders.read().unwrap_or_else(PoisonError::into_inner);
        senders
            .iter()
            .flatten()
            .enumerate()
            .filter(|(_, sender)| sender.is_some())
            .map(|(i, _)| NodeId::from_index(i))
            .collect()
    }

    /// Drops every sender. Peers see [`TransportError::ChannelClosed`] once they drain what was
    /// already queued.
    pub fn close(&self) {
        self.senders
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

/// The receiving half of the channel from one peer.
pub struct Inbound {
    peer: NodeId,
    rx: mpsc::UnboundedReceiver<Message>,
}

impl Inbound {
    pub(crate) fn new(peer: NodeId, rx: mpsc::UnboundedReceiver<Message>) -> Self {
        Inbound { peer, rx }
    }

    pub fn peer(&self) -> NodeId {
        self.peer
    }

    /// Blocks the calling thread until the next message arrives. Must not be called from within
    /// an async context.
    pub fn recv(&mut self) -> Result<Message, TransportError> {
        self.rx
            .blocking_recv()
            .ok_or(TransportError::ChannelClosed { peer: self.peer })
    }

    /// The next message if one is already queued.
    pub fn try_recv(&mut self) -> Option<Message> {
        self.rx.try_recv().ok()
    }
}

/// Everything a node needs to talk to its peers.
pub struct Endpoint {
    pub id: NodeId,
    pub outbound: Outbound,
    pub inbound: Vec<Inbound>,
}

/// Builds `num_nodes` fully connected in-process endpoints, lowest NodeID first.
pub fn mesh(num_nodes: usize) -> Vec<Endpoint> {
    let mut senders: Vec<Vec<Option<_>>> = (0..num_nodes)
        .map(|_| (0..num_nodes).map(|_| None).collect())
        .collect();
    let mut inbound: Vec<Vec<Inbound>> = (0..num_nodes).map(|_| Vec::new()).collect();
    for src in NodeId::all(num_nodes) {
        for dst in NodeId::all(num_nodes).filter(|dst| *dst != src) {
            let (tx, rx) = mpsc::unbounded_channel();
            senders[src][dst] = Some(tx);
            inbound[dst].push(Inbound::new(src, rx));
        }
    }
    senders
        .into_iter()
        .zip(inbound)
        .enumerate()
        .map(|(i, (senders, inbound))| {
            let id = NodeId::from_index(i);
            Endpoint {
                id,
                outbound: Outbound::new(id, senders),
                inbound,
            }
        })
        .collect()
}
