use {
    crate::{
        store::Store, transport::Outbound, CacheLine, CoherenceError, ConfigError,
        DirectoryEntry, EngineConfig, TransportError,
    },
    dsm_core::{BlockId, Message, MessageKind, NodeId, Value},
    std::time::Instant,
    tracing::{debug, error, warn},
};

/// The per-node coherence logic: local reads and writes, and the handlers for messages from
/// peers.
///
/// Writes are not atomic with respect to the rest of the cluster. Between a writer's
/// `INVALIDATE` broadcast and the delivery of its `WRITE_CLAIM`, a peer may still fetch the old
/// value from the previous owner, and peers may see claims from competing writers in different
/// orders. Ownership views agree once every claim for a block has been delivered.
pub struct Engine {
    id: NodeId,
    config: EngineConfig,
    store: Store,
    outbound: Outbound,
}

impl Engine {
    /// Fails if `config` does not validate or `id` is not one of its nodes.
    pub fn new(id: NodeId, config: EngineConfig, outbound: Outbound) -> Result<Self, ConfigError> {
        config.validate()?;
        if id.index() >= config.num_nodes() {
            return Err(ConfigError::NodeOutOfRange {
                id: id.get(),
                num_nodes: config.num_nodes(),
            });
        }
        let store = Store::new(id, &config);
        Ok(Engine {
            id,
            config,
            store,
            outbound,
        })
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns the local copy if valid. Otherwise asks the owner for it and suspends until the
    /// line is filled, giving up with [`CoherenceError::Timeout`] after the configured bound.
    ///
    /// If ownership moves while waiting, the request is repeated to the new owner within the same
    /// bound. Concurrent reads of one block may each send their own request.
    pub fn read(&self, block: BlockId) -> Result<Value, CoherenceError> {
        self.check_block(block)?;
        let started = Instant::now();
        let deadline = started + self.config.timeout();
        let mut state = self.store.lock();
        if let Some(value) = state.read_local(block) {
            return Ok(value);
        }
        loop {
            let owner = state.get_owner(block);
            if owner == self.id {
                // A local write has claimed the block but not installed yet, or a peer's
                // INVALIDATE overtook its WRITE_CLAIM.
                debug!(id = ?self.id, ?block, "Own the block, line not yet filled. Waiting.");
            } else {
                drop(state);
                self.outbound.send(owner, Message::fetch_req(block, self.id))?;
                state = self.store.lock();
            }
            state = state.wait_for_change(block, owner, deadline);
            if let Some(value) = state.read_local(block) {
                return Ok(value);
            }
            if Instant::now() >= deadline {
                return Err(CoherenceError::Timeout {
                    block,
                    owner: state.get_owner(block),
                    waited: started.elapsed(),
                });
            }
            let new = state.get_owner(block);
            debug!(id = ?self.id, ?block, old = ?owner, ?new, "Owner moved during fetch.");
        }
    }

    /// Invalidates every peer's copy, claims ownership, then installs `value` locally. No
    /// acknowledgements are collected.
    ///
    /// A closed channel does not stop the write: the remaining peers and the local tables are
    /// still brought up to date, and the first send failure is returned afterwards.
    pub fn write(&self, block: BlockId, value: Value) -> Result<(), CoherenceError> {
        self.check_block(block)?;
        let invalidated = self.broadcast(Message::invalidate(block, self.id));
        self.store.lock().set_owner(block, self.id);
        let claimed = self.broadcast(Message::write_claim(block, self.id));
        self.store.lock().install(block, value);
        invalidated.and(claimed)?;
        Ok(())
    }

    /// Applies one message from a peer.
    ///
    /// A fetch for a block this node does not validly hold is answered with nothing and reported
    /// as [`CoherenceError::DirectoryInconsistency`].
    pub fn handle(&self, msg: Message) -> Result<(), CoherenceError> {
        self.check_block(msg.block)?;
        if msg.src == self.id || msg.src.index() >= self.config.num_nodes() {
            return Err(CoherenceError::UnknownSender { src: msg.src });
        }
        match msg.kind {
            MessageKind::Invalidate => self.store.lock().invalidate(msg.block),
            MessageKind::FetchReq => {
                let value = {
                    let mut state = self.store.lock();
                    let value = state.read_local(msg.block);
                    if value.is_some() {
                        state.add_sharer(msg.block, msg.src);
                    }
                    value
                };
                let Some(value) = value else {
                    error!(
                        id = ?self.id,
                        requester = ?msg.src,
                        block = ?msg.block,
                        "Asked to serve a block without a valid copy."
                    );
                    return Err(CoherenceError::DirectoryInconsistency {
                        block: msg.block,
                        requester: msg.src,
                    });
                };
                self.outbound
                    .send(msg.src, Message::fetch_res(msg.block, value, self.id))?;
            }
            MessageKind::FetchRes => {
                let mut state = self.store.lock();
                if state.is_valid(msg.block) {
                    debug!(id = ?self.id, ?msg, "Redundant response overwrites a valid copy.");
                }
                state.install(msg.block, msg.value);
            }
            MessageKind::WriteClaim => self.store.lock().set_owner(msg.block, msg.src),
        }
        Ok(())
    }

    pub fn owner(&self, block: BlockId) -> Result<NodeId, CoherenceError> {
        self.check_block(block)?;
        Ok(self.store.lock().get_owner(block))
    }

    pub fn cache_line(&self, block: BlockId) -> Result<CacheLine, CoherenceError> {
        self.check_block(block)?;
        Ok(self.store.lock().cache_line(block))
    }

    pub fn directory_entry(&self, block: BlockId) -> Result<DirectoryEntry, CoherenceError> {
        self.check_block(block)?;
        Ok(self.store.lock().directory_entry(block))
    }

    /// Stops sending. Peers' receiver loops end once they drain their queues.
    pub fn disconnect(&self) {
        self.outbound.close();
    }

    /// Sends to every peer even if some fail; reports the first failure.
    fn broadcast(&self, msg: Message) -> Result<(), TransportError> {
        let mut first_err = None;
        for peer in NodeId::all(self.config.num_nodes()).filter(|peer| *peer != self.id) {
            if let Err(err) = self.outbound.send(peer, msg) {
                warn!(id = ?self.id, ?peer, ?msg, %err, "Broadcast send failed.");
                first_err.get_or_insert(err);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    fn check_block(&self, block: BlockId) -> Result<(), CoherenceError> {
        if block.get() < self.config.num_blocks() {
            Ok(())
        } else {
            Err(CoherenceError::BlockOutOfRange {
                block,
                num_blocks: self.config.num_blocks(),
            })
        }
    }
}
