use {
    dsm_core::{BlockId, DecodeError, NodeId},
    std::{io, path::PathBuf, time::Duration},
};

/// The peer list or engine parameters are unusable. Fatal: the node cannot start.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("unable to read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("line {line}: {reason}")]
    Parse { line: usize, reason: String },
    #[error("expected {expected} peers, found {found}")]
    PeerCount { expected: usize, found: usize },
    #[error("{id} is outside a cluster of {num_nodes} nodes")]
    NodeOutOfRange { id: usize, num_nodes: usize },
    #[error("invalid engine parameter: {0}")]
    Engine(&'static str),
    #[error("unknown home policy {0:?} (expected lowest, interleaved or node:<id>)")]
    HomePolicy(String),
}

/// The script could not be turned into operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum WorkloadError {
    #[error("unable to read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("token {position}: unknown operation {token:?}")]
    UnknownOp { position: usize, token: String },
    #[error("token {position}: expected {expected} after {op}")]
    MissingOperand {
        position: usize,
        op: char,
        expected: &'static str,
    },
    #[error("token {position}: {token:?} is not a valid {expected}")]
    BadOperand {
        position: usize,
        token: String,
        expected: &'static str,
    },
}

/// Failure on an established channel. There is no reconnection, so the channel is done for.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum TransportError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("channel to {peer} is closed")]
    ChannelClosed { peer: NodeId },
    #[error("no channel to {peer}")]
    UnknownPeer { peer: NodeId },
    #[error("undecodable frame from {peer}")]
    Decode {
        peer: NodeId,
        #[source]
        source: DecodeError,
    },
    #[error("handshake failed: {0}")]
    Handshake(String),
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum CoherenceError {
    /// A fetch got no response in time. Fails the operation, not the process.
    #[error("coherence timeout: block {block} not filled by {owner} within {waited:?}")]
    Timeout {
        block: BlockId,
        owner: NodeId,
        waited: Duration,
    },
    /// This node was asked to serve a block it does not validly hold.
    #[error(
        "directory inconsistency: {requester} fetched block {block} from a node without a valid copy"
    )]
    DirectoryInconsistency { block: BlockId, requester: NodeId },
    #[error("block {block} is outside the {num_blocks}-block address space")]
    BlockOutOfRange { block: BlockId, num_blocks: usize },
    #[error("message from {src}, which is not a peer")]
    UnknownSender { src: NodeId },
    /// The operation never ran because its thread could not be started.
    #[error("unable to spawn operation thread")]
    Spawn(#[source] io::Error),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Anything that stops a node from starting or finishing its workload.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Workload(#[from] WorkloadError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("unable to spawn thread")]
    Spawn(#[source] io::Error),
}
