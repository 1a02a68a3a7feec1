//! A simulator for directory-based, invalidation-style cache coherence across a fixed set of
//! nodes, as used by distributed shared memory systems.
//!
//! Each node keeps a cache line and a directory entry for every block. Reads are served locally
//! when the line is valid and otherwise fetched from the owner named by the node's own directory
//! view. Writes invalidate every peer, broadcast an ownership claim, then install the value. No
//! acknowledgements are collected, so peers converge on one owner only after every claim is
//! delivered; see [`Engine`] for the resulting weak-consistency window.
//!
//! # Example
//!
//! ```rust
//! use {
//!     dsm::{Cluster, EngineConfig},
//!     dsm_core::{BlockId, NodeId},
//! };
//!
//! let cluster = Cluster::start(EngineConfig::new(2, 1))?;
//! let (one, two) = (NodeId::from_index(0), NodeId::from_index(1));
//! let block = BlockId::new(0);
//!
//! // Node 1 is the home node, so node 2 fetches the initial value from it.
//! assert_eq!(cluster.node(two).engine().read(block)?, 0);
//!
//! cluster.node(one).engine().write(block, 42)?;
//! // The claim follows the invalidation on the same channel, so once node 2 sees the new owner
//! // its stale copy is already gone.
//! while cluster.node(two).engine().owner(block)? != one {
//!     std::thread::yield_now();
//! }
//! assert_eq!(cluster.node(two).engine().read(block)?, 42);
//!
//! cluster.shutdown().expect("receiver panicked");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Processes on different hosts connect with [`TcpRuntime`] instead of the in-memory
//! [`mesh`]; the `dsm_node` binary wires that up from a peer list and a command script.
//!
//! # Features
//!
//! - `serde`: Implement `Serialize` and `Deserialize` where applicable.

#![cfg_attr(all(doc, CHANNEL_NIGHTLY), feature(doc_auto_cfg))]
#![deny(unused_must_use)]
#![warn(rust_2018_idioms, unreachable_pub)]

mod cluster;
mod config;
mod engine;
mod error;
mod node;
mod receiver;
mod scheduler;
mod store;
mod tcp;
pub mod transport;
mod workload;

pub use cluster::Cluster;
pub use config::{ClusterConfig, EngineConfig, HomePolicy};
pub use engine::Engine;
pub use error::{CoherenceError, ConfigError, Error, TransportError, WorkloadError};
pub use node::Node;
pub use scheduler::{run_workload, OperationReport};
pub use store::{CacheLine, DirectoryEntry};
pub use tcp::TcpRuntime;
pub use transport::{mesh, Endpoint, Inbound, Outbound};
pub use workload::Workload;
