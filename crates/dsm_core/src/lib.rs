//! Core types for the DSM directory-coherence simulator: participant and block identifiers, the
//! four-message coherence vocabulary with its fixed-width wire codec, and scripted operations.
//!
//! # Usage
//!
//! Please see [the `dsm` docs](https://docs.rs/dsm/).
//!
//! # Features
//!
//! - `serde`: Implement `Serialize` and `Deserialize` where applicable.

#![cfg_attr(all(doc, CHANNEL_NIGHTLY), feature(doc_auto_cfg))]
#![deny(unused_must_use)]
#![warn(rust_2018_idioms, unreachable_pub)]

mod id;
mod message;
mod operation;

pub use id::{BlockId, NodeId, ZeroNodeId};
pub use message::{DecodeError, Message, MessageKind, Value, WIRE_LEN};
pub use operation::Operation;
