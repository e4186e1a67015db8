//! # statesync
//!
//! Distributed state synchronization over named multicast: a group of nodes
//! converges on a shared version vector (node id → latest sequence number)
//! while sending as few sync packets as possible.
//!
//! ## How it works
//!
//! Every node periodically announces its vector with a jittered ~30 s
//! timer. When a node hears that a peer is behind, it schedules a short
//! jittered reply (~200 ms) instead of answering at once; if another peer
//! announces the same news first, the reply is suppressed. Local publishes
//! bypass suppression and announce immediately. Data transfer itself is the
//! host's job: the engine reports missing sequence ranges through a
//! callback and never touches payloads.
//!
//! ## Features
//!
//! - [`SyncLogic`]: the suppression state machine, one instance per node
//!   per sync group
//! - Five vector encodings for large groups (full, chunked, most-recent,
//!   most-recent plus random, random), selected in [`SyncConfig`]
//! - Unsigned, HMAC-SHA256, or host-delegated asymmetric packet signing
//!   via [`SecurityOptions`]
//! - Transport-agnostic: bring any [`SyncTransport`] implementation

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod sched;
pub mod security;
pub mod sync;
pub mod transport;

pub use self::config::{ConfigError, EncodingStrategy, SyncConfig};
pub use self::error::{SyncError, TransportError};
pub use self::sched::{Scheduler, TimerHandle};
pub use self::security::{PacketSigner, PacketValidator, SecurityOptions, SigningMode};
pub use self::sync::{MergeOutcome, MissingDataInfo, SyncLogic, UpdateCallback, VectorPolicy};
pub use self::transport::{PacketHandler, RegisteredPrefix, SyncTransport};

pub use statesync_proto::{Component, Name, NodeId, SeqNo, SyncPacket, VersionVector};
