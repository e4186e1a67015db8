//! # statesync-proto
//!
//! Wire format for the statesync distributed state-synchronization protocol.
//!
//! ## Features
//!
//! - TLV encoding primitives with variable-size type and length numbers
//! - Hierarchical [`Name`]s with negative indexing and percent-escaped display
//! - [`VersionVector`]: per-node sequence numbers with canonical and
//!   recency-ordered views
//! - Five vector encodings: full, chunked, most-recent, most-recent plus
//!   random sample, and random sample — the partial variants keep sync
//!   packets small in large groups
//! - [`SyncPacket`] name layout and signing-input extraction
//!
//! This crate is pure data plumbing: no I/O, no timers, no policy. The sync
//! state machine lives in the `statesync` crate.

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod error;
pub mod name;
pub mod packet;
pub mod tlv;
pub mod vector;

pub use self::error::CodecError;
pub use self::name::{Component, Name};
pub use self::packet::SyncPacket;
pub use self::vector::{NodeId, SeqNo, VersionVector, ENTRY_OVERHEAD};
