//! The version vector: per-node latest sequence numbers.
//!
//! A [`VersionVector`] keeps two views of the same entry set: the canonical
//! map ordered by node id (used for deterministic full encodings) and a
//! recency list ordered by last update (used by the partial encodings that
//! prioritize recently active nodes). Every mutation keeps the views in
//! lockstep.

use std::collections::BTreeMap;
use std::fmt;

use bytes::BytesMut;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::{CodecError, Result};
use crate::tlv;

/// Per-entry wire overhead estimate used by the size-capped encodings.
///
/// Covers the key/value TLV framing and the integer payload; the true cost
/// is a few bytes lower for short sequence numbers, so caps are advisory.
pub const ENTRY_OVERHEAD: usize = 16;

/// A monotonically increasing per-node sequence number. Zero means "no data
/// known from this node".
pub type SeqNo = u64;

/// An opaque node identity: a hierarchical name rendered as bytes.
///
/// Equality and ordering are lexicographic on the raw bytes; the sync core
/// never interprets the contents.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(Vec<u8>);

impl NodeId {
    /// Creates a node id from raw bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Returns the raw bytes of the identity.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns the identity length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the identity is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

impl From<&[u8]> for NodeId {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl From<Vec<u8>> for NodeId {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        crate::name::write_escaped(f, &self.0)
    }
}

/// An ordered mapping from [`NodeId`] to [`SeqNo`] with size-capped partial
/// encodings.
#[derive(Debug, Clone, Default)]
pub struct VersionVector {
    entries: BTreeMap<NodeId, SeqNo>,
    /// Node ids ordered by last update; front = least recent.
    recency: Vec<NodeId>,
}

impl VersionVector {
    /// Creates an empty vector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the sequence number for `nid`, or 0 if absent.
    #[must_use]
    pub fn get(&self, nid: &NodeId) -> SeqNo {
        self.entries.get(nid).copied().unwrap_or(0)
    }

    /// Returns `true` if the vector has an entry for `nid`.
    #[must_use]
    pub fn has(&self, nid: &NodeId) -> bool {
        self.entries.contains_key(nid)
    }

    /// Inserts or updates an entry and moves `nid` to the most-recent end of
    /// the recency list. Returns the stored sequence number.
    ///
    /// The protocol only ever raises entries; lowering is permitted by the
    /// data type but callers relying on monotonicity must not do it.
    pub fn set(&mut self, nid: NodeId, seq: SeqNo) -> SeqNo {
        self.recency.retain(|known| known != &nid);
        self.recency.push(nid.clone());
        self.entries.insert(nid, seq);
        seq
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the vector has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over entries in ascending node-id order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (&NodeId, SeqNo)> {
        self.entries.iter().map(|(nid, &seq)| (nid, seq))
    }

    /// Iterates over node ids in ascending order.
    pub fn node_ids(&self) -> impl Iterator<Item = &NodeId> {
        self.entries.keys()
    }

    /// Encodes the full vector as one TLV block.
    ///
    /// Entries appear in ascending node-id order, so two vectors holding the
    /// same mapping encode to identical bytes regardless of insertion order.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        encode_entries(self.iter())
    }

    /// Splits the vector into chunks, each encoding a disjoint subset of the
    /// entries and estimated to stay within `cap` bytes.
    ///
    /// Every entry lands in exactly one chunk. An empty vector yields a
    /// single chunk with no entries.
    #[must_use]
    pub fn encode_chunked(&self, cap: usize) -> Vec<Vec<u8>> {
        if self.entries.is_empty() {
            return vec![self.encode()];
        }

        let mut chunks = Vec::new();
        let mut pending: Vec<&NodeId> = Vec::new();
        let mut key_bytes = 0usize;

        for nid in self.entries.keys().rev() {
            let projected = key_bytes + nid.len() + (pending.len() + 1) * ENTRY_OVERHEAD;
            if !pending.is_empty() && projected > cap {
                chunks.push(self.encode_subset(&pending));
                pending.clear();
                key_bytes = 0;
            }
            key_bytes += nid.len();
            pending.push(nid);
        }
        chunks.push(self.encode_subset(&pending));
        chunks
    }

    /// Encodes the most recently updated entries, newest first, stopping
    /// before the estimated size exceeds `cap`.
    #[must_use]
    pub fn encode_most_recent(&self, cap: usize) -> Vec<u8> {
        let selected = self.select_most_recent(cap);
        self.encode_subset(&selected)
    }

    /// Encodes the most recently updated entries as in
    /// [`encode_most_recent`](Self::encode_most_recent), then up to `extra`
    /// uniformly sampled entries from the remainder.
    #[must_use]
    pub fn encode_most_recent_and_random<R: Rng + ?Sized>(
        &self,
        cap: usize,
        extra: usize,
        rng: &mut R,
    ) -> Vec<u8> {
        let mut selected = self.select_most_recent(cap);
        let mut remainder: Vec<&NodeId> = self
            .entries
            .keys()
            .filter(|nid| !selected.contains(nid))
            .collect();
        remainder.shuffle(rng);
        selected.extend(remainder.into_iter().take(extra));
        self.encode_subset(&selected)
    }

    /// Encodes uniformly sampled entries, stopping before the estimated size
    /// exceeds `cap`.
    #[must_use]
    pub fn encode_random<R: Rng + ?Sized>(&self, cap: usize, rng: &mut R) -> Vec<u8> {
        let mut candidates: Vec<&NodeId> = self.entries.keys().collect();
        candidates.shuffle(rng);

        let mut selected = Vec::new();
        let mut estimate = 0usize;
        for nid in candidates {
            let cost = nid.len() + ENTRY_OVERHEAD;
            if estimate + cost > cap {
                break;
            }
            estimate += cost;
            selected.push(nid);
        }
        self.encode_subset(&selected)
    }

    /// Decodes a vector from one TLV block.
    ///
    /// Fails when the outer type, the inner key/value types, or the pairing
    /// structure is wrong; the input must be exactly one block.
    pub fn decode(mut input: &[u8]) -> Result<Self> {
        let (ty, mut payload) = tlv::read_tlv(&mut input)?;
        if ty != tlv::VERSION_VECTOR {
            return Err(CodecError::MalformedVector("not a version vector block"));
        }
        if !input.is_empty() {
            return Err(CodecError::MalformedVector("trailing bytes after block"));
        }

        let mut vector = VersionVector::new();
        while !payload.is_empty() {
            let (key_ty, key) = tlv::read_tlv(&mut payload)?;
            if key_ty != tlv::VERSION_VECTOR_KEY {
                return Err(CodecError::MalformedVector("expected key element"));
            }
            if payload.is_empty() {
                return Err(CodecError::MalformedVector("key without value"));
            }
            let (val_ty, val) = tlv::read_tlv(&mut payload)?;
            if val_ty != tlv::VERSION_VECTOR_VALUE {
                return Err(CodecError::MalformedVector("expected value element"));
            }
            let seq = tlv::read_nonneg_integer(val)?;
            vector.set(NodeId::from(key), seq);
        }
        Ok(vector)
    }

    /// Entries from the back of the recency list whose estimated encoding
    /// fits within `cap`.
    fn select_most_recent(&self, cap: usize) -> Vec<&NodeId> {
        let mut selected = Vec::new();
        let mut estimate = 0usize;
        for nid in self.recency.iter().rev() {
            let cost = nid.len() + ENTRY_OVERHEAD;
            if estimate + cost > cap {
                break;
            }
            estimate += cost;
            selected.push(nid);
        }
        selected
    }

    /// Encodes a subset of entries in ascending node-id order.
    fn encode_subset(&self, subset: &[&NodeId]) -> Vec<u8> {
        let mut ordered: Vec<&NodeId> = subset.to_vec();
        ordered.sort_unstable();
        encode_entries(ordered.into_iter().map(|nid| (nid, self.get(nid))))
    }
}

fn encode_entries<'a>(entries: impl Iterator<Item = (&'a NodeId, SeqNo)>) -> Vec<u8> {
    let mut inner = BytesMut::new();
    for (nid, seq) in entries {
        tlv::write_tlv(&mut inner, tlv::VERSION_VECTOR_KEY, nid.as_bytes());
        tlv::write_var_number(&mut inner, tlv::VERSION_VECTOR_VALUE);
        tlv::write_var_number(&mut inner, tlv::nonneg_integer_len(seq) as u64);
        tlv::write_nonneg_integer(&mut inner, seq);
    }
    let mut buf = BytesMut::new();
    tlv::write_tlv(&mut buf, tlv::VERSION_VECTOR, &inner);
    buf.to_vec()
}

impl PartialEq for VersionVector {
    /// Vectors compare as mappings; the recency bookkeeping is ignored.
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl Eq for VersionVector {}

impl fmt::Display for VersionVector {
    /// Human-readable `nid:seq nid:seq ...` in canonical order.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (nid, seq) in self.iter() {
            if !first {
                write!(f, " ")?;
            }
            write!(f, "{}:{}", nid, seq)?;
            first = false;
        }
        Ok(())
    }
}

impl FromIterator<(NodeId, SeqNo)> for VersionVector {
    fn from_iter<I: IntoIterator<Item = (NodeId, SeqNo)>>(iter: I) -> Self {
        let mut vector = VersionVector::new();
        for (nid, seq) in iter {
            vector.set(nid, seq);
        }
        vector
    }
}
