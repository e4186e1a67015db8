//! Merging remote version vectors into local state.
//!
//! Pure functions: the caller owns locking and callback delivery. A merge
//! walks the remote vector in canonical order, raises every local entry the
//! remote knows better, and reports the sequence-number gaps the host should
//! now fetch.

use statesync_proto::{NodeId, SeqNo, VersionVector};

/// A contiguous range of sequence numbers missing from local state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingDataInfo {
    /// The session (publisher) the data belongs to.
    pub session: NodeId,
    /// Lowest missing sequence number.
    pub low: SeqNo,
    /// Highest missing sequence number.
    pub high: SeqNo,
}

/// How absent entries in an observed vector are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorPolicy {
    /// The observed vector is complete: an absent entry means the sender
    /// knows nothing from that node.
    Complete,
    /// The observed vector is a subset: an absent (zero) entry means the
    /// sender said nothing about that node, not that it is behind.
    Partial,
}

/// Result of merging a remote vector into local state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Local state holds something the remote vector does not.
    pub local_newer: bool,
    /// The remote vector held something local state did not.
    pub remote_newer: bool,
    /// Gaps discovered during the merge, one entry per session.
    pub missing: Vec<MissingDataInfo>,
}

/// Merges `remote` into `local`, raising local entries pointwise and
/// collecting the discovered gaps.
///
/// Idempotent: merging the same remote vector twice yields no missing
/// ranges and no `remote_newer` flag the second time.
pub fn merge(
    local: &mut VersionVector,
    remote: &VersionVector,
    policy: VectorPolicy,
) -> MergeOutcome {
    let mut outcome = MergeOutcome::default();

    for (nid, seq_remote) in remote.iter() {
        let seq_local = local.get(nid);
        if seq_remote > seq_local {
            outcome.remote_newer = true;
            outcome.missing.push(MissingDataInfo {
                session: nid.clone(),
                low: seq_local + 1,
                high: seq_remote,
            });
            local.set(nid.clone(), seq_remote);
        }
    }

    outcome.local_newer = local_newer_than(local, remote, policy);
    outcome
}

/// Returns `true` if `local` holds a sequence number newer than what
/// `observed` reports, under the given policy.
pub fn local_newer_than(
    local: &VersionVector,
    observed: &VersionVector,
    policy: VectorPolicy,
) -> bool {
    local.iter().any(|(nid, seq)| {
        let seq_observed = observed.get(nid);
        match policy {
            VectorPolicy::Complete => seq_observed < seq,
            VectorPolicy::Partial => seq_observed > 0 && seq_observed < seq,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vv(entries: &[(&str, SeqNo)]) -> VersionVector {
        let mut v = VersionVector::new();
        for (nid, seq) in entries {
            v.set(NodeId::from(*nid), *seq);
        }
        v
    }

    #[test]
    fn test_missing_data_delta() {
        let mut local = vv(&[("B", 4)]);
        let remote = vv(&[("B", 7)]);

        let outcome = merge(&mut local, &remote, VectorPolicy::Complete);
        assert!(outcome.remote_newer);
        assert_eq!(
            outcome.missing,
            vec![MissingDataInfo {
                session: NodeId::from("B"),
                low: 5,
                high: 7,
            }]
        );
        assert_eq!(local.get(&NodeId::from("B")), 7);
    }

    #[test]
    fn test_two_node_exchange() {
        let mut local = vv(&[("A", 3)]);
        let remote = vv(&[("B", 5)]);

        let outcome = merge(&mut local, &remote, VectorPolicy::Complete);
        assert!(outcome.remote_newer);
        assert!(outcome.local_newer, "A:3 is unknown to the remote");
        assert_eq!(
            outcome.missing,
            vec![MissingDataInfo {
                session: NodeId::from("B"),
                low: 1,
                high: 5,
            }]
        );
        assert_eq!(local, vv(&[("A", 3), ("B", 5)]));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let mut local = vv(&[("A", 3)]);
        let remote = vv(&[("A", 3), ("B", 5)]);

        let first = merge(&mut local, &remote, VectorPolicy::Complete);
        assert!(first.remote_newer);

        let second = merge(&mut local, &remote, VectorPolicy::Complete);
        assert!(!second.remote_newer);
        assert!(second.missing.is_empty());
        assert!(!second.local_newer);
    }

    #[test]
    fn test_equal_vectors_yield_nothing() {
        let mut local = vv(&[("A", 2), ("B", 5)]);
        let remote = vv(&[("A", 2), ("B", 5)]);

        let outcome = merge(&mut local, &remote, VectorPolicy::Complete);
        assert_eq!(outcome, MergeOutcome::default());
    }

    #[test]
    fn test_partial_policy_ignores_unknown_nodes() {
        // Local knows {X:5, Y:2}; a partial sync carries only {X:5}.
        let mut local = vv(&[("X", 5), ("Y", 2)]);
        let remote = vv(&[("X", 5)]);

        let outcome = merge(&mut local, &remote, VectorPolicy::Partial);
        assert!(!outcome.local_newer, "Y is unknown to a partial sender");
        assert!(!outcome.remote_newer);
        assert!(outcome.missing.is_empty());

        // Under the complete policy the same exchange reads Y as behind.
        let mut local = vv(&[("X", 5), ("Y", 2)]);
        let outcome = merge(&mut local, &remote, VectorPolicy::Complete);
        assert!(outcome.local_newer);
    }

    #[test]
    fn test_partial_policy_still_detects_stale_entries() {
        let mut local = vv(&[("X", 5)]);
        let remote = vv(&[("X", 3)]);

        let outcome = merge(&mut local, &remote, VectorPolicy::Partial);
        assert!(outcome.local_newer, "X:3 is present and behind");
    }

    #[test]
    fn test_lower_remote_entries_do_not_regress_local() {
        let mut local = vv(&[("A", 9)]);
        let remote = vv(&[("A", 2)]);

        let outcome = merge(&mut local, &remote, VectorPolicy::Complete);
        assert!(!outcome.remote_newer);
        assert!(outcome.missing.is_empty());
        assert_eq!(local.get(&NodeId::from("A")), 9);
    }

    #[test]
    fn test_missing_reported_in_canonical_order() {
        let mut local = VersionVector::new();
        let remote = vv(&[("zeta", 1), ("alpha", 2), ("mid", 3)]);

        let outcome = merge(&mut local, &remote, VectorPolicy::Complete);
        let sessions: Vec<String> = outcome
            .missing
            .iter()
            .map(|m| m.session.to_string())
            .collect();
        assert_eq!(sessions, ["alpha", "mid", "zeta"]);
    }

    #[test]
    fn test_zero_seeded_local_entry_under_partial_policy() {
        // A freshly constructed instance seeds itself at zero. A partial
        // sender that omits us must not make us look newer.
        let mut local = vv(&[("me", 0), ("X", 4)]);
        let remote = vv(&[("X", 4)]);

        let outcome = merge(&mut local, &remote, VectorPolicy::Partial);
        assert!(!outcome.local_newer);
    }
}
