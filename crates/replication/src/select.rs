// Path: crates/replication/src/select.rs

//! Deterministic replication target selection.
//!
//! Peers are ordered by rendezvous hashing (SHA-256 over the CID followed
//! by the node id, descending), so every node derives the same target list
//! for a CID from the same peer set, without coordination.

use bytecave_types::peer::PeerRecord;
use bytecave_types::replication::{ExcludedPeer, ExclusionReason};
use bytecave_types::shard::ShardMap;
use bytecave_types::Cid;
use sha2::{Digest, Sha256};
use std::collections::HashSet;

/// Peers scoring below this are not trusted with replicas.
pub const REPUTATION_FLOOR: f64 = 20.0;

/// A candidate with its locally-computed reputation score.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub record: PeerRecord,
    pub score: f64,
}

/// The outcome of one selection round.
#[derive(Debug, Clone, Default)]
pub struct SelectionOutcome {
    pub targets: Vec<PeerRecord>,
    pub excluded: Vec<ExcludedPeer>,
}

fn rendezvous_weight(cid: &Cid, node_id: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(cid.as_bytes());
    hasher.update(node_id.as_bytes());
    hasher.finalize().into()
}

fn owns_cid_shard(record: &PeerRecord, cid: &Cid, shard_count: u32) -> bool {
    match &record.shards {
        // A peer that does not advertise ownership is assumed to hold the
        // full keyspace, matching a default-configured node.
        None => true,
        Some(spec) => ShardMap::parse(spec, shard_count)
            .map(|map| map.owns_cid(cid))
            .unwrap_or(false),
    }
}

/// Picks up to `r` replication targets for `cid` from `candidates`.
///
/// The rendezvous ordering is applied first, then peers are filtered in
/// order: previously-failed peers, reputation floor, shard ownership. Every
/// exclusion is recorded with its reason.
pub fn select_targets(
    cid: &Cid,
    candidates: &[Candidate],
    r: usize,
    shard_count: u32,
    prior_failures: &HashSet<String>,
) -> SelectionOutcome {
    let mut ordered: Vec<&Candidate> = candidates.iter().collect();
    ordered.sort_by(|a, b| {
        rendezvous_weight(cid, &b.record.node_id).cmp(&rendezvous_weight(cid, &a.record.node_id))
    });

    let mut outcome = SelectionOutcome::default();
    for candidate in ordered {
        if outcome.targets.len() >= r {
            break;
        }
        let node_id = &candidate.record.node_id;
        if prior_failures.contains(node_id) {
            outcome.excluded.push(ExcludedPeer {
                node_id: node_id.clone(),
                reason: ExclusionReason::PriorFailure,
            });
            continue;
        }
        if candidate.score < REPUTATION_FLOOR {
            outcome.excluded.push(ExcludedPeer {
                node_id: node_id.clone(),
                reason: ExclusionReason::Reputation,
            });
            continue;
        }
        if !owns_cid_shard(&candidate.record, cid, shard_count) {
            outcome.excluded.push(ExcludedPeer {
                node_id: node_id.clone(),
                reason: ExclusionReason::Shard,
            });
            continue;
        }
        outcome.targets.push(candidate.record.clone());
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytecave_peers::registry::test_peer;

    fn candidates(ids: &[&str]) -> Vec<Candidate> {
        ids.iter()
            .map(|id| Candidate {
                record: test_peer(id),
                score: 80.0,
            })
            .collect()
    }

    fn cid(byte: u8) -> Cid {
        Cid::from_digest([byte; 32])
    }

    #[test]
    fn selection_is_deterministic_and_order_independent() {
        let cands = candidates(&["a", "b", "c", "d", "e"]);
        let mut shuffled = cands.clone();
        shuffled.reverse();
        let none = HashSet::new();
        let first = select_targets(&cid(7), &cands, 3, 1024, &none);
        let second = select_targets(&cid(7), &shuffled, 3, 1024, &none);
        let ids = |o: &SelectionOutcome| {
            o.targets.iter().map(|t| t.node_id.clone()).collect::<Vec<_>>()
        };
        assert_eq!(ids(&first), ids(&second));
        assert_eq!(first.targets.len(), 3);
    }

    #[test]
    fn different_cids_spread_targets() {
        let cands = candidates(&["a", "b", "c", "d", "e", "f", "g", "h"]);
        let none = HashSet::new();
        let firsts: HashSet<String> = (0u8..16)
            .map(|b| {
                select_targets(&cid(b), &cands, 1, 1024, &none)
                    .targets
                    .first()
                    .map(|t| t.node_id.clone())
                    .unwrap_or_default()
            })
            .collect();
        // Rendezvous hashing should not pin every CID to one peer.
        assert!(firsts.len() > 2);
    }

    #[test]
    fn prior_failures_are_excluded_first() {
        let cands = candidates(&["a", "b", "c"]);
        let failed: HashSet<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        let outcome = select_targets(&cid(1), &cands, 2, 1024, &failed);
        assert!(outcome.targets.is_empty());
        assert_eq!(outcome.excluded.len(), 3);
        assert!(outcome
            .excluded
            .iter()
            .all(|e| e.reason == ExclusionReason::PriorFailure));
    }

    #[test]
    fn low_reputation_is_excluded_with_reason() {
        let mut cands = candidates(&["trusted", "shady"]);
        if let Some(c) = cands.iter_mut().find(|c| c.record.node_id == "shady") {
            c.score = REPUTATION_FLOOR - 1.0;
        }
        let outcome = select_targets(&cid(1), &cands, 2, 1024, &HashSet::new());
        assert_eq!(outcome.targets.len(), 1);
        assert_eq!(
            outcome.excluded,
            vec![ExcludedPeer {
                node_id: "shady".into(),
                reason: ExclusionReason::Reputation,
            }]
        );
    }

    #[test]
    fn shard_strangers_are_excluded() {
        let mut cands = candidates(&["holder", "stranger"]);
        for c in cands.iter_mut() {
            c.record.shards = Some(if c.record.node_id == "holder" {
                "0-1023".into()
            } else {
                // Owns a single shard the test CID does not land in.
                "0".into()
            });
        }
        let c = Cid::from_digest([0x20; 32]);
        assert_ne!(c.shard_key(1024), 0);
        let outcome = select_targets(&c, &cands, 2, 1024, &HashSet::new());
        assert_eq!(outcome.targets.len(), 1);
        assert_eq!(outcome.targets.first().unwrap().node_id, "holder");
        assert_eq!(outcome.excluded.first().unwrap().reason, ExclusionReason::Shard);
    }
}
