// Path: crates/types/src/replication.rs

//! Per-CID replication state, persisted with an integrity tag.

use crate::cid::Cid;
use crate::UnixMillis;
use serde::{Deserialize, Serialize};

/// The durable record tracking how widely one blob has been replicated.
///
/// `integrity_hash` is an HMAC over the canonicalized tuple of the other
/// fields; records whose tag fails verification on load are discarded, never
/// silently trusted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationState {
    pub cid: Cid,
    pub replication_factor: u32,
    pub target_nodes: Vec<String>,
    pub confirmed_nodes: Vec<String>,
    pub failed_nodes: Vec<String>,
    pub last_updated: UnixMillis,
    pub complete: bool,
    #[serde(default)]
    pub integrity_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_verified: Option<UnixMillis>,
}

impl ReplicationState {
    pub fn new(cid: Cid, replication_factor: u32, now: UnixMillis) -> Self {
        ReplicationState {
            cid,
            replication_factor,
            target_nodes: Vec::new(),
            confirmed_nodes: Vec::new(),
            failed_nodes: Vec::new(),
            last_updated: now,
            complete: false,
            integrity_hash: String::new(),
            last_verified: None,
        }
    }

    /// Recomputes the `complete` flag from the confirmed set.
    pub fn recompute_complete(&mut self) {
        self.complete = self.confirmed_nodes.len() as u32 >= self.replication_factor;
    }

    /// The invariant `confirmed ∩ failed = ∅` plus the completeness rule.
    pub fn is_consistent(&self) -> bool {
        let disjoint = !self
            .confirmed_nodes
            .iter()
            .any(|n| self.failed_nodes.contains(n));
        let complete_ok =
            self.complete == (self.confirmed_nodes.len() as u32 >= self.replication_factor);
        disjoint && complete_ok
    }
}

/// Why a peer was passed over during target selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExclusionReason {
    Reputation,
    Shard,
    PriorFailure,
}

/// One excluded peer with the reason, kept for observability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExcludedPeer {
    pub node_id: String,
    pub reason: ExclusionReason,
}

/// The replication outcome reported back to a writer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationStatus {
    pub target: u32,
    pub confirmed: u32,
    pub complete: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cid() -> Cid {
        "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
            .parse()
            .unwrap()
    }

    #[test]
    fn complete_tracks_confirmed_count() {
        let mut st = ReplicationState::new(cid(), 2, 0);
        st.confirmed_nodes.push("a".into());
        st.recompute_complete();
        assert!(!st.complete);
        st.confirmed_nodes.push("b".into());
        st.recompute_complete();
        assert!(st.complete);
        assert!(st.is_consistent());
    }

    #[test]
    fn overlap_breaks_consistency() {
        let mut st = ReplicationState::new(cid(), 3, 0);
        st.confirmed_nodes.push("a".into());
        st.failed_nodes.push("a".into());
        st.recompute_complete();
        assert!(!st.is_consistent());
    }
}
