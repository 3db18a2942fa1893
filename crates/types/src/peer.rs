// Path: crates/types/src/peer.rs

//! Peer records, local observations, and misbehavior accounting.

use crate::UnixMillis;
use serde::{Deserialize, Serialize};

/// A peer as published by the authoritative on-chain registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PeerRecord {
    pub node_id: String,
    pub endpoint: String,
    pub public_key: String,
    pub active: bool,
    /// The peer's advertised shard ownership spec, when it publishes one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shards: Option<String>,
}

/// A rolling local observation of one peer's behavior.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PeerObservation {
    pub success_count: u64,
    pub failure_count: u64,
    pub avg_latency_ms: f64,
    /// Last time a valid proof or response was seen from this peer.
    pub last_seen: UnixMillis,
    pub cached_at: UnixMillis,
}

impl PeerObservation {
    pub fn new(now: UnixMillis) -> Self {
        PeerObservation {
            success_count: 0,
            failure_count: 0,
            avg_latency_ms: 0.0,
            last_seen: now,
            cached_at: now,
        }
    }

    /// Fraction of interactions that succeeded, 1.0 when unobserved.
    pub fn success_rate(&self) -> f64 {
        let total = self.success_count + self.failure_count;
        if total == 0 {
            return 1.0;
        }
        self.success_count as f64 / total as f64
    }
}

/// A misbehavior event reported against a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MisbehaviorKind {
    InvalidProof,
    CidMismatch,
    CorruptBlob,
    Timeout,
}

/// One entry of the append-only reputation event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReputationEvent {
    pub node_id: String,
    pub kind: MisbehaviorKind,
    pub at: UnixMillis,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Weights of the peer score components. Defaults are fixed by the
/// federation; construction-time overrides exist for tuning experiments.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub freshness: f64,
    pub latency: f64,
    pub reliability: f64,
    pub capacity: f64,
    pub shard_relevance: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        ScoreWeights {
            freshness: 0.40,
            latency: 0.20,
            reliability: 0.20,
            capacity: 0.10,
            shard_relevance: 0.10,
        }
    }
}
