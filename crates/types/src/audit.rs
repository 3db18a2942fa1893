// Path: crates/types/src/audit.rs

//! Read-path audit records: disputes between replicas and censorship events.

use crate::cid::Cid;
use crate::UnixMillis;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How a dispute over conflicting replica contents stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeResolution {
    Pending,
    Resolved,
    Unresolvable,
}

/// Replicas of the same CID returned different ciphertexts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisputeRecord {
    pub cid: Cid,
    /// Observed ciphertext hash → the nodes that served it.
    pub conflicting_hashes: BTreeMap<String, Vec<String>>,
    pub resolution: DisputeResolution,
    pub recorded_at: UnixMillis,
}

/// The way a replica failed to serve a CID it should hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CensorshipKind {
    Refusal,
    Timeout,
    InvalidResponse,
}

/// A replica refused, timed out, or answered garbage for a CID it should hold.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CensorshipEvent {
    pub cid: Cid,
    pub node_id: String,
    pub at: UnixMillis,
    pub kind: CensorshipKind,
}
