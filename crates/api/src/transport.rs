// Path: crates/api/src/transport.rs

//! The pluggable peer transport. Discovery and gossip live outside the core;
//! the vault only needs these four verbs against an already-known peer.

use async_trait::async_trait;
use bytecave_types::peer::PeerRecord;
use bytecave_types::Cid;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Transport-level failures. These feed reputation, never abort a write on
/// their own.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("peer timed out")]
    Timeout,
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("protocol error: {0}")]
    Protocol(String),
    /// The peer answered with a vault error envelope.
    #[error("peer rejected: {code}: {message}")]
    Rejected { code: String, message: String },
}

/// A peer's acknowledgement of a replication push.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicateAck {
    pub stored: bool,
    /// The peer already held this CID; no state was mutated on its side.
    #[serde(default)]
    pub already_stored: bool,
}

/// Application metadata forwarded with a replication push.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicaMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guild_id: Option<String>,
    /// The pushing node's id, so the receiver can attribute the copy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_peer: Option<String>,
}

/// A peer's liveness report.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerHealth {
    pub healthy: bool,
    #[serde(default)]
    pub latency_ms: u64,
}

/// Dialing verbs against a single known peer. Implementations must enforce
/// their own per-call deadlines.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Pushes a blob to a peer for replication.
    async fn replicate(
        &self,
        peer: &PeerRecord,
        cid: &Cid,
        bytes: &[u8],
        mime_type: &str,
        meta: &ReplicaMeta,
    ) -> Result<ReplicateAck, TransportError>;

    /// Fetches a blob from a peer. `Ok(None)` means the peer answered but
    /// does not hold the CID.
    async fn fetch_blob(&self, peer: &PeerRecord, cid: &Cid)
        -> Result<Option<Vec<u8>>, TransportError>;

    /// Existence probe; never transfers the blob body.
    async fn probe_has(&self, peer: &PeerRecord, cid: &Cid) -> Result<bool, TransportError>;

    /// Liveness probe.
    async fn health(&self, peer: &PeerRecord) -> Result<PeerHealth, TransportError>;
}
