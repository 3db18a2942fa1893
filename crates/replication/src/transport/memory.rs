// Path: crates/replication/src/transport/memory.rs

//! An in-memory federation of simulated peers. Tests script each peer's
//! behavior (honest, refusing, timing out, or lying) and observe how the
//! engines react.

use async_trait::async_trait;
use bytecave_api::transport::{PeerHealth, PeerTransport, ReplicaMeta, ReplicateAck, TransportError};
use bytecave_types::peer::PeerRecord;
use bytecave_types::Cid;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// How a simulated peer responds.
#[derive(Debug, Clone)]
pub enum PeerBehavior {
    /// Stores and serves faithfully.
    Honest,
    /// Refuses every call with a rejection.
    Refusing,
    /// Hangs until the caller's deadline fires.
    Unresponsive,
    /// Serves these bytes for every fetch, whatever was stored.
    Lying(Vec<u8>),
}

#[derive(Default)]
struct SimPeer {
    blobs: DashMap<Cid, Vec<u8>>,
    behavior: Option<PeerBehavior>,
}

/// The shared federation: one instance is handed to every engine under test.
#[derive(Default)]
pub struct InMemoryFederation {
    peers: DashMap<String, Arc<SimPeer>>,
    replicate_calls: AtomicU64,
}

impl InMemoryFederation {
    pub fn new() -> Self {
        Self::default()
    }

    fn peer(&self, node_id: &str) -> Arc<SimPeer> {
        self.peers
            .entry(node_id.to_string())
            .or_insert_with(|| Arc::new(SimPeer::default()))
            .clone()
    }

    pub fn set_behavior(&self, node_id: &str, behavior: PeerBehavior) {
        let peer = self.peer(node_id);
        // Entries are Arc-shared; replace through a fresh SimPeer carrying
        // the same blobs would lose them, so store behavior via interior map.
        self.peers.insert(
            node_id.to_string(),
            Arc::new(SimPeer {
                blobs: peer.blobs.clone(),
                behavior: Some(behavior),
            }),
        );
    }

    /// Seeds a blob directly into a peer's store.
    pub fn seed(&self, node_id: &str, cid: Cid, bytes: Vec<u8>) {
        self.peer(node_id).blobs.insert(cid, bytes);
    }

    /// Simulates a peer silently dropping a blob.
    pub fn remove_blob(&self, node_id: &str, cid: &Cid) {
        self.peer(node_id).blobs.remove(cid);
    }

    pub fn holds(&self, node_id: &str, cid: &Cid) -> bool {
        self.peers
            .get(node_id)
            .map(|p| p.blobs.contains_key(cid))
            .unwrap_or(false)
    }

    pub fn replicate_calls(&self) -> u64 {
        self.replicate_calls.load(Ordering::Relaxed)
    }

    async fn act(&self, node_id: &str) -> Result<Arc<SimPeer>, TransportError> {
        let peer = self.peer(node_id);
        match &peer.behavior {
            Some(PeerBehavior::Refusing) => Err(TransportError::Rejected {
                code: "FORBIDDEN".into(),
                message: "scripted refusal".into(),
            }),
            Some(PeerBehavior::Unresponsive) => {
                // Outlive any sane test deadline.
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(TransportError::Timeout)
            }
            _ => Ok(peer),
        }
    }
}

#[async_trait]
impl PeerTransport for InMemoryFederation {
    async fn replicate(
        &self,
        peer: &PeerRecord,
        cid: &Cid,
        bytes: &[u8],
        _mime_type: &str,
        _meta: &ReplicaMeta,
    ) -> Result<ReplicateAck, TransportError> {
        self.replicate_calls.fetch_add(1, Ordering::Relaxed);
        let sim = self.act(&peer.node_id).await?;
        let already_stored = sim.blobs.contains_key(cid);
        if !already_stored {
            sim.blobs.insert(*cid, bytes.to_vec());
        }
        Ok(ReplicateAck {
            stored: true,
            already_stored,
        })
    }

    async fn fetch_blob(
        &self,
        peer: &PeerRecord,
        cid: &Cid,
    ) -> Result<Option<Vec<u8>>, TransportError> {
        let sim = self.act(&peer.node_id).await?;
        if let Some(PeerBehavior::Lying(bytes)) = &sim.behavior {
            return Ok(Some(bytes.clone()));
        }
        Ok(sim.blobs.get(cid).map(|b| b.clone()))
    }

    async fn probe_has(&self, peer: &PeerRecord, cid: &Cid) -> Result<bool, TransportError> {
        let sim = self.act(&peer.node_id).await?;
        Ok(sim.blobs.contains_key(cid))
    }

    async fn health(&self, peer: &PeerRecord) -> Result<PeerHealth, TransportError> {
        self.act(&peer.node_id).await?;
        Ok(PeerHealth {
            healthy: true,
            latency_ms: 1,
        })
    }
}
