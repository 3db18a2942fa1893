// Path: crates/api/src/query.rs

//! Narrow inverse-dependency queries. GC consults replication through this
//! interface instead of sharing mutable state with the engine.

use async_trait::async_trait;
use bytecave_types::Cid;

/// Replication facts the garbage collector is allowed to ask for.
#[async_trait]
pub trait ReplicationProbe: Send + Sync {
    /// Live existence probes against the peers believed to hold `cid`;
    /// returns how many distinct *other* nodes confirmed a copy. This count
    /// drives deletion safety, never the locally-claimed one.
    async fn verified_replica_count(&self, cid: &Cid) -> usize;

    /// The locally-recorded count of other nodes confirmed to hold `cid`.
    async fn claimed_replica_count(&self, cid: &Cid) -> usize;

    /// Whether deleting the local copy keeps the blob at its replication
    /// factor: the verified copies plus this node's must reach R.
    async fn is_safe_to_delete(&self, cid: &Cid) -> bool;
}
