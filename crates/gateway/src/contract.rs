// Path: crates/gateway/src/contract.rs

//! The contract between the HTTP surface and the vault core.

use async_trait::async_trait;
use bytecave_api::transport::ReplicateAck;
use bytecave_gc::{GcReport, GcStatus};
use bytecave_replication::IncomingReplica;
use bytecave_types::auth::AuthorizationRecord;
use bytecave_types::blob::{BlobMetadata, StoreStats};
use bytecave_types::error::VaultError;
use bytecave_types::replication::ReplicationStatus;
use bytecave_types::shard::ShardRange;
use bytecave_types::Cid;
use serde::{Deserialize, Serialize};

/// A write entering the pipeline.
#[derive(Debug, Clone)]
pub struct StoreRequest {
    pub ciphertext: Vec<u8>,
    pub mime_type: String,
    pub authorization: AuthorizationRecord,
}

/// The receipt returned for an accepted write.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreReceipt {
    pub success: bool,
    pub cid: Cid,
    pub timestamp: i64,
    pub replication_status: ReplicationStatus,
}

/// A blob served by the read path.
#[derive(Debug, Clone)]
pub struct FetchedBlob {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    /// False when the copy came from peers via consensus fetch.
    pub local: bool,
}

/// The `/health` payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub node_id: String,
    pub uptime_secs: u64,
    pub stats: StoreStats,
    /// Fraction of requests served without an internal failure.
    pub success_rate: f64,
}

/// The `/shards` ownership report.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShardReport {
    pub shard_count: u32,
    pub ranges: Vec<ShardRange>,
    pub explicit: Vec<u32>,
    pub owned_shards: u64,
    /// Mean number of known nodes covering each shard, this node included.
    pub avg_nodes_per_shard: f64,
}

/// Everything the router needs from the vault core.
#[async_trait]
pub trait VaultApi: Send + Sync {
    /// The authorized write pipeline.
    async fn store(&self, request: StoreRequest) -> Result<StoreReceipt, VaultError>;

    /// Local read with consensus fallback.
    async fn fetch(&self, cid: &Cid) -> Result<FetchedBlob, VaultError>;

    /// Whether the blob is held locally. Serves existence probes.
    async fn contains(&self, cid: &Cid) -> bool;

    async fn list(&self) -> Result<Vec<BlobMetadata>, VaultError>;

    async fn health(&self) -> HealthReport;

    async fn shard_report(&self) -> ShardReport;

    async fn gc_status(&self) -> GcStatus;

    async fn run_gc(&self, dry_run: bool) -> Result<GcReport, VaultError>;

    async fn pin(&self, cid: &Cid) -> Result<(), VaultError>;

    async fn unpin(&self, cid: &Cid) -> Result<(), VaultError>;

    async fn list_pinned(&self) -> Result<Vec<BlobMetadata>, VaultError>;

    /// The replication intake for pushes from peers.
    async fn replicate_in(&self, replica: IncomingReplica) -> Result<ReplicateAck, VaultError>;
}
