// Path: crates/types/src/blob.rs

//! Per-blob metadata records and store-level statistics.

use crate::cid::Cid;
use crate::UnixMillis;
use serde::{Deserialize, Serialize};

/// The current metadata schema version written to disk.
pub const METADATA_SCHEMA_VERSION: u32 = 1;

/// The sidecar record stored next to every ciphertext blob.
///
/// Created at ingest, mutated by access (metrics), pin toggles, and
/// replication confirmations. Destroyed only by garbage collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BlobMetadata {
    pub cid: Cid,
    /// Size of the stored ciphertext in bytes (pre-compression).
    pub size: u64,
    pub mime_type: String,
    pub created_at: UnixMillis,
    /// Metadata schema version.
    pub version: u32,
    pub pinned: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrity_hash: Option<String>,
    /// Application-level content classification (e.g. `media`, `message`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guild_id: Option<String>,
    /// Whether the on-disk bytes are gzip-compressed.
    #[serde(default)]
    pub compressed: bool,
    #[serde(default)]
    pub replication: ReplicationInfo,
    #[serde(default)]
    pub metrics: BlobMetrics,
}

impl BlobMetadata {
    /// A fresh record for a newly ingested blob.
    pub fn new(cid: Cid, size: u64, mime_type: impl Into<String>, created_at: UnixMillis) -> Self {
        BlobMetadata {
            cid,
            size,
            mime_type: mime_type.into(),
            created_at,
            version: METADATA_SCHEMA_VERSION,
            pinned: false,
            integrity_hash: None,
            content_type: None,
            guild_id: None,
            compressed: false,
            replication: ReplicationInfo::default(),
            metrics: BlobMetrics::default(),
        }
    }

    /// Age of the blob in whole days at `now`.
    pub fn age_days(&self, now: UnixMillis) -> f64 {
        ((now - self.created_at).max(0) as f64) / 86_400_000.0
    }

    /// Days since the blob was last read, falling back to its age.
    pub fn idle_days(&self, now: UnixMillis) -> f64 {
        let reference = if self.metrics.last_accessed > 0 {
            self.metrics.last_accessed
        } else {
            self.created_at
        };
        ((now - reference).max(0) as f64) / 86_400_000.0
    }
}

/// Where this blob came from and who else confirmed holding it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_peer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicated_at: Option<UnixMillis>,
    #[serde(default)]
    pub replicated_to: Vec<String>,
}

/// Rolling access metrics, updated on every successful read.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BlobMetrics {
    pub retrieval_count: u64,
    #[serde(default)]
    pub last_accessed: UnixMillis,
    #[serde(default)]
    pub avg_latency_ms: f64,
}

/// Aggregate statistics over the local store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub blob_count: u64,
    pub total_size: u64,
    pub pinned_count: u64,
    pub pinned_size: u64,
}
