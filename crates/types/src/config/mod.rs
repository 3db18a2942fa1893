// Path: crates/types/src/config/mod.rs

//! Node configuration: every tunable of the vault with its federation
//! default, deserialized from TOML with env overrides applied by the binary.

use crate::error::ConfigError;
use crate::shard::ShardMap;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

fn d_node_env() -> String {
    "development".to_string()
}
fn d_port() -> u16 {
    3004
}
fn d_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn d_shard_count() -> u32 {
    1024
}
fn d_node_shards() -> String {
    "0-1023".to_string()
}
fn d_replication_factor() -> u32 {
    3
}
fn d_replication_timeout_ms() -> u64 {
    5000
}
fn d_true() -> bool {
    true
}
fn d_max_blob_size_mb() -> u64 {
    10
}
fn d_max_storage_gb() -> u64 {
    100
}
fn d_chain_timeout_ms() -> u64 {
    5000
}

/// Which signal drives garbage collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RetentionMode {
    Time,
    Size,
    #[default]
    Hybrid,
}

/// Garbage collection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GcConfig {
    #[serde(default = "d_true")]
    pub enabled: bool,
    #[serde(default)]
    pub retention_mode: RetentionMode,
    #[serde(default = "GcConfig::d_max_storage_mb")]
    pub max_storage_mb: u64,
    #[serde(default = "GcConfig::d_max_blob_age_days")]
    pub max_blob_age_days: u64,
    #[serde(default = "GcConfig::d_min_free_disk_mb")]
    pub min_free_disk_mb: u64,
    #[serde(default = "GcConfig::d_reserved_for_pinned_mb")]
    pub reserved_for_pinned_mb: u64,
    #[serde(default = "GcConfig::d_interval_minutes")]
    pub interval_minutes: u64,
    #[serde(default = "d_true")]
    pub verify_replicas: bool,
    #[serde(default)]
    pub verify_proofs: bool,
}

impl GcConfig {
    fn d_max_storage_mb() -> u64 {
        5000
    }
    fn d_max_blob_age_days() -> u64 {
        30
    }
    fn d_min_free_disk_mb() -> u64 {
        1000
    }
    fn d_reserved_for_pinned_mb() -> u64 {
        1000
    }
    fn d_interval_minutes() -> u64 {
        10
    }
}

impl Default for GcConfig {
    fn default() -> Self {
        GcConfig {
            enabled: true,
            retention_mode: RetentionMode::Hybrid,
            max_storage_mb: Self::d_max_storage_mb(),
            max_blob_age_days: Self::d_max_blob_age_days(),
            min_free_disk_mb: Self::d_min_free_disk_mb(),
            reserved_for_pinned_mb: Self::d_reserved_for_pinned_mb(),
            interval_minutes: Self::d_interval_minutes(),
            verify_replicas: true,
            verify_proofs: false,
        }
    }
}

/// Authorization oracle settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthConfig {
    /// Reject writes when the app registry cannot be consulted.
    #[serde(default)]
    pub require_app_registry: bool,
    /// App-id allowlist; entries match exactly, as substrings, or `*`.
    #[serde(default)]
    pub allowed_apps: Option<Vec<String>>,
    /// Opt into the looser message rule that does not require the sender to
    /// be a thread participant.
    #[serde(default)]
    pub allow_nonparticipant_sender: bool,
}

/// The complete node configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default = "d_node_env")]
    pub node_env: String,
    pub node_id: String,
    /// This node's public key, presented to peers on replication pushes so
    /// they can verify it against the on-chain registry.
    #[serde(default)]
    pub node_public_key: String,
    #[serde(default = "d_port")]
    pub port: u16,
    pub node_url: String,
    #[serde(default = "d_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "d_shard_count")]
    pub shard_count: u32,
    /// Shard ownership spec, e.g. `"0-255,512-767"` or `"0,1,2,3"`.
    #[serde(default = "d_node_shards")]
    pub node_shards: String,
    #[serde(default = "d_replication_factor")]
    pub replication_factor: u32,
    #[serde(default = "d_replication_timeout_ms")]
    pub replication_timeout_ms: u64,
    #[serde(default = "d_true")]
    pub replication_enabled: bool,
    #[serde(default = "d_max_blob_size_mb")]
    pub max_blob_size_mb: u64,
    #[serde(default = "d_max_storage_gb")]
    pub max_storage_gb: u64,
    #[serde(default)]
    pub compression_enabled: bool,
    /// Enforce the CID/peer blocklists.
    #[serde(default = "d_true")]
    pub enable_blocked_content: bool,
    #[serde(default)]
    pub blocked_cids: Vec<String>,
    #[serde(default)]
    pub blocked_peers: Vec<String>,
    #[serde(default = "d_chain_timeout_ms")]
    pub chain_timeout_ms: u64,
    /// Base URL of the chain indexer service.
    #[serde(default)]
    pub chain_url: Option<String>,
    #[serde(default)]
    pub gc: GcConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

impl NodeConfig {
    /// The per-blob size ceiling in bytes.
    pub fn max_blob_size(&self) -> u64 {
        self.max_blob_size_mb * 1024 * 1024
    }

    /// The total storage capacity in bytes.
    pub fn max_storage(&self) -> u64 {
        self.max_storage_gb * 1024 * 1024 * 1024
    }

    /// Builds the shard map from the ownership spec.
    pub fn shard_map(&self) -> Result<ShardMap, ConfigError> {
        ShardMap::parse(&self.node_shards, self.shard_count)
    }

    /// Validates the configuration at startup. Failures here are fatal.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.node_id.trim().is_empty() {
            return Err(ConfigError::Missing("node_id"));
        }
        if self.node_url.trim().is_empty() {
            return Err(ConfigError::Missing("node_url"));
        }
        if self.replication_factor == 0 {
            return Err(ConfigError::Invalid(
                "replication_factor must be at least 1".into(),
            ));
        }
        self.shard_map()?;

        // A development or test node must not point at production data.
        let dir = self.data_dir.to_string_lossy().to_ascii_lowercase();
        if self.node_env != "production" && (dir.contains("prod") || dir.starts_with("/var/lib")) {
            return Err(ConfigError::UnsafeDataDir {
                node_env: self.node_env.clone(),
                data_dir: self.data_dir.to_string_lossy().into_owned(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> NodeConfig {
        toml::from_str(
            r#"
            node_id = "vault-1"
            node_url = "http://127.0.0.1:3004"
            "#,
        )
        .unwrap()
    }

    #[test]
    fn defaults_match_federation() {
        let cfg = minimal();
        assert_eq!(cfg.node_env, "development");
        assert_eq!(cfg.port, 3004);
        assert_eq!(cfg.shard_count, 1024);
        assert_eq!(cfg.node_shards, "0-1023");
        assert_eq!(cfg.replication_factor, 3);
        assert_eq!(cfg.replication_timeout_ms, 5000);
        assert!(cfg.replication_enabled);
        assert_eq!(cfg.max_blob_size(), 10 * 1024 * 1024);
        assert_eq!(cfg.max_storage_gb, 100);
        assert!(!cfg.compression_enabled);
        assert!(cfg.enable_blocked_content);
        assert_eq!(cfg.gc.retention_mode, RetentionMode::Hybrid);
        assert_eq!(cfg.gc.max_storage_mb, 5000);
        assert_eq!(cfg.gc.interval_minutes, 10);
        assert!(cfg.gc.verify_replicas);
        assert!(!cfg.gc.verify_proofs);
        assert!(!cfg.auth.require_app_registry);
        cfg.validate().unwrap();
    }

    #[test]
    fn rejects_missing_identity() {
        let mut cfg = minimal();
        cfg.node_id = String::new();
        assert!(matches!(cfg.validate(), Err(ConfigError::Missing("node_id"))));
    }

    #[test]
    fn rejects_dev_node_on_production_dir() {
        let mut cfg = minimal();
        cfg.data_dir = PathBuf::from("/srv/prod-vault/data");
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::UnsafeDataDir { .. })
        ));
        cfg.node_env = "production".into();
        cfg.validate().unwrap();
    }

    #[test]
    fn rejects_bad_shard_spec() {
        let mut cfg = minimal();
        cfg.node_shards = "12-9".into();
        assert!(cfg.validate().is_err());
    }
}
