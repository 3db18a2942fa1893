// Path: crates/api/src/chain.rs

//! The chain verifier oracle. The vault never mutates chain state on the
//! write path; registration is an explicit operator task.

use async_trait::async_trait;
use bytecave_types::error::ChainError;
use bytecave_types::peer::PeerRecord;
use bytecave_types::Cid;
use serde::{Deserialize, Serialize};

/// A group as resolved from its token address.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GroupRecord {
    pub owner: String,
    pub token: String,
}

/// Read access to the on-chain registries the oracle consults.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Whether the node identified by the hashed public key is registered
    /// and active.
    async fn is_node_active(&self, node_id_hash: &str) -> Result<bool, ChainError>;

    /// The registration record for a node, if any.
    async fn get_node(&self, node_id_hash: &str) -> Result<Option<PeerRecord>, ChainError>;

    /// The group token configured at a group-posts contract address.
    async fn get_group_token(&self, group_posts_address: &str)
        -> Result<Option<String>, ChainError>;

    /// The group owned by a token address, if any.
    async fn get_group_by_token(
        &self,
        token_address: &str,
    ) -> Result<Option<GroupRecord>, ChainError>;

    /// Whether `address` holds membership of `group_token`.
    async fn is_member(&self, address: &str, group_token: &str) -> Result<bool, ChainError>;

    /// Whether any authorized post references this CID.
    async fn get_post_by_cid(&self, cid: &Cid) -> Result<bool, ChainError>;

    /// Whether any authorized message references this CID.
    async fn get_message_by_cid(&self, cid: &Cid) -> Result<bool, ChainError>;

    /// Registers this vault in the node registry. Operator-initiated only.
    async fn register_node(&self, record: &PeerRecord) -> Result<(), ChainError>;
}

/// The external application registry consulted for `(appId, sender)` pairs.
#[async_trait]
pub trait AppRegistry: Send + Sync {
    /// Whether the registry service can currently be reached.
    async fn available(&self) -> bool;

    /// Whether `sender` is authorized to write under `app_id`.
    async fn is_app_authorized(&self, app_id: &str, sender: &str) -> Result<bool, ChainError>;
}
