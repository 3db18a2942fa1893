// Path: crates/replication/src/intake.rs

//! The server side of replication: validating a blob pushed by a peer
//! before it is admitted into the local store.
//!
//! Checks run in order: peer blocklist, registered-active lookup by hashed
//! public key, CID blocklist, ciphertext-to-CID verification, on-chain CID
//! authorization (media is signature-authorized upstream and only needs a
//! sender), then the idempotent `put`.

use bytecave_api::chain::ChainClient;
use bytecave_api::transport::{ReplicaMeta, ReplicateAck};
use bytecave_chain::CachingChainClient;
use bytecave_crypto::{node_id_of_public_key, verify_cid};
use bytecave_storage::{BlobStore, PutExtras};
use bytecave_types::error::ReplicationError;
use bytecave_types::Cid;
use std::collections::HashSet;
use std::sync::Arc;

/// A replication push as received from a peer.
#[derive(Debug, Clone)]
pub struct IncomingReplica {
    pub cid: Cid,
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub meta: ReplicaMeta,
    /// The pushing peer's public key, as presented by the transport.
    pub peer_public_key: String,
}

/// Validates and admits replicas pushed by peers.
pub struct ReplicationIntake<C> {
    chain: Arc<CachingChainClient<C>>,
    store: Arc<BlobStore>,
    blocked_cids: HashSet<String>,
    blocked_peers: HashSet<String>,
    blocklist_enabled: bool,
}

impl<C: ChainClient> ReplicationIntake<C> {
    pub fn new(
        chain: Arc<CachingChainClient<C>>,
        store: Arc<BlobStore>,
        blocked_cids: impl IntoIterator<Item = String>,
        blocked_peers: impl IntoIterator<Item = String>,
        blocklist_enabled: bool,
    ) -> Self {
        ReplicationIntake {
            chain,
            store,
            blocked_cids: blocked_cids.into_iter().collect(),
            blocked_peers: blocked_peers.into_iter().collect(),
            blocklist_enabled,
        }
    }

    /// Runs the intake pipeline for one push.
    pub async fn handle(&self, replica: IncomingReplica) -> Result<ReplicateAck, ReplicationError> {
        let node_id = node_id_of_public_key(&replica.peer_public_key);

        if self.blocklist_enabled {
            let from = replica.meta.from_peer.as_deref().unwrap_or("");
            if self.blocked_peers.contains(&node_id) || self.blocked_peers.contains(from) {
                return Err(ReplicationError::PeerBlocked(node_id));
            }
        }

        if !self.chain.is_node_active(&node_id).await? {
            return Err(ReplicationError::PeerNotRegistered(node_id));
        }

        if self.blocklist_enabled && self.blocked_cids.contains(&replica.cid.to_hex()) {
            return Err(ReplicationError::CidBlocked(replica.cid.to_hex()));
        }

        if !verify_cid(&replica.cid, &replica.bytes) {
            return Err(ReplicationError::CidMismatch(replica.cid.to_hex()));
        }

        let is_media = replica.meta.content_type.as_deref() == Some("media");
        if is_media {
            if replica.meta.sender.as_deref().unwrap_or("").is_empty() {
                return Err(ReplicationError::MissingSender);
            }
        } else if !self.chain.is_cid_on_chain(&replica.cid).await? {
            return Err(ReplicationError::NotAuthorizedOnChain(replica.cid.to_hex()));
        }

        let outcome = self.store.put(
            &replica.cid,
            &replica.bytes,
            &replica.mime_type,
            PutExtras {
                content_type: replica.meta.content_type.clone(),
                guild_id: replica.meta.guild_id.clone(),
                from_peer: replica.meta.from_peer.clone().or(Some(node_id.clone())),
                integrity_hash: None,
            },
        )?;

        tracing::info!(
            target: "replication",
            event = "replica_admitted",
            cid = %replica.cid,
            from = %node_id,
            already_stored = outcome.already_stored,
        );
        Ok(ReplicateAck {
            stored: true,
            already_stored: outcome.already_stored,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytecave_chain::MockChain;
    use bytecave_crypto::cid_of;
    use bytecave_storage::StoreOptions;
    use bytecave_types::peer::PeerRecord;
    use std::time::Duration;

    struct Fixture {
        intake: ReplicationIntake<MockChain>,
        chain: Arc<MockChain>,
        store: Arc<BlobStore>,
        _dir: tempfile::TempDir,
    }

    const PEER_KEY: &str = "04deadbeef";

    fn fixture(blocked_cids: Vec<String>, blocked_peers: Vec<String>) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(
            BlobStore::open(StoreOptions {
                root: dir.path().to_path_buf(),
                capacity: 1 << 20,
                max_blob_size: 1 << 20,
                compression_enabled: false,
            })
            .unwrap(),
        );
        let chain = Arc::new(MockChain::new());
        // Register the pushing peer as active.
        chain.add_node(
            node_id_of_public_key(PEER_KEY),
            PeerRecord {
                node_id: node_id_of_public_key(PEER_KEY),
                endpoint: "http://peer:3004".into(),
                public_key: PEER_KEY.into(),
                active: true,
                shards: None,
            },
        );
        let caching = Arc::new(CachingChainClient::new(chain.clone(), Duration::from_secs(1)));
        let intake = ReplicationIntake::new(caching, store.clone(), blocked_cids, blocked_peers, true);
        Fixture {
            intake,
            chain,
            store,
            _dir: dir,
        }
    }

    fn replica(bytes: &[u8]) -> IncomingReplica {
        IncomingReplica {
            cid: cid_of(bytes),
            bytes: bytes.to_vec(),
            mime_type: "application/octet-stream".into(),
            meta: ReplicaMeta::default(),
            peer_public_key: PEER_KEY.into(),
        }
    }

    #[tokio::test]
    async fn admits_chain_authorized_replica() {
        let fx = fixture(vec![], vec![]);
        let push = replica(b"on-chain blob");
        fx.chain.add_post_cid(push.cid);
        let ack = fx.intake.handle(push.clone()).await.unwrap();
        assert!(ack.stored);
        assert!(!ack.already_stored);
        assert!(fx.store.has_blob(&push.cid));
    }

    #[tokio::test]
    async fn repeat_push_is_idempotent() {
        let fx = fixture(vec![], vec![]);
        let push = replica(b"twice");
        fx.chain.add_post_cid(push.cid);
        fx.intake.handle(push.clone()).await.unwrap();
        let ack = fx.intake.handle(push).await.unwrap();
        assert!(ack.already_stored);
        assert_eq!(fx.store.stats().blob_count, 1);
    }

    #[tokio::test]
    async fn unregistered_peer_is_rejected() {
        let fx = fixture(vec![], vec![]);
        let mut push = replica(b"who are you");
        push.peer_public_key = "04unknown".into();
        assert!(matches!(
            fx.intake.handle(push).await,
            Err(ReplicationError::PeerNotRegistered(_))
        ));
    }

    #[tokio::test]
    async fn blocked_peer_is_rejected_before_chain_lookup() {
        let node_id = node_id_of_public_key(PEER_KEY);
        let fx = fixture(vec![], vec![node_id]);
        let calls_before = fx.chain.call_count();
        assert!(matches!(
            fx.intake.handle(replica(b"blocked peer")).await,
            Err(ReplicationError::PeerBlocked(_))
        ));
        assert_eq!(fx.chain.call_count(), calls_before);
    }

    #[tokio::test]
    async fn blocked_cid_is_rejected() {
        let push = replica(b"banned content");
        let fx = fixture(vec![push.cid.to_hex()], vec![]);
        fx.chain.add_post_cid(push.cid);
        assert!(matches!(
            fx.intake.handle(push).await,
            Err(ReplicationError::CidBlocked(_))
        ));
    }

    #[tokio::test]
    async fn mismatched_ciphertext_is_rejected() {
        let fx = fixture(vec![], vec![]);
        let mut push = replica(b"original");
        push.bytes = b"swapped!".to_vec();
        assert!(matches!(
            fx.intake.handle(push).await,
            Err(ReplicationError::CidMismatch(_))
        ));
    }

    #[tokio::test]
    async fn non_media_requires_on_chain_record() {
        let fx = fixture(vec![], vec![]);
        let push = replica(b"not referenced anywhere");
        assert!(matches!(
            fx.intake.handle(push).await,
            Err(ReplicationError::NotAuthorizedOnChain(_))
        ));
    }

    #[tokio::test]
    async fn media_needs_only_a_sender() {
        let fx = fixture(vec![], vec![]);
        let mut push = replica(b"media bytes");
        push.meta.content_type = Some("media".into());
        // No sender: rejected.
        assert!(matches!(
            fx.intake.handle(push.clone()).await,
            Err(ReplicationError::MissingSender)
        ));
        // With a sender: admitted without any chain CID lookup.
        push.meta.sender = Some("0xabc".into());
        let ack = fx.intake.handle(push).await.unwrap();
        assert!(ack.stored);
    }
}
